pub mod extra_bytes;
pub mod reader;
pub mod writer;
