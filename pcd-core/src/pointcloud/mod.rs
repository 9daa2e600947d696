pub mod column;
pub mod decimation;
pub mod extra_bytes;
pub mod point;
pub mod schema;
