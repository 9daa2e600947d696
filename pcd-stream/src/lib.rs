pub mod builder;
pub mod error;
pub mod field;
pub mod filter;
pub mod result;
pub mod runner;
pub mod selection;
pub mod writer;

use std::path::Path;

use pcd_parser::writer::{las::LasPointWriter, PointWriter as _};

pub use builder::{GridBounds, StreamBuilder, StreamConfig, VoxelConfig};
pub use error::StreamError;
pub use field::Field;
pub use result::{Advisories, Inventory, PointColumns, StreamOutput};
pub use runner::{CancelFlag, StreamState, Streamer};
pub use selection::{ExtraByteSelection, FieldSelection};
pub use writer::ColumnWriter;

/// Streams the configured LAS/LAZ inputs to completion.
pub fn stream_files(config: StreamConfig) -> Result<StreamOutput, StreamError> {
    let mut streamer = Streamer::new(config);
    streamer.open_files()?;
    streamer.run()
}

/// Writes materialized columns to a new LAS/LAZ file. Returns the number of
/// points written.
pub fn write_las<P: AsRef<Path>>(columns: &PointColumns, path: P) -> Result<usize, StreamError> {
    let column_writer = ColumnWriter::new(columns)?;
    let mut writer = LasPointWriter::create(path, &column_writer.schema()?)?;
    let written = column_writer.write_to(&mut writer)?;
    writer.close()?;
    Ok(written)
}
