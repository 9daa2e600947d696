pub mod las;
pub mod memory;

use pcd_core::pointcloud::{point::Point, schema::PointSchema};
use std::io;

/// Pull-based point source. Readers release their handles on drop as well
/// as on `close`.
pub trait PointReader {
    fn schema(&self) -> &PointSchema;

    fn next_point(&mut self) -> io::Result<Option<Point>>;

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}
