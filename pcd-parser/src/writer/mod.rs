pub mod las;
pub mod memory;

use pcd_core::pointcloud::point::Point;
use std::io;

/// Point sink. Writers flush and release their handles on drop as well as
/// on `close`.
pub trait PointWriter {
    fn write_point(&mut self, point: &Point) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;
}
