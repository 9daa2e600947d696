use std::{cell::RefCell, io, rc::Rc};

use pcd_core::pointcloud::point::Point;

use super::PointWriter;

/// Collects written points into a vector shared with the caller.
#[derive(Default)]
pub struct MemoryPointWriter {
    points: Rc<RefCell<Vec<Point>>>,
    closed: bool,
}

impl MemoryPointWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the collected points; stays valid after the writer is dropped.
    pub fn points(&self) -> Rc<RefCell<Vec<Point>>> {
        Rc::clone(&self.points)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl PointWriter for MemoryPointWriter {
    fn write_point(&mut self, point: &Point) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "writing to a closed point writer",
            ));
        }
        self.points.borrow_mut().push(point.clone());
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_until_closed() {
        let mut writer = MemoryPointWriter::new();
        let points = writer.points();

        writer.write_point(&Point::new(1.0, 1.0, 1.0)).unwrap();
        writer.close().unwrap();
        assert!(writer.write_point(&Point::new(2.0, 2.0, 2.0)).is_err());

        drop(writer);
        assert_eq!(points.borrow().len(), 1);
    }
}
