use std::{collections::VecDeque, io};

use pcd_core::pointcloud::{point::Point, schema::PointSchema};

use super::PointReader;

/// Serves points from memory, e.g. for tests or embedding callers.
pub struct MemoryPointReader {
    schema: PointSchema,
    points: VecDeque<Point>,
    closed: bool,
}

impl MemoryPointReader {
    /// `number_of_points` and the bounding volume of `schema` are filled from `points`.
    pub fn new(mut schema: PointSchema, points: Vec<Point>) -> Self {
        schema.number_of_points = points.len() as u64;
        schema.bounding_volume = Default::default();
        for p in &points {
            schema.bounding_volume.extend(p.x, p.y, p.z);
        }
        Self {
            schema,
            points: points.into(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl PointReader for MemoryPointReader {
    fn schema(&self) -> &PointSchema {
        &self.schema
    }

    fn next_point(&mut self) -> io::Result<Option<Point>> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "reading from a closed point reader",
            ));
        }
        Ok(self.points.pop_front())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        self.points.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_points_in_order_then_ends() {
        let mut reader = MemoryPointReader::new(
            PointSchema::default(),
            vec![Point::new(1.0, 2.0, 3.0), Point::new(-1.0, 0.0, 5.0)],
        );
        assert_eq!(reader.schema().number_of_points, 2);
        assert_eq!(reader.schema().bounding_volume.min, [-1.0, 0.0, 3.0]);

        assert_eq!(reader.next_point().unwrap().unwrap().x, 1.0);
        assert_eq!(reader.next_point().unwrap().unwrap().x, -1.0);
        assert!(reader.next_point().unwrap().is_none());

        reader.close().unwrap();
        assert!(reader.is_closed());
        assert!(reader.next_point().is_err());
    }
}
