use crate::pointcloud::point::Point;

use super::voxel_grid::{VoxelError, VoxelGrid};

/// A streaming keep/drop criterion, evaluated once per point in arrival order.
pub trait PointCloudDecimator {
    fn name(&self) -> &'static str;

    fn keep(&mut self, point: &Point) -> Result<bool, VoxelError>;

    fn reset(&mut self) {}

    fn decimate(&mut self, points: &[Point]) -> Result<Vec<Point>, VoxelError> {
        let mut decimated_points = Vec::new();
        for point in points {
            if self.keep(point)? {
                decimated_points.push(point.clone());
            }
        }
        Ok(decimated_points)
    }
}

/// First point seen in a voxel wins.
pub struct VoxelDecimator {
    pub grid: VoxelGrid,
}

impl VoxelDecimator {
    pub fn new(grid: VoxelGrid) -> Self {
        Self { grid }
    }
}

impl PointCloudDecimator for VoxelDecimator {
    fn name(&self) -> &'static str {
        "thin_with_voxel"
    }

    fn keep(&mut self, point: &Point) -> Result<bool, VoxelError> {
        self.grid.test_and_mark(point.x, point.y, point.z)
    }

    fn reset(&mut self) {
        self.grid.reset();
    }
}

pub struct ClassDecimator {
    pub classes: Vec<u8>,
    pub keep_listed: bool,
}

impl PointCloudDecimator for ClassDecimator {
    fn name(&self) -> &'static str {
        if self.keep_listed {
            "keep_class"
        } else {
            "drop_class"
        }
    }

    fn keep(&mut self, point: &Point) -> Result<bool, VoxelError> {
        let listed = self.classes.contains(&point.attributes.classification);
        Ok(listed == self.keep_listed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointFlag {
    Withheld,
    Synthetic,
}

pub struct FlagDecimator {
    pub flag: PointFlag,
}

impl PointCloudDecimator for FlagDecimator {
    fn name(&self) -> &'static str {
        match self.flag {
            PointFlag::Withheld => "drop_withheld",
            PointFlag::Synthetic => "drop_synthetic",
        }
    }

    fn keep(&mut self, point: &Point) -> Result<bool, VoxelError> {
        let set = match self.flag {
            PointFlag::Withheld => point.attributes.withheld,
            PointFlag::Synthetic => point.attributes.synthetic,
        };
        Ok(!set)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnDecimator {
    First,
    Last,
}

impl PointCloudDecimator for ReturnDecimator {
    fn name(&self) -> &'static str {
        match self {
            ReturnDecimator::First => "keep_first",
            ReturnDecimator::Last => "keep_last",
        }
    }

    fn keep(&mut self, point: &Point) -> Result<bool, VoxelError> {
        let attributes = &point.attributes;
        Ok(match self {
            ReturnDecimator::First => attributes.return_number <= 1,
            ReturnDecimator::Last => attributes.return_number >= attributes.number_of_returns,
        })
    }
}

/// Keeps points whose coordinates fall inside half-open ranges.
pub struct RangeDecimator {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl RangeDecimator {
    pub fn z(min: f64, max: f64) -> Self {
        RangeDecimator {
            min: [f64::NEG_INFINITY, f64::NEG_INFINITY, min],
            max: [f64::INFINITY, f64::INFINITY, max],
        }
    }

    pub fn xy(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        RangeDecimator {
            min: [min_x, min_y, f64::NEG_INFINITY],
            max: [max_x, max_y, f64::INFINITY],
        }
    }
}

impl PointCloudDecimator for RangeDecimator {
    fn name(&self) -> &'static str {
        "keep_range"
    }

    fn keep(&mut self, point: &Point) -> Result<bool, VoxelError> {
        let inside = [point.x, point.y, point.z]
            .iter()
            .enumerate()
            .all(|(axis, &v)| v >= self.min[axis] && v < self.max[axis]);
        Ok(inside)
    }
}

/// Runs decimators in order, stopping at the first one that drops the point.
#[derive(Default)]
pub struct DecimatorChain {
    decimators: Vec<Box<dyn PointCloudDecimator>>,
}

impl DecimatorChain {
    pub fn new(decimators: Vec<Box<dyn PointCloudDecimator>>) -> Self {
        Self { decimators }
    }

    pub fn push(&mut self, decimator: Box<dyn PointCloudDecimator>) {
        self.decimators.push(decimator);
    }

    pub fn is_empty(&self) -> bool {
        self.decimators.is_empty()
    }

    pub fn len(&self) -> usize {
        self.decimators.len()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.decimators.iter().map(|d| d.name()).collect()
    }
}

impl PointCloudDecimator for DecimatorChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn keep(&mut self, point: &Point) -> Result<bool, VoxelError> {
        for decimator in self.decimators.iter_mut() {
            if !decimator.keep(point)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn reset(&mut self) {
        for decimator in self.decimators.iter_mut() {
            decimator.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_point(x: f64, y: f64, z: f64, classification: u8) -> Point {
        let mut point = Point::new(x, y, z);
        point.attributes.classification = classification;
        point
    }

    #[test]
    fn voxel_decimator_keeps_first_point_per_cell() {
        let mut decimator = VoxelDecimator::new(VoxelGrid::dynamic(1.0).unwrap());
        let points = vec![
            make_point(0.1, 0.1, 0.1, 2),
            make_point(0.9, 0.9, 0.9, 2),
            make_point(1.1, 1.1, 1.1, 2),
        ];
        let kept = decimator.decimate(&points).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].x, 1.1);
    }

    #[test]
    fn class_decimators() {
        let mut keep = ClassDecimator {
            classes: vec![2, 9],
            keep_listed: true,
        };
        let mut drop = ClassDecimator {
            classes: vec![2],
            keep_listed: false,
        };
        assert!(keep.keep(&make_point(0.0, 0.0, 0.0, 9)).unwrap());
        assert!(!keep.keep(&make_point(0.0, 0.0, 0.0, 5)).unwrap());
        assert!(!drop.keep(&make_point(0.0, 0.0, 0.0, 2)).unwrap());
        assert!(drop.keep(&make_point(0.0, 0.0, 0.0, 1)).unwrap());
    }

    #[test]
    fn return_decimators() {
        let mut p = make_point(0.0, 0.0, 0.0, 1);
        p.attributes.return_number = 2;
        p.attributes.number_of_returns = 2;
        assert!(!ReturnDecimator::First.keep(&p).unwrap());
        assert!(ReturnDecimator::Last.keep(&p).unwrap());
    }

    #[test]
    fn chain_skips_voxel_for_dropped_points() {
        let mut chain = DecimatorChain::new(vec![
            Box::new(FlagDecimator {
                flag: PointFlag::Withheld,
            }),
            Box::new(VoxelDecimator::new(VoxelGrid::dynamic(1.0).unwrap())),
        ]);
        let mut withheld = make_point(0.5, 0.5, 0.5, 1);
        withheld.attributes.withheld = true;

        assert!(!chain.keep(&withheld).unwrap());
        // the withheld point did not anchor or occupy the grid
        assert!(chain.keep(&make_point(0.6, 0.6, 0.6, 1)).unwrap());
        assert!(!chain.keep(&make_point(0.7, 0.7, 0.7, 1)).unwrap());
        assert_eq!(chain.names(), vec!["drop_withheld", "thin_with_voxel"]);
    }

    #[test]
    fn range_decimator_is_half_open() {
        let mut z = RangeDecimator::z(0.0, 10.0);
        assert!(z.keep(&make_point(5.0, 5.0, 0.0, 1)).unwrap());
        assert!(!z.keep(&make_point(5.0, 5.0, 10.0, 1)).unwrap());
    }
}
