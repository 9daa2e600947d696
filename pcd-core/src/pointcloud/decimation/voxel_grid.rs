use std::collections::HashSet;

use thiserror::Error;

use crate::pointcloud::point::BoundingVolume;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VoxelError {
    #[error("voxel size must be finite and non-zero, got {0}")]
    InvalidCellSize(f64),
    #[error("static voxel grid bounds must be finite with min <= max on every axis")]
    InvalidBounds,
    #[error("static voxel grid of {0:?} cells cannot be allocated")]
    GridTooLarge([usize; 3]),
    #[error("point ({x}, {y}, {z}) lies outside the static voxel grid")]
    OutOfBounds { x: f64, y: f64, z: f64 },
}

/// Integer cell coordinates, `floor((coordinate - anchor) / cell_size)` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoxelKey {
    pub ix: i64,
    pub iy: i64,
    pub iz: i64,
}

impl VoxelKey {
    pub fn new(x: f64, y: f64, z: f64, anchor: [f64; 3], cell_size: f64) -> Self {
        VoxelKey {
            ix: cell_index(anchor[0], x, cell_size) as i64,
            iy: cell_index(anchor[1], y, cell_size) as i64,
            iz: cell_index(anchor[2], z, cell_size) as i64,
        }
    }
}

fn cell_index(first: f64, last: f64, cell_size: f64) -> f64 {
    ((last - first) / cell_size).floor()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoxelMode {
    /// Dense occupancy array over fixed bounds.
    Static(BoundingVolume),
    /// Hash set of keys, anchored on the first point seen.
    Dynamic,
}

/// Occupancy strategy behind a [`VoxelGrid`].
pub trait VoxelRegistry {
    /// Returns `true` the first time the cell holding `(x, y, z)` is visited.
    fn test_and_mark(&mut self, x: f64, y: f64, z: f64, cell_size: f64)
        -> Result<bool, VoxelError>;
    fn reset(&mut self);
    fn occupied(&self) -> usize;
}

pub struct DenseRegistry {
    min: [f64; 3],
    dims: [usize; 3],
    cells: Vec<bool>,
    occupied: usize,
}

impl DenseRegistry {
    pub fn new(bounds: &BoundingVolume, cell_size: f64) -> Result<Self, VoxelError> {
        let mut dims = [0usize; 3];
        for axis in 0..3 {
            let (min, max) = (bounds.min[axis], bounds.max[axis]);
            if !min.is_finite() || !max.is_finite() || min > max {
                return Err(VoxelError::InvalidBounds);
            }
            let n = ((max - min) / cell_size).ceil();
            if n >= usize::MAX as f64 {
                return Err(VoxelError::GridTooLarge([usize::MAX; 3]));
            }
            dims[axis] = n as usize + 1;
        }

        let len = dims[0]
            .checked_mul(dims[1])
            .and_then(|n| n.checked_mul(dims[2]))
            .ok_or(VoxelError::GridTooLarge(dims))?;

        let mut cells = Vec::new();
        cells
            .try_reserve_exact(len)
            .map_err(|_| VoxelError::GridTooLarge(dims))?;
        cells.resize(len, false);

        log::debug!("static voxel grid allocated with {:?} cells", dims);

        Ok(DenseRegistry {
            min: bounds.min,
            dims,
            cells,
            occupied: 0,
        })
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    fn index(&self, x: f64, y: f64, z: f64, cell_size: f64) -> Option<usize> {
        let mut idx = [0usize; 3];
        for (axis, value) in [x, y, z].into_iter().enumerate() {
            let n = cell_index(self.min[axis], value, cell_size);
            // NaN fails both comparisons
            if !(n >= 0.0 && n < self.dims[axis] as f64) {
                return None;
            }
            idx[axis] = n as usize;
        }
        Some((idx[0] * self.dims[1] + idx[1]) * self.dims[2] + idx[2])
    }
}

impl VoxelRegistry for DenseRegistry {
    fn test_and_mark(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        cell_size: f64,
    ) -> Result<bool, VoxelError> {
        let index = self
            .index(x, y, z, cell_size)
            .ok_or(VoxelError::OutOfBounds { x, y, z })?;

        if self.cells[index] {
            return Ok(false);
        }
        self.cells[index] = true;
        self.occupied += 1;
        Ok(true)
    }

    fn reset(&mut self) {
        self.cells.fill(false);
        self.occupied = 0;
    }

    fn occupied(&self) -> usize {
        self.occupied
    }
}

#[derive(Default)]
pub struct SparseRegistry {
    anchor: Option<[f64; 3]>,
    keys: HashSet<VoxelKey>,
}

impl SparseRegistry {
    pub fn anchor(&self) -> Option<[f64; 3]> {
        self.anchor
    }
}

impl VoxelRegistry for SparseRegistry {
    fn test_and_mark(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        cell_size: f64,
    ) -> Result<bool, VoxelError> {
        let anchor = *self.anchor.get_or_insert([x, y, z]);
        let key = VoxelKey::new(x, y, z, anchor, cell_size);
        Ok(self.keys.insert(key))
    }

    fn reset(&mut self) {
        self.keys.clear();
        self.anchor = None;
    }

    fn occupied(&self) -> usize {
        self.keys.len()
    }
}

/// Keeps at most one point per cubic cell of side `cell_size`.
pub struct VoxelGrid {
    cell_size: f64,
    registry: Box<dyn VoxelRegistry>,
}

impl VoxelGrid {
    pub fn new(cell_size: f64, mode: VoxelMode) -> Result<Self, VoxelError> {
        if !cell_size.is_finite() || cell_size == 0.0 {
            return Err(VoxelError::InvalidCellSize(cell_size));
        }
        let cell_size = cell_size.abs();

        let registry: Box<dyn VoxelRegistry> = match mode {
            VoxelMode::Static(bounds) => Box::new(DenseRegistry::new(&bounds, cell_size)?),
            VoxelMode::Dynamic => Box::new(SparseRegistry::default()),
        };

        Ok(VoxelGrid {
            cell_size,
            registry,
        })
    }

    pub fn dynamic(cell_size: f64) -> Result<Self, VoxelError> {
        Self::new(cell_size, VoxelMode::Dynamic)
    }

    pub fn with_bounds(cell_size: f64, bounds: BoundingVolume) -> Result<Self, VoxelError> {
        Self::new(cell_size, VoxelMode::Static(bounds))
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn test_and_mark(&mut self, x: f64, y: f64, z: f64) -> Result<bool, VoxelError> {
        self.registry.test_and_mark(x, y, z, self.cell_size)
    }

    /// Forgets every visited cell. A dynamic grid re-anchors on the next point.
    pub fn reset(&mut self) {
        self.registry.reset();
    }

    /// Number of distinct cells marked since creation or the last reset.
    pub fn occupied(&self) -> usize {
        self.registry.occupied()
    }
}
