use std::path::PathBuf;

use pcd_core::pointcloud::{
    decimation::voxel_grid::VoxelGrid, point::BoundingVolume, schema::PointSchema,
};

use crate::{
    error::StreamError, filter::FilterSpec, runner::CancelFlag, selection::FieldSelection,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridBounds {
    /// Hash-set grid anchored on the first point.
    Unbounded,
    /// Dense grid over the bounds declared by the source.
    FromHeader,
    /// Dense grid over caller-supplied bounds.
    Explicit(BoundingVolume),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelConfig {
    pub cell_size: f64,
    pub bounds: GridBounds,
}

impl VoxelConfig {
    pub fn grid(&self, schema: &PointSchema) -> Result<VoxelGrid, StreamError> {
        let grid = match self.bounds {
            GridBounds::Unbounded => VoxelGrid::dynamic(self.cell_size)?,
            GridBounds::FromHeader if schema.bounding_volume.is_empty() => {
                if schema.number_of_points > 0 {
                    return Err(StreamError::Unsupported(format!(
                        "source declares {} points but no bounds for a static voxel grid",
                        schema.number_of_points
                    )));
                }
                // no point will ever be looked up
                log::debug!("source is empty, static voxel grid not allocated");
                VoxelGrid::dynamic(self.cell_size)?
            }
            GridBounds::FromHeader => {
                VoxelGrid::with_bounds(self.cell_size, schema.bounding_volume)?
            }
            GridBounds::Explicit(bounds) => VoxelGrid::with_bounds(self.cell_size, bounds)?,
        };
        Ok(grid)
    }
}

/// Settings of one stream, fixed once built.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub inputs: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub selection: FieldSelection,
    pub filter: FilterSpec,
    pub voxel: Option<VoxelConfig>,
    pub cancel: Option<CancelFlag>,
}

impl StreamConfig {
    /// Whether any criterion or thinning drops points.
    pub fn has_filter(&self) -> bool {
        !self.filter.criteria.is_empty() || self.voxel.is_some()
    }

    /// Number of points to reserve per populated column.
    pub fn capacity_hint(&self, number_of_points: u64) -> usize {
        let n = usize::try_from(number_of_points).unwrap_or(usize::MAX);
        if self.has_filter() {
            n.div_ceil(8)
        } else {
            n
        }
    }
}

#[derive(Debug, Default)]
pub struct StreamBuilder {
    inputs: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
    select: Option<String>,
    selection: Option<FieldSelection>,
    filter: String,
    voxel: Option<VoxelConfig>,
    cancel: Option<CancelFlag>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn inputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.inputs.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Switches the stream to pass-through mode. Only one output is accepted.
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    pub fn select(mut self, select: &str) -> Self {
        self.select = Some(select.to_string());
        self
    }

    pub fn fields(mut self, selection: FieldSelection) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Appends to the filter expression.
    pub fn filter(mut self, expression: &str) -> Self {
        if !self.filter.is_empty() {
            self.filter.push(' ');
        }
        self.filter.push_str(expression);
        self
    }

    pub fn voxel(mut self, cell_size: f64) -> Self {
        self.voxel = Some(VoxelConfig {
            cell_size,
            bounds: GridBounds::Unbounded,
        });
        self
    }

    /// Thinning over a dense grid; `None` takes the bounds of the source.
    pub fn static_voxel(mut self, cell_size: f64, bounds: Option<BoundingVolume>) -> Self {
        self.voxel = Some(VoxelConfig {
            cell_size,
            bounds: bounds.map_or(GridBounds::FromHeader, GridBounds::Explicit),
        });
        self
    }

    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Validates everything that can be checked without touching the sources.
    pub fn build(self) -> Result<StreamConfig, StreamError> {
        if self.inputs.is_empty() {
            return Err(StreamError::config("the input list is empty"));
        }
        if self.outputs.len() > 1 {
            return Err(StreamError::config(format!(
                "only one output is supported, got {}",
                self.outputs.len()
            )));
        }

        let selection = match (self.selection, self.select) {
            (Some(_), Some(_)) => {
                return Err(StreamError::config(
                    "give either a select string or a field selection, not both",
                ))
            }
            (Some(selection), None) => selection,
            (None, Some(select)) => FieldSelection::parse(&select)?,
            (None, None) => FieldSelection::all(),
        };

        let mut filter = FilterSpec::parse(&self.filter)?;
        let voxel = match (self.voxel, filter.voxel_size.take()) {
            (Some(_), Some(_)) => {
                return Err(StreamError::config("voxel thinning is configured twice"))
            }
            (Some(voxel), None) => Some(voxel),
            (None, Some(cell_size)) => Some(VoxelConfig {
                cell_size,
                bounds: GridBounds::Unbounded,
            }),
            (None, None) => None,
        };

        if let Some(voxel) = &voxel {
            if !voxel.cell_size.is_finite() || voxel.cell_size == 0.0 {
                return Err(StreamError::config(format!(
                    "voxel size must be finite and non-zero, got {}",
                    voxel.cell_size
                )));
            }
            if let GridBounds::Explicit(bounds) = voxel.bounds {
                if bounds.is_empty() {
                    return Err(StreamError::config("static voxel bounds are empty"));
                }
            }
        }

        let config = StreamConfig {
            inputs: self.inputs,
            output: self.outputs.into_iter().next(),
            selection,
            filter,
            voxel,
            cancel: self.cancel,
        };

        if config.output.is_some() && !config.has_filter() {
            return Err(StreamError::config(
                "writing an output without a filter is useless",
            ));
        }

        Ok(config)
    }
}
