pub mod decimator;
pub mod voxel_grid;
