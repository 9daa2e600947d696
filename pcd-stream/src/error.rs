use std::io;

use pcd_core::pointcloud::{decimation::voxel_grid::VoxelError, extra_bytes::CodecError};
use thiserror::Error;

use crate::runner::StreamState;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid stream configuration: {0}")]
    Config(String),
    #[error("unsupported data: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Voxel(#[from] VoxelError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot {operation} a stream in state {state:?}")]
    State {
        operation: &'static str,
        state: StreamState,
    },
}

impl StreamError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        StreamError::Config(message.into())
    }
}
