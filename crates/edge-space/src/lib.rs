//! Discretised state, action, and state-action spaces.
//!
//! A space is a product of 1-D [`Axis`] grids. Values are addressed either by
//! coordinates (`f64` per axis) or by grid indices (`usize` per axis), and a
//! [`StateActionSpace`] pairs a state product with an action product.

use thiserror::Error;

mod axis;
mod product;
mod stateaction;

pub use axis::Axis;
pub use product::ProductSpace;
pub use stateaction::StateActionSpace;

/// Result type for space operations.
pub type SpaceResult<T> = Result<T, SpaceError>;

/// Errors returned when coordinates or indices do not fit a space.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpaceError {
    #[error("size mismatch: expected {expected} coordinates, received {received}")]
    ShapeMismatch { expected: usize, received: usize },
    #[error("value {value} is outside axis bounds [{low}, {high}]")]
    OutOfBounds { value: f64, low: f64, high: f64 },
    #[error("index {index} is out of range for axis of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("invalid axis: {0}")]
    InvalidAxis(String),
    #[error("a product space requires at least one axis")]
    EmptyProduct,
}
