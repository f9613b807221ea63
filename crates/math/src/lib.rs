/// Mathematical core of the APY keeper
///
/// This crate provides scale-typed fixed-point decimals and the pure
/// snapshot-delta estimator that turns two consecutive venue observations
/// into a profit figure and an annualized rate. It performs no I/O.

pub mod error;
pub mod fixed_point;
pub mod estimator;

// Re-export commonly used items
pub use error::*;
pub use fixed_point::*;
pub use estimator::*;
