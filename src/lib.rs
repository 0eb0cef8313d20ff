//! POD-Galerkin reduced-order models for parametric PDEs.
//!
//! Offline: snapshots → POD basis → reduced quadratic operators. Online: one
//! Newton solve of `λᵗAλ + B(α)λ = source(α)` per design vector `α`, plus error
//! evaluation and a serializable bundle for external coefficient regressors.

pub mod basis;
pub mod config;
pub mod discretization;
pub mod error;
pub mod models;
pub mod numerics;
pub mod physics;
pub mod processing;
pub mod surrogate;

pub use error::{Result, RomError};
