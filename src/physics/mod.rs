pub mod operators;
pub mod problem;

pub use operators::{Coefficients, QuadraticTensor, ReducedOperators, ReducedSystem};
pub use problem::{AssembledProblem, Forcing, Problem};

use nalgebra::DVector;

/// A square system in the `M` basis coefficients that the normalized solver
/// can drive to zero. Implemented over `f64` and over dual numbers so the
/// Jacobian comes from forward-mode differentiation.
pub trait ReducedModel<T: nalgebra::Scalar> {
    fn num_modes(&self) -> usize;

    /// `R(λ)` of the reduced equations.
    fn calculate_residual(&self, lambda: DVector<T>) -> DVector<T>;
}
