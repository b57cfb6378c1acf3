//! Capability traits for stepping schemes.
//!
//! A scheme advertises what it can do by the traits it implements instead of
//! by its place in a class hierarchy:
//!
//! - [`Steppable`]: one step of size `dt` plus interpolation coefficients.
//! - [`AdaptiveSteppable`]: a trial step that also yields a local error
//!   estimate, so the step size controller can accept or reject it.
//! - [`EventCapable`]: the interpolant covers the whole step with a known
//!   polynomial degree, which makes bisection on it meaningful.
//!
//! All states handed to a scheme are flattened to 1-D. Interpolation
//! coefficients are the power-basis coefficients of the local polynomial in
//! the normalized position `s = (t - t0) / dt`, lowest degree first.

use crate::DType;
use crate::integrate::error::IntegrateResult;

use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Result of a plain step.
#[derive(Debug, Clone)]
pub struct StepOutput<R: Runtime> {
    /// State at `t0 + dt`.
    pub y1: Tensor<R>,

    /// Power-basis interpolation coefficients valid on `[t0, t0 + dt]`.
    pub interp_coeffs: Vec<Tensor<R>>,
}

/// Result of an error-estimating trial step.
#[derive(Debug, Clone)]
pub struct TrialStep<R: Runtime> {
    /// Proposed state at `t0 + dt`.
    pub y1: Tensor<R>,

    /// Derivative at the proposed state, reused as the next step's first stage.
    pub f1: Tensor<R>,

    /// Local error estimate (difference of the embedded solutions).
    pub y_err: Tensor<R>,

    /// Power-basis interpolation coefficients valid on `[t0, t0 + dt]`.
    pub interp_coeffs: Vec<Tensor<R>>,
}

/// A scheme that can take a single step.
pub trait Steppable<R: Runtime<DType = DType>, C> {
    /// Short name used in logs and error contexts.
    fn name(&self) -> &'static str;

    /// Convergence order, used for step size scaling.
    fn order(&self) -> usize;

    /// Advance `y0` from `t0` by `dt`, given `f0 = f(t0, y0)`.
    fn step<F>(
        &self,
        client: &C,
        f: &F,
        t0: f64,
        y0: &Tensor<R>,
        f0: &Tensor<R>,
        dt: f64,
    ) -> IntegrateResult<StepOutput<R>>
    where
        F: Fn(f64, &Tensor<R>) -> IntegrateResult<Tensor<R>>;
}

/// A scheme with an embedded error estimate.
pub trait AdaptiveSteppable<R: Runtime<DType = DType>, C>: Steppable<R, C> {
    /// Trial step: proposed state, its derivative, error estimate and
    /// interpolation coefficients.
    fn trial_step<F>(
        &self,
        client: &C,
        f: &F,
        t0: f64,
        y0: &Tensor<R>,
        f0: &Tensor<R>,
        dt: f64,
    ) -> IntegrateResult<TrialStep<R>>
    where
        F: Fn(f64, &Tensor<R>) -> IntegrateResult<Tensor<R>>;
}

/// A scheme whose interpolant can be bisected for event location.
pub trait EventCapable<R: Runtime<DType = DType>, C>: AdaptiveSteppable<R, C> {
    /// Degree of the local interpolating polynomial.
    fn interpolant_degree(&self) -> usize;
}
