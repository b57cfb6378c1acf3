//! Dense output for ODE solvers.
//!
//! Every accepted step carries the power-basis coefficients of a local
//! polynomial in the normalized position `s = (t - t0) / (t1 - t0)`:
//!
//! ```text
//! y(s) = c[0] + c[1]·s + c[2]·s² + ... + c[k]·s^k,   c[0] = y(t0)
//! ```
//!
//! evaluated with Horner's scheme. Three fits are provided:
//!
//! - [`linear_coeffs`]: chord between the step endpoints.
//! - [`hermite_coeffs`]: cubic Hermite using the derivatives at both ends.
//! - [`dopri_coeffs`]: quartic through both endpoints, both derivatives and
//!   a midpoint estimate (Dormand-Prince dense output).
//!
//! [`DenseOutput`] archives the steps of a whole run for random-access
//! queries after the forward pass completes.

use std::marker::PhantomData;

use crate::DType;
use numr::error::Result;
use numr::ops::{ScalarOps, TensorOps};
use numr::runtime::{Runtime, RuntimeClient};
use numr::tensor::Tensor;

use crate::integrate::error::{IntegrateError, IntegrateResult};
use crate::integrate::traits::OdeState;

use super::state::{StateShape, linear_combination};

/// Interpolation data for one accepted step.
#[derive(Debug, Clone)]
pub struct DenseOutputStep<R: Runtime> {
    /// Start time of the step.
    pub t0: f64,

    /// End time of the step.
    pub t1: f64,

    /// Power-basis coefficients in `s`, lowest degree first.
    pub coeffs: Vec<Tensor<R>>,

    /// State at the end of the step.
    pub y1: Tensor<R>,
}

impl<R: Runtime> DenseOutputStep<R> {
    pub fn new(t0: f64, t1: f64, coeffs: Vec<Tensor<R>>, y1: Tensor<R>) -> Self {
        Self { t0, t1, coeffs, y1 }
    }

    /// Zero-length step holding a single state.
    pub fn constant(t: f64, y: Tensor<R>) -> Self {
        Self {
            t0: t,
            t1: t,
            coeffs: vec![y.clone()],
            y1: y,
        }
    }

    /// Get the step size.
    pub fn h(&self) -> f64 {
        self.t1 - self.t0
    }

    /// Degree of the interpolating polynomial.
    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    /// Check if a time is within this step, allowing a few ulps of slack.
    pub fn contains(&self, t: f64) -> bool {
        let slack = range_slack(self.t0, self.t1);
        t >= self.t0 - slack && t <= self.t1 + slack
    }
}

fn range_slack(t0: f64, t1: f64) -> f64 {
    4.0 * f64::EPSILON * t0.abs().max(t1.abs()).max(1.0)
}

/// Evaluate the solution at `t` within a step.
///
/// Endpoints are reproduced exactly. Queries outside `[t0, t1]` are an error,
/// never an extrapolation.
pub fn dense_eval<R, C>(client: &C, step: &DenseOutputStep<R>, t: f64) -> IntegrateResult<Tensor<R>>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
    if !step.contains(t) {
        return Err(IntegrateError::OutOfInterpolationRange {
            t,
            t_min: step.t0,
            t_max: step.t1,
        });
    }

    // Edge cases
    if t <= step.t0 {
        return Ok(step.coeffs[0].clone());
    }
    if t >= step.t1 {
        return Ok(step.y1.clone());
    }

    let s = (t - step.t0) / step.h();
    Ok(horner(client, &step.coeffs, s)?)
}

fn horner<R, C>(client: &C, coeffs: &[Tensor<R>], s: f64) -> Result<Tensor<R>>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R>,
{
    let (last, rest) = coeffs
        .split_last()
        .ok_or_else(|| numr::error::Error::InvalidArgument {
            arg: "coeffs",
            reason: "interpolant has no coefficients".to_string(),
        })?;
    let mut total = last.clone();
    for c in rest.iter().rev() {
        total = client.add(c, &client.mul_scalar(&total, s)?)?;
    }
    Ok(total)
}

/// Chord `y0 + s·(y1 - y0)`.
pub fn linear_coeffs<R, C>(client: &C, y0: &Tensor<R>, y1: &Tensor<R>) -> Result<Vec<Tensor<R>>>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R>,
{
    Ok(vec![y0.clone(), client.sub(y1, y0)?])
}

/// Cubic Hermite interpolant.
///
/// ```text
/// y(s) = y0 + s·h·f0 + s²·(3Δ - h·(2f0 + f1)) + s³·(-2Δ + h·(f0 + f1)),   Δ = y1 - y0
/// ```
pub fn hermite_coeffs<R, C>(
    client: &C,
    y0: &Tensor<R>,
    y1: &Tensor<R>,
    f0: &Tensor<R>,
    f1: &Tensor<R>,
    h: f64,
) -> Result<Vec<Tensor<R>>>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R>,
{
    let c1 = client.mul_scalar(f0, h)?;
    let c2 = linear_combination(
        client,
        &[(y0, -3.0), (y1, 3.0), (f0, -2.0 * h), (f1, -h)],
    )?;
    let c3 = linear_combination(client, &[(y0, 2.0), (y1, -2.0), (f0, h), (f1, h)])?;
    Ok(vec![y0.clone(), c1, c2, c3])
}

/// Quartic through `y0`, `y1`, `f0`, `f1` and the midpoint estimate `y_mid`.
pub fn dopri_coeffs<R, C>(
    client: &C,
    y0: &Tensor<R>,
    y1: &Tensor<R>,
    y_mid: &Tensor<R>,
    f0: &Tensor<R>,
    f1: &Tensor<R>,
    h: f64,
) -> Result<Vec<Tensor<R>>>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R>,
{
    let d = client.mul_scalar(f0, h)?;
    let c = linear_combination(
        client,
        &[(f1, h), (f0, -4.0 * h), (y0, -11.0), (y1, -5.0), (y_mid, 16.0)],
    )?;
    let b = linear_combination(
        client,
        &[(f0, 5.0 * h), (f1, -3.0 * h), (y0, 18.0), (y1, 14.0), (y_mid, -32.0)],
    )?;
    let a = linear_combination(
        client,
        &[(f1, 2.0 * h), (f0, -2.0 * h), (y1, -8.0), (y0, -8.0), (y_mid, 16.0)],
    )?;
    Ok(vec![y0.clone(), d, c, b, a])
}

/// Archive of accepted steps, queryable anywhere in the solved interval.
///
/// Breakpoints are stored in normalized (increasing) time; queries are given
/// in the caller's time direction.
#[derive(Debug, Clone)]
pub struct DenseOutput<R: Runtime, Y = Tensor<R>> {
    steps: Vec<DenseOutputStep<R>>,
    breakpoints: Vec<f64>,
    shape: StateShape,
    reversed: bool,
    t_span: (f64, f64),
    _state: PhantomData<fn() -> Y>,

    /// Number of derivative evaluations during the forward pass
    pub nfev: usize,

    /// Number of accepted steps
    pub naccept: usize,

    /// Number of rejected steps
    pub nreject: usize,
}

impl<R: Runtime<DType = DType>, Y: OdeState<R>> DenseOutput<R, Y> {
    /// Build an archive from contiguous accepted steps.
    pub fn new(
        steps: Vec<DenseOutputStep<R>>,
        shape: StateShape,
        reversed: bool,
        t_span: (f64, f64),
    ) -> IntegrateResult<Self> {
        let Some(first) = steps.first() else {
            return Err(IntegrateError::InvalidInput {
                context: "dense output needs at least one accepted step".to_string(),
            });
        };

        let mut breakpoints = Vec::with_capacity(steps.len() + 1);
        breakpoints.push(first.t0);
        for step in &steps {
            if !(step.t1 > *breakpoints.last().unwrap_or(&f64::NEG_INFINITY)) {
                return Err(IntegrateError::InvalidTimeSequence {
                    context: format!("breakpoint {} is not increasing", step.t1),
                });
            }
            breakpoints.push(step.t1);
        }

        Ok(Self {
            steps,
            breakpoints,
            shape,
            reversed,
            t_span,
            _state: PhantomData,
            nfev: 0,
            naccept: 0,
            nreject: 0,
        })
    }

    /// `(t0, t1)` as requested by the caller.
    pub fn t_span(&self) -> (f64, f64) {
        self.t_span
    }

    /// Breakpoint times in normalized (increasing) time.
    ///
    /// For a backward solve these are the negated caller times.
    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }

    /// Number of archived steps.
    pub fn n_steps(&self) -> usize {
        self.steps.len()
    }

    /// Evaluate the solution at caller time `t`.
    pub fn evaluate<C>(&self, client: &C, t: f64) -> IntegrateResult<Y>
    where
        C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    {
        let y = self.evaluate_flat(client, t)?;
        self.shape.restore(&y)
    }

    fn evaluate_flat<C>(&self, client: &C, t: f64) -> IntegrateResult<Tensor<R>>
    where
        C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    {
        let tn = if self.reversed { -t } else { t };
        let (lo, hi) = self.span_normalized();
        let slack = range_slack(lo, hi);
        if !(tn >= lo - slack && tn <= hi + slack) {
            let (a, b) = self.t_span;
            return Err(IntegrateError::OutOfInterpolationRange {
                t,
                t_min: a.min(b),
                t_max: a.max(b),
            });
        }

        // First breakpoint >= tn closes the owning step
        let idx = self.breakpoints.partition_point(|&b| b < tn);
        let step = &self.steps[idx.saturating_sub(1).min(self.steps.len() - 1)];
        dense_eval(client, step, tn)
    }

    /// Evaluate at several caller times; every component is stacked to
    /// `[ts.len(), *component_shape]`.
    pub fn evaluate_many<C>(&self, client: &C, ts: &[f64]) -> IntegrateResult<Y>
    where
        C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    {
        if ts.is_empty() {
            return Err(IntegrateError::InvalidInput {
                context: "no query times".to_string(),
            });
        }
        let rows = ts
            .iter()
            .map(|&t| self.evaluate_flat(client, t))
            .collect::<IntegrateResult<Vec<_>>>()?;
        let refs: Vec<&Tensor<R>> = rows.iter().collect();
        self.shape.restore_rows(&client.stack(&refs, 0)?)
    }

    fn span_normalized(&self) -> (f64, f64) {
        let (a, b) = self.t_span;
        if self.reversed { (-a, -b) } else { (a, b) }
    }
}
