//! Step size control for adaptive ODE methods.
//!
//! A trial step is accepted iff its error ratio
//! `e = norm(y_err / (atol + rtol * max(|y0|, |y1|)))` is at most 1. The next
//! trial size is `dt * min(max_factor, max(min_factor, safety * e^(-1/order)))`,
//! never growing after a rejection, and clipped to `[min_step, max_step]`.

use crate::DType;
use numr::ops::{ScalarOps, TensorOps};
use numr::runtime::{Runtime, RuntimeClient};
use numr::tensor::Tensor;

use crate::integrate::error::{IntegrateError, IntegrateResult};
use crate::integrate::ode::{ErrorNorm, ODEOptions, Tolerance};
use crate::integrate::traits::{AdaptiveSteppable, TrialStep};

use super::state::{StateShape, host_values, step_floor, tensor_from_f64};

/// Step size controller parameters.
#[derive(Debug, Clone, Copy)]
pub struct StepSizeController {
    /// Safety factor (typically 0.9)
    pub safety: f64,
    /// Minimum step size ratio between trials
    pub min_factor: f64,
    /// Maximum step size ratio between trials
    pub max_factor: f64,
    /// Lower bound on step sizes
    pub min_step: Option<f64>,
    /// Upper bound on step sizes
    pub max_step: Option<f64>,
}

impl Default for StepSizeController {
    fn default() -> Self {
        Self {
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 10.0,
            min_step: None,
            max_step: None,
        }
    }
}

impl StepSizeController {
    /// Controller configured from solver options; unset fields keep defaults.
    pub fn from_options(options: &ODEOptions) -> Self {
        let defaults = Self::default();
        Self {
            safety: options.safety.unwrap_or(defaults.safety),
            min_factor: options.min_factor.unwrap_or(defaults.min_factor),
            max_factor: options.max_factor.unwrap_or(defaults.max_factor),
            min_step: options.min_step,
            max_step: options.max_step,
        }
    }

    /// Clip a step size to `[min_step, max_step]`.
    pub fn clip(&self, h: f64) -> f64 {
        let h = self.max_step.map_or(h, |max| h.min(max));
        self.min_step.map_or(h, |min| h.max(min))
    }

    /// Returns true if `h` cannot be shrunk any further.
    pub fn at_min_step(&self, h: f64) -> bool {
        self.min_step.is_some_and(|min| h <= min)
    }

    /// Next trial step size after a step of size `h` with error ratio `error_ratio`.
    pub fn next_step_size(&self, h: f64, error_ratio: f64, order: usize, accepted: bool) -> f64 {
        let factor = if error_ratio == 0.0 {
            self.max_factor
        } else if !error_ratio.is_finite() {
            self.min_factor
        } else {
            let optimal = self.safety * error_ratio.powf(-1.0 / order as f64);
            optimal.max(self.min_factor).min(self.max_factor)
        };

        // Don't increase step size immediately after rejection
        let factor = if accepted { factor } else { factor.min(1.0) };
        self.clip(h * factor)
    }
}

/// Tolerances broadcast to the flattened state, in the state dtype.
#[derive(Debug, Clone)]
pub struct ErrorScale<R: Runtime> {
    rtol: Tensor<R>,
    atol: Tensor<R>,
}

impl<R: Runtime<DType = DType>> ErrorScale<R> {
    /// Broadcast `rtol`/`atol` to the state described by `shape`, in `dtype`.
    ///
    /// A per-element tolerance holding one value per flattened element is
    /// taken as is; otherwise it is broadcast against every component along
    /// the trailing axis.
    pub fn new<C>(
        client: &C,
        rtol: &Tolerance,
        atol: &Tolerance,
        shape: &StateShape,
        dtype: DType,
    ) -> IntegrateResult<Self>
    where
        C: RuntimeClient<R>,
    {
        let n = shape.numel();
        let rtol = tensor_from_f64(client, &broadcast(rtol, shape, "rtol")?, &[n], dtype)?;
        let atol = tensor_from_f64(client, &broadcast(atol, shape, "atol")?, &[n], dtype)?;
        Ok(Self { rtol, atol })
    }

    /// `atol + rtol * |y|` elementwise.
    pub fn scale<C>(&self, client: &C, y_abs: &Tensor<R>) -> IntegrateResult<Tensor<R>>
    where
        C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    {
        let rel = client.mul(&self.rtol, y_abs)?;
        Ok(client.add(&self.atol, &rel)?)
    }
}

fn broadcast(tol: &Tolerance, shape: &StateShape, name: &str) -> IntegrateResult<Vec<f64>> {
    let values = match tol {
        Tolerance::Scalar(v) => return Ok(vec![*v; shape.numel()]),
        Tolerance::PerElement(vs) if vs.len() == shape.numel() => return Ok(vs.clone()),
        Tolerance::PerElement(vs) => vs,
    };

    let mut out = Vec::with_capacity(shape.numel());
    for dims in shape.component_dims() {
        let expanded = broadcast_trailing(values, dims).ok_or_else(|| IntegrateError::InvalidInput {
            context: format!(
                "{} with {} elements does not broadcast to state shape {:?}",
                name,
                values.len(),
                dims
            ),
        })?;
        out.extend(expanded);
    }
    Ok(out)
}

/// Broadcast a 1-D array against `dims` (row-major, trailing axis fastest).
fn broadcast_trailing(values: &[f64], dims: &[usize]) -> Option<Vec<f64>> {
    let numel: usize = dims.iter().product();
    match (values, dims.last()) {
        ([v], _) => Some(vec![*v; numel]),
        (vs, Some(&last)) if vs.len() == last => {
            Some(vs.iter().copied().cycle().take(numel).collect())
        }
        _ => None,
    }
}

/// Compute the normalized error ratio of a trial step.
pub fn compute_error_ratio<R, C>(
    client: &C,
    scale: &ErrorScale<R>,
    norm: &ErrorNorm,
    y0: &Tensor<R>,
    y1: &Tensor<R>,
    y_err: &Tensor<R>,
) -> IntegrateResult<f64>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
    // sc = atol + rtol * max(|y0|, |y1|)
    let y_max = client.maximum(&client.abs(y0)?, &client.abs(y1)?)?;
    let sc = scale.scale(client, &y_max)?;

    let scaled = client.div(y_err, &sc)?;
    let values = host_values(&scaled)?;
    Ok(norm.apply(&values))
}

/// Outcome of one trial step.
#[derive(Debug, Clone)]
pub struct StepAttempt<R: Runtime> {
    /// Whether the trial step met the tolerance.
    pub accepted: bool,
    /// The trial step itself. Discarded by the caller on rejection.
    pub trial: TrialStep<R>,
    /// Normalized error ratio.
    pub error_ratio: f64,
    /// Step size for the next trial.
    pub next_step_size: f64,
}

/// Attempt one step of size `dt` from `(t0, y0)` and decide acceptance.
///
/// Fails with `StepSizeTooSmall` instead of returning a rejection that could
/// not be retried with a meaningfully smaller step.
#[allow(clippy::too_many_arguments)]
pub fn attempt_step<R, C, S, F>(
    client: &C,
    scheme: &S,
    controller: &StepSizeController,
    scale: &ErrorScale<R>,
    norm: &ErrorNorm,
    f: &F,
    t0: f64,
    y0: &Tensor<R>,
    f0: &Tensor<R>,
    dt: f64,
) -> IntegrateResult<StepAttempt<R>>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    S: AdaptiveSteppable<R, C>,
    F: Fn(f64, &Tensor<R>) -> IntegrateResult<Tensor<R>>,
{
    let floor = step_floor(t0, y0.dtype());
    if !(dt >= floor) {
        return Err(IntegrateError::StepSizeTooSmall {
            step: dt,
            t: t0,
            context: scheme.name().to_string(),
        });
    }

    let trial = scheme.trial_step(client, f, t0, y0, f0, dt)?;
    let error_ratio = compute_error_ratio(client, scale, norm, y0, &trial.y1, &trial.y_err)?;

    // NaN compares false, so a non-finite estimate is a rejection
    let accepted = error_ratio <= 1.0;
    let next_step_size = controller.next_step_size(dt, error_ratio, scheme.order(), accepted);

    if !accepted && (controller.at_min_step(dt) || next_step_size < floor) {
        return Err(IntegrateError::StepSizeTooSmall {
            step: next_step_size.min(dt),
            t: t0,
            context: scheme.name().to_string(),
        });
    }

    Ok(StepAttempt {
        accepted,
        trial,
        error_ratio,
        next_step_size,
    })
}

/// Select the initial step size (Hairer, Norsett & Wanner, Sec. II.4).
///
/// Costs one derivative evaluation.
#[allow(clippy::too_many_arguments)]
pub fn select_initial_step<R, C, F>(
    client: &C,
    f: &F,
    t0: f64,
    y0: &Tensor<R>,
    f0: &Tensor<R>,
    order: usize,
    scale: &ErrorScale<R>,
    norm: &ErrorNorm,
) -> IntegrateResult<f64>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    F: Fn(f64, &Tensor<R>) -> IntegrateResult<Tensor<R>>,
{
    let scaled_norm = |x: &Tensor<R>, sc: &Tensor<R>| -> IntegrateResult<f64> {
        let ratio = client.div(x, sc)?;
        Ok(norm.apply(&host_values(&ratio)?))
    };

    let sc = scale.scale(client, &client.abs(y0)?)?;
    let d0 = scaled_norm(y0, &sc)?;
    let d1 = scaled_norm(f0, &sc)?;

    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };

    // Explicit Euler step
    let y1 = client.add(y0, &client.mul_scalar(f0, h0)?)?;
    let f1 = f(t0 + h0, &y1)?;

    let d2 = scaled_norm(&client.sub(&f1, f0)?, &sc)? / h0;

    let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(1.0 / order as f64)
    };

    let h = (100.0 * h0).min(h1);
    if !h.is_finite() || h <= 0.0 {
        return Err(IntegrateError::NumericalError {
            message: format!("initial step selection produced {} at t = {}", h, t0),
        });
    }
    Ok(h)
}
