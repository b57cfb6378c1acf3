//! Generic ODE solver implementations using tensor operations.
//!
//! All implementations use numr's `TensorOps` and `ScalarOps` for computation,
//! keeping state tensors on device; only scalar error ratios and event values
//! cross to the host.
//!
//! Every entry point normalizes the problem before stepping: the state (a
//! tensor or a group of tensors) is flattened and concatenated to 1-D, and a
//! decreasing time request is solved as an increasing one in `-t` with
//! derivative `-f(-t, y)`.

mod dense_output;
mod events;
mod fixed_grid;
mod heun;
mod integrator;
mod rk23;
mod rk45;
mod state;
mod step_control;

pub use dense_output::{
    DenseOutput, DenseOutputStep, dense_eval, dopri_coeffs, hermite_coeffs, linear_coeffs,
};
pub use events::{EventProbe, find_event, locate_until_event};
pub use fixed_grid::{
    ExplicitMidpoint, FixedScheme, ForwardEuler, Rk4ThreeEighths, build_grid, integrate_fixed,
};
pub use heun::HeunEuler12;
pub use integrator::{AdaptiveIntegrator, AdaptiveScheme, RkState};
pub use rk23::BogackiShampine23;
pub use rk45::DormandPrince45;
pub use state::{Rhs, StateShape, host_values, step_floor, tensor_from_f64, validate_ode_dtype};
pub use step_control::{
    ErrorScale, StepAttempt, StepSizeController, attempt_step, compute_error_ratio,
    select_initial_step,
};

use log::debug;

use crate::DType;
use numr::error::Result;
use numr::ops::{ScalarOps, TensorOps};
use numr::runtime::{Runtime, RuntimeClient};
use numr::tensor::Tensor;

use crate::integrate::error::{IntegrateError, IntegrateResult};
use crate::integrate::ode::{ODEMethod, ODEOptions};
use crate::integrate::traits::{EventFunction, OdeState};

/// Trajectory at the requested times.
///
/// All data is stored as tensors in the dtype of the initial state.
#[derive(Debug, Clone)]
pub struct ODESolution<R: Runtime, Y = Tensor<R>> {
    /// Requested times (1-D tensor)
    pub t: Tensor<R>,

    /// Solution values, with the structure of `y0`; every component has
    /// shape `[len(t), *component_shape]`
    pub y: Y,

    /// Number of function evaluations
    pub nfev: usize,

    /// Number of accepted steps
    pub naccept: usize,

    /// Number of rejected steps
    pub nreject: usize,

    /// Method used for integration
    pub method: ODEMethod,
}

impl<R: Runtime<DType = DType>, Y: OdeState<R>> ODESolution<R, Y> {
    /// Number of output rows.
    pub fn len(&self) -> usize {
        self.t.shape()[0]
    }

    /// Returns true if the trajectory has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the final state as a flat `Vec<f64>`, components concatenated.
    pub fn y_final_vec(&self) -> Result<Vec<f64>> {
        let rows = self.len();
        if rows == 0 {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for part in self.y.components() {
            out.extend(host_values(&part.narrow(0, rows - 1, 1)?)?);
        }
        Ok(out)
    }
}

/// Result of an event-terminated solve.
#[derive(Debug, Clone)]
pub struct EventSolution<R: Runtime, Y = Tensor<R>> {
    /// Time of the first zero crossing after the initial time
    pub event_time: f64,

    /// `[y0, y(event_time)]`, with the structure of `y0`; every component
    /// has shape `[2, *component_shape]`
    pub y: Y,

    /// Number of function evaluations (event function calls excluded)
    pub nfev: usize,

    /// Number of accepted steps
    pub naccept: usize,

    /// Number of rejected steps
    pub nreject: usize,

    /// Method used for integration
    pub method: ODEMethod,

    _marker: std::marker::PhantomData<fn() -> R>,
}

/// Check that `times` is non-empty, finite and strictly monotonic.
///
/// Returns true for a decreasing sequence.
fn validate_times(times: &[f64]) -> IntegrateResult<bool> {
    if times.is_empty() {
        return Err(IntegrateError::InvalidTimeSequence {
            context: "no requested times".to_string(),
        });
    }
    if let Some(t) = times.iter().find(|t| !t.is_finite()) {
        return Err(IntegrateError::InvalidTimeSequence {
            context: format!("non-finite time {}", t),
        });
    }

    let reversed = times.len() > 1 && times[1] < times[0];
    let monotonic = times
        .windows(2)
        .all(|w| if reversed { w[1] < w[0] } else { w[1] > w[0] });
    if !monotonic {
        return Err(IntegrateError::InvalidTimeSequence {
            context: "times must be strictly increasing or strictly decreasing".to_string(),
        });
    }
    Ok(reversed)
}

fn normalize(t: f64, reversed: bool) -> f64 {
    if reversed { -t } else { t }
}

/// Validate options and `y0`, returning its layout and dtype.
fn check_initial_state<R, Y>(y0: &Y, options: &ODEOptions) -> IntegrateResult<(StateShape, DType)>
where
    R: Runtime<DType = DType>,
    Y: OdeState<R>,
{
    options.validate()?;
    let shape = StateShape::of(y0)?;
    let dtype = y0
        .components()
        .first()
        .map(|part| part.dtype())
        .ok_or_else(|| IntegrateError::InvalidInput {
            context: "initial state has no components".to_string(),
        })?;
    validate_ode_dtype(dtype)?;
    Ok((shape, dtype))
}

/// Stack flat rows and restore the caller's structure.
fn stack_rows<R, C, Y>(client: &C, rows: &[Tensor<R>], shape: &StateShape) -> IntegrateResult<Y>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    Y: OdeState<R>,
{
    let refs: Vec<&Tensor<R>> = rows.iter().collect();
    let stacked = client.stack(&refs, 0)?;
    shape.restore_rows(&stacked)
}

fn adaptive_scheme(method: ODEMethod, entry: &str) -> IntegrateResult<AdaptiveScheme> {
    AdaptiveScheme::from_method(method).ok_or_else(|| {
        IntegrateError::unsupported(
            "method",
            format!(
                "{} needs an adaptive method with dense output, got fixed-grid {}",
                entry,
                method.name()
            ),
        )
    })
}

/// Solve an initial value problem at the requested times.
///
/// `t` must be strictly monotonic; a decreasing sequence integrates backward.
/// Row `i` of the result is the state at `t[i]`, and row 0 is `y0` itself.
///
/// # Arguments
///
/// * `client` - Runtime client for tensor operations
/// * `f` - Right-hand side function f(t, y) -> dy/dt, with `y` structured like `y0`
/// * `y0` - Initial state: a tensor of any shape, or a group of tensors
///   ([`OdeState`]), F32 or F64
/// * `t` - Output times, `t[0]` is the initial time
/// * `options` - Solver options
///
/// # Example
///
/// ```ignore
/// use odestep::integrate::{ODEOptions, odeint_impl};
/// use numr::runtime::cpu::{CpuClient, CpuDevice};
///
/// let device = CpuDevice::new();
/// let client = CpuClient::new(device.clone());
///
/// // Solve dy/dt = -y, y(0) = 1
/// let y0 = Tensor::from_slice(&[1.0], &[1], &device);
/// let result = odeint_impl(
///     &client,
///     |_t, y| client.mul_scalar(y, -1.0),
///     &y0,
///     &[0.0, 1.0, 2.0],
///     &ODEOptions::default(),
/// )?;
/// ```
pub fn odeint_impl<R, C, F, Y>(
    client: &C,
    f: F,
    y0: &Y,
    t: &[f64],
    options: &ODEOptions,
) -> IntegrateResult<ODESolution<R, Y>>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    F: Fn(f64, &Y) -> Result<Y>,
    Y: OdeState<R>,
{
    let (shape, dtype) = check_initial_state(y0, options)?;
    let reversed = validate_times(t)?;
    let times: Vec<f64> = t.iter().map(|&ti| normalize(ti, reversed)).collect();

    let y0_flat = shape.flatten(client, y0)?;
    let rhs = Rhs::new(client, &f, &shape, dtype, reversed);
    let rhs_fn = |ti: f64, y: &Tensor<R>| rhs.eval(ti, y);

    let (rows, naccept, nreject) = match AdaptiveScheme::from_method(options.method) {
        Some(scheme) => {
            let grid: Vec<f64> = options.grid_points.iter().map(|&g| normalize(g, reversed)).collect();
            let jumps: Vec<f64> = options.jump_points.iter().map(|&j| normalize(j, reversed)).collect();
            let mut integrator = AdaptiveIntegrator::new(
                client, scheme, rhs_fn, times[0], y0_flat, &shape, options, &grid, &jumps,
            )?;
            let rows = integrator.integrate(&times)?;
            (rows, integrator.naccept(), integrator.nreject())
        }
        None => {
            let scheme = FixedScheme::from_method(options.method).ok_or_else(|| {
                IntegrateError::unsupported("method", "no scheme for method")
            })?;
            let (rows, n_steps) = integrate_fixed(client, &scheme, &rhs_fn, &times, &y0_flat, options)?;
            (rows, n_steps, 0)
        }
    };

    debug!(
        "{} solved {} output times: {} accepted, {} rejected, {} evaluations",
        options.method.name(),
        t.len(),
        naccept,
        nreject,
        rhs.nfev()
    );

    Ok(ODESolution {
        t: tensor_from_f64(client, t, &[t.len()], dtype)?,
        y: stack_rows(client, &rows, &shape)?,
        nfev: rhs.nfev(),
        naccept,
        nreject,
        method: options.method,
    })
}

/// Solve over `[t0, t1]` and return a dense output archive.
///
/// `t1 < t0` integrates backward. Queries on the archive are accepted
/// anywhere between `t0` and `t1`; the final accepted step lands on `t1`,
/// or on the nearest representable time past it when no step reaches `t1`
/// exactly.
pub fn odeint_dense_impl<R, C, F, Y>(
    client: &C,
    f: F,
    y0: &Y,
    t0: f64,
    t1: f64,
    options: &ODEOptions,
) -> IntegrateResult<DenseOutput<R, Y>>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    F: Fn(f64, &Y) -> Result<Y>,
    Y: OdeState<R>,
{
    let (shape, dtype) = check_initial_state(y0, options)?;
    let scheme = adaptive_scheme(options.method, "odeint_dense")?;
    if t0 == t1 {
        return Err(IntegrateError::InvalidTimeSequence {
            context: format!("empty interval [{}, {}]", t0, t1),
        });
    }
    let reversed = validate_times(&[t0, t1])?;
    let (start, end) = (normalize(t0, reversed), normalize(t1, reversed));

    let y0_flat = shape.flatten(client, y0)?;
    let rhs = Rhs::new(client, &f, &shape, dtype, reversed);
    let rhs_fn = |ti: f64, y: &Tensor<R>| rhs.eval(ti, y);

    let mut grid: Vec<f64> = options.grid_points.iter().map(|&g| normalize(g, reversed)).collect();
    grid.push(end);
    let jumps: Vec<f64> = options.jump_points.iter().map(|&j| normalize(j, reversed)).collect();

    let mut integrator =
        AdaptiveIntegrator::new(client, scheme, rhs_fn, start, y0_flat, &shape, options, &grid, &jumps)?;
    let steps = integrator.integrate_dense(end)?;
    let (naccept, nreject) = (integrator.naccept(), integrator.nreject());

    debug!(
        "{} dense solve over [{}, {}]: {} accepted, {} rejected",
        options.method.name(),
        t0,
        t1,
        naccept,
        nreject
    );

    let nfev = rhs.nfev();
    let mut dense = DenseOutput::new(steps, shape.clone(), reversed, (t0, t1))?;
    dense.nfev = nfev;
    dense.naccept = naccept;
    dense.nreject = nreject;
    Ok(dense)
}

/// Integrate from `t0` until `event_fn` changes sign.
///
/// Integrates forward unless `options.event.reverse` is set. The event is
/// terminal: only the first crossing is reported.
pub fn odeint_event_impl<R, C, F, E, Y>(
    client: &C,
    f: F,
    y0: &Y,
    t0: f64,
    event_fn: &E,
    options: &ODEOptions,
) -> IntegrateResult<EventSolution<R, Y>>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    F: Fn(f64, &Y) -> Result<Y>,
    E: EventFunction<R, C, Y> + ?Sized,
    Y: OdeState<R>,
{
    let (shape, dtype) = check_initial_state(y0, options)?;
    let scheme = adaptive_scheme(options.method, "odeint_event")?;
    if !t0.is_finite() {
        return Err(IntegrateError::InvalidTimeSequence {
            context: format!("non-finite initial time {}", t0),
        });
    }
    let reversed = options.event.reverse;

    let y0_flat = shape.flatten(client, y0)?;
    let rhs = Rhs::new(client, &f, &shape, dtype, reversed);
    let rhs_fn = |ti: f64, y: &Tensor<R>| rhs.eval(ti, y);

    let grid: Vec<f64> = options.grid_points.iter().map(|&g| normalize(g, reversed)).collect();
    let jumps: Vec<f64> = options.jump_points.iter().map(|&j| normalize(j, reversed)).collect();
    let mut integrator = AdaptiveIntegrator::new(
        client,
        scheme,
        rhs_fn,
        normalize(t0, reversed),
        y0_flat.clone(),
        &shape,
        options,
        &grid,
        &jumps,
    )?;

    let probe = EventProbe::new(event_fn, &shape, reversed);
    let (t_event, y_event) = locate_until_event(&mut integrator, &probe, &options.event)?;

    Ok(EventSolution {
        event_time: normalize(t_event, reversed),
        y: stack_rows(client, &[y0_flat, y_event], &shape)?,
        nfev: rhs.nfev(),
        naccept: integrator.naccept(),
        nreject: integrator.nreject(),
        method: options.method,
        _marker: std::marker::PhantomData,
    })
}
