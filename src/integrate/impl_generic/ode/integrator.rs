//! Adaptive integration loop.
//!
//! [`AdaptiveIntegrator`] exclusively owns the solver state
//! `{t0, t1, dt, interp}` and only ever moves it forward: accepted steps
//! replace the interpolant, rejected steps only shrink `dt`. All times here
//! are normalized (increasing); reversal is handled by the derivative wrapper
//! and the callers.

use log::{debug, trace};

use crate::DType;
use numr::ops::{ScalarOps, TensorOps};
use numr::runtime::{Runtime, RuntimeClient};
use numr::tensor::Tensor;

use crate::integrate::error::{IntegrateError, IntegrateResult};
use crate::integrate::ode::{ErrorNorm, ODEMethod, ODEOptions};
use crate::integrate::traits::{
    AdaptiveSteppable, EventCapable, StepOutput, Steppable, TrialStep,
};

use super::dense_output::{DenseOutputStep, dense_eval};
use super::heun::HeunEuler12;
use super::rk23::BogackiShampine23;
use super::rk45::DormandPrince45;
use super::state::{StateShape, step_floor};
use super::step_control::{
    ErrorScale, StepSizeController, attempt_step, select_initial_step,
};

/// Adaptive scheme selected once from the method.
#[derive(Debug, Clone, Copy)]
pub enum AdaptiveScheme {
    Heun12(HeunEuler12),
    RK23(BogackiShampine23),
    RK45(DormandPrince45),
}

impl AdaptiveScheme {
    /// The adaptive scheme for `method`, or `None` for fixed-grid methods.
    pub fn from_method(method: ODEMethod) -> Option<Self> {
        match method {
            ODEMethod::Heun12 => Some(Self::Heun12(HeunEuler12)),
            ODEMethod::RK23 => Some(Self::RK23(BogackiShampine23)),
            ODEMethod::RK45 => Some(Self::RK45(DormandPrince45)),
            ODEMethod::Euler | ODEMethod::Midpoint | ODEMethod::RK4 => None,
        }
    }
}

impl<R, C> Steppable<R, C> for AdaptiveScheme
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
    fn name(&self) -> &'static str {
        match self {
            Self::Heun12(s) => Steppable::<R, C>::name(s),
            Self::RK23(s) => Steppable::<R, C>::name(s),
            Self::RK45(s) => Steppable::<R, C>::name(s),
        }
    }

    fn order(&self) -> usize {
        match self {
            Self::Heun12(s) => Steppable::<R, C>::order(s),
            Self::RK23(s) => Steppable::<R, C>::order(s),
            Self::RK45(s) => Steppable::<R, C>::order(s),
        }
    }

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
        F: Fn(f64, &Tensor<R>) -> IntegrateResult<Tensor<R>>,
    {
        match self {
            Self::Heun12(s) => s.step(client, f, t0, y0, f0, dt),
            Self::RK23(s) => s.step(client, f, t0, y0, f0, dt),
            Self::RK45(s) => s.step(client, f, t0, y0, f0, dt),
        }
    }
}

impl<R, C> AdaptiveSteppable<R, C> for AdaptiveScheme
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
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
        F: Fn(f64, &Tensor<R>) -> IntegrateResult<Tensor<R>>,
    {
        match self {
            Self::Heun12(s) => s.trial_step(client, f, t0, y0, f0, dt),
            Self::RK23(s) => s.trial_step(client, f, t0, y0, f0, dt),
            Self::RK45(s) => s.trial_step(client, f, t0, y0, f0, dt),
        }
    }
}

impl<R, C> EventCapable<R, C> for AdaptiveScheme
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
    fn interpolant_degree(&self) -> usize {
        match self {
            Self::Heun12(s) => EventCapable::<R, C>::interpolant_degree(s),
            Self::RK23(s) => EventCapable::<R, C>::interpolant_degree(s),
            Self::RK45(s) => EventCapable::<R, C>::interpolant_degree(s),
        }
    }
}

/// Solver state owned by the integration loop.
#[derive(Debug, Clone)]
pub struct RkState<R: Runtime> {
    /// State at `t1`.
    pub y1: Tensor<R>,
    /// Derivative at `(t1, y1)`, the next step's first stage.
    pub f1: Tensor<R>,
    /// Start of the last accepted step.
    pub t0: f64,
    /// End of the last accepted step.
    pub t1: f64,
    /// Size of the next trial step.
    pub dt: f64,
    /// Interpolant of the last accepted step, valid on `[t0, t1]`.
    pub interp: DenseOutputStep<R>,
}

/// A time every accepted step must land on exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GridPoint {
    t: f64,
    /// Discontinuity of the derivative: re-evaluate just past it.
    jump: bool,
}

/// Step size `h` with `t0 + h == t` exactly, so end-of-step stages are
/// evaluated at `t` itself and not one ulp past it.
///
/// When no such `h` exists, returns the smallest `h` with `t0 + h > t`.
fn landing_step(t0: f64, t: f64) -> f64 {
    let mut h = t - t0;
    while t0 + h > t {
        h = h.next_down();
    }
    while t0 + h < t {
        h = h.next_up();
    }
    h
}

/// Adaptive stepping loop over a single scheme.
pub struct AdaptiveIntegrator<'a, R, C, S, F>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    S: AdaptiveSteppable<R, C>,
    F: Fn(f64, &Tensor<R>) -> IntegrateResult<Tensor<R>>,
{
    client: &'a C,
    scheme: S,
    f: F,
    controller: StepSizeController,
    scale: ErrorScale<R>,
    norm: ErrorNorm,
    max_num_steps: usize,
    max_rejections: usize,
    grid: Vec<GridPoint>,
    next_point: usize,
    t_start: f64,
    y_start: Tensor<R>,
    state: RkState<R>,
    steps: usize,
    naccept: usize,
    nreject: usize,
    rejections: usize,
}

impl<'a, R, C, S, F> AdaptiveIntegrator<'a, R, C, S, F>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    S: AdaptiveSteppable<R, C>,
    F: Fn(f64, &Tensor<R>) -> IntegrateResult<Tensor<R>>,
{
    /// Initialize at `(t0, y0)` with a flat `y0` laid out as `shape`.
    ///
    /// `grid_points` and `jump_points` are in normalized time; points at or
    /// before `t0` are ignored.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: &'a C,
        scheme: S,
        f: F,
        t0: f64,
        y0: Tensor<R>,
        shape: &StateShape,
        options: &ODEOptions,
        grid_points: &[f64],
        jump_points: &[f64],
    ) -> IntegrateResult<Self> {
        let dtype = y0.dtype();
        let scale = ErrorScale::new(client, &options.rtol, &options.atol, shape, dtype)?;
        let controller = StepSizeController::from_options(options);

        let f0 = f(t0, &y0)?;
        let dt = match options.first_step {
            Some(h) => h,
            None => select_initial_step(
                client,
                &f,
                t0,
                &y0,
                &f0,
                scheme.order(),
                &scale,
                &options.norm,
            )?,
        };
        let dt = controller.clip(dt);

        let mut grid: Vec<GridPoint> = grid_points
            .iter()
            .map(|&t| GridPoint { t, jump: false })
            .chain(jump_points.iter().map(|&t| GridPoint { t, jump: true }))
            .filter(|p| p.t > t0)
            .collect();
        grid.sort_by(|a, b| a.t.total_cmp(&b.t));
        // A time listed as both keeps the jump treatment
        grid.dedup_by(|later, earlier| {
            if later.t == earlier.t {
                earlier.jump |= later.jump;
                true
            } else {
                false
            }
        });

        Ok(Self {
            client,
            scheme,
            f,
            controller,
            scale,
            norm: options.norm.clone(),
            max_num_steps: options.max_num_steps,
            max_rejections: options.max_rejections,
            grid,
            next_point: 0,
            t_start: t0,
            y_start: y0.clone(),
            state: RkState {
                y1: y0.clone(),
                f1: f0,
                t0,
                t1: t0,
                dt,
                interp: DenseOutputStep::constant(t0, y0),
            },
            steps: 0,
            naccept: 0,
            nreject: 0,
            rejections: 0,
        })
    }

    pub fn client(&self) -> &'a C {
        self.client
    }

    pub fn scheme(&self) -> &S {
        &self.scheme
    }

    pub fn state(&self) -> &RkState<R> {
        &self.state
    }

    pub fn naccept(&self) -> usize {
        self.naccept
    }

    pub fn nreject(&self) -> usize {
        self.nreject
    }

    fn next_grid_point(&mut self, t0: f64) -> Option<GridPoint> {
        let floor = step_floor(t0, self.state.y1.dtype());
        while let Some(&p) = self.grid.get(self.next_point) {
            if p.t > t0 + floor {
                return Some(p);
            }
            self.next_point += 1;
        }
        None
    }

    /// Take one accepted step, retrying rejected trials with smaller steps.
    pub fn adaptive_step(&mut self) -> IntegrateResult<()> {
        loop {
            let t0 = self.state.t1;
            if self.steps >= self.max_num_steps {
                return Err(IntegrateError::MaxStepsExceeded {
                    steps: self.steps,
                    t: t0,
                    context: Steppable::<R, C>::name(&self.scheme).to_string(),
                });
            }

            let mut dt = self.state.dt;
            let mut landing = None;
            if let Some(p) = self.next_grid_point(t0) {
                // Stretch onto the point rather than leave a sliver before it
                if t0 + dt >= p.t - step_floor(p.t, self.state.y1.dtype()) {
                    dt = landing_step(t0, p.t);
                    landing = Some(p);
                }
            }

            let attempt = attempt_step(
                self.client,
                &self.scheme,
                &self.controller,
                &self.scale,
                &self.norm,
                &self.f,
                t0,
                &self.state.y1,
                &self.state.f1,
                dt,
            )?;
            self.steps += 1;

            if attempt.accepted {
                let trial = attempt.trial;
                // Equals p.t unless no f64 step lands on it; then it is the
                // nearest time past p.t, matching the time the stages used
                let t1 = t0 + dt;
                let f1 = match landing {
                    Some(p) if p.jump => (self.f)(t1.next_up(), &trial.y1)?,
                    _ => trial.f1,
                };
                if landing.is_some() {
                    self.next_point += 1;
                }

                trace!(
                    "{} accepted t = {:.6e} -> {:.6e} (error ratio {:.3e})",
                    Steppable::<R, C>::name(&self.scheme),
                    t0,
                    t1,
                    attempt.error_ratio
                );

                let interp = DenseOutputStep::new(t0, t1, trial.interp_coeffs, trial.y1.clone());
                self.state = RkState {
                    y1: trial.y1,
                    f1,
                    t0,
                    t1,
                    dt: attempt.next_step_size,
                    interp,
                };
                self.naccept += 1;
                self.rejections = 0;
                return Ok(());
            }

            self.nreject += 1;
            self.rejections += 1;
            debug!(
                "{} rejected step {:.3e} at t = {:.6e} (error ratio {:.3e}), retrying with {:.3e}",
                Steppable::<R, C>::name(&self.scheme),
                dt,
                t0,
                attempt.error_ratio,
                attempt.next_step_size
            );
            if self.rejections >= self.max_rejections {
                return Err(IntegrateError::MaxRejectionsExceeded {
                    rejections: self.rejections,
                    t: t0,
                    step: dt,
                });
            }
            self.state.dt = attempt.next_step_size;
        }
    }

    /// Step until `next_t` is covered and interpolate there.
    ///
    /// Queries before the current step are an error: accepted progress is
    /// never revisited.
    pub fn advance(&mut self, next_t: f64) -> IntegrateResult<Tensor<R>> {
        if next_t < self.state.t0 {
            return Err(IntegrateError::InvalidTimeSequence {
                context: format!(
                    "requested t = {} lies before the current step [{}, {}]",
                    next_t, self.state.t0, self.state.t1
                ),
            });
        }
        while next_t > self.state.t1 {
            self.adaptive_step()?;
        }
        dense_eval(self.client, &self.state.interp, next_t)
    }

    /// Produce one flat state per requested time. `times[0]` must be the
    /// initial time; its row is the unmodified initial state.
    pub fn integrate(&mut self, times: &[f64]) -> IntegrateResult<Vec<Tensor<R>>> {
        match times.first() {
            Some(&t) if t == self.t_start => {}
            first => {
                return Err(IntegrateError::InvalidTimeSequence {
                    context: format!(
                        "first requested time {:?} differs from initial time {}",
                        first, self.t_start
                    ),
                });
            }
        }

        let mut rows = Vec::with_capacity(times.len());
        rows.push(self.y_start.clone());
        for &t in &times[1..] {
            rows.push(self.advance(t)?);
        }
        Ok(rows)
    }

    /// Step until `t_end` is reached, archiving every accepted step.
    pub fn integrate_dense(&mut self, t_end: f64) -> IntegrateResult<Vec<DenseOutputStep<R>>> {
        let mut steps = Vec::new();
        while self.state.t1 < t_end {
            self.adaptive_step()?;
            steps.push(self.state.interp.clone());
        }
        Ok(steps)
    }
}
