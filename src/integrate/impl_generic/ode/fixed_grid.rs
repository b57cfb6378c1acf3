//! Fixed-grid explicit schemes and their integration loop.
//!
//! The grid is either the requested times or, with `step_size`, the nodes
//! `t0, t0 + h, t0 + 2h, ...` with the last node moved onto the final
//! requested time. Output times between nodes are interpolated linearly or
//! with a cubic Hermite polynomial.

use log::trace;

use crate::DType;
use numr::ops::{ScalarOps, TensorOps};
use numr::runtime::{Runtime, RuntimeClient};
use numr::tensor::Tensor;

use crate::integrate::error::{IntegrateError, IntegrateResult};
use crate::integrate::ode::{FixedGridInterp, ODEMethod, ODEOptions};
use crate::integrate::traits::{StepOutput, Steppable};

use super::dense_output::{DenseOutputStep, dense_eval, hermite_coeffs, linear_coeffs};
use super::state::stage_update;

/// Forward Euler.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardEuler;

/// Explicit midpoint rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitMidpoint;

/// Classical 4th order Runge-Kutta, 3/8 rule variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rk4ThreeEighths;

impl<R, C> Steppable<R, C> for ForwardEuler
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
    fn name(&self) -> &'static str {
        "Euler"
    }

    fn order(&self) -> usize {
        1
    }

    fn step<F>(
        &self,
        client: &C,
        _f: &F,
        _t0: f64,
        y0: &Tensor<R>,
        f0: &Tensor<R>,
        dt: f64,
    ) -> IntegrateResult<StepOutput<R>>
    where
        F: Fn(f64, &Tensor<R>) -> IntegrateResult<Tensor<R>>,
    {
        let y1 = stage_update(client, y0, &[f0], &[1.0], dt)?;
        let interp_coeffs = linear_coeffs(client, y0, &y1)?;
        Ok(StepOutput { y1, interp_coeffs })
    }
}

impl<R, C> Steppable<R, C> for ExplicitMidpoint
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
    fn name(&self) -> &'static str {
        "Midpoint"
    }

    fn order(&self) -> usize {
        2
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
        let y_half = stage_update(client, y0, &[f0], &[0.5], dt)?;
        let k2 = f(t0 + 0.5 * dt, &y_half)?;
        let y1 = stage_update(client, y0, &[&k2], &[1.0], dt)?;
        let interp_coeffs = linear_coeffs(client, y0, &y1)?;
        Ok(StepOutput { y1, interp_coeffs })
    }
}

impl<R, C> Steppable<R, C> for Rk4ThreeEighths
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
    fn name(&self) -> &'static str {
        "RK4"
    }

    fn order(&self) -> usize {
        4
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
        const THIRD: f64 = 1.0 / 3.0;

        let k1 = f0;
        let y_stage = stage_update(client, y0, &[k1], &[THIRD], dt)?;
        let k2 = f(t0 + THIRD * dt, &y_stage)?;

        let y_stage = stage_update(client, y0, &[k1, &k2], &[-THIRD, 1.0], dt)?;
        let k3 = f(t0 + 2.0 * THIRD * dt, &y_stage)?;

        let y_stage = stage_update(client, y0, &[k1, &k2, &k3], &[1.0, -1.0, 1.0], dt)?;
        let k4 = f(t0 + dt, &y_stage)?;

        let y1 = stage_update(
            client,
            y0,
            &[k1, &k2, &k3, &k4],
            &[0.125, 0.375, 0.375, 0.125],
            dt,
        )?;
        let interp_coeffs = linear_coeffs(client, y0, &y1)?;
        Ok(StepOutput { y1, interp_coeffs })
    }
}

/// Fixed-grid scheme selected once from the method.
#[derive(Debug, Clone, Copy)]
pub enum FixedScheme {
    Euler(ForwardEuler),
    Midpoint(ExplicitMidpoint),
    RK4(Rk4ThreeEighths),
}

impl FixedScheme {
    /// The fixed-grid scheme for `method`, or `None` for adaptive methods.
    pub fn from_method(method: ODEMethod) -> Option<Self> {
        match method {
            ODEMethod::Euler => Some(Self::Euler(ForwardEuler)),
            ODEMethod::Midpoint => Some(Self::Midpoint(ExplicitMidpoint)),
            ODEMethod::RK4 => Some(Self::RK4(Rk4ThreeEighths)),
            ODEMethod::Heun12 | ODEMethod::RK23 | ODEMethod::RK45 => None,
        }
    }
}

impl<R, C> Steppable<R, C> for FixedScheme
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
    fn name(&self) -> &'static str {
        match self {
            Self::Euler(s) => Steppable::<R, C>::name(s),
            Self::Midpoint(s) => Steppable::<R, C>::name(s),
            Self::RK4(s) => Steppable::<R, C>::name(s),
        }
    }

    fn order(&self) -> usize {
        match self {
            Self::Euler(s) => Steppable::<R, C>::order(s),
            Self::Midpoint(s) => Steppable::<R, C>::order(s),
            Self::RK4(s) => Steppable::<R, C>::order(s),
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
            Self::Euler(s) => s.step(client, f, t0, y0, f0, dt),
            Self::Midpoint(s) => s.step(client, f, t0, y0, f0, dt),
            Self::RK4(s) => s.step(client, f, t0, y0, f0, dt),
        }
    }
}

/// Build the integration grid for increasing `times`.
pub fn build_grid(
    times: &[f64],
    step_size: Option<f64>,
    max_num_steps: usize,
) -> IntegrateResult<Vec<f64>> {
    let (Some(&start), Some(&end)) = (times.first(), times.last()) else {
        return Err(IntegrateError::InvalidTimeSequence {
            context: "no requested times".to_string(),
        });
    };

    let grid = match step_size {
        None => times.to_vec(),
        Some(_) if times.len() == 1 => vec![start],
        Some(h) => {
            let n_nodes = ((end - start) / h + 1.0).ceil();
            if n_nodes - 1.0 > max_num_steps as f64 {
                return Err(IntegrateError::MaxStepsExceeded {
                    steps: max_num_steps,
                    t: start,
                    context: format!("fixed grid with step size {} needs {} steps", h, n_nodes - 1.0),
                });
            }

            // Drop nodes that would leave a sliver before the final time
            let tiny = 4.0 * f64::EPSILON * end.abs().max(1.0);
            let mut grid: Vec<f64> = (0..n_nodes as usize)
                .map(|i| start + i as f64 * h)
                .filter(|&t| t < end - tiny)
                .collect();
            grid.push(end);
            grid
        }
    };

    if grid.len().saturating_sub(1) > max_num_steps {
        return Err(IntegrateError::MaxStepsExceeded {
            steps: max_num_steps,
            t: start,
            context: format!("fixed grid has {} steps", grid.len() - 1),
        });
    }
    Ok(grid)
}

/// Integrate on a fixed grid, returning one flat state per requested time
/// and the number of grid steps taken.
pub fn integrate_fixed<R, C, S, F>(
    client: &C,
    scheme: &S,
    f: &F,
    times: &[f64],
    y0: &Tensor<R>,
    options: &ODEOptions,
) -> IntegrateResult<(Vec<Tensor<R>>, usize)>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    S: Steppable<R, C>,
    F: Fn(f64, &Tensor<R>) -> IntegrateResult<Tensor<R>>,
{
    let grid = build_grid(times, options.step_size, options.max_num_steps)?;

    let mut rows = Vec::with_capacity(times.len());
    rows.push(y0.clone());
    let mut j = 1;
    let mut y = y0.clone();

    for w in grid.windows(2) {
        let (t0, t1) = (w[0], w[1]);
        let dt = t1 - t0;
        let f0 = f(t0, &y)?;
        let out = scheme.step(client, f, t0, &y, &f0, dt)?;
        trace!("{} step t = {:.6e} -> {:.6e}", scheme.name(), t0, t1);

        if j < times.len() && times[j] <= t1 {
            let coeffs = match options.fixed_interp {
                FixedGridInterp::Linear => out.interp_coeffs,
                FixedGridInterp::Cubic => {
                    let f1 = f(t1, &out.y1)?;
                    hermite_coeffs(client, &y, &out.y1, &f0, &f1, dt)?
                }
            };
            let step = DenseOutputStep::new(t0, t1, coeffs, out.y1.clone());
            while j < times.len() && times[j] <= t1 {
                rows.push(dense_eval(client, &step, times[j])?);
                j += 1;
            }
        }
        y = out.y1;
    }

    Ok((rows, grid.len() - 1))
}
