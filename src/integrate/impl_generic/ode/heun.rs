//! Adaptive Heun-Euler 2(1) method.
//!
//! The trapezoidal (Heun) solution is propagated; its difference to the
//! forward Euler solution is the error estimate.

use crate::DType;
use numr::ops::{ScalarOps, TensorOps};
use numr::runtime::{Runtime, RuntimeClient};
use numr::tensor::Tensor;

use crate::integrate::error::IntegrateResult;
use crate::integrate::traits::{
    AdaptiveSteppable, EventCapable, StepOutput, Steppable, TrialStep,
};

use super::dense_output::hermite_coeffs;
use super::state::{linear_combination, stage_update};

/// Heun-Euler 2(1) with cubic Hermite output.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeunEuler12;

impl<R, C> Steppable<R, C> for HeunEuler12
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
    fn name(&self) -> &'static str {
        "Heun12"
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
        let trial = self.trial_step(client, f, t0, y0, f0, dt)?;
        Ok(StepOutput {
            y1: trial.y1,
            interp_coeffs: trial.interp_coeffs,
        })
    }
}

impl<R, C> AdaptiveSteppable<R, C> for HeunEuler12
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
        h: f64,
    ) -> IntegrateResult<TrialStep<R>>
    where
        F: Fn(f64, &Tensor<R>) -> IntegrateResult<Tensor<R>>,
    {
        let k1 = f0;

        let y_euler = stage_update(client, y0, &[k1], &[1.0], h)?;
        let k2 = f(t0 + h, &y_euler)?;

        let y1 = stage_update(client, y0, &[k1, &k2], &[0.5, 0.5], h)?;
        let f1 = f(t0 + h, &y1)?;

        let y_err = linear_combination(client, &[(k1, 0.5 * h), (&k2, -0.5 * h)])?;
        let interp_coeffs = hermite_coeffs(client, y0, &y1, k1, &f1, h)?;

        Ok(TrialStep {
            y1,
            f1,
            y_err,
            interp_coeffs,
        })
    }
}

impl<R, C> EventCapable<R, C> for HeunEuler12
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
    fn interpolant_degree(&self) -> usize {
        3
    }
}
