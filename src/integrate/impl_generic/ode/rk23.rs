//! Bogacki-Shampine RK23 method using tensor operations.

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

// Bogacki-Shampine coefficients
const C2: f64 = 0.5;
const C3: f64 = 0.75;

const A21: f64 = 0.5;
const A32: f64 = 0.75;

// 3rd order weights
const B1: f64 = 2.0 / 9.0;
const B2: f64 = 1.0 / 3.0;
const B3: f64 = 4.0 / 9.0;

// Error weights (3rd - 2nd order)
const E1: f64 = -5.0 / 72.0;
const E2: f64 = 1.0 / 12.0;
const E3: f64 = 1.0 / 9.0;
const E4: f64 = -1.0 / 8.0;

/// Bogacki-Shampine 3(2) with first-same-as-last and cubic Hermite output.
#[derive(Debug, Clone, Copy, Default)]
pub struct BogackiShampine23;

impl<R, C> Steppable<R, C> for BogackiShampine23
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
    fn name(&self) -> &'static str {
        "RK23"
    }

    fn order(&self) -> usize {
        3
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

impl<R, C> AdaptiveSteppable<R, C> for BogackiShampine23
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

        let y_stage = stage_update(client, y0, &[k1], &[A21], h)?;
        let k2 = f(t0 + C2 * h, &y_stage)?;

        let y_stage = stage_update(client, y0, &[&k2], &[A32], h)?;
        let k3 = f(t0 + C3 * h, &y_stage)?;

        let y1 = stage_update(client, y0, &[k1, &k2, &k3], &[B1, B2, B3], h)?;

        // FSAL
        let k4 = f(t0 + h, &y1)?;

        let y_err = linear_combination(
            client,
            &[(k1, h * E1), (&k2, h * E2), (&k3, h * E3), (&k4, h * E4)],
        )?;

        let interp_coeffs = hermite_coeffs(client, y0, &y1, k1, &k4, h)?;

        Ok(TrialStep {
            y1,
            f1: k4,
            y_err,
            interp_coeffs,
        })
    }
}

impl<R, C> EventCapable<R, C> for BogackiShampine23
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
    fn interpolant_degree(&self) -> usize {
        3
    }
}
