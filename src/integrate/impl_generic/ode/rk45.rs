//! Dormand-Prince RK45 method using tensor operations.
//!
//! All computation stays on device using numr's TensorOps.

use crate::DType;
use numr::ops::{ScalarOps, TensorOps};
use numr::runtime::{Runtime, RuntimeClient};
use numr::tensor::Tensor;

use crate::integrate::error::IntegrateResult;
use crate::integrate::traits::{
    AdaptiveSteppable, EventCapable, StepOutput, Steppable, TrialStep,
};

use super::dense_output::dopri_coeffs;
use super::state::{linear_combination, stage_update};

// Dormand-Prince coefficients
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th order weights
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Error weights (5th - 4th order)
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

// Weights of the solution estimate at the step midpoint (b2 = 0)
const M1: f64 = 6025192743.0 / 30085553152.0 / 2.0;
const M3: f64 = 51252292925.0 / 65400821598.0 / 2.0;
const M4: f64 = -2691868925.0 / 45128329728.0 / 2.0;
const M5: f64 = 187940372067.0 / 1594534317056.0 / 2.0;
const M6: f64 = -1776094331.0 / 19743644256.0 / 2.0;
const M7: f64 = 11237099.0 / 235043384.0 / 2.0;

/// Dormand-Prince 5(4) with first-same-as-last and quartic dense output.
#[derive(Debug, Clone, Copy, Default)]
pub struct DormandPrince45;

impl<R, C> Steppable<R, C> for DormandPrince45
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
    fn name(&self) -> &'static str {
        "RK45"
    }

    fn order(&self) -> usize {
        5
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

impl<R, C> AdaptiveSteppable<R, C> for DormandPrince45
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

        // k2 = f(t + c2*h, y + h*a21*k1)
        let y_stage = stage_update(client, y0, &[k1], &[A21], h)?;
        let k2 = f(t0 + C2 * h, &y_stage)?;

        // k3 = f(t + c3*h, y + h*(a31*k1 + a32*k2))
        let y_stage = stage_update(client, y0, &[k1, &k2], &[A31, A32], h)?;
        let k3 = f(t0 + C3 * h, &y_stage)?;

        // k4 = f(t + c4*h, y + h*(a41*k1 + a42*k2 + a43*k3))
        let y_stage = stage_update(client, y0, &[k1, &k2, &k3], &[A41, A42, A43], h)?;
        let k4 = f(t0 + C4 * h, &y_stage)?;

        // k5 = f(t + c5*h, y + h*(a51*k1 + a52*k2 + a53*k3 + a54*k4))
        let y_stage = stage_update(
            client,
            y0,
            &[k1, &k2, &k3, &k4],
            &[A51, A52, A53, A54],
            h,
        )?;
        let k5 = f(t0 + C5 * h, &y_stage)?;

        // k6 = f(t + h, y + h*(a61*k1 + ... + a65*k5))
        let y_stage = stage_update(
            client,
            y0,
            &[k1, &k2, &k3, &k4, &k5],
            &[A61, A62, A63, A64, A65],
            h,
        )?;
        let k6 = f(t0 + h, &y_stage)?;

        // 5th order solution, b2 = 0
        let y1 = stage_update(
            client,
            y0,
            &[k1, &k3, &k4, &k5, &k6],
            &[B1, B3, B4, B5, B6],
            h,
        )?;

        // k7 (FSAL) = f(t + h, y1)
        let k7 = f(t0 + h, &y1)?;

        // Error estimate: y_err = h*(e1*k1 + e3*k3 + e4*k4 + e5*k5 + e6*k6 + e7*k7)
        let y_err = linear_combination(
            client,
            &[
                (k1, h * E1),
                (&k3, h * E3),
                (&k4, h * E4),
                (&k5, h * E5),
                (&k6, h * E6),
                (&k7, h * E7),
            ],
        )?;

        let y_mid = stage_update(
            client,
            y0,
            &[k1, &k3, &k4, &k5, &k6, &k7],
            &[M1, M3, M4, M5, M6, M7],
            h,
        )?;
        let interp_coeffs = dopri_coeffs(client, y0, &y1, &y_mid, k1, &k7, h)?;

        Ok(TrialStep {
            y1,
            f1: k7,
            y_err,
            interp_coeffs,
        })
    }
}

impl<R, C> EventCapable<R, C> for DormandPrince45
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
{
    fn interpolant_degree(&self) -> usize {
        4
    }
}
