//! CUDA implementation of integration algorithms.
//!
//! This module implements the [`IntegrationAlgorithms`] trait for CUDA
//! by delegating to the generic implementations in `impl_generic/`.

use crate::integrate::error::IntegrateResult;
use crate::integrate::impl_generic::{
    DenseOutput, EventSolution, ODESolution, odeint_dense_impl, odeint_event_impl, odeint_impl,
};
use crate::integrate::{EventFunction, IntegrationAlgorithms, ODEOptions, OdeState};
use numr::error::Result;
use numr::runtime::cuda::{CudaClient, CudaRuntime};

impl IntegrationAlgorithms<CudaRuntime> for CudaClient {
    fn odeint<Y, F>(
        &self,
        f: F,
        y0: &Y,
        t: &[f64],
        options: &ODEOptions,
    ) -> IntegrateResult<ODESolution<CudaRuntime, Y>>
    where
        Y: OdeState<CudaRuntime>,
        F: Fn(f64, &Y) -> Result<Y>,
    {
        odeint_impl(self, f, y0, t, options)
    }

    fn odeint_dense<Y, F>(
        &self,
        f: F,
        y0: &Y,
        t0: f64,
        t1: f64,
        options: &ODEOptions,
    ) -> IntegrateResult<DenseOutput<CudaRuntime, Y>>
    where
        Y: OdeState<CudaRuntime>,
        F: Fn(f64, &Y) -> Result<Y>,
    {
        odeint_dense_impl(self, f, y0, t0, t1, options)
    }

    fn odeint_event<Y, F, E>(
        &self,
        f: F,
        y0: &Y,
        t0: f64,
        event_fn: &E,
        options: &ODEOptions,
    ) -> IntegrateResult<EventSolution<CudaRuntime, Y>>
    where
        Y: OdeState<CudaRuntime>,
        F: Fn(f64, &Y) -> Result<Y>,
        E: EventFunction<CudaRuntime, Self, Y> + ?Sized,
    {
        odeint_event_impl(self, f, y0, t0, event_fn, options)
    }
}
