//! WebGPU implementation of integration algorithms.
//!
//! This module implements the [`IntegrationAlgorithms`] trait for WebGPU
//! by delegating to the generic implementations in `impl_generic/`.
//!
//! # Limitations
//!
//! - Only F32 states are supported (WGSL doesn't support F64)

use crate::integrate::error::IntegrateResult;
use crate::integrate::impl_generic::{
    DenseOutput, EventSolution, ODESolution, odeint_dense_impl, odeint_event_impl, odeint_impl,
};
use crate::integrate::{EventFunction, IntegrationAlgorithms, ODEOptions, OdeState};
use numr::error::Result;
use numr::runtime::wgpu::{WgpuClient, WgpuRuntime};

impl IntegrationAlgorithms<WgpuRuntime> for WgpuClient {
    fn odeint<Y, F>(
        &self,
        f: F,
        y0: &Y,
        t: &[f64],
        options: &ODEOptions,
    ) -> IntegrateResult<ODESolution<WgpuRuntime, Y>>
    where
        Y: OdeState<WgpuRuntime>,
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
    ) -> IntegrateResult<DenseOutput<WgpuRuntime, Y>>
    where
        Y: OdeState<WgpuRuntime>,
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
    ) -> IntegrateResult<EventSolution<WgpuRuntime, Y>>
    where
        Y: OdeState<WgpuRuntime>,
        F: Fn(f64, &Y) -> Result<Y>,
        E: EventFunction<WgpuRuntime, Self, Y> + ?Sized,
    {
        odeint_event_impl(self, f, y0, t0, event_fn, options)
    }
}
