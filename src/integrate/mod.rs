//! Adaptive-step ODE integration for odestep.
//!
//! This module provides Runtime-first solvers for initial value problems
//! `dy/dt = f(t, y)` whose state is a `Tensor<R>` of any shape, or a fixed
//! group of tensors.
//!
//! # Architecture
//!
//! All entry points are exposed through the [`IntegrationAlgorithms`] trait,
//! implemented for every numr runtime client by delegating to the generic
//! implementations in [`impl_generic`]. Stepping schemes plug into the
//! integration loop through the capability traits in [`traits`]. States are
//! single tensors or fixed groups of tensors ([`OdeState`]).
//!
//! # Entry Points
//!
//! - [`IntegrationAlgorithms::odeint`] - trajectory at requested times
//! - [`IntegrationAlgorithms::odeint_dense`] - queryable dense output over an interval
//! - [`IntegrationAlgorithms::odeint_event`] - integrate until an event function crosses zero
//!
//! ## Available Methods
//!
//! - **Heun12**: adaptive Heun-Euler 2(1)
//! - **RK23**: Bogacki-Shampine 3(2)
//! - **RK45**: Dormand-Prince 5(4) (default)
//! - **Euler / Midpoint / RK4**: fixed grid, `odeint` only
//!
//! # Example
//!
//! ```ignore
//! use odestep::integrate::{IntegrationAlgorithms, ODEOptions};
//! use numr::runtime::cpu::{CpuClient, CpuDevice};
//!
//! let device = CpuDevice::new();
//! let client = CpuClient::new(device.clone());
//!
//! let y0 = Tensor::from_slice(&[1.0], &[1], &device);
//! let dense = client.odeint_dense(
//!     |_t, y| client.mul_scalar(y, -1.0),
//!     &y0,
//!     0.0,
//!     5.0,
//!     &ODEOptions::default(),
//! )?;
//! let y = dense.evaluate(&client, 2.5)?;
//! ```

mod cpu;
#[cfg(feature = "cuda")]
mod cuda;
pub mod error;
pub mod impl_generic;
pub mod ode;
pub mod traits;
#[cfg(feature = "wgpu")]
mod wgpu;

use crate::DType;
use numr::error::Result;
use numr::runtime::Runtime;

// Re-export error types
pub use error::{IntegrateError, IntegrateResult};

// Re-export configuration types
pub use ode::{
    ErrorNorm, EventAtStartPolicy, EventOptions, FixedGridInterp, ODEMethod, ODEOptions,
    Tolerance,
};

// Re-export traits
pub use traits::{EventFn, EventFunction, OdeState};

// Re-export tensor-based results and generic entry points
pub use impl_generic::{
    DenseOutput, EventSolution, ODESolution, odeint_dense_impl, odeint_event_impl, odeint_impl,
};

/// Trait for ODE integration that works across all Runtime backends.
///
/// All methods keep the state in `Tensor<R>` on the client's device. The
/// state is a single tensor or a fixed group of tensors (see [`OdeState`]);
/// the derivative function receives it with the structure of `y0` and the
/// time in the caller's direction.
///
/// # Example
///
/// ```ignore
/// use odestep::integrate::{IntegrationAlgorithms, ODEOptions};
/// use numr::runtime::cpu::{CpuClient, CpuDevice};
///
/// let device = CpuDevice::new();
/// let client = CpuClient::new(device.clone());
///
/// // Solve dy/dt = -y, y(0) = 1
/// let y0 = Tensor::from_slice(&[1.0], &[1], &device);
/// let sol = client.odeint(
///     |_t, y| client.mul_scalar(y, -1.0),
///     &y0,
///     &[0.0, 1.0, 2.0],
///     &ODEOptions::default(),
/// )?;
/// assert_eq!(sol.y.shape(), &[3, 1]);
///
/// // Position and velocity as separate tensors
/// let x0 = Tensor::from_slice(&[1.0], &[1], &device);
/// let v0 = Tensor::from_slice(&[0.0], &[1], &device);
/// let sol = client.odeint(
///     |_t, (x, v): &(Tensor<_>, Tensor<_>)| Ok((v.clone(), client.mul_scalar(x, -1.0)?)),
///     &(x0, v0),
///     &[0.0, 1.0],
///     &ODEOptions::default(),
/// )?;
/// ```
pub trait IntegrationAlgorithms<R: Runtime<DType = DType>>: Sized {
    /// Solve an initial value problem at the requested times.
    ///
    /// # Arguments
    /// * `f` - Right-hand side function f(t, y) -> dy/dt
    /// * `y0` - Initial state: a tensor of any shape or a group of tensors, F32 or F64
    /// * `t` - Strictly monotonic output times; `t[0]` is the initial time
    /// * `options` - Solver options (method, tolerances, step bounds)
    ///
    /// # Returns
    /// An [`ODESolution`] whose `y` components have shape
    /// `[t.len(), *component_shape]`.
    fn odeint<Y, F>(
        &self,
        f: F,
        y0: &Y,
        t: &[f64],
        options: &ODEOptions,
    ) -> IntegrateResult<ODESolution<R, Y>>
    where
        Y: OdeState<R>,
        F: Fn(f64, &Y) -> Result<Y>;

    /// Solve over `[t0, t1]` and keep every accepted step for later queries.
    ///
    /// Requires an adaptive method. `t1 < t0` integrates backward.
    fn odeint_dense<Y, F>(
        &self,
        f: F,
        y0: &Y,
        t0: f64,
        t1: f64,
        options: &ODEOptions,
    ) -> IntegrateResult<DenseOutput<R, Y>>
    where
        Y: OdeState<R>,
        F: Fn(f64, &Y) -> Result<Y>;

    /// Integrate from `t0` until `event_fn` changes sign.
    ///
    /// Requires an adaptive method. Direction, bisection tolerance and the
    /// policy for an event already at zero come from `options.event`.
    fn odeint_event<Y, F, E>(
        &self,
        f: F,
        y0: &Y,
        t0: f64,
        event_fn: &E,
        options: &ODEOptions,
    ) -> IntegrateResult<EventSolution<R, Y>>
    where
        Y: OdeState<R>,
        F: Fn(f64, &Y) -> Result<Y>,
        E: EventFunction<R, Self, Y> + ?Sized;
}
