//! odestep - adaptive-step ODE integration on numr tensors
//!
//! odestep solves initial value problems `dy/dt = f(t, y)` for states of any
//! shape held in numr tensors. It produces the trajectory at requested times,
//! a queryable dense output over an interval, or the first time a scalar event
//! function crosses zero.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      odestep                             │
//! │  (step control, integration loop, dense output, events) │
//! └──────────────────────────┬──────────────────────────────┘
//!                            │ uses
//! ┌──────────────────────────▼──────────────────────────────┐
//! │                       numr                               │
//! │          (tensors, elementwise ops, reductions)          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Backend Support
//!
//! All algorithms are generic over numr's `Runtime` trait:
//! - CPU (always available)
//! - CUDA (`cuda` feature)
//! - WebGPU (`wgpu` feature, F32 only)
//!
//! # Example
//!
//! ```ignore
//! use odestep::integrate::{IntegrationAlgorithms, ODEOptions};
//! use numr::runtime::cpu::{CpuClient, CpuDevice};
//! use numr::tensor::Tensor;
//!
//! let device = CpuDevice::new();
//! let client = CpuClient::new(device.clone());
//!
//! // dy/dt = -y, y(0) = 1
//! let y0 = Tensor::from_slice(&[1.0], &[1], &device);
//! let sol = client.odeint(
//!     |_t, y| client.mul_scalar(y, -1.0),
//!     &y0,
//!     &[0.0, 1.0, 2.0],
//!     &ODEOptions::with_tolerances(1e-7, 1e-9),
//! )?;
//! ```

pub mod integrate;

pub use integrate::{
    DenseOutput, EventAtStartPolicy, EventFn, EventFunction, EventOptions, EventSolution,
    IntegrateError, IntegrateResult, IntegrationAlgorithms, ODEMethod, ODEOptions, ODESolution,
    OdeState, Tolerance, odeint_dense_impl, odeint_event_impl, odeint_impl,
};

// Re-export numr types that users will commonly need
pub use numr::dtype::DType;
pub use numr::error::{Error, Result};
pub use numr::runtime::{Runtime, RuntimeClient};
pub use numr::tensor::Tensor;
