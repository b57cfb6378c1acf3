//! Generic integration implementations.
//!
//! Runtime-generic ODE algorithms that work with any numr backend (CPU, CUDA,
//! WebGPU). Backends implement [`IntegrationAlgorithms`](super::IntegrationAlgorithms)
//! by delegating here, so there is no per-backend code duplication.

pub mod ode;

// Re-export only what backends and callers need
pub use ode::{
    DenseOutput, EventSolution, ODESolution, odeint_dense_impl, odeint_event_impl, odeint_impl,
};
