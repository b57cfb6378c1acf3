//! Ordinary differential equation (ODE) solver configuration.
//!
//! Options for solving initial value problems (IVPs) of the form
//! dy/dt = f(t, y), y(t0) = y0.
//!
//! # Available Methods
//!
//! | Method | Order | Type | Best For |
//! |--------|-------|------|----------|
//! | Heun12 | 2(1) | Adaptive | Loose tolerances, cheap RHS |
//! | RK23 | 3(2) | Adaptive | Low accuracy, fast |
//! | RK45 | 5(4) | Adaptive | General purpose (default) |
//! | Euler / Midpoint / RK4 | 1 / 2 / 4 | Fixed grid | Reproducible grids |
//!
//! # Usage
//!
//! ```ignore
//! use odestep::integrate::{ODEMethod, ODEOptions};
//!
//! let opts = ODEOptions::with_method(ODEMethod::RK23)
//!     .tolerances(1e-6, 1e-9)
//!     .initial_step(1e-3);
//!
//! // Dictionary-style configuration, unknown names are rejected
//! let opts = ODEOptions::from_pairs(ODEMethod::RK45, [("first_step", 0.1), ("safety", 0.8)])?;
//! ```

mod types;

pub use types::{
    ErrorNorm, EventAtStartPolicy, EventOptions, FixedGridInterp, ODEMethod, ODEOptions,
    OPTION_NAMES, Tolerance,
};
