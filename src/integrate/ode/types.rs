//! Types for ODE solvers.

use std::fmt;
use std::sync::Arc;

use crate::integrate::error::{IntegrateError, IntegrateResult};

/// ODE solver method.
///
/// # Available Methods
///
/// ## Adaptive Methods
///
/// | Method | Order | Stages | Interpolant | Use Case |
/// |--------|-------|--------|-------------|----------|
/// | Heun12 | 2(1)  | 2      | cubic Hermite | Cheap, loose tolerances |
/// | RK23   | 3(2)  | 3+FSAL | cubic Hermite | Fast, lower accuracy |
/// | RK45   | 5(4)  | 6+FSAL | quartic       | General purpose (recommended) |
///
/// ## Fixed-Grid Methods
///
/// | Method   | Order | Stages |
/// |----------|-------|--------|
/// | Euler    | 1     | 1      |
/// | Midpoint | 2     | 2      |
/// | RK4      | 4     | 4      |
///
/// Fixed-grid methods take no error feedback and only support
/// fixed-time-grid solves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ODEMethod {
    /// Adaptive Heun-Euler 2(1).
    Heun12,

    /// Bogacki-Shampine 3(2).
    ///
    /// 3 stages per step plus a first-same-as-last evaluation that is
    /// reused as the next step's first stage.
    RK23,

    /// Dormand-Prince 5(4) - general purpose (default).
    ///
    /// 6 stages per step. Dense output uses a quartic fitted through an
    /// additional midpoint estimate built from the same stages.
    #[default]
    RK45,

    /// Forward Euler on a fixed grid.
    Euler,

    /// Explicit midpoint rule on a fixed grid.
    Midpoint,

    /// Runge-Kutta 4 (3/8 rule) on a fixed grid.
    RK4,
}

impl ODEMethod {
    /// Returns true if the method carries an embedded error estimate.
    pub fn is_adaptive(&self) -> bool {
        matches!(self, Self::Heun12 | Self::RK23 | Self::RK45)
    }

    /// Short human-readable name used in error contexts.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Heun12 => "Heun12",
            Self::RK23 => "RK23",
            Self::RK45 => "RK45",
            Self::Euler => "Euler",
            Self::Midpoint => "Midpoint",
            Self::RK4 => "RK4",
        }
    }
}

/// Relative or absolute tolerance: one value for the whole state, or a
/// per-element array.
///
/// A per-element array holding one value per flattened state element is
/// used as is. Otherwise it is broadcast against each state component along
/// the trailing axis, so it must hold one value or one value per entry of
/// the component's last axis (a `[2, 3]` state takes 3 values).
#[derive(Debug, Clone, PartialEq)]
pub enum Tolerance {
    Scalar(f64),
    PerElement(Vec<f64>),
}

impl Tolerance {
    fn validate(&self, name: &str) -> IntegrateResult<()> {
        let values: &[f64] = match self {
            Self::Scalar(v) => std::slice::from_ref(v),
            Self::PerElement(vs) => vs,
        };
        if values.is_empty() {
            return Err(IntegrateError::unsupported(name, "tolerance vector is empty"));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(IntegrateError::unsupported(
                name,
                format!("tolerances must be finite and non-negative (got {})", bad),
            ));
        }
        Ok(())
    }
}

impl From<f64> for Tolerance {
    fn from(val: f64) -> Self {
        Self::Scalar(val)
    }
}

impl From<Vec<f64>> for Tolerance {
    fn from(val: Vec<f64>) -> Self {
        Self::PerElement(val)
    }
}

impl From<&[f64]> for Tolerance {
    fn from(val: &[f64]) -> Self {
        Self::PerElement(val.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Tolerance {
    fn from(val: [f64; N]) -> Self {
        Self::PerElement(val.to_vec())
    }
}

/// Aggregation of the scaled error `y_err / (atol + rtol * max(|y0|, |y1|))`
/// into the scalar error ratio compared against 1.
#[derive(Clone, Default)]
pub enum ErrorNorm {
    /// Root-mean-square over all state elements.
    #[default]
    Rms,
    /// Maximum absolute value over all state elements.
    Max,
    /// User norm over the scaled error, transferred to the host as `f64`.
    Custom(Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>),
}

impl ErrorNorm {
    /// Aggregate scaled error values into a single ratio.
    pub fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Self::Rms => {
                if values.is_empty() {
                    return 0.0;
                }
                let sum_sq: f64 = values.iter().map(|v| v * v).sum();
                (sum_sq / values.len() as f64).sqrt()
            }
            Self::Max => values.iter().fold(0.0, |acc: f64, v| acc.max(v.abs())),
            Self::Custom(norm) => norm(values),
        }
    }
}

impl fmt::Debug for ErrorNorm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rms => write!(f, "Rms"),
            Self::Max => write!(f, "Max"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Interpolation between fixed-grid nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixedGridInterp {
    #[default]
    Linear,
    /// Cubic Hermite using the derivative at both nodes (one extra
    /// evaluation per output time).
    Cubic,
}

/// What to do when the event function is exactly zero at the initial time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventAtStartPolicy {
    /// Fail with [`IntegrateError::EventAtStart`].
    #[default]
    Error,
    /// Report the initial time as the event.
    Accept,
}

/// Options for event location.
#[derive(Debug, Clone)]
pub struct EventOptions {
    /// Bisection stops once the bracket is narrower than this (default: 1e-9)
    pub tol: f64,

    /// Hard cap on bisection iterations (default: 100)
    pub max_iter: usize,

    /// Policy for an event function that is zero at `t0` (default: Error)
    pub at_start: EventAtStartPolicy,

    /// Integrate backward in time from `t0` (default: false)
    pub reverse: bool,
}

impl Default for EventOptions {
    fn default() -> Self {
        Self {
            tol: 1e-9,
            max_iter: 100,
            at_start: EventAtStartPolicy::Error,
            reverse: false,
        }
    }
}

/// Options for ODE solvers.
#[derive(Debug, Clone)]
pub struct ODEOptions {
    /// Solver method (default: RK45)
    pub method: ODEMethod,

    /// Relative tolerance (default: 1e-7)
    pub rtol: Tolerance,

    /// Absolute tolerance (default: 1e-9)
    pub atol: Tolerance,

    /// Initial trial step size (default: auto-computed)
    pub first_step: Option<f64>,

    /// Safety factor applied to the optimal step size (default: 0.9)
    pub safety: Option<f64>,

    /// Lower bound on the step size ratio between trials (default: 0.2)
    pub min_factor: Option<f64>,

    /// Upper bound on the step size ratio between trials (default: 10.0)
    pub max_factor: Option<f64>,

    /// Minimum step size (default: none, only the dtype resolution floor)
    pub min_step: Option<f64>,

    /// Maximum step size (default: unbounded)
    pub max_step: Option<f64>,

    /// Maximum number of trial steps, accepted plus rejected (default: 10000)
    pub max_num_steps: usize,

    /// Maximum number of consecutive rejections (default: 100)
    pub max_rejections: usize,

    /// Error norm (default: RMS)
    pub norm: ErrorNorm,

    /// Times every accepted step must land on exactly
    pub grid_points: Vec<f64>,

    /// Discontinuities of `f`: steps land on them and the derivative is
    /// re-evaluated just past them
    pub jump_points: Vec<f64>,

    /// Grid spacing for fixed-grid methods (default: the requested times)
    pub step_size: Option<f64>,

    /// Interpolation between fixed-grid nodes (default: Linear)
    pub fixed_interp: FixedGridInterp,

    /// Event location options
    pub event: EventOptions,
}

impl Default for ODEOptions {
    fn default() -> Self {
        Self {
            method: ODEMethod::default(),
            rtol: Tolerance::Scalar(1e-7),
            atol: Tolerance::Scalar(1e-9),
            first_step: None,
            safety: None,
            min_factor: None,
            max_factor: None,
            min_step: None,
            max_step: None,
            max_num_steps: 10000,
            max_rejections: 100,
            norm: ErrorNorm::Rms,
            grid_points: Vec::new(),
            jump_points: Vec::new(),
            step_size: None,
            fixed_interp: FixedGridInterp::Linear,
            event: EventOptions::default(),
        }
    }
}

/// Option names accepted by [`ODEOptions::from_pairs`].
pub const OPTION_NAMES: [&str; 11] = [
    "rtol",
    "atol",
    "first_step",
    "safety",
    "min_factor",
    "max_factor",
    "min_step",
    "max_step",
    "max_num_steps",
    "max_rejections",
    "step_size",
];

impl ODEOptions {
    /// Create options with specified tolerances.
    pub fn with_tolerances(rtol: impl Into<Tolerance>, atol: impl Into<Tolerance>) -> Self {
        Self {
            rtol: rtol.into(),
            atol: atol.into(),
            ..Default::default()
        }
    }

    /// Create options with specified method.
    pub fn with_method(method: ODEMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    /// Build options from name/value pairs, rejecting unknown names.
    ///
    /// The result is validated against `method` before it is returned.
    pub fn from_pairs<'a, I>(method: ODEMethod, pairs: I) -> IntegrateResult<Self>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut opts = Self::with_method(method);
        for (name, value) in pairs {
            opts.set(name, value)?;
        }
        opts.validate()?;
        Ok(opts)
    }

    /// Set a single option by name.
    pub fn set(&mut self, name: &str, value: f64) -> IntegrateResult<()> {
        match name {
            "rtol" => self.rtol = Tolerance::Scalar(value),
            "atol" => self.atol = Tolerance::Scalar(value),
            "first_step" => self.first_step = Some(value),
            "safety" => self.safety = Some(value),
            "min_factor" => self.min_factor = Some(value),
            "max_factor" => self.max_factor = Some(value),
            "min_step" => self.min_step = Some(value),
            "max_step" => self.max_step = Some(value),
            "max_num_steps" => self.max_num_steps = count_option(name, value)?,
            "max_rejections" => self.max_rejections = count_option(name, value)?,
            "step_size" => self.step_size = Some(value),
            _ => {
                return Err(IntegrateError::unsupported(
                    name,
                    format!("unknown option; expected one of {:?}", OPTION_NAMES),
                ));
            }
        }
        Ok(())
    }

    /// Set the method.
    pub fn method(mut self, method: ODEMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the tolerances.
    pub fn tolerances(mut self, rtol: impl Into<Tolerance>, atol: impl Into<Tolerance>) -> Self {
        self.rtol = rtol.into();
        self.atol = atol.into();
        self
    }

    /// Set the initial step size.
    pub fn initial_step(mut self, h0: f64) -> Self {
        self.first_step = Some(h0);
        self
    }

    /// Set step size bounds.
    pub fn step_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_step = Some(min);
        self.max_step = Some(max);
        self
    }

    /// Set maximum number of trial steps.
    pub fn max_steps(mut self, n: usize) -> Self {
        self.max_num_steps = n;
        self
    }

    /// Set the error norm.
    pub fn norm(mut self, norm: ErrorNorm) -> Self {
        self.norm = norm;
        self
    }

    /// Set the fixed-grid spacing.
    pub fn step_size(mut self, dt: f64) -> Self {
        self.step_size = Some(dt);
        self
    }

    /// Set the event options.
    pub fn event(mut self, event: EventOptions) -> Self {
        self.event = event;
        self
    }

    /// Check value ranges and that every set option applies to the method.
    pub fn validate(&self) -> IntegrateResult<()> {
        self.rtol.validate("rtol")?;
        self.atol.validate("atol")?;

        positive("first_step", self.first_step)?;
        positive("min_step", self.min_step)?;
        positive("max_step", self.max_step)?;
        positive("step_size", self.step_size)?;

        if let (Some(min), Some(max)) = (self.min_step, self.max_step) {
            if min > max {
                return Err(IntegrateError::unsupported(
                    "min_step",
                    format!("min_step {} exceeds max_step {}", min, max),
                ));
            }
        }
        if let Some(safety) = self.safety {
            if !(safety > 0.0 && safety <= 1.0) {
                return Err(IntegrateError::unsupported("safety", "must lie in (0, 1]"));
            }
        }
        if let Some(min_factor) = self.min_factor {
            if !(min_factor > 0.0 && min_factor <= 1.0) {
                return Err(IntegrateError::unsupported("min_factor", "must lie in (0, 1]"));
            }
        }
        if let Some(max_factor) = self.max_factor {
            if !(max_factor >= 1.0 && max_factor.is_finite()) {
                return Err(IntegrateError::unsupported(
                    "max_factor",
                    "must be finite and at least 1",
                ));
            }
        }
        if self.max_num_steps == 0 {
            return Err(IntegrateError::unsupported("max_num_steps", "must be positive"));
        }
        if self.max_rejections == 0 {
            return Err(IntegrateError::unsupported("max_rejections", "must be positive"));
        }
        if !(self.event.tol > 0.0) || self.event.max_iter == 0 {
            return Err(IntegrateError::unsupported(
                "event",
                "bisection tolerance and iteration budget must be positive",
            ));
        }
        if let Some(bad) = self
            .grid_points
            .iter()
            .chain(self.jump_points.iter())
            .find(|t| !t.is_finite())
        {
            return Err(IntegrateError::unsupported(
                "grid_points",
                format!("grid times must be finite (got {})", bad),
            ));
        }

        let method = self.method;
        if method.is_adaptive() {
            if self.step_size.is_some() {
                return Err(IntegrateError::unsupported(
                    "step_size",
                    format!("{} chooses its own steps", method.name()),
                ));
            }
        } else {
            let adaptive_only = [
                ("first_step", self.first_step.is_some()),
                ("safety", self.safety.is_some()),
                ("min_factor", self.min_factor.is_some()),
                ("max_factor", self.max_factor.is_some()),
                ("min_step", self.min_step.is_some()),
                ("max_step", self.max_step.is_some()),
                ("grid_points", !self.grid_points.is_empty()),
                ("jump_points", !self.jump_points.is_empty()),
            ];
            if let Some((name, _)) = adaptive_only.iter().find(|(_, set)| *set) {
                return Err(IntegrateError::unsupported(
                    name,
                    format!(
                        "only applies to adaptive methods, not fixed-grid {}",
                        method.name()
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn positive(name: &str, value: Option<f64>) -> IntegrateResult<()> {
    match value {
        Some(v) if !(v > 0.0 && v.is_finite()) => Err(IntegrateError::unsupported(
            name,
            format!("must be finite and positive (got {})", v),
        )),
        _ => Ok(()),
    }
}

fn count_option(name: &str, value: f64) -> IntegrateResult<usize> {
    if value >= 1.0 && value.fract() == 0.0 && value <= usize::MAX as f64 {
        Ok(value as usize)
    } else {
        Err(IntegrateError::unsupported(
            name,
            format!("expected a positive integer (got {})", value),
        ))
    }
}
