//! Error types for ODE integration.

use std::fmt;

/// Result type for integration operations.
pub type IntegrateResult<T> = Result<T, IntegrateError>;

/// Errors that can occur during ODE integration.
///
/// Every variant is fatal for the call that produced it: no partial
/// trajectory is returned alongside an error.
#[derive(Debug, Clone)]
pub enum IntegrateError {
    /// Requested times are not strictly monotonic, or a query went backward
    /// past progress the solver already made.
    InvalidTimeSequence { context: String },

    /// Step size fell below the representable resolution at `t`.
    StepSizeTooSmall { step: f64, t: f64, context: String },

    /// Maximum number of trial steps (accepted + rejected) exceeded.
    MaxStepsExceeded {
        steps: usize,
        t: f64,
        context: String,
    },

    /// Too many consecutive rejected trial steps.
    MaxRejectionsExceeded {
        rejections: usize,
        t: f64,
        step: f64,
    },

    /// Dense-output query outside the interval the coefficients are valid on.
    OutOfInterpolationRange { t: f64, t_min: f64, t_max: f64 },

    /// The event function is already zero at the initial time.
    EventAtStart { t: f64 },

    /// Unknown option name, or an option that does not apply to the selected
    /// scheme or has an invalid value.
    UnsupportedConfiguration { option: String, message: String },

    /// Invalid input tensor (shape, dtype, emptiness).
    InvalidInput { context: String },

    /// Numerical computation failed (e.g., NaN error estimate).
    NumericalError { message: String },

    /// Error from underlying numr operation.
    NumrError(String),
}

impl fmt::Display for IntegrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimeSequence { context } => {
                write!(f, "Invalid time sequence: {}", context)
            }
            Self::StepSizeTooSmall { step, t, context } => {
                write!(
                    f,
                    "{}: step size {:.2e} too small at t = {:.6}",
                    context, step, t
                )
            }
            Self::MaxStepsExceeded { steps, t, context } => {
                write!(
                    f,
                    "{}: exceeded maximum {} steps at t = {:.6}",
                    context, steps, t
                )
            }
            Self::MaxRejectionsExceeded {
                rejections,
                t,
                step,
            } => {
                write!(
                    f,
                    "{} consecutive step rejections at t = {:.6} (last step {:.2e})",
                    rejections, t, step
                )
            }
            Self::OutOfInterpolationRange { t, t_min, t_max } => {
                write!(
                    f,
                    "Interpolation time {} outside valid range [{}, {}]",
                    t, t_min, t_max
                )
            }
            Self::EventAtStart { t } => {
                write!(f, "Event function is already zero at initial time t = {}", t)
            }
            Self::UnsupportedConfiguration { option, message } => {
                write!(f, "Unsupported option '{}': {}", option, message)
            }
            Self::InvalidInput { context } => {
                write!(f, "Invalid input: {}", context)
            }
            Self::NumericalError { message } => {
                write!(f, "Numerical error: {}", message)
            }
            Self::NumrError(msg) => {
                write!(f, "numr error: {}", msg)
            }
        }
    }
}

impl std::error::Error for IntegrateError {}

impl From<numr::error::Error> for IntegrateError {
    fn from(err: numr::error::Error) -> Self {
        Self::NumrError(err.to_string())
    }
}

impl IntegrateError {
    pub(crate) fn unsupported(option: &str, message: impl Into<String>) -> Self {
        Self::UnsupportedConfiguration {
            option: option.to_string(),
            message: message.into(),
        }
    }
}
