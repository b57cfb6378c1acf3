//! Event function traits and types for ODE solvers.
//!
//! An event function is a scalar observable g(t, y) of the trajectory. The
//! event solver integrates until g changes sign and then bisects the last
//! accepted step's interpolant for the crossing time.
//!
//! # Example
//!
//! ```ignore
//! use odestep::integrate::traits::EventFunction;
//!
//! // Detect when y[0] crosses zero (e.g., ball hitting ground)
//! struct GroundImpact;
//!
//! impl<R: Runtime<DType = DType>, C> EventFunction<R, C> for GroundImpact {
//!     fn evaluate(&self, _client: &C, _t: f64, y: &Tensor<R>) -> Result<f64> {
//!         let data: Vec<f64> = y.to_vec();
//!         Ok(data[0])
//!     }
//! }
//! ```
use crate::DType;

use numr::error::Result;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

use super::state::OdeState;

/// Trait for event functions used in ODE integration.
///
/// `y` is handed over in the caller's original state shape and `t` in the
/// caller's time direction. `Y` is the state type: a tensor, or a group of
/// tensors for multi-component states.
pub trait EventFunction<R: Runtime<DType = DType>, C, Y = Tensor<R>>: Send + Sync {
    /// Evaluate the event function at (t, y).
    ///
    /// # Returns
    /// The value of the event function. The event fires when its sign differs
    /// from the sign at the initial time.
    fn evaluate(&self, client: &C, t: f64, y: &Y) -> Result<f64>;
}

/// Wrapper for closure-based event functions.
pub struct EventFn<R, C, F, Y = Tensor<R>>
where
    R: Runtime<DType = DType>,
    F: Fn(&C, f64, &Y) -> Result<f64> + Send + Sync,
    Y: OdeState<R>,
{
    f: F,
    _marker: std::marker::PhantomData<fn(&C, &Y) -> R>,
}

impl<R, C, F, Y> EventFn<R, C, F, Y>
where
    R: Runtime<DType = DType>,
    F: Fn(&C, f64, &Y) -> Result<f64> + Send + Sync,
    Y: OdeState<R>,
{
    /// Create a new event function from a closure.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<R, C, F, Y> EventFunction<R, C, Y> for EventFn<R, C, F, Y>
where
    R: Runtime<DType = DType>,
    F: Fn(&C, f64, &Y) -> Result<f64> + Send + Sync,
    Y: OdeState<R>,
{
    fn evaluate(&self, client: &C, t: f64, y: &Y) -> Result<f64> {
        (self.f)(client, t, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use numr::runtime::cpu::{CpuClient, CpuDevice, CpuRuntime};

    fn setup() -> (CpuDevice, CpuClient) {
        let device = CpuDevice::new();
        let client = CpuClient::new(device.clone());
        (device, client)
    }

    #[test]
    fn test_event_fn_closure() {
        let (device, client) = setup();

        // Threshold crossing y[1] = 1
        let event = EventFn::new(|_c: &CpuClient, _t: f64, y: &Tensor<CpuRuntime>| {
            let y_data: Vec<f64> = y.to_vec();
            Ok(y_data[1] - 1.0)
        });

        let y = Tensor::<CpuRuntime>::from_slice(&[1.0, 2.5], &[2], &device);
        let val = event.evaluate(&client, 0.0, &y).unwrap();
        assert!((val - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_event_fn_sees_time() {
        let (device, client) = setup();

        let event = EventFn::new(|_c: &CpuClient, t: f64, _y: &Tensor<CpuRuntime>| Ok(t - 2.0));
        let y = Tensor::<CpuRuntime>::from_slice(&[0.0], &[1], &device);

        assert!(event.evaluate(&client, 1.0, &y).unwrap() < 0.0);
        assert!(event.evaluate(&client, 3.0, &y).unwrap() > 0.0);
    }
}
