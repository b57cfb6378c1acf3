//! Terminal event location.
//!
//! The integrator is driven one accepted step at a time until the sign of
//! the event function at the step end differs from its sign at the initial
//! time. The crossing is then refined by bisection on the bracketing step's
//! interpolant, which is never discarded.

use std::marker::PhantomData;

use log::debug;

use crate::DType;
use numr::ops::{ScalarOps, TensorOps};
use numr::runtime::{Runtime, RuntimeClient};
use numr::tensor::Tensor;

use crate::integrate::error::{IntegrateError, IntegrateResult};
use crate::integrate::ode::{EventAtStartPolicy, EventOptions};
use crate::integrate::traits::{EventCapable, EventFunction, OdeState};

use super::dense_output::{DenseOutputStep, dense_eval};
use super::integrator::AdaptiveIntegrator;
use super::state::StateShape;

/// How the event function is evaluated on flat, normalized-time states.
pub struct EventProbe<'e, E: ?Sized, Y> {
    event_fn: &'e E,
    shape: &'e StateShape,
    reversed: bool,
    _state: PhantomData<fn() -> Y>,
}

impl<'e, E: ?Sized, Y> EventProbe<'e, E, Y> {
    /// Sign evaluator for `event_fn` on states laid out as `shape`.
    pub fn new(event_fn: &'e E, shape: &'e StateShape, reversed: bool) -> Self {
        Self {
            event_fn,
            shape,
            reversed,
            _state: PhantomData,
        }
    }

    /// Sign of the event function at normalized time `t`: -1, 0 or 1.
    pub fn sign<R, C>(&self, client: &C, t: f64, y: &Tensor<R>) -> IntegrateResult<i8>
    where
        R: Runtime<DType = DType>,
        C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
        E: EventFunction<R, C, Y>,
        Y: OdeState<R>,
    {
        let y_shaped: Y = self.shape.restore(y)?;
        let t_user = if self.reversed { -t } else { t };
        let g = self.event_fn.evaluate(client, t_user, &y_shaped)?;
        if g.is_nan() {
            return Err(IntegrateError::NumericalError {
                message: format!("event function returned NaN at t = {}", t_user),
            });
        }
        Ok(if g > 0.0 {
            1
        } else if g < 0.0 {
            -1
        } else {
            0
        })
    }
}

/// Integrate until the event fires and return the normalized event time and
/// the flat state there.
pub fn locate_until_event<R, C, S, F, E, Y>(
    integrator: &mut AdaptiveIntegrator<'_, R, C, S, F>,
    probe: &EventProbe<'_, E, Y>,
    options: &EventOptions,
) -> IntegrateResult<(f64, Tensor<R>)>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    S: EventCapable<R, C>,
    F: Fn(f64, &Tensor<R>) -> IntegrateResult<Tensor<R>>,
    E: EventFunction<R, C, Y> + ?Sized,
    Y: OdeState<R>,
{
    let client = integrator.client();
    let t_start = integrator.state().t1;
    let y_start = integrator.state().y1.clone();

    let sign0 = probe.sign(client, t_start, &y_start)?;
    if sign0 == 0 {
        return match options.at_start {
            EventAtStartPolicy::Error => Err(IntegrateError::EventAtStart {
                t: if probe.reversed { -t_start } else { t_start },
            }),
            EventAtStartPolicy::Accept => Ok((t_start, y_start)),
        };
    }

    loop {
        integrator.adaptive_step()?;
        let state = integrator.state();
        if probe.sign(client, state.t1, &state.y1)? != sign0 {
            break;
        }
    }

    let (t_event, y_event, iterations) =
        find_event(client, &integrator.state().interp, probe, sign0, options)?;
    debug!(
        "event bracketed in [{:.6e}, {:.6e}], located at t = {:.9e} after {} bisections on a degree-{} interpolant",
        integrator.state().t0,
        integrator.state().t1,
        t_event,
        iterations,
        integrator.scheme().interpolant_degree()
    );
    Ok((t_event, y_event))
}

/// Bisect the step interpolant for the sign change.
///
/// Runs `ceil(log2(width / tol))` iterations, capped at `max_iter`, and
/// returns the bracket midpoint with its interpolated state.
pub fn find_event<R, C, E, Y>(
    client: &C,
    step: &DenseOutputStep<R>,
    probe: &EventProbe<'_, E, Y>,
    sign0: i8,
    options: &EventOptions,
) -> IntegrateResult<(f64, Tensor<R>, usize)>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    E: EventFunction<R, C, Y> + ?Sized,
    Y: OdeState<R>,
{
    let (mut lo, mut hi) = (step.t0, step.t1);
    let width = hi - lo;
    let iterations = if width > options.tol {
        ((width / options.tol).log2().ceil() as usize).min(options.max_iter)
    } else {
        0
    };

    for _ in 0..iterations {
        let mid = lo + 0.5 * (hi - lo);
        let y_mid = dense_eval(client, step, mid)?;
        if probe.sign(client, mid, &y_mid)? == sign0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let t_event = lo + 0.5 * (hi - lo);
    let y_event = dense_eval(client, step, t_event)?;
    Ok((t_event, y_event, iterations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrate::ode::{ODEMethod, ODEOptions};
    use crate::integrate::traits::EventFn;
    use numr::runtime::cpu::{CpuClient, CpuDevice, CpuRuntime};

    use super::super::dense_output::linear_coeffs;
    use super::super::integrator::AdaptiveScheme;

    fn setup() -> (CpuDevice, CpuClient) {
        let device = CpuDevice::new();
        let client = CpuClient::new(device.clone());
        (device, client)
    }

    fn first(t: &Tensor<CpuRuntime>) -> f64 {
        let data: Vec<f64> = t.to_vec();
        data[0]
    }

    #[test]
    fn test_find_event_on_linear_step() {
        let (device, client) = setup();

        // y goes 1 -> -1 over [0, 2]; root at t = 1
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);
        let y1 = Tensor::<CpuRuntime>::from_slice(&[-1.0], &[1], &device);
        let coeffs = linear_coeffs(&client, &y0, &y1).unwrap();
        let step = DenseOutputStep::new(0.0, 2.0, coeffs, y1.clone());

        let event = EventFn::new(|_c: &CpuClient, _t: f64, y: &Tensor<CpuRuntime>| Ok(first(y)));
        let shape = StateShape::of(&y0).unwrap();
        let probe = EventProbe::new(&event, &shape, false);
        let options = EventOptions {
            tol: 1e-6,
            ..Default::default()
        };

        let (t, y, iterations) = find_event(&client, &step, &probe, 1, &options).unwrap();
        assert_eq!(iterations, 21);
        assert!((t - 1.0).abs() < 1e-6);
        assert!(first(&y).abs() < 1e-6);
    }

    #[test]
    fn test_nan_event_is_error() {
        let (device, client) = setup();

        let y = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);
        let event = EventFn::new(|_c: &CpuClient, _t: f64, _y: &Tensor<CpuRuntime>| Ok(f64::NAN));
        let shape = StateShape::of(&y).unwrap();
        let probe = EventProbe::new(&event, &shape, false);

        let err = probe.sign(&client, 0.0, &y).unwrap_err();
        assert!(matches!(err, IntegrateError::NumericalError { .. }));
    }

    #[test]
    fn test_locate_exp_decay_half_life() {
        let (device, client) = setup();

        let f = |_t: f64, y: &Tensor<CpuRuntime>| -> IntegrateResult<Tensor<CpuRuntime>> {
            Ok(client.mul_scalar(y, -1.0)?)
        };
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);
        let shape = StateShape::of(&y0).unwrap();
        let options = ODEOptions::with_method(ODEMethod::RK45);

        let mut integrator = AdaptiveIntegrator::new(
            &client,
            AdaptiveScheme::RK45(Default::default()),
            f,
            0.0,
            y0.clone(),
            &shape,
            &options,
            &[],
            &[],
        )
        .unwrap();

        let event =
            EventFn::new(|_c: &CpuClient, _t: f64, y: &Tensor<CpuRuntime>| Ok(first(y) - 0.5));
        let probe = EventProbe::new(&event, &shape, false);

        let (t, y) = locate_until_event(&mut integrator, &probe, &options.event).unwrap();
        assert!((t - std::f64::consts::LN_2).abs() < 1e-6);
        assert!((first(&y) - 0.5).abs() < 1e-6);
    }
}
