//! CPU implementation of integration algorithms.
//!
//! This module implements the [`IntegrationAlgorithms`] trait for CPU
//! by delegating to the generic implementations in `impl_generic/`.

use crate::integrate::error::IntegrateResult;
use crate::integrate::impl_generic::{
    DenseOutput, EventSolution, ODESolution, odeint_dense_impl, odeint_event_impl, odeint_impl,
};
use crate::integrate::{EventFunction, IntegrationAlgorithms, ODEOptions, OdeState};
use numr::error::Result;
use numr::runtime::cpu::{CpuClient, CpuRuntime};

impl IntegrationAlgorithms<CpuRuntime> for CpuClient {
    fn odeint<Y, F>(
        &self,
        f: F,
        y0: &Y,
        t: &[f64],
        options: &ODEOptions,
    ) -> IntegrateResult<ODESolution<CpuRuntime, Y>>
    where
        Y: OdeState<CpuRuntime>,
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
    ) -> IntegrateResult<DenseOutput<CpuRuntime, Y>>
    where
        Y: OdeState<CpuRuntime>,
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
    ) -> IntegrateResult<EventSolution<CpuRuntime, Y>>
    where
        Y: OdeState<CpuRuntime>,
        F: Fn(f64, &Y) -> Result<Y>,
        E: EventFunction<CpuRuntime, Self, Y> + ?Sized,
    {
        odeint_event_impl(self, f, y0, t0, event_fn, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;
    use crate::integrate::{
        ErrorNorm, EventAtStartPolicy, EventFn, EventOptions, IntegrateError, ODEMethod,
    };
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use numr::ops::ScalarOps;
    use numr::runtime::cpu::CpuDevice;
    use numr::tensor::Tensor;

    fn setup() -> (CpuDevice, CpuClient) {
        let device = CpuDevice::new();
        let client = CpuClient::new(device.clone());
        (device, client)
    }

    fn values(t: &Tensor<CpuRuntime>) -> Vec<f64> {
        t.to_vec()
    }

    #[test]
    fn test_exp_decay_tolerance_sweep() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);
        let times = [0.0, 0.5, 1.0, 2.0, 5.0];

        let sweeps = [
            (ODEMethod::RK45, &[1e-4, 1e-6, 1e-8][..]),
            (ODEMethod::RK23, &[1e-4, 1e-6, 1e-8][..]),
            (ODEMethod::Heun12, &[1e-4, 1e-6][..]),
        ];
        for (method, rtols) in sweeps {
            for &rtol in rtols {
                let options = ODEOptions::with_method(method)
                    .tolerances(rtol, rtol * 1e-2)
                    .max_steps(100_000);
                let sol = client
                    .odeint(|_t, y| client.mul_scalar(y, -1.0), &y0, &times, &options)
                    .unwrap();

                assert_eq!(sol.y.shape(), &[5, 1]);
                let y = values(&sol.y);
                assert_eq!(y[0], 1.0);
                for (ti, yi) in times.iter().zip(&y) {
                    let err = (yi - (-ti).exp()).abs();
                    assert!(
                        err < 100.0 * rtol,
                        "{} rtol {}: error {} at t = {}",
                        method.name(),
                        rtol,
                        err,
                        ti
                    );
                }
            }
        }
    }

    #[test]
    fn test_harmonic_oscillator_direction_symmetry() {
        let (device, client) = setup();

        // x' = v, v' = -x
        let f = |_t: f64, y: &Tensor<CpuRuntime>| -> Result<Tensor<CpuRuntime>> {
            let d: Vec<f64> = y.to_vec();
            Ok(Tensor::<CpuRuntime>::from_slice(&[d[1], -d[0]], &[2], &device))
        };
        let options = ODEOptions::with_tolerances(1e-10, 1e-12);

        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0, 0.0], &[2], &device);
        let forward = client.odeint(f, &y0, &[0.0, 1.0, 2.0], &options).unwrap();
        let fwd = values(&forward.y);
        assert!((fwd[4] - 2.0f64.cos()).abs() < 1e-7);
        assert!((fwd[5] + 2.0f64.sin()).abs() < 1e-7);

        let y2 = Tensor::<CpuRuntime>::from_slice(&fwd[4..6], &[2], &device);
        let backward = client.odeint(f, &y2, &[2.0, 1.0, 0.0], &options).unwrap();
        let bwd = values(&backward.y);

        // Rows at t = 1 agree and t = 0 returns to the initial state
        assert!((bwd[2] - fwd[2]).abs() < 1e-7);
        assert!((bwd[3] - fwd[3]).abs() < 1e-7);
        assert!((bwd[4] - 1.0).abs() < 1e-7);
        assert!(bwd[5].abs() < 1e-7);

        let t: Vec<f64> = backward.t.to_vec();
        assert_eq!(t, vec![2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_dense_matches_odeint() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0, 2.0], &[2], &device);
        let options = ODEOptions::with_tolerances(1e-8, 1e-10);
        let times = [0.0, 0.3, 1.1, 2.0];

        let sol = client
            .odeint(|_t, y| client.mul_scalar(y, -0.5), &y0, &times, &options)
            .unwrap();
        let dense = client
            .odeint_dense(|_t, y| client.mul_scalar(y, -0.5), &y0, 0.0, 2.0, &options)
            .unwrap();

        let from_dense = values(&dense.evaluate_many(&client, &times).unwrap());
        let from_odeint = values(&sol.y);
        assert_eq!(from_dense.len(), from_odeint.len());
        for (a, b) in from_dense.iter().zip(&from_odeint) {
            assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
        }

        // Endpoints are reproduced exactly
        let start = values(&dense.evaluate(&client, 0.0).unwrap());
        assert_eq!(start, vec![1.0, 2.0]);
        assert_eq!(dense.t_span(), (0.0, 2.0));
        assert_eq!(*dense.breakpoints().last().unwrap(), 2.0);
    }

    #[test]
    fn test_dense_breakpoints_strictly_increasing() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);

        for (t0, t1) in [(0.0, 3.0), (3.0, 0.0)] {
            let dense = client
                .odeint_dense(
                    |t, y| client.mul_scalar(y, t.cos()),
                    &y0,
                    t0,
                    t1,
                    &ODEOptions::with_tolerances(1e-6, 1e-9),
                )
                .unwrap();
            let bp = dense.breakpoints();
            assert_eq!(bp.len(), dense.n_steps() + 1);
            assert!(bp.windows(2).all(|w| w[1] > w[0]));
            assert!(dense.naccept >= dense.n_steps());
            assert!(dense.nfev > 0);
        }
    }

    #[test]
    fn test_dense_backward() {
        let (device, client) = setup();

        // y(1) = 1 for y' = -y gives y(0) = e
        let y1 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);
        let dense = client
            .odeint_dense(
                |_t, y| client.mul_scalar(y, -1.0),
                &y1,
                1.0,
                0.0,
                &ODEOptions::with_tolerances(1e-9, 1e-12),
            )
            .unwrap();

        let y0 = values(&dense.evaluate(&client, 0.0).unwrap());
        assert!((y0[0] - std::f64::consts::E).abs() < 1e-7);
        let y_half = values(&dense.evaluate(&client, 0.5).unwrap());
        assert!((y_half[0] - 0.5f64.exp()).abs() < 1e-7);
    }

    #[test]
    fn test_dense_out_of_range() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);
        let dense = client
            .odeint_dense(
                |_t, y| client.mul_scalar(y, -1.0),
                &y0,
                0.0,
                2.0,
                &ODEOptions::default(),
            )
            .unwrap();

        let err = dense.evaluate(&client, 2.5).unwrap_err();
        assert!(matches!(err, IntegrateError::OutOfInterpolationRange { .. }));
        let err = dense.evaluate(&client, -0.1).unwrap_err();
        assert!(matches!(err, IntegrateError::OutOfInterpolationRange { .. }));
    }

    #[test]
    fn test_event_half_life() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);
        let event = EventFn::new(|_c: &CpuClient, _t: f64, y: &Tensor<CpuRuntime>| {
            let d: Vec<f64> = y.to_vec();
            Ok(d[0] - 0.5)
        });

        let sol = client
            .odeint_event(
                |_t, y| client.mul_scalar(y, -1.0),
                &y0,
                0.0,
                &event,
                &ODEOptions::with_tolerances(1e-9, 1e-12),
            )
            .unwrap();

        assert!((sol.event_time - std::f64::consts::LN_2).abs() < 1e-7);
        assert_eq!(sol.y.shape(), &[2, 1]);
        let y = values(&sol.y);
        assert_eq!(y[0], 1.0);
        assert!((y[1] - 0.5).abs() < 1e-7);
        assert_eq!(sol.method, ODEMethod::RK45);
    }

    #[test]
    fn test_event_backward() {
        let (device, client) = setup();

        // From y(0) = 0.5 backward, y reaches 1 at t = -ln 2
        let y0 = Tensor::<CpuRuntime>::from_slice(&[0.5], &[1], &device);
        let event = EventFn::new(|_c: &CpuClient, _t: f64, y: &Tensor<CpuRuntime>| {
            let d: Vec<f64> = y.to_vec();
            Ok(d[0] - 1.0)
        });
        let options = ODEOptions::with_tolerances(1e-9, 1e-12).event(EventOptions {
            reverse: true,
            ..Default::default()
        });

        let sol = client
            .odeint_event(|_t, y| client.mul_scalar(y, -1.0), &y0, 0.0, &event, &options)
            .unwrap();

        assert!((sol.event_time + std::f64::consts::LN_2).abs() < 1e-7);
        let y = values(&sol.y);
        assert!((y[1] - 1.0).abs() < 1e-7);
    }

    #[test]
    fn test_event_time_dependent() {
        let (device, client) = setup();

        // y' = 1 from y(0) = 0; a purely time-dependent event fires at t = 0.75
        let y0 = Tensor::<CpuRuntime>::from_slice(&[0.0], &[1], &device);
        let rhs = |_t: f64, y: &Tensor<CpuRuntime>| -> Result<Tensor<CpuRuntime>> {
            let zero = client.mul_scalar(y, 0.0)?;
            client.add_scalar(&zero, 1.0)
        };
        let event = EventFn::new(|_c: &CpuClient, t: f64, _y: &Tensor<CpuRuntime>| Ok(t - 0.75));

        let sol = client
            .odeint_event(rhs, &y0, 0.0, &event, &ODEOptions::default())
            .unwrap();
        assert!((sol.event_time - 0.75).abs() < 1e-8);
        assert!((values(&sol.y)[1] - 0.75).abs() < 1e-8);
    }

    #[test]
    fn test_event_at_start_policies() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);
        let event = EventFn::new(|_c: &CpuClient, _t: f64, y: &Tensor<CpuRuntime>| {
            let d: Vec<f64> = y.to_vec();
            Ok(d[0] - 1.0)
        });

        let err = client
            .odeint_event(
                |_t, y| client.mul_scalar(y, -1.0),
                &y0,
                0.5,
                &event,
                &ODEOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, IntegrateError::EventAtStart { t } if t == 0.5));

        let accept = ODEOptions::default().event(EventOptions {
            at_start: EventAtStartPolicy::Accept,
            ..Default::default()
        });
        let sol = client
            .odeint_event(|_t, y| client.mul_scalar(y, -1.0), &y0, 0.5, &event, &accept)
            .unwrap();
        assert_eq!(sol.event_time, 0.5);
        assert_eq!(values(&sol.y), vec![1.0, 1.0]);
        assert_eq!(sol.naccept, 0);
    }

    #[test]
    fn test_large_first_step_is_rejected_and_converges() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);
        let options = ODEOptions::with_tolerances(1e-6, 1e-9).initial_step(1.0);
        let times = [0.0, 0.05, 0.1, 0.5];

        let sol = client
            .odeint(|_t, y| client.mul_scalar(y, -50.0), &y0, &times, &options)
            .unwrap();

        assert!(sol.nreject >= 1);
        let y = values(&sol.y);
        for (ti, yi) in times.iter().zip(&y) {
            let exact = (-50.0 * ti).exp();
            assert!((yi - exact).abs() < 1e-4 * exact.max(1e-3), "t = {}: {} vs {}", ti, yi, exact);
        }
    }

    #[test]
    fn test_jump_point_discontinuity() {
        let (device, client) = setup();

        // y' = 0 up to t = 1 and 1 after, so y(2) = 1
        let rhs = |t: f64, y: &Tensor<CpuRuntime>| -> Result<Tensor<CpuRuntime>> {
            let zero = client.mul_scalar(y, 0.0)?;
            client.add_scalar(&zero, if t <= 1.0 { 0.0 } else { 1.0 })
        };
        let y0 = Tensor::<CpuRuntime>::from_slice(&[0.0], &[1], &device);
        let options = ODEOptions {
            jump_points: vec![1.0],
            ..Default::default()
        };

        let sol = client.odeint(rhs, &y0, &[0.0, 1.0, 2.0], &options).unwrap();
        let y = values(&sol.y);
        assert!(y[1].abs() < 1e-12);
        assert!((y[2] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_f32_state_keeps_dtype() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0f32, 0.5], &[2], &device);

        let sol = client
            .odeint(
                |_t, y| client.mul_scalar(y, -1.0),
                &y0,
                &[0.0, 1.0],
                &ODEOptions::with_tolerances(1e-5, 1e-7),
            )
            .unwrap();

        assert_eq!(sol.y.dtype(), DType::F32);
        assert_eq!(sol.t.dtype(), DType::F32);
        let y: Vec<f32> = sol.y.to_vec();
        let e = (-1.0f32).exp();
        assert!((y[2] - e).abs() < 1e-4);
        assert!((y[3] - 0.5 * e).abs() < 1e-4);
    }

    #[test]
    fn test_matrix_state_shape_preserved() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0, 2.0, 3.0, 4.0], &[2, 2], &device);

        let sol = client
            .odeint(
                |_t, y| {
                    assert_eq!(y.shape(), &[2, 2]);
                    client.mul_scalar(y, -1.0)
                },
                &y0,
                &[0.0, 0.5, 1.0],
                &ODEOptions::default(),
            )
            .unwrap();
        assert_eq!(sol.y.shape(), &[3, 2, 2]);
        assert_eq!(sol.len(), 3);

        let last = sol.y_final_vec().unwrap();
        for (yi, y0i) in last.iter().zip([1.0, 2.0, 3.0, 4.0]) {
            assert!((yi - y0i * (-1.0f64).exp()).abs() < 1e-6);
        }

        let dense = client
            .odeint_dense(|_t, y| client.mul_scalar(y, -1.0), &y0, 0.0, 1.0, &ODEOptions::default())
            .unwrap();
        assert_eq!(dense.evaluate(&client, 0.25).unwrap().shape(), &[2, 2]);
        assert_eq!(
            dense.evaluate_many(&client, &[0.25, 0.75]).unwrap().shape(),
            &[2, 2, 2]
        );
    }

    #[test]
    fn test_tolerance_broadcast_along_trailing_axis() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], &device);
        let options = ODEOptions::with_tolerances(1e-6, vec![1e-9, 1e-8, 1e-7]);

        let sol = client
            .odeint(|_t, y| client.mul_scalar(y, -1.0), &y0, &[0.0, 1.0], &options)
            .unwrap();
        assert_eq!(sol.y.shape(), &[2, 2, 3]);

        let last = sol.y_final_vec().unwrap();
        for (yi, y0i) in last.iter().zip([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]) {
            assert!((yi - y0i * (-1.0f64).exp()).abs() < 1e-4);
        }

        // Two values do not broadcast against a trailing axis of 3
        let options = ODEOptions::with_tolerances(1e-6, vec![1e-9, 1e-8]);
        let err = client
            .odeint(|_t, y| client.mul_scalar(y, -1.0), &y0, &[0.0, 1.0], &options)
            .unwrap_err();
        assert!(matches!(err, IntegrateError::InvalidInput { .. }));
    }

    #[test]
    fn test_pair_state_oscillator() {
        let (device, client) = setup();

        // x' = v, v' = -x with position and velocity as separate tensors
        type Pair = (Tensor<CpuRuntime>, Tensor<CpuRuntime>);
        let f = |_t: f64, y: &Pair| -> Result<Pair> {
            let (x, v) = y;
            Ok((v.clone(), client.mul_scalar(x, -1.0)?))
        };
        let y0: Pair = (
            Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device),
            Tensor::<CpuRuntime>::from_slice(&[0.0], &[1], &device),
        );
        let options = ODEOptions::with_tolerances(1e-10, 1e-12);

        let sol = client.odeint(f, &y0, &[0.0, 1.0, 2.0], &options).unwrap();
        let (x, v) = &sol.y;
        assert_eq!(x.shape(), &[3, 1]);
        assert_eq!(v.shape(), &[3, 1]);
        let (x, v) = (values(x), values(v));
        assert_eq!((x[0], v[0]), (1.0, 0.0));
        assert!((x[2] - 2.0f64.cos()).abs() < 1e-7);
        assert!((v[2] + 2.0f64.sin()).abs() < 1e-7);

        let final_state = sol.y_final_vec().unwrap();
        assert_eq!(final_state.len(), 2);
        assert!((final_state[0] - 2.0f64.cos()).abs() < 1e-7);

        let dense = client.odeint_dense(f, &y0, 0.0, 2.0, &options).unwrap();
        let (x, v) = dense.evaluate(&client, 0.5).unwrap();
        assert!((values(&x)[0] - 0.5f64.cos()).abs() < 1e-7);
        assert!((values(&v)[0] + 0.5f64.sin()).abs() < 1e-7);
        let (xs, _vs) = dense.evaluate_many(&client, &[0.5, 1.5]).unwrap();
        assert_eq!(xs.shape(), &[2, 1]);

        // x first reaches zero at pi/2
        let event = EventFn::new(|_c: &CpuClient, _t: f64, y: &Pair| {
            let x: Vec<f64> = y.0.to_vec();
            Ok(x[0])
        });
        let hit = client.odeint_event(f, &y0, 0.0, &event, &options).unwrap();
        assert!((hit.event_time - std::f64::consts::FRAC_PI_2).abs() < 1e-7);
        let (x, v) = &hit.y;
        assert_eq!(x.shape(), &[2, 1]);
        assert!(values(x)[1].abs() < 1e-7);
        assert!((values(v)[1] + 1.0).abs() < 1e-7);
    }

    #[test]
    fn test_vec_state_with_mixed_component_shapes() {
        let (device, client) = setup();
        let y0 = vec![
            Tensor::<CpuRuntime>::from_slice(&[1.0, 2.0], &[2], &device),
            Tensor::<CpuRuntime>::from_slice(&[1.0, 1.0, 1.0, 1.0], &[2, 2], &device),
        ];

        // First component decays at rate 1, second at rate 2
        let sol = client
            .odeint(
                |_t, y: &Vec<Tensor<CpuRuntime>>| {
                    assert_eq!(y[1].shape(), &[2, 2]);
                    Ok(vec![client.mul_scalar(&y[0], -1.0)?, client.mul_scalar(&y[1], -2.0)?])
                },
                &y0,
                &[0.0, 0.5, 1.0],
                &ODEOptions::default(),
            )
            .unwrap();
        assert_eq!(sol.y.len(), 2);
        assert_eq!(sol.y[0].shape(), &[3, 2]);
        assert_eq!(sol.y[1].shape(), &[3, 2, 2]);

        let last = sol.y_final_vec().unwrap();
        assert_eq!(last.len(), 6);
        assert!((last[1] - 2.0 * (-1.0f64).exp()).abs() < 1e-6);
        assert!((last[5] - (-2.0f64).exp()).abs() < 1e-6);

        // A derivative with the wrong number of components is rejected
        let err = client
            .odeint(
                |_t, y: &Vec<Tensor<CpuRuntime>>| Ok(vec![client.mul_scalar(&y[0], -1.0)?]),
                &y0,
                &[0.0, 1.0],
                &ODEOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, IntegrateError::InvalidInput { .. }));
    }

    #[test]
    fn test_finite_time_blowup_step_size_too_small() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);

        // y' = y^2, y(0) = 1 blows up at t = 1
        let f = |_t: f64, y: &Tensor<CpuRuntime>| -> Result<Tensor<CpuRuntime>> {
            let d: Vec<f64> = y.to_vec();
            Ok(Tensor::<CpuRuntime>::from_slice(&[d[0] * d[0]], &[1], &device))
        };

        let err = client
            .odeint(f, &y0, &[0.0, 2.0], &ODEOptions::default())
            .unwrap_err();
        match err {
            IntegrateError::StepSizeTooSmall { step, t, .. } => {
                assert!((t - 1.0).abs() < 1e-3, "stalled at t = {}", t);
                assert!(step < 1e-10);
            }
            other => panic!("expected StepSizeTooSmall, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_norm_reaches_controller() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);
        let times = [0.0, 5.0];

        let baseline = client
            .odeint(|_t, y| client.mul_scalar(y, -1.0), &y0, &times, &ODEOptions::default())
            .unwrap();

        // Ten times the RMS norm: a tighter effective tolerance
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let norm = ErrorNorm::Custom(Arc::new(move |v: &[f64]| {
            counter.fetch_add(1, Ordering::Relaxed);
            10.0 * ErrorNorm::Rms.apply(v)
        }));
        let options = ODEOptions::default().norm(norm);
        let strict = client
            .odeint(|_t, y| client.mul_scalar(y, -1.0), &y0, &times, &options)
            .unwrap();

        assert!(calls.load(Ordering::Relaxed) >= strict.naccept + strict.nreject);
        assert!(strict.naccept > baseline.naccept);
    }

    #[test]
    fn test_fixed_grid_rk4() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);
        let options = ODEOptions::with_method(ODEMethod::RK4).step_size(0.05);

        let sol = client
            .odeint(|_t, y| client.mul_scalar(y, -1.0), &y0, &[0.0, 0.33, 1.0], &options)
            .unwrap();
        let y = values(&sol.y);
        assert!((y[2] - (-1.0f64).exp()).abs() < 1e-6);
        // Linear interpolation between grid nodes
        assert!((y[1] - (-0.33f64).exp()).abs() < 1e-3);
        assert_eq!(sol.nreject, 0);
        assert_eq!(sol.naccept, 20);
    }

    #[test]
    fn test_fixed_grid_rejects_dense_and_event() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);
        let options = ODEOptions::with_method(ODEMethod::Euler);

        let err = client
            .odeint_dense(|_t, y| client.mul_scalar(y, -1.0), &y0, 0.0, 1.0, &options)
            .unwrap_err();
        assert!(matches!(err, IntegrateError::UnsupportedConfiguration { .. }));

        let event = EventFn::new(|_c: &CpuClient, _t: f64, y: &Tensor<CpuRuntime>| {
            let d: Vec<f64> = y.to_vec();
            Ok(d[0] - 0.5)
        });
        let err = client
            .odeint_event(|_t, y| client.mul_scalar(y, -1.0), &y0, 0.0, &event, &options)
            .unwrap_err();
        assert!(matches!(err, IntegrateError::UnsupportedConfiguration { .. }));
    }

    #[test]
    fn test_invalid_configuration() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);

        let err = ODEOptions::from_pairs(ODEMethod::RK45, [("bogus", 1.0)]).unwrap_err();
        assert!(matches!(err, IntegrateError::UnsupportedConfiguration { .. }));

        let options = ODEOptions::with_method(ODEMethod::RK23).step_size(0.1);
        let err = client
            .odeint(|_t, y| client.mul_scalar(y, -1.0), &y0, &[0.0, 1.0], &options)
            .unwrap_err();
        assert!(matches!(err, IntegrateError::UnsupportedConfiguration { .. }));

        // Per-element tolerance must broadcast to the state
        let options = ODEOptions::with_tolerances(vec![1e-6, 1e-6, 1e-6], 1e-9);
        let err = client
            .odeint(|_t, y| client.mul_scalar(y, -1.0), &y0, &[0.0, 1.0], &options)
            .unwrap_err();
        assert!(matches!(err, IntegrateError::InvalidInput { .. }));
    }

    #[test]
    fn test_invalid_time_sequences() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);
        let options = ODEOptions::default();

        for times in [&[0.0, 1.0, 0.5][..], &[0.0, 0.0][..], &[][..]] {
            let err = client
                .odeint(|_t, y| client.mul_scalar(y, -1.0), &y0, times, &options)
                .unwrap_err();
            assert!(matches!(err, IntegrateError::InvalidTimeSequence { .. }));
        }

        let err = client
            .odeint_dense(|_t, y| client.mul_scalar(y, -1.0), &y0, 1.0, 1.0, &options)
            .unwrap_err();
        assert!(matches!(err, IntegrateError::InvalidTimeSequence { .. }));
    }

    #[test]
    fn test_max_steps_exceeded() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[1.0], &[1], &device);
        let options = ODEOptions::with_tolerances(1e-10, 1e-12).max_steps(5);

        let err = client
            .odeint(|_t, y| client.mul_scalar(y, -1.0), &y0, &[0.0, 100.0], &options)
            .unwrap_err();
        assert!(matches!(err, IntegrateError::MaxStepsExceeded { .. }));
    }

    #[test]
    fn test_single_time_returns_initial_state() {
        let (device, client) = setup();
        let y0 = Tensor::<CpuRuntime>::from_slice(&[3.0, 4.0], &[2], &device);

        let sol = client
            .odeint(|_t, y| client.mul_scalar(y, -1.0), &y0, &[1.5], &ODEOptions::default())
            .unwrap();
        assert_eq!(sol.y.shape(), &[1, 2]);
        assert_eq!(values(&sol.y), vec![3.0, 4.0]);
        assert_eq!(sol.naccept, 0);
    }
}
