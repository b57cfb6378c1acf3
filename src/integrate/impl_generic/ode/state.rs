//! State plumbing shared by every scheme: shape flattening, dtype checks,
//! host transfers and the derivative wrapper.

use std::cell::Cell;
use std::marker::PhantomData;

use crate::DType;
use numr::error::{Error, Result};
use numr::ops::{ScalarOps, TensorOps};
use numr::runtime::{Runtime, RuntimeClient};
use numr::tensor::Tensor;

use crate::integrate::error::{IntegrateError, IntegrateResult};
use crate::integrate::traits::OdeState;

/// Component shapes of the caller's state.
///
/// Schemes work on a single flattened 1-D state: the components are
/// flattened and concatenated in order. The structure is restored whenever
/// a state leaves the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateShape {
    components: Vec<Vec<usize>>,
    sizes: Vec<usize>,
    numel: usize,
}

impl StateShape {
    /// Record the component shapes of `y0`, rejecting empty states and
    /// components of mixed dtype.
    pub fn of<R, Y>(y0: &Y) -> IntegrateResult<Self>
    where
        R: Runtime<DType = DType>,
        Y: OdeState<R>,
    {
        let parts = y0.components();
        let Some(first) = parts.first() else {
            return Err(IntegrateError::InvalidInput {
                context: "initial state has no components".to_string(),
            });
        };
        let dtype = first.dtype();

        let mut components = Vec::with_capacity(parts.len());
        let mut sizes = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let shape = part.shape().to_vec();
            let size = shape.iter().product::<usize>();
            if size == 0 {
                return Err(IntegrateError::InvalidInput {
                    context: format!("state component {} has no elements (shape {:?})", i, shape),
                });
            }
            if part.dtype() != dtype {
                return Err(IntegrateError::InvalidInput {
                    context: format!(
                        "state component {} has dtype {:?}, component 0 has {:?}",
                        i,
                        part.dtype(),
                        dtype
                    ),
                });
            }
            components.push(shape);
            sizes.push(size);
        }
        let numel = sizes.iter().sum();
        Ok(Self {
            components,
            sizes,
            numel,
        })
    }

    /// Shape of each component, in order.
    pub fn component_dims(&self) -> &[Vec<usize>] {
        &self.components
    }

    /// Total number of elements across components.
    pub fn numel(&self) -> usize {
        self.numel
    }

    /// Flatten and concatenate the components of `y`.
    pub fn flatten<R, C, Y>(&self, client: &C, y: &Y) -> IntegrateResult<Tensor<R>>
    where
        R: Runtime<DType = DType>,
        C: TensorOps<R>,
        Y: OdeState<R>,
    {
        let parts = y.components();
        if parts.len() != self.components.len() {
            return Err(IntegrateError::InvalidInput {
                context: format!(
                    "state has {} components, expected {}",
                    parts.len(),
                    self.components.len()
                ),
            });
        }

        let mut flat = Vec::with_capacity(parts.len());
        for ((part, &size), shape) in parts.iter().zip(&self.sizes).zip(&self.components) {
            if part.numel() != size {
                return Err(IntegrateError::InvalidInput {
                    context: format!(
                        "state component has {} elements, expected {} (shape {:?})",
                        part.numel(),
                        size,
                        shape
                    ),
                });
            }
            flat.push(part.contiguous().reshape(&[size])?);
        }

        if flat.len() == 1 {
            return Ok(flat.swap_remove(0));
        }
        let refs: Vec<&Tensor<R>> = flat.iter().collect();
        Ok(client.cat(&refs, 0)?)
    }

    /// Restore a flat state to the caller's structure.
    pub fn restore<R, Y>(&self, y: &Tensor<R>) -> IntegrateResult<Y>
    where
        R: Runtime<DType = DType>,
        Y: OdeState<R>,
    {
        self.split(y, &[])
    }

    /// Restore a stack of flat states `[rows, numel]`; every component gets
    /// shape `[rows, *component_shape]`.
    pub fn restore_rows<R, Y>(&self, rows: &Tensor<R>) -> IntegrateResult<Y>
    where
        R: Runtime<DType = DType>,
        Y: OdeState<R>,
    {
        let n_rows = rows.shape().first().copied().unwrap_or(0);
        self.split(rows, &[n_rows])
    }

    fn split<R, Y>(&self, y: &Tensor<R>, leading: &[usize]) -> IntegrateResult<Y>
    where
        R: Runtime<DType = DType>,
        Y: OdeState<R>,
    {
        let y = y.contiguous();
        let mut parts = Vec::with_capacity(self.components.len());
        let mut offset = 0;
        for (shape, &size) in self.components.iter().zip(&self.sizes) {
            let part = if self.components.len() == 1 {
                y.clone()
            } else {
                y.narrow(-1, offset, size)?.contiguous()
            };
            let target: Vec<usize> = leading.iter().chain(shape).copied().collect();
            parts.push(part.reshape(&target)?);
            offset += size;
        }
        Ok(Y::from_components(parts)?)
    }
}

/// Validate that a state dtype is supported (F32 or F64).
pub fn validate_ode_dtype(dtype: DType) -> IntegrateResult<()> {
    match dtype {
        DType::F32 | DType::F64 => Ok(()),
        _ => Err(IntegrateError::InvalidInput {
            context: format!("unsupported state dtype {:?}, expected F32 or F64", dtype),
        }),
    }
}

/// Machine epsilon of a floating dtype.
pub fn dtype_eps(dtype: DType) -> f64 {
    match dtype {
        DType::F32 => f32::EPSILON as f64,
        _ => f64::EPSILON,
    }
}

/// Smallest step the controller will attempt at time `t`.
pub fn step_floor(t: f64, dtype: DType) -> f64 {
    4.0 * dtype_eps(dtype) * t.abs().max(1.0)
}

/// Copy tensor values to the host as `f64`.
pub fn host_values<R: Runtime<DType = DType>>(tensor: &Tensor<R>) -> Result<Vec<f64>> {
    let contig = tensor.contiguous();
    match contig.dtype() {
        DType::F32 => {
            let data: Vec<f32> = contig.to_vec();
            Ok(data.into_iter().map(f64::from).collect())
        }
        DType::F64 => Ok(contig.to_vec()),
        dtype => Err(Error::UnsupportedDType {
            dtype,
            op: "host_values",
        }),
    }
}

/// Build a tensor of the given dtype from host `f64` values.
pub fn tensor_from_f64<R, C>(
    client: &C,
    values: &[f64],
    shape: &[usize],
    dtype: DType,
) -> Result<Tensor<R>>
where
    R: Runtime<DType = DType>,
    C: RuntimeClient<R>,
{
    match dtype {
        DType::F32 => {
            let data: Vec<f32> = values.iter().map(|&v| v as f32).collect();
            Ok(Tensor::<R>::from_slice(&data, shape, client.device()))
        }
        DType::F64 => Ok(Tensor::<R>::from_slice(values, shape, client.device())),
        _ => Err(Error::UnsupportedDType {
            dtype,
            op: "tensor_from_f64",
        }),
    }
}

/// Compute `sum(weights[i] * terms[i])`, skipping zero weights.
pub fn linear_combination<R, C>(client: &C, terms: &[(&Tensor<R>, f64)]) -> Result<Tensor<R>>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R>,
{
    let mut nonzero = terms.iter().filter(|(_, w)| *w != 0.0);
    let Some((first, w0)) = nonzero.next().or(terms.first()) else {
        return Err(Error::InvalidArgument {
            arg: "terms",
            reason: "linear combination needs at least one term".to_string(),
        });
    };
    let mut result = client.mul_scalar(first, *w0)?;
    for (term, w) in nonzero {
        let scaled = client.mul_scalar(term, *w)?;
        result = client.add(&result, &scaled)?;
    }
    Ok(result)
}

/// Compute `y + h * sum(coeffs[i] * stages[i])`.
pub fn stage_update<R, C>(
    client: &C,
    y: &Tensor<R>,
    stages: &[&Tensor<R>],
    coeffs: &[f64],
    h: f64,
) -> Result<Tensor<R>>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R>,
{
    debug_assert_eq!(stages.len(), coeffs.len());

    let weighted: Vec<(&Tensor<R>, f64)> = stages
        .iter()
        .zip(coeffs)
        .map(|(k, c)| (*k, h * c))
        .collect();
    let increment = linear_combination(client, &weighted)?;
    client.add(y, &increment)
}

/// The caller's derivative function seen through the engine's conventions.
///
/// States arrive flattened and in normalized (increasing) time; the wrapper
/// restores the caller's structure and time direction, checks the returned
/// derivative and counts evaluations. For a reversed solve the derivative is
/// `-f(-t, y)`.
pub struct Rhs<'a, R, C, F, Y>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    F: Fn(f64, &Y) -> Result<Y>,
    Y: OdeState<R>,
{
    client: &'a C,
    f: &'a F,
    shape: &'a StateShape,
    dtype: DType,
    reversed: bool,
    nfev: Cell<usize>,
    _marker: PhantomData<fn(&Y) -> R>,
}

impl<'a, R, C, F, Y> Rhs<'a, R, C, F, Y>
where
    R: Runtime<DType = DType>,
    C: TensorOps<R> + ScalarOps<R> + RuntimeClient<R>,
    F: Fn(f64, &Y) -> Result<Y>,
    Y: OdeState<R>,
{
    pub fn new(client: &'a C, f: &'a F, shape: &'a StateShape, dtype: DType, reversed: bool) -> Self {
        Self {
            client,
            f,
            shape,
            dtype,
            reversed,
            nfev: Cell::new(0),
            _marker: PhantomData,
        }
    }

    /// Evaluate the derivative at normalized time `t` and flat state `y`.
    pub fn eval(&self, t: f64, y: &Tensor<R>) -> IntegrateResult<Tensor<R>> {
        let y_shaped: Y = self.shape.restore(y)?;
        let t_user = if self.reversed { -t } else { t };
        let dy = (self.f)(t_user, &y_shaped)?;
        self.nfev.set(self.nfev.get() + 1);

        if let Some(part) = dy.components().iter().find(|p| p.dtype() != self.dtype) {
            return Err(IntegrateError::InvalidInput {
                context: format!(
                    "derivative dtype {:?} does not match state dtype {:?}",
                    part.dtype(),
                    self.dtype
                ),
            });
        }
        let dy = self.shape.flatten(self.client, &dy)?;
        if self.reversed {
            Ok(self.client.mul_scalar(&dy, -1.0)?)
        } else {
            Ok(dy)
        }
    }

    /// Number of derivative evaluations so far.
    pub fn nfev(&self) -> usize {
        self.nfev.get()
    }
}
