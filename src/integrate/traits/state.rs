//! States made of one or more tensors.
//!
//! A state is either a single tensor or a fixed-structure group of tensors
//! (a pair, or a `Vec` whose length is fixed by the initial state). The
//! engine concatenates the flattened components into one 1-D tensor and
//! splits it back whenever a state is handed to the caller.

use numr::error::{Error, Result};
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// A state the integrators can carry.
///
/// Components may have different shapes but must share a dtype.
pub trait OdeState<R: Runtime>: Sized {
    /// Component tensors in a fixed order.
    fn components(&self) -> Vec<&Tensor<R>>;

    /// Rebuild a state from components given in the order of
    /// [`components`](Self::components).
    fn from_components(components: Vec<Tensor<R>>) -> Result<Self>;
}

impl<R: Runtime> OdeState<R> for Tensor<R> {
    fn components(&self) -> Vec<&Tensor<R>> {
        vec![self]
    }

    fn from_components(components: Vec<Tensor<R>>) -> Result<Self> {
        let count = components.len();
        let mut iter = components.into_iter();
        match (iter.next(), iter.next()) {
            (Some(y), None) => Ok(y),
            _ => Err(Error::InvalidArgument {
                arg: "components",
                reason: format!("expected 1 tensor, got {}", count),
            }),
        }
    }
}

impl<R: Runtime> OdeState<R> for (Tensor<R>, Tensor<R>) {
    fn components(&self) -> Vec<&Tensor<R>> {
        vec![&self.0, &self.1]
    }

    fn from_components(components: Vec<Tensor<R>>) -> Result<Self> {
        let count = components.len();
        let mut iter = components.into_iter();
        match (iter.next(), iter.next(), iter.next()) {
            (Some(a), Some(b), None) => Ok((a, b)),
            _ => Err(Error::InvalidArgument {
                arg: "components",
                reason: format!("expected 2 tensors, got {}", count),
            }),
        }
    }
}

impl<R: Runtime> OdeState<R> for Vec<Tensor<R>> {
    fn components(&self) -> Vec<&Tensor<R>> {
        self.iter().collect()
    }

    fn from_components(components: Vec<Tensor<R>>) -> Result<Self> {
        Ok(components)
    }
}
