//! Tensors resident on a [`Device`].

use super::{Device, MemoryLease};
use crate::errors::DeviceResult;
use ndarray::{ArcArray, Array, ArrayView, Dimension, ShapeBuilder};
use std::sync::Arc;

const F32_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// An `f32` array whose storage is charged against a device's memory pool.
///
/// Clones share both the storage and the lease, so handing a tensor to a
/// saved-activation tape does not charge its bytes twice.
#[derive(Debug, Clone)]
pub struct DeviceArray<D: Dimension> {
    data: ArcArray<f32, D>,
    lease: Arc<MemoryLease>,
}

impl<D: Dimension> DeviceArray<D> {
    /// Moves a host array onto `device`.
    pub fn upload(device: &dyn Device, data: Array<f32, D>) -> DeviceResult<Self> {
        let lease = device.allocate(data.len() as u64 * F32_BYTES)?;
        Ok(Self {
            data: data.into_shared(),
            lease: Arc::new(lease),
        })
    }

    /// Allocates a zero-filled array of the given shape on `device`.
    pub fn zeros<Sh>(device: &dyn Device, shape: Sh) -> DeviceResult<Self>
    where
        Sh: ShapeBuilder<Dim = D>,
    {
        Self::upload(device, Array::zeros(shape))
    }

    pub fn view(&self) -> ArrayView<'_, f32, D> {
        self.data.view()
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes this array holds on the device.
    pub fn size_in_bytes(&self) -> u64 {
        self.lease.bytes()
    }

    /// Mean over all elements; the scalar reduction the backward pass differentiates.
    pub fn mean(&self) -> f32 {
        self.data.mean().unwrap_or(0.0)
    }
}
