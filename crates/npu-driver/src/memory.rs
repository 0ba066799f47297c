// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host-visible device memory.

use crate::types::{DeviceAddress, TensorData};
use crate::{Driver, DriverResult};
use std::sync::Arc;

/// Alignment used for every buffer; matches the device's DMA granularity.
pub const BUFFER_ALIGNMENT: usize = 4096;

/// An owned allocation of host-visible memory that the device can address.
#[derive(Debug)]
pub struct DeviceBuffer {
    driver: Arc<dyn Driver>,
    address: DeviceAddress,
    size: usize,
}

impl DeviceBuffer {
    pub fn new(driver: Arc<dyn Driver>, size: usize) -> DriverResult<Self> {
        let address = driver.alloc_host(size, BUFFER_ALIGNMENT)?;
        tracing::trace!("Allocated {size} bytes at {address}");
        Ok(Self {
            driver,
            address,
            size,
        })
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The binding describing the whole buffer.
    pub fn tensor_data(&self) -> TensorData {
        TensorData::new(self.address, self.size)
    }

    /// Copies `data` to the start of the buffer.
    pub fn write(&self, data: &[u8]) -> DriverResult<()> {
        self.write_at(0, data)
    }

    pub fn write_at(&self, offset: usize, data: &[u8]) -> DriverResult<()> {
        self.check_range(offset, data.len())?;
        self.driver.write_memory(self.address.offset(offset), data)
    }

    pub fn read(&self, out: &mut [u8]) -> DriverResult<()> {
        self.read_at(0, out)
    }

    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> DriverResult<()> {
        self.check_range(offset, out.len())?;
        self.driver.read_memory(self.address.offset(offset), out)
    }

    /// Reads the whole buffer.
    pub fn to_vec(&self) -> DriverResult<Vec<u8>> {
        let mut out = vec![0u8; self.size];
        self.read(&mut out)?;
        Ok(out)
    }

    fn check_range(&self, offset: usize, len: usize) -> DriverResult<()> {
        if offset.checked_add(len).map_or(true, |end| end > self.size) {
            return Err(crate::DriverError::OutOfBounds {
                address: self.address.offset(offset).0,
                len,
            });
        }
        Ok(())
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.driver.free(self.address) {
            tracing::warn!("Failed to free buffer at {}: {e}", self.address);
        }
    }
}
