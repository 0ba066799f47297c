// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host/device synchronisation primitives.

use crate::types::{EventHandle, EventPoolHandle, FenceHandle};
use crate::{CommandList, CommandQueue, Driver, DriverResult};
use std::sync::Arc;
use std::time::Duration;

/// A pool of events.
#[derive(Debug)]
pub struct EventPool {
    driver: Arc<dyn Driver>,
    handle: EventPoolHandle,
    count: u32,
}

impl EventPool {
    /// Creates a pool with `count` slots. A count of zero still reserves one
    /// slot.
    pub fn new(driver: Arc<dyn Driver>, count: u32) -> DriverResult<Arc<Self>> {
        let count = count.max(1);
        let handle = driver.create_event_pool(count)?;
        Ok(Arc::new(Self {
            driver,
            handle,
            count,
        }))
    }

    pub fn handle(&self) -> EventPoolHandle {
        self.handle
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl Drop for EventPool {
    fn drop(&mut self) {
        if let Err(e) = self.driver.destroy_event_pool(self.handle) {
            tracing::warn!("Failed to destroy event pool {}: {e}", self.handle);
        }
    }
}

/// An event carved from slot `index` of an [`EventPool`].
///
/// The event keeps its pool alive.
#[derive(Debug)]
pub struct Event {
    pool: Arc<EventPool>,
    handle: EventHandle,
}

impl Event {
    pub fn new(pool: &Arc<EventPool>, index: u32) -> DriverResult<Self> {
        let handle = pool.driver.create_event(pool.handle, index)?;
        Ok(Self {
            pool: Arc::clone(pool),
            handle,
        })
    }

    pub fn handle(&self) -> EventHandle {
        self.handle
    }

    /// Appends a signal of this event to `list`.
    pub fn append_signal(&self, list: &CommandList) -> DriverResult<()> {
        list.append_signal_event(self.handle)
    }

    /// Appends a wait on this event to `list`.
    pub fn append_wait(&self, list: &CommandList) -> DriverResult<()> {
        list.append_wait_on_event(self.handle)
    }

    pub fn host_synchronize(&self, timeout: Duration) -> DriverResult<()> {
        self.pool.driver.event_host_synchronize(self.handle, timeout)
    }

    /// Rearms the event.
    pub fn reset(&self) -> DriverResult<()> {
        self.pool.driver.event_host_reset(self.handle)
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        if let Err(e) = self.pool.driver.destroy_event(self.handle) {
            tracing::warn!("Failed to destroy event {}: {e}", self.handle);
        }
    }
}

/// A fence bound to one command queue.
#[derive(Debug)]
pub struct Fence {
    driver: Arc<dyn Driver>,
    queue: Arc<CommandQueue>,
    handle: FenceHandle,
}

impl Fence {
    pub fn new(driver: Arc<dyn Driver>, queue: &Arc<CommandQueue>) -> DriverResult<Self> {
        let handle = driver.create_fence(queue.handle())?;
        Ok(Self {
            driver,
            queue: Arc::clone(queue),
            handle,
        })
    }

    pub fn handle(&self) -> FenceHandle {
        self.handle
    }

    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    pub fn host_synchronize(&self, timeout: Duration) -> DriverResult<()> {
        self.driver.fence_host_synchronize(self.handle, timeout)
    }

    /// Rearms the fence.
    pub fn reset(&self) -> DriverResult<()> {
        self.driver.fence_reset(self.handle)
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        if let Err(e) = self.driver.destroy_fence(self.handle) {
            tracing::warn!("Failed to destroy fence {}: {e}", self.handle);
        }
    }
}
