// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Command queue wrapper.

use crate::types::{CommandListHandle, QueueDesc, QueueHandle};
use crate::{CommandList, Driver, DriverResult, Fence};
use npu_common::WorkloadType;
use std::sync::Arc;

/// An owned command queue.
///
/// The queue is destroyed when the last owner drops it. Fences created on
/// the queue hold a reference to it, so the queue always outlives them.
#[derive(Debug)]
pub struct CommandQueue {
    driver: Arc<dyn Driver>,
    handle: QueueHandle,
    desc: QueueDesc,
}

impl CommandQueue {
    pub fn new(driver: Arc<dyn Driver>, desc: QueueDesc) -> DriverResult<Self> {
        let handle = driver.create_command_queue(&desc)?;
        tracing::debug!(
            "Created command queue {handle} (ordinal {}, priority {:?}, turbo {})",
            desc.ordinal,
            desc.priority,
            desc.turbo
        );
        Ok(Self {
            driver,
            handle,
            desc,
        })
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle
    }

    pub fn desc(&self) -> &QueueDesc {
        &self.desc
    }

    pub fn set_workload_type(&self, workload: WorkloadType) -> DriverResult<()> {
        self.driver.set_queue_workload_type(self.handle, workload)
    }

    /// Submits one closed command list, optionally signalling `fence`.
    pub fn execute(&self, list: &CommandList, fence: Option<&Fence>) -> DriverResult<()> {
        self.execute_all(&[list], fence)
    }

    /// Submits several closed command lists in order as one batch.
    pub fn execute_all(&self, lists: &[&CommandList], fence: Option<&Fence>) -> DriverResult<()> {
        let handles: Vec<CommandListHandle> = lists.iter().map(|l| l.handle()).collect();
        self.driver
            .execute_command_lists(self.handle, &handles, fence.map(Fence::handle))
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        if let Err(e) = self.driver.destroy_command_queue(self.handle) {
            tracing::warn!("Failed to destroy command queue {}: {e}", self.handle);
        }
    }
}
