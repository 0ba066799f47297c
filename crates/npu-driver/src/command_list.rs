// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Command list wrapper.

use crate::types::{Command, CommandListHandle, DeviceAddress, EventHandle, GraphHandle, QueryHandle};
use crate::{Driver, DriverResult};
use std::sync::Arc;

/// An owned command list.
///
/// Commands are recorded in append order and run in that order once the
/// list is closed and submitted to a [`crate::CommandQueue`].
#[derive(Debug)]
pub struct CommandList {
    driver: Arc<dyn Driver>,
    handle: CommandListHandle,
    mutable: bool,
}

impl CommandList {
    /// Creates a list for queue group `ordinal`. A `mutable` list allows
    /// graph arguments to be rebound after it is closed.
    pub fn new(driver: Arc<dyn Driver>, ordinal: u32, mutable: bool) -> DriverResult<Self> {
        let handle = driver.create_command_list(ordinal, mutable)?;
        Ok(Self {
            driver,
            handle,
            mutable,
        })
    }

    pub fn handle(&self) -> CommandListHandle {
        self.handle
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn append_barrier(&self) -> DriverResult<()> {
        self.driver.append_command(self.handle, Command::Barrier)
    }

    /// Appends a device timestamp write to `address`.
    pub fn append_timestamp(&self, address: DeviceAddress) -> DriverResult<()> {
        self.driver
            .append_command(self.handle, Command::WriteTimestamp { address })
    }

    /// Appends an execution of `graph` with its current argument bindings.
    pub fn append_graph_execute(
        &self,
        graph: GraphHandle,
        query: Option<QueryHandle>,
    ) -> DriverResult<()> {
        self.driver
            .append_command(self.handle, Command::GraphExecute { graph, query })
    }

    pub fn append_signal_event(&self, event: EventHandle) -> DriverResult<()> {
        self.driver
            .append_command(self.handle, Command::SignalEvent(event))
    }

    pub fn append_wait_on_event(&self, event: EventHandle) -> DriverResult<()> {
        self.driver
            .append_command(self.handle, Command::WaitOnEvent(event))
    }

    /// Rebinds argument `index` of the recorded graph executions.
    pub fn update_mutable_argument(&self, index: u32, address: DeviceAddress) -> DriverResult<()> {
        self.driver
            .update_mutable_argument(self.handle, index, address)
    }

    /// Seals the list for submission.
    pub fn close(&self) -> DriverResult<()> {
        self.driver.close_command_list(self.handle)
    }
}

impl Drop for CommandList {
    fn drop(&mut self) {
        if let Err(e) = self.driver.destroy_command_list(self.handle) {
            tracing::warn!("Failed to destroy command list {}: {e}", self.handle);
        }
    }
}
