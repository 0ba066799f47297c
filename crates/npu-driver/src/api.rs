// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`Driver`] trait: every device call the runtime makes.

use crate::types::{
    BackendKind, Command, CommandListHandle, DeviceAddress, EventHandle, EventPoolHandle,
    FenceHandle, GraphHandle, GraphProperties, ProfilingPoolHandle, QueryHandle, QueueDesc,
    QueueGroupFlags, QueueHandle,
};
use crate::DriverResult;
use npu_common::{ArgumentMetadata, WorkloadType};
use std::fmt::Debug;
use std::time::Duration;

/// A device backend.
///
/// Implementations are shared behind `Arc<dyn Driver>` by every graph,
/// queue and pipeline built on top of them, so all methods take `&self`
/// and implementations synchronise internally.
///
/// Handles are plain integers; the RAII wrappers in this crate are the
/// intended way to own them.
pub trait Driver: Send + Sync + Debug {
    // ---- capabilities -------------------------------------------------

    /// Backend family. Graphs can only be loaded on [`BackendKind::LevelZero`].
    fn backend_kind(&self) -> BackendKind;

    /// Graph extension version as `(major, minor)`.
    fn graph_ext_version(&self) -> (u32, u32);

    /// Whether command lists can be patched after they are closed.
    fn supports_mutable_command_lists(&self) -> bool;

    // ---- graph extension ----------------------------------------------

    /// Loads a compiled blob and returns its device handle.
    fn create_graph(&self, blob: &[u8]) -> DriverResult<GraphHandle>;

    fn graph_properties(&self, graph: GraphHandle) -> DriverResult<GraphProperties>;

    /// Properties of argument `index` (declaration order).
    fn argument_properties(&self, graph: GraphHandle, index: u32)
        -> DriverResult<ArgumentMetadata>;

    /// Binds argument `index` to `address`. The binding is captured by the
    /// next graph-execute command appended for this graph.
    fn set_argument_value(
        &self,
        graph: GraphHandle,
        index: u32,
        address: DeviceAddress,
    ) -> DriverResult<()>;

    /// Performs driver-side initialisation of a loaded graph.
    fn initialize_graph(&self, graph: GraphHandle) -> DriverResult<()>;

    fn destroy_graph(&self, graph: GraphHandle) -> DriverResult<()>;

    // ---- command queues -----------------------------------------------

    /// Finds the ordinal of the first queue group offering `flags`.
    fn find_queue_group_ordinal(&self, flags: QueueGroupFlags) -> DriverResult<u32>;

    fn create_command_queue(&self, desc: &QueueDesc) -> DriverResult<QueueHandle>;

    fn set_queue_workload_type(
        &self,
        queue: QueueHandle,
        workload: WorkloadType,
    ) -> DriverResult<()>;

    /// Submits closed command lists in order. Returns without waiting for
    /// the work; `fence` is signalled once all of it has finished.
    fn execute_command_lists(
        &self,
        queue: QueueHandle,
        lists: &[CommandListHandle],
        fence: Option<FenceHandle>,
    ) -> DriverResult<()>;

    fn destroy_command_queue(&self, queue: QueueHandle) -> DriverResult<()>;

    // ---- command lists ------------------------------------------------

    fn create_command_list(&self, ordinal: u32, mutable: bool) -> DriverResult<CommandListHandle>;

    /// Appends a command. Fails on a closed list.
    fn append_command(&self, list: CommandListHandle, command: Command) -> DriverResult<()>;

    /// Rebinds argument `index` of every graph-execute command already in
    /// `list`. Only valid on mutable lists; the list must be closed again
    /// before it is submitted.
    fn update_mutable_argument(
        &self,
        list: CommandListHandle,
        index: u32,
        address: DeviceAddress,
    ) -> DriverResult<()>;

    fn close_command_list(&self, list: CommandListHandle) -> DriverResult<()>;

    fn destroy_command_list(&self, list: CommandListHandle) -> DriverResult<()>;

    // ---- events -------------------------------------------------------

    fn create_event_pool(&self, count: u32) -> DriverResult<EventPoolHandle>;

    fn destroy_event_pool(&self, pool: EventPoolHandle) -> DriverResult<()>;

    fn create_event(&self, pool: EventPoolHandle, index: u32) -> DriverResult<EventHandle>;

    /// Blocks until the event is signalled or `timeout` elapses.
    fn event_host_synchronize(&self, event: EventHandle, timeout: Duration) -> DriverResult<()>;

    fn event_host_reset(&self, event: EventHandle) -> DriverResult<()>;

    fn destroy_event(&self, event: EventHandle) -> DriverResult<()>;

    // ---- fences -------------------------------------------------------

    fn create_fence(&self, queue: QueueHandle) -> DriverResult<FenceHandle>;

    /// Blocks until the fence is signalled or `timeout` elapses.
    fn fence_host_synchronize(&self, fence: FenceHandle, timeout: Duration) -> DriverResult<()>;

    fn fence_reset(&self, fence: FenceHandle) -> DriverResult<()>;

    fn destroy_fence(&self, fence: FenceHandle) -> DriverResult<()>;

    // ---- memory -------------------------------------------------------

    /// Allocates zeroed host-visible memory reachable by the device.
    fn alloc_host(&self, size: usize, alignment: usize) -> DriverResult<DeviceAddress>;

    fn free(&self, address: DeviceAddress) -> DriverResult<()>;

    fn write_memory(&self, address: DeviceAddress, data: &[u8]) -> DriverResult<()>;

    fn read_memory(&self, address: DeviceAddress, out: &mut [u8]) -> DriverResult<()>;

    // ---- profiling ----------------------------------------------------

    /// Creates a pool of `count` profiling queries for `graph`.
    fn create_profiling_pool(&self, graph: GraphHandle, count: u32)
        -> DriverResult<ProfilingPoolHandle>;

    fn create_profiling_query(
        &self,
        pool: ProfilingPoolHandle,
        index: u32,
    ) -> DriverResult<QueryHandle>;

    /// Raw profiling bytes recorded by the last graph execution bound to
    /// `query`.
    fn profiling_query_data(&self, query: QueryHandle) -> DriverResult<Vec<u8>>;

    fn destroy_profiling_query(&self, query: QueryHandle) -> DriverResult<()>;

    fn destroy_profiling_pool(&self, pool: ProfilingPoolHandle) -> DriverResult<()>;
}
