// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # npu-driver
//!
//! The hardware collaborator of the runtime, expressed as the [`Driver`]
//! trait: graph extension calls (load a compiled blob, enumerate and bind
//! arguments), command queues, command lists, events, fences, host-visible
//! memory and profiling queries.
//!
//! Raw handles returned by a driver are wrapped in RAII types
//! ([`CommandQueue`], [`CommandList`], [`EventPool`], [`Event`], [`Fence`],
//! [`DeviceBuffer`], [`ProfilingPool`], [`ProfilingQuery`]) that hold an
//! `Arc<dyn Driver>` and release the handle exactly once on drop.
//!
//! # Ownership Model
//!
//! ```text
//! Arc<dyn Driver>
//!     ├── CommandQueue ── Fence (borrows queue at creation)
//!     ├── CommandList  ── appends GraphExecute / Barrier / Timestamp / SignalEvent
//!     ├── EventPool ──── Event (one per pool slot)
//!     └── DeviceBuffer
//! ```
//!
//! [`sim::SimDriver`] implements the trait in host memory so the whole
//! stack can be exercised without an accelerator.

mod api;
mod command_list;
mod error;
mod memory;
mod profiling;
mod queue;
pub mod sim;
mod sync;
mod types;

pub use api::Driver;
pub use command_list::CommandList;
pub use error::{DriverError, DriverResult};
pub use memory::{DeviceBuffer, BUFFER_ALIGNMENT};
pub use profiling::{ProfilingPool, ProfilingQuery};
pub use queue::CommandQueue;
pub use sync::{Event, EventPool, Fence};
pub use types::{
    BackendKind, Command, CommandListHandle, DeviceAddress, EventHandle, EventPoolHandle,
    FenceHandle, GraphHandle, GraphProperties, ProfilingPoolHandle, QueryHandle, QueueDesc,
    QueueGroupFlags, QueueHandle, QueuePriority, TensorData,
};

/// Host wait that never gives up; the driver decides when work completes.
pub const WAIT_FOREVER: std::time::Duration = std::time::Duration::MAX;
