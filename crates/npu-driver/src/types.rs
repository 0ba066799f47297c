// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Plain data types exchanged with a [`crate::Driver`].

use npu_common::ModelPriority;

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

handle_type!(
    /// A compiled artifact loaded on the device.
    GraphHandle
);
handle_type!(
    /// A command queue.
    QueueHandle
);
handle_type!(
    /// A command list.
    CommandListHandle
);
handle_type!(
    /// A pool that events are carved from.
    EventPoolHandle
);
handle_type!(
    /// A host-visible event.
    EventHandle
);
handle_type!(
    /// A fence bound to one command queue.
    FenceHandle
);
handle_type!(
    /// A pool of graph profiling queries.
    ProfilingPoolHandle
);
handle_type!(
    /// A graph profiling query.
    QueryHandle
);

/// What kind of backend a driver talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// A Level Zero class backend exposing the graph extension.
    LevelZero,
    /// Any other backend; graphs cannot be loaded through it.
    Other,
}

/// An address in device-visible memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress(pub u64);

impl DeviceAddress {
    /// Returns this address advanced by `bytes`.
    pub fn offset(self, bytes: usize) -> DeviceAddress {
        DeviceAddress(self.0 + bytes as u64)
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A buffer binding: where a tensor lives and how large it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorData {
    pub address: DeviceAddress,
    pub size: usize,
}

impl TensorData {
    pub fn new(address: DeviceAddress, size: usize) -> Self {
        Self { address, size }
    }

    /// Address of the slice stream `index` of `count` works on.
    ///
    /// The buffer is split evenly in row-major order: stream `i` starts at
    /// `i * size / count`. Callers guarantee `size` divides evenly.
    pub fn stream_address(&self, index: usize, count: usize) -> DeviceAddress {
        self.address.offset((index * self.size) / count)
    }
}

/// Command queue priority as understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePriority {
    Normal,
    PriorityLow,
    PriorityHigh,
}

impl From<ModelPriority> for QueuePriority {
    fn from(priority: ModelPriority) -> Self {
        match priority {
            ModelPriority::Low => QueuePriority::PriorityLow,
            ModelPriority::Medium => QueuePriority::Normal,
            ModelPriority::High => QueuePriority::PriorityHigh,
        }
    }
}

/// Capabilities a command queue group must offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueGroupFlags {
    Compute,
    Copy,
}

/// Parameters for creating a command queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDesc {
    pub ordinal: u32,
    pub priority: QueuePriority,
    pub turbo: bool,
}

/// Graph-level properties reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphProperties {
    pub num_graph_args: u32,
}

/// One entry of a command list.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Orders all previous commands before all following ones.
    Barrier,
    /// Writes the device timestamp (8 bytes) to `address`.
    WriteTimestamp { address: DeviceAddress },
    /// Runs a loaded graph with the arguments bound at append time.
    GraphExecute {
        graph: GraphHandle,
        query: Option<QueryHandle>,
    },
    /// Signals an event once every previous command has finished.
    SignalEvent(EventHandle),
    /// Holds the list until an event is signalled.
    WaitOnEvent(EventHandle),
}
