// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! An in-process simulated device.
//!
//! [`SimDriver`] keeps every object in host memory behind one mutex.
//! Submitted work is queued and only runs when the host synchronises on or
//! rearms a fence or an event; at that point every queue is drained in
//! submission order until nothing can make progress. A wait whose primitive is still
//! unsignalled after draining can never complete and fails with
//! [`DriverError::Timeout`].
//!
//! A graph execution reads each bound input slice and writes output `k` as
//! input `min(k, inputs - 1)` plus the blob's bias byte (wrapping), padding
//! with the bias when the output is larger.

mod blob;

pub use blob::{SimBlob, SimGraphDesc, SIM_BLOB_MAGIC};

use crate::types::{
    BackendKind, Command, CommandListHandle, DeviceAddress, EventHandle, EventPoolHandle,
    FenceHandle, GraphHandle, GraphProperties, ProfilingPoolHandle, QueryHandle, QueueDesc,
    QueueGroupFlags, QueueHandle,
};
use crate::{Driver, DriverError, DriverResult};
use npu_common::{ArgumentMetadata, WorkloadType};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Device ticks charged per simulated operation.
pub const TICKS_PER_OPERATION: u64 = 1_000;

const COMPUTE_ORDINAL: u32 = 0;
const COPY_ORDINAL: u32 = 1;
const MEMORY_BASE: u64 = 0x1000_0000;

/// Capabilities the simulated device advertises.
#[derive(Debug, Clone)]
pub struct SimOptions {
    pub backend: BackendKind,
    pub graph_ext_version: (u32, u32),
    pub mutable_command_lists: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            backend: BackendKind::LevelZero,
            graph_ext_version: (1, 8),
            mutable_command_lists: true,
        }
    }
}

/// Counters exposed for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub graph_executions: u64,
    pub submissions: u64,
    pub live_objects: usize,
}

#[derive(Debug, Clone)]
enum Recorded {
    Barrier,
    Timestamp(DeviceAddress),
    Execute {
        graph: u64,
        bindings: Vec<Option<DeviceAddress>>,
        query: Option<u64>,
    },
    Signal(u64),
    Wait(u64),
}

impl Recorded {
    fn kind(&self) -> &'static str {
        match self {
            Self::Barrier => "barrier",
            Self::Timestamp(_) => "timestamp",
            Self::Execute { .. } => "execute",
            Self::Signal(_) => "signal",
            Self::Wait(_) => "wait",
        }
    }
}

#[derive(Debug)]
struct SimGraph {
    desc: SimGraphDesc,
    bindings: Vec<Option<DeviceAddress>>,
    initialized: bool,
}

#[derive(Debug)]
struct Submission {
    commands: VecDeque<Recorded>,
    fence: Option<u64>,
}

#[derive(Debug)]
struct SimQueue {
    desc: QueueDesc,
    workload: Option<WorkloadType>,
    pending: VecDeque<Submission>,
}

#[derive(Debug)]
struct SimList {
    mutable: bool,
    closed: bool,
    commands: Vec<Recorded>,
}

#[derive(Debug)]
struct SimEvent {
    signaled: bool,
}

#[derive(Debug)]
struct SimFence {
    queue: u64,
    signaled: bool,
}

#[derive(Debug)]
struct SimQuery {
    data: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct SimState {
    next_id: u64,
    next_address: u64,
    clock: u64,
    graphs: HashMap<u64, SimGraph>,
    queues: BTreeMap<u64, SimQueue>,
    lists: HashMap<u64, SimList>,
    event_pools: HashMap<u64, u32>,
    events: HashMap<u64, SimEvent>,
    fences: HashMap<u64, SimFence>,
    memory: BTreeMap<u64, Vec<u8>>,
    profiling_pools: HashMap<u64, u64>,
    queries: HashMap<u64, SimQuery>,
    graph_executions: u64,
    submissions: u64,
    destroyed: Vec<&'static str>,
}

fn missing(kind: &'static str, id: u64) -> DriverError {
    DriverError::InvalidHandle { kind, id }
}

impl SimState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn live_objects(&self) -> usize {
        self.graphs.len()
            + self.queues.len()
            + self.lists.len()
            + self.event_pools.len()
            + self.events.len()
            + self.fences.len()
            + self.memory.len()
            + self.profiling_pools.len()
            + self.queries.len()
    }

    fn locate(&self, address: DeviceAddress, len: usize) -> DriverResult<(u64, usize)> {
        let out_of_bounds = DriverError::OutOfBounds {
            address: address.0,
            len,
        };
        let (&base, buffer) = self
            .memory
            .range(..=address.0)
            .next_back()
            .ok_or(out_of_bounds)?;
        let offset = (address.0 - base) as usize;
        if offset + len > buffer.len() {
            return Err(DriverError::OutOfBounds {
                address: address.0,
                len,
            });
        }
        Ok((base, offset))
    }

    fn read(&self, address: DeviceAddress, len: usize) -> DriverResult<Vec<u8>> {
        let (base, offset) = self.locate(address, len)?;
        Ok(self.memory[&base][offset..offset + len].to_vec())
    }

    fn write(&mut self, address: DeviceAddress, data: &[u8]) -> DriverResult<()> {
        let (base, offset) = self.locate(address, data.len())?;
        if let Some(buffer) = self.memory.get_mut(&base) {
            buffer[offset..offset + data.len()].copy_from_slice(data);
        }
        Ok(())
    }

    fn graph(&self, graph: GraphHandle) -> DriverResult<&SimGraph> {
        self.graphs.get(&graph.0).ok_or(missing("graph", graph.0))
    }

    fn graph_mut(&mut self, graph: GraphHandle) -> DriverResult<&mut SimGraph> {
        self.graphs.get_mut(&graph.0).ok_or(missing("graph", graph.0))
    }

    fn list_mut(&mut self, list: CommandListHandle) -> DriverResult<&mut SimList> {
        self.lists
            .get_mut(&list.0)
            .ok_or(missing("command list", list.0))
    }

    /// Runs every queue until no submission can make further progress.
    fn drain(&mut self) -> DriverResult<()> {
        loop {
            let mut progressed = false;
            let queue_ids: Vec<u64> = self.queues.keys().copied().collect();
            for queue in queue_ids {
                loop {
                    let Some(mut submission) = self
                        .queues
                        .get_mut(&queue)
                        .and_then(|q| q.pending.pop_front())
                    else {
                        break;
                    };
                    let (finished, advanced) = self.run(&mut submission)?;
                    progressed |= advanced;
                    if finished {
                        if let Some(fence) = submission.fence {
                            if let Some(f) = self.fences.get_mut(&fence) {
                                f.signaled = true;
                            }
                        }
                    } else {
                        if let Some(q) = self.queues.get_mut(&queue) {
                            q.pending.push_front(submission);
                        }
                        break;
                    }
                }
            }
            if !progressed {
                return Ok(());
            }
        }
    }

    /// Runs commands until the submission finishes or blocks on an event.
    /// Returns `(finished, advanced)`.
    fn run(&mut self, submission: &mut Submission) -> DriverResult<(bool, bool)> {
        let mut advanced = false;
        while let Some(command) = submission.commands.front() {
            match command {
                Recorded::Wait(event) => {
                    let signaled = self
                        .events
                        .get(event)
                        .ok_or(missing("event", *event))?
                        .signaled;
                    if !signaled {
                        return Ok((false, advanced));
                    }
                }
                Recorded::Signal(event) => {
                    self.events
                        .get_mut(event)
                        .ok_or(missing("event", *event))?
                        .signaled = true;
                }
                Recorded::Barrier => {}
                Recorded::Timestamp(address) => {
                    self.clock += 1;
                    let ticks = self.clock;
                    self.write(*address, &ticks.to_le_bytes())?;
                }
                Recorded::Execute {
                    graph,
                    bindings,
                    query,
                } => {
                    let (graph, bindings, query) = (*graph, bindings.clone(), *query);
                    self.execute_graph(graph, &bindings, query)?;
                }
            }
            submission.commands.pop_front();
            advanced = true;
        }
        Ok((true, advanced))
    }

    fn execute_graph(
        &mut self,
        graph: u64,
        bindings: &[Option<DeviceAddress>],
        query: Option<u64>,
    ) -> DriverResult<()> {
        let sim = self.graphs.get(&graph).ok_or(missing("graph", graph))?;
        if !sim.initialized {
            return Err(DriverError::InvalidState(format!(
                "graph {graph} executed before initialization"
            )));
        }
        let desc = sim.desc.clone();

        let bound = |index: usize, arg: &ArgumentMetadata| -> DriverResult<DeviceAddress> {
            bindings.get(index).copied().flatten().ok_or_else(|| {
                DriverError::InvalidState(format!("argument {index} ('{}') is not bound", arg.name))
            })
        };

        let mut inputs = Vec::new();
        for (index, arg) in desc.arguments.iter().enumerate().filter(|(_, a)| a.is_input()) {
            let address = bound(index, arg)?;
            inputs.push(self.read(address, arg.size_bytes())?);
        }

        let outputs: Vec<(usize, &ArgumentMetadata)> = desc
            .arguments
            .iter()
            .enumerate()
            .filter(|(_, a)| !a.is_input())
            .collect();
        for (k, (index, arg)) in outputs.into_iter().enumerate() {
            let address = bound(index, arg)?;
            let mut data = vec![desc.bias; arg.size_bytes()];
            if let Some(source) = inputs.get(k.min(inputs.len().saturating_sub(1))) {
                for (dst, src) in data.iter_mut().zip(source.iter()) {
                    *dst = src.wrapping_add(desc.bias);
                }
            }
            self.write(address, &data)?;
        }

        let mut raw = Vec::with_capacity(desc.operations.len() * 8);
        for _ in &desc.operations {
            self.clock += TICKS_PER_OPERATION;
            raw.extend_from_slice(&TICKS_PER_OPERATION.to_le_bytes());
        }
        if let Some(query) = query {
            self.queries
                .get_mut(&query)
                .ok_or(missing("profiling query", query))?
                .data = Some(raw);
        }

        self.graph_executions += 1;
        Ok(())
    }
}

/// The simulated device.
#[derive(Debug)]
pub struct SimDriver {
    options: SimOptions,
    state: Mutex<SimState>,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    pub fn new() -> Self {
        Self::with_options(SimOptions::default())
    }

    pub fn with_options(options: SimOptions) -> Self {
        Self {
            options,
            state: Mutex::new(SimState {
                next_address: MEMORY_BASE,
                ..SimState::default()
            }),
        }
    }

    pub fn stats(&self) -> SimStats {
        let state = self.lock();
        SimStats {
            graph_executions: state.graph_executions,
            submissions: state.submissions,
            live_objects: state.live_objects(),
        }
    }

    /// Kinds of objects destroyed so far, in destruction order.
    pub fn destroy_log(&self) -> Vec<&'static str> {
        self.lock().destroyed.clone()
    }

    /// Kinds of the commands recorded in `list`, in append order.
    pub fn recorded_commands(&self, list: CommandListHandle) -> Vec<&'static str> {
        self.lock()
            .lists
            .get(&list.0)
            .map(|l| l.commands.iter().map(Recorded::kind).collect())
            .unwrap_or_default()
    }

    /// Workload hint applied to `queue`, if any.
    pub fn queue_workload(&self, queue: QueueHandle) -> Option<WorkloadType> {
        self.lock().queues.get(&queue.0).and_then(|q| q.workload)
    }

    /// Whether `graph` went through driver-side initialization.
    pub fn is_graph_initialized(&self, graph: GraphHandle) -> bool {
        self.lock()
            .graphs
            .get(&graph.0)
            .map_or(false, |g| g.initialized)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Driver for SimDriver {
    fn backend_kind(&self) -> BackendKind {
        self.options.backend
    }

    fn graph_ext_version(&self) -> (u32, u32) {
        self.options.graph_ext_version
    }

    fn supports_mutable_command_lists(&self) -> bool {
        self.options.mutable_command_lists
    }

    fn create_graph(&self, blob: &[u8]) -> DriverResult<GraphHandle> {
        if self.options.backend != BackendKind::LevelZero {
            return Err(DriverError::Unsupported(
                "graph extension is not available on this backend".into(),
            ));
        }
        let decoded = SimBlob::decode(blob)?;
        let mut state = self.lock();
        let id = state.next_id();
        let bindings = vec![None; decoded.desc.arguments.len()];
        tracing::trace!("Loaded graph '{}' as {id}", decoded.desc.name);
        state.graphs.insert(
            id,
            SimGraph {
                desc: decoded.desc,
                bindings,
                initialized: false,
            },
        );
        Ok(GraphHandle(id))
    }

    fn graph_properties(&self, graph: GraphHandle) -> DriverResult<GraphProperties> {
        let state = self.lock();
        let sim = state.graph(graph)?;
        Ok(GraphProperties {
            num_graph_args: sim.desc.arguments.len() as u32,
        })
    }

    fn argument_properties(
        &self,
        graph: GraphHandle,
        index: u32,
    ) -> DriverResult<ArgumentMetadata> {
        let state = self.lock();
        state
            .graph(graph)?
            .desc
            .arguments
            .get(index as usize)
            .cloned()
            .ok_or_else(|| DriverError::InvalidState(format!("graph has no argument {index}")))
    }

    fn set_argument_value(
        &self,
        graph: GraphHandle,
        index: u32,
        address: DeviceAddress,
    ) -> DriverResult<()> {
        let mut state = self.lock();
        let sim = state.graph_mut(graph)?;
        let slot = sim
            .bindings
            .get_mut(index as usize)
            .ok_or_else(|| DriverError::InvalidState(format!("graph has no argument {index}")))?;
        *slot = Some(address);
        Ok(())
    }

    fn initialize_graph(&self, graph: GraphHandle) -> DriverResult<()> {
        self.lock().graph_mut(graph)?.initialized = true;
        Ok(())
    }

    fn destroy_graph(&self, graph: GraphHandle) -> DriverResult<()> {
        let mut state = self.lock();
        state.graphs.remove(&graph.0).ok_or(missing("graph", graph.0))?;
        state.destroyed.push("graph");
        Ok(())
    }

    fn find_queue_group_ordinal(&self, flags: QueueGroupFlags) -> DriverResult<u32> {
        Ok(match flags {
            QueueGroupFlags::Compute => COMPUTE_ORDINAL,
            QueueGroupFlags::Copy => COPY_ORDINAL,
        })
    }

    fn create_command_queue(&self, desc: &QueueDesc) -> DriverResult<QueueHandle> {
        if desc.ordinal > COPY_ORDINAL {
            return Err(DriverError::CallFailed {
                call: "create_command_queue",
                detail: format!("no queue group with ordinal {}", desc.ordinal),
            });
        }
        let mut state = self.lock();
        let id = state.next_id();
        state.queues.insert(
            id,
            SimQueue {
                desc: desc.clone(),
                workload: None,
                pending: VecDeque::new(),
            },
        );
        Ok(QueueHandle(id))
    }

    fn set_queue_workload_type(
        &self,
        queue: QueueHandle,
        workload: WorkloadType,
    ) -> DriverResult<()> {
        let mut state = self.lock();
        let sim = state
            .queues
            .get_mut(&queue.0)
            .ok_or(missing("command queue", queue.0))?;
        tracing::trace!("Queue {} (priority {:?}) workload set to {workload:?}", queue.0, sim.desc.priority);
        sim.workload = Some(workload);
        Ok(())
    }

    fn execute_command_lists(
        &self,
        queue: QueueHandle,
        lists: &[CommandListHandle],
        fence: Option<FenceHandle>,
    ) -> DriverResult<()> {
        let mut state = self.lock();
        if !state.queues.contains_key(&queue.0) {
            return Err(missing("command queue", queue.0));
        }
        if let Some(fence) = fence {
            let sim = state.fences.get(&fence.0).ok_or(missing("fence", fence.0))?;
            if sim.queue != queue.0 {
                return Err(DriverError::InvalidState(format!(
                    "fence {} belongs to another queue",
                    fence.0
                )));
            }
        }

        let mut commands = VecDeque::new();
        for list in lists {
            let sim = state
                .lists
                .get(&list.0)
                .ok_or(missing("command list", list.0))?;
            if !sim.closed {
                return Err(DriverError::InvalidState(format!(
                    "command list {} submitted before close",
                    list.0
                )));
            }
            commands.extend(sim.commands.iter().cloned());
        }

        state.submissions += 1;
        if let Some(q) = state.queues.get_mut(&queue.0) {
            q.pending.push_back(Submission {
                commands,
                fence: fence.map(|f| f.0),
            });
        }
        Ok(())
    }

    fn destroy_command_queue(&self, queue: QueueHandle) -> DriverResult<()> {
        let mut state = self.lock();
        state
            .queues
            .remove(&queue.0)
            .ok_or(missing("command queue", queue.0))?;
        state.destroyed.push("command queue");
        Ok(())
    }

    fn create_command_list(&self, ordinal: u32, mutable: bool) -> DriverResult<CommandListHandle> {
        if mutable && !self.options.mutable_command_lists {
            return Err(DriverError::Unsupported("mutable command lists".into()));
        }
        if ordinal > COPY_ORDINAL {
            return Err(DriverError::CallFailed {
                call: "create_command_list",
                detail: format!("no queue group with ordinal {ordinal}"),
            });
        }
        let mut state = self.lock();
        let id = state.next_id();
        state.lists.insert(
            id,
            SimList {
                mutable,
                closed: false,
                commands: Vec::new(),
            },
        );
        Ok(CommandListHandle(id))
    }

    fn append_command(&self, list: CommandListHandle, command: Command) -> DriverResult<()> {
        let mut state = self.lock();
        let recorded = match command {
            Command::Barrier => Recorded::Barrier,
            Command::WriteTimestamp { address } => {
                state.locate(address, 8)?;
                Recorded::Timestamp(address)
            }
            Command::GraphExecute { graph, query } => {
                if let Some(query) = query {
                    if !state.queries.contains_key(&query.0) {
                        return Err(missing("profiling query", query.0));
                    }
                }
                Recorded::Execute {
                    graph: graph.0,
                    bindings: state.graph(graph)?.bindings.clone(),
                    query: query.map(|q| q.0),
                }
            }
            Command::SignalEvent(event) => {
                if !state.events.contains_key(&event.0) {
                    return Err(missing("event", event.0));
                }
                Recorded::Signal(event.0)
            }
            Command::WaitOnEvent(event) => {
                if !state.events.contains_key(&event.0) {
                    return Err(missing("event", event.0));
                }
                Recorded::Wait(event.0)
            }
        };
        let sim = state.list_mut(list)?;
        if sim.closed {
            return Err(DriverError::InvalidState(format!(
                "append to closed command list {}",
                list.0
            )));
        }
        sim.commands.push(recorded);
        Ok(())
    }

    fn update_mutable_argument(
        &self,
        list: CommandListHandle,
        index: u32,
        address: DeviceAddress,
    ) -> DriverResult<()> {
        let mut state = self.lock();
        let sim = state.list_mut(list)?;
        if !sim.mutable {
            return Err(DriverError::Unsupported(format!(
                "command list {} is not mutable",
                list.0
            )));
        }
        for command in &mut sim.commands {
            if let Recorded::Execute { bindings, .. } = command {
                let slot = bindings.get_mut(index as usize).ok_or_else(|| {
                    DriverError::InvalidState(format!("graph has no argument {index}"))
                })?;
                *slot = Some(address);
            }
        }
        sim.closed = false;
        Ok(())
    }

    fn close_command_list(&self, list: CommandListHandle) -> DriverResult<()> {
        self.lock().list_mut(list)?.closed = true;
        Ok(())
    }

    fn destroy_command_list(&self, list: CommandListHandle) -> DriverResult<()> {
        let mut state = self.lock();
        state
            .lists
            .remove(&list.0)
            .ok_or(missing("command list", list.0))?;
        state.destroyed.push("command list");
        Ok(())
    }

    fn create_event_pool(&self, count: u32) -> DriverResult<EventPoolHandle> {
        let mut state = self.lock();
        let id = state.next_id();
        state.event_pools.insert(id, count);
        Ok(EventPoolHandle(id))
    }

    fn destroy_event_pool(&self, pool: EventPoolHandle) -> DriverResult<()> {
        let mut state = self.lock();
        state
            .event_pools
            .remove(&pool.0)
            .ok_or(missing("event pool", pool.0))?;
        state.destroyed.push("event pool");
        Ok(())
    }

    fn create_event(&self, pool: EventPoolHandle, index: u32) -> DriverResult<EventHandle> {
        let mut state = self.lock();
        let count = *state
            .event_pools
            .get(&pool.0)
            .ok_or(missing("event pool", pool.0))?;
        if index >= count {
            return Err(DriverError::InvalidState(format!(
                "event index {index} outside pool of {count}"
            )));
        }
        let id = state.next_id();
        state.events.insert(id, SimEvent { signaled: false });
        Ok(EventHandle(id))
    }

    fn event_host_synchronize(&self, event: EventHandle, timeout: Duration) -> DriverResult<()> {
        let mut state = self.lock();
        state.drain()?;
        let sim = state.events.get(&event.0).ok_or(missing("event", event.0))?;
        if sim.signaled {
            Ok(())
        } else {
            Err(DriverError::Timeout(format!("event {} after {timeout:?}", event.0)))
        }
    }

    fn event_host_reset(&self, event: EventHandle) -> DriverResult<()> {
        let mut state = self.lock();
        state.drain()?;
        state
            .events
            .get_mut(&event.0)
            .ok_or(missing("event", event.0))?
            .signaled = false;
        Ok(())
    }

    fn destroy_event(&self, event: EventHandle) -> DriverResult<()> {
        let mut state = self.lock();
        state.events.remove(&event.0).ok_or(missing("event", event.0))?;
        state.destroyed.push("event");
        Ok(())
    }

    fn create_fence(&self, queue: QueueHandle) -> DriverResult<FenceHandle> {
        let mut state = self.lock();
        if !state.queues.contains_key(&queue.0) {
            return Err(missing("command queue", queue.0));
        }
        let id = state.next_id();
        state.fences.insert(
            id,
            SimFence {
                queue: queue.0,
                signaled: false,
            },
        );
        Ok(FenceHandle(id))
    }

    fn fence_host_synchronize(&self, fence: FenceHandle, timeout: Duration) -> DriverResult<()> {
        let mut state = self.lock();
        state.drain()?;
        let sim = state.fences.get(&fence.0).ok_or(missing("fence", fence.0))?;
        if sim.signaled {
            Ok(())
        } else {
            Err(DriverError::Timeout(format!("fence {} after {timeout:?}", fence.0)))
        }
    }

    fn fence_reset(&self, fence: FenceHandle) -> DriverResult<()> {
        let mut state = self.lock();
        state.drain()?;
        state
            .fences
            .get_mut(&fence.0)
            .ok_or(missing("fence", fence.0))?
            .signaled = false;
        Ok(())
    }

    fn destroy_fence(&self, fence: FenceHandle) -> DriverResult<()> {
        let mut state = self.lock();
        state.fences.remove(&fence.0).ok_or(missing("fence", fence.0))?;
        state.destroyed.push("fence");
        Ok(())
    }

    fn alloc_host(&self, size: usize, alignment: usize) -> DriverResult<DeviceAddress> {
        let alignment = alignment.max(1) as u64;
        let mut state = self.lock();
        let base = state.next_address.div_ceil(alignment) * alignment;
        // Keep a gap so an overrun never lands in the next allocation.
        state.next_address = base + size.max(1) as u64 + alignment;
        state.memory.insert(base, vec![0u8; size]);
        Ok(DeviceAddress(base))
    }

    fn free(&self, address: DeviceAddress) -> DriverResult<()> {
        let mut state = self.lock();
        state
            .memory
            .remove(&address.0)
            .ok_or(missing("allocation", address.0))?;
        state.destroyed.push("memory");
        Ok(())
    }

    fn write_memory(&self, address: DeviceAddress, data: &[u8]) -> DriverResult<()> {
        self.lock().write(address, data)
    }

    fn read_memory(&self, address: DeviceAddress, out: &mut [u8]) -> DriverResult<()> {
        let data = self.lock().read(address, out.len())?;
        out.copy_from_slice(&data);
        Ok(())
    }

    fn create_profiling_pool(
        &self,
        graph: GraphHandle,
        _count: u32,
    ) -> DriverResult<ProfilingPoolHandle> {
        let mut state = self.lock();
        state.graph(graph)?;
        let id = state.next_id();
        state.profiling_pools.insert(id, graph.0);
        Ok(ProfilingPoolHandle(id))
    }

    fn create_profiling_query(
        &self,
        pool: ProfilingPoolHandle,
        _index: u32,
    ) -> DriverResult<QueryHandle> {
        let mut state = self.lock();
        if !state.profiling_pools.contains_key(&pool.0) {
            return Err(missing("profiling pool", pool.0));
        }
        let id = state.next_id();
        state.queries.insert(id, SimQuery { data: None });
        Ok(QueryHandle(id))
    }

    fn profiling_query_data(&self, query: QueryHandle) -> DriverResult<Vec<u8>> {
        let state = self.lock();
        state
            .queries
            .get(&query.0)
            .ok_or(missing("profiling query", query.0))?
            .data
            .clone()
            .ok_or_else(|| DriverError::InvalidState("profiling query has no data yet".into()))
    }

    fn destroy_profiling_query(&self, query: QueryHandle) -> DriverResult<()> {
        let mut state = self.lock();
        state
            .queries
            .remove(&query.0)
            .ok_or(missing("profiling query", query.0))?;
        state.destroyed.push("profiling query");
        Ok(())
    }

    fn destroy_profiling_pool(&self, pool: ProfilingPoolHandle) -> DriverResult<()> {
        let mut state = self.lock();
        state
            .profiling_pools
            .remove(&pool.0)
            .ok_or(missing("profiling pool", pool.0))?;
        state.destroyed.push("profiling pool");
        Ok(())
    }
}
