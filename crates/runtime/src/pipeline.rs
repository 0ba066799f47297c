// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The execution pipeline.
//!
//! One pipeline carries one inference request on a compiled graph across
//! `N` command streams. Each stream owns a command list recorded once:
//!
//! ```text
//! [barrier → timestamp] → graph execute (+ profiling query) → [barrier → timestamp] → [barrier → signal event]
//! ```
//!
//! Stream `i` binds every tensor at offset `i * size / N`, so a batched
//! tensor is split row-major across the streams. With a single stream the
//! whole tensor is bound.
//!
//! # Stream lifecycle
//! ```text
//! Built ──push──▶ Submitted ──pull──▶ Completed ──reset──▶ Reset ──push──▶ …
//! ```
//!
//! Completion is observed either through a fence handed to the queue with
//! the submission (`SYNC_DISCIPLINE=FENCE`) or through the event the list
//! signals at its end (`SYNC_DISCIPLINE=EVENT`). When inferences must run
//! sequentially, each submission first waits on the event of the pipeline
//! submitted before it on the same lane, which forces the event discipline.

use crate::{ProfilingResources, RuntimeError, RuntimeResult, StreamTimestamps};
use npu_common::{NpuConfig, SyncDiscipline};
use npu_driver::{
    CommandList, CommandQueue, Driver, Event, EventPool, Fence, TensorData, WAIT_FOREVER,
};
use npu_graph::{ArgumentDescriptor, CompiledGraph, GraphError};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Built,
    Submitted,
    Completed,
    Reset,
}

impl StreamState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::Submitted => "submitted",
            Self::Completed => "completed",
            Self::Reset => "reset",
        }
    }
}

/// Timing of one stream's last execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTiming {
    /// From submission until the host saw completion.
    pub host: Duration,
    /// Device timestamps, when recorded.
    pub device: Option<StreamTimestamps>,
}

#[derive(Debug)]
struct PipelineStream {
    /// Waits for the previous pipeline on this lane. Rebuilt on every push.
    chain: Option<CommandList>,
    command_list: CommandList,
    event: Arc<Event>,
    fence: Option<Fence>,
    state: StreamState,
    submitted_at: Option<Instant>,
    timing: Option<StreamTiming>,
}

impl PipelineStream {
    fn require_state(
        &self,
        index: usize,
        operation: &'static str,
        allowed: &[StreamState],
    ) -> RuntimeResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RuntimeError::InvalidState {
                stream: index,
                operation,
                state: self.state.as_str(),
            })
        }
    }
}

/// Drives a compiled graph through `N` parallel command streams.
#[derive(Debug)]
pub struct ExecutionPipeline {
    streams: Vec<PipelineStream>,
    profiling: ProfilingResources,
    queue: Arc<CommandQueue>,
    driver: Arc<dyn Driver>,
    graph: Arc<CompiledGraph>,
    discipline: SyncDiscipline,
    sequential: bool,
    timeout: Duration,
}

impl ExecutionPipeline {
    /// Records one command list per stream with `inputs` and `outputs`
    /// bound in declaration order.
    ///
    /// Every tensor size must divide evenly by `stream_count`.
    pub fn new(
        config: &NpuConfig,
        graph: Arc<CompiledGraph>,
        profiling: ProfilingResources,
        inputs: &[TensorData],
        outputs: &[TensorData],
        stream_count: usize,
    ) -> RuntimeResult<Self> {
        let name = graph.metadata().name.clone();
        if stream_count == 0 {
            return Err(RuntimeError::ConfigError(format!(
                "pipeline for '{name}' needs at least one stream"
            )));
        }
        let (Some(driver), Some(handle), Some(queue)) = (
            graph.driver().cloned(),
            graph.handle(),
            graph.command_queue().cloned(),
        ) else {
            return Err(GraphError::Config(format!(
                "'{name}' has no initialized device graph; inference is not available"
            ))
            .into());
        };
        if inputs.len() != graph.input_descriptors().len()
            || outputs.len() != graph.output_descriptors().len()
        {
            return Err(RuntimeError::ConfigError(format!(
                "'{name}' takes {} inputs and {} outputs, got {} and {}",
                graph.input_descriptors().len(),
                graph.output_descriptors().len(),
                inputs.len(),
                outputs.len()
            )));
        }
        let count = u32::try_from(stream_count).map_err(|_| {
            RuntimeError::ConfigError(format!("{stream_count} streams exceed the event pool"))
        })?;

        let lanes = graph.sequential_lanes();
        let sequential = config.run_inferences_sequentially && lanes > 0;
        if sequential && stream_count > lanes {
            return Err(RuntimeError::ConfigError(format!(
                "'{name}' chains {lanes} sequential lanes, {stream_count} streams requested"
            )));
        }
        let discipline = if sequential {
            if config.sync_discipline == SyncDiscipline::Fence {
                tracing::debug!("Sequential inferences on '{name}' synchronise through events");
            }
            SyncDiscipline::Event
        } else {
            config.sync_discipline
        };
        let mutable = driver.supports_mutable_command_lists();

        tracing::debug!("Pipeline for '{name}': building {stream_count} streams");
        let events = EventPool::new(Arc::clone(&driver), count)?;
        let mut streams = Vec::with_capacity(stream_count);
        for index in 0..stream_count {
            let command_list =
                CommandList::new(Arc::clone(&driver), graph.queue_group_ordinal(), mutable)?;
            let event = Arc::new(Event::new(&events, index as u32)?);
            let fence = match discipline {
                SyncDiscipline::Fence => Some(Fence::new(Arc::clone(&driver), &queue)?),
                SyncDiscipline::Event => None,
            };

            if let Some(address) = profiling.timestamp_address(index, false) {
                command_list.append_barrier()?;
                command_list.append_timestamp(address)?;
            }
            {
                let _bindings = graph.lock_arguments();
                bind(&graph, graph.input_descriptors(), inputs, index, stream_count)?;
                bind(&graph, graph.output_descriptors(), outputs, index, stream_count)?;
                command_list.append_graph_execute(handle, profiling.query_handle())?;
            }
            if let Some(address) = profiling.timestamp_address(index, true) {
                command_list.append_barrier()?;
                command_list.append_timestamp(address)?;
            }
            if discipline == SyncDiscipline::Event {
                command_list.append_barrier()?;
                event.append_signal(&command_list)?;
            }
            command_list.close()?;

            streams.push(PipelineStream {
                chain: None,
                command_list,
                event,
                fence,
                state: StreamState::Built,
                submitted_at: None,
                timing: None,
            });
        }
        tracing::debug!(
            "Pipeline for '{name}' ready: {stream_count} streams, {discipline:?} sync{}",
            if sequential { ", sequential" } else { "" }
        );

        Ok(Self {
            streams,
            profiling,
            queue,
            driver,
            graph,
            discipline,
            sequential,
            timeout: WAIT_FOREVER,
        })
    }

    /// Bounds every host wait in [`pull`](Self::pull).
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Submits every stream. Never waits for the device.
    pub fn push(&mut self) -> RuntimeResult<()> {
        tracing::debug!("Pipeline push for '{}'", self.graph.metadata().name);
        let ordinal = self.graph.queue_group_ordinal();
        for (lane, stream) in self.streams.iter_mut().enumerate() {
            stream.require_state(lane, "push", &[StreamState::Built, StreamState::Reset])?;

            stream.chain = None;
            if self.sequential {
                if let Some(previous) = self.graph.last_submitted_event(lane) {
                    if !Arc::ptr_eq(&previous, &stream.event) {
                        let chain = CommandList::new(Arc::clone(&self.driver), ordinal, false)?;
                        previous.append_wait(&chain)?;
                        chain.close()?;
                        stream.chain = Some(chain);
                    }
                }
            }

            let mut lists = Vec::with_capacity(2);
            if let Some(chain) = &stream.chain {
                lists.push(chain);
            }
            lists.push(&stream.command_list);
            self.queue.execute_all(&lists, stream.fence.as_ref())?;

            if self.sequential {
                self.graph
                    .set_last_submitted_event(lane, Arc::clone(&stream.event));
            }
            stream.submitted_at = Some(Instant::now());
            stream.timing = None;
            stream.state = StreamState::Submitted;
        }
        Ok(())
    }

    /// Waits for every submitted stream in order and samples device
    /// timestamps.
    ///
    /// A failed wait does not stop the others: every stream still in flight
    /// is waited and the first error is returned afterwards. Streams that
    /// already completed are skipped, so `pull` can be retried after a
    /// timeout.
    pub fn pull(&mut self) -> RuntimeResult<()> {
        tracing::debug!("Pipeline pull for '{}'", self.graph.metadata().name);
        let mut first_error = None;
        for (index, stream) in self.streams.iter_mut().enumerate() {
            stream.require_state(
                index,
                "pull",
                &[StreamState::Submitted, StreamState::Completed],
            )?;
            if stream.state == StreamState::Completed {
                continue;
            }
            let waited = match &stream.fence {
                Some(fence) => fence.host_synchronize(self.timeout),
                None => stream.event.host_synchronize(self.timeout),
            };
            if let Err(e) = waited {
                tracing::warn!(
                    "Stream {index} of '{}' did not complete: {e}",
                    self.graph.metadata().name
                );
                first_error.get_or_insert(RuntimeError::from(e));
                continue;
            }
            stream.state = StreamState::Completed;
            let device = match self.profiling.read_timestamps(index) {
                Ok(device) => device,
                Err(e) => {
                    first_error.get_or_insert(e);
                    None
                }
            };
            stream.timing = Some(StreamTiming {
                host: stream
                    .submitted_at
                    .map(|at| at.elapsed())
                    .unwrap_or_default(),
                device,
            });
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Whether every stream can be pushed.
    pub fn is_idle(&self) -> bool {
        self.streams
            .iter()
            .all(|s| matches!(s.state, StreamState::Built | StreamState::Reset))
    }

    /// Rearms every stream's fence or event. Command lists and bindings
    /// stay as recorded.
    ///
    /// Under sequential execution a later pipeline may still have a wait on
    /// this pipeline's event queued. The driver must finish that wait before
    /// the rearm takes effect; a device that rearms first stalls the waiter.
    pub fn reset(&mut self) -> RuntimeResult<()> {
        for (lane, stream) in self.streams.iter_mut().enumerate() {
            stream.require_state(lane, "reset", &[StreamState::Completed])?;
            match &stream.fence {
                Some(fence) => fence.reset()?,
                None => stream.event.reset()?,
            }
            if self.sequential {
                self.graph.clear_last_submitted_event(lane, &stream.event);
            }
            stream.chain = None;
            stream.state = StreamState::Reset;
        }
        Ok(())
    }

    /// Rebinds argument `binding_index` to `tensor` in every stream's
    /// command list, split like the original bindings.
    ///
    /// Requires a device with mutable command lists.
    pub fn update_command_list(
        &mut self,
        tensor: TensorData,
        binding_index: u32,
    ) -> RuntimeResult<()> {
        let count = self.streams.len();
        for (index, stream) in self.streams.iter_mut().enumerate() {
            stream.require_state(
                index,
                "update the command list",
                &[StreamState::Built, StreamState::Completed, StreamState::Reset],
            )?;
            stream.command_list.update_mutable_argument(
                binding_index,
                tensor.stream_address(index, count),
            )?;
            stream.command_list.close()?;
        }
        tracing::debug!(
            "Argument {binding_index} of '{}' rebound to {}",
            self.graph.metadata().name,
            tensor.address
        );
        Ok(())
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn stream_state(&self, index: usize) -> Option<StreamState> {
        self.streams.get(index).map(|s| s.state)
    }

    /// Discipline in effect, after sequential execution forced events.
    pub fn sync_discipline(&self) -> SyncDiscipline {
        self.discipline
    }

    pub fn is_sequential(&self) -> bool {
        self.sequential
    }

    /// Timings of the last completed pull, one entry per stream.
    pub fn timings(&self) -> Vec<StreamTiming> {
        self.streams.iter().filter_map(|s| s.timing).collect()
    }

    pub fn profiling(&self) -> &ProfilingResources {
        &self.profiling
    }

    pub fn graph(&self) -> &Arc<CompiledGraph> {
        &self.graph
    }
}

impl Drop for ExecutionPipeline {
    fn drop(&mut self) {
        for (lane, stream) in self.streams.iter().enumerate() {
            if stream.state == StreamState::Submitted {
                tracing::warn!(
                    "Pipeline for '{}' dropped with stream {lane} still in flight",
                    self.graph.metadata().name
                );
            }
            if self.sequential {
                self.graph.clear_last_submitted_event(lane, &stream.event);
            }
        }
    }
}

fn bind(
    graph: &CompiledGraph,
    descriptors: &[ArgumentDescriptor],
    tensors: &[TensorData],
    stream: usize,
    stream_count: usize,
) -> RuntimeResult<()> {
    for (descriptor, tensor) in descriptors.iter().zip(tensors) {
        graph.set_argument_value(
            descriptor.binding_index,
            tensor.stream_address(stream, stream_count),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, SAMPLE_BYTES};
    use npu_driver::sim::{SimDriver, SimOptions, TICKS_PER_OPERATION};
    use npu_driver::{DeviceBuffer, DriverError};

    struct Fixture {
        sim: Arc<SimDriver>,
        graph: Arc<CompiledGraph>,
        input: DeviceBuffer,
        output: DeviceBuffer,
    }

    impl Fixture {
        fn new(batch: usize, config: &NpuConfig) -> Self {
            let (sim, graph) = test_support::graph(batch, config);
            Self::with_graph(sim, graph, batch)
        }

        fn with_graph(sim: Arc<SimDriver>, graph: CompiledGraph, batch: usize) -> Self {
            let driver: Arc<dyn Driver> = sim.clone();
            let size = batch * SAMPLE_BYTES;
            Self {
                input: DeviceBuffer::new(Arc::clone(&driver), size).unwrap(),
                output: DeviceBuffer::new(driver, size).unwrap(),
                sim,
                graph: Arc::new(graph),
            }
        }

        fn pipeline(&self, config: &NpuConfig, streams: usize) -> RuntimeResult<ExecutionPipeline> {
            ExecutionPipeline::new(
                config,
                Arc::clone(&self.graph),
                ProfilingResources::disabled(),
                &[self.input.tensor_data()],
                &[self.output.tensor_data()],
                streams,
            )
        }

        fn fill_input(&self, start: u8) -> Vec<u8> {
            let data: Vec<u8> = (0..self.input.size())
                .map(|i| start.wrapping_add(i as u8))
                .collect();
            self.input.write(&data).unwrap();
            data
        }
    }

    fn plus_one(data: &[u8]) -> Vec<u8> {
        data.iter().map(|b| b.wrapping_add(1)).collect()
    }

    fn event_config() -> NpuConfig {
        NpuConfig {
            sync_discipline: SyncDiscipline::Event,
            ..NpuConfig::default()
        }
    }

    #[test]
    fn test_single_stream_with_fences() {
        let config = NpuConfig::default();
        let fx = Fixture::new(1, &config);
        let mut pipeline = fx.pipeline(&config, 1).unwrap();
        assert_eq!(pipeline.sync_discipline(), SyncDiscipline::Fence);
        assert_eq!(pipeline.stream_state(0), Some(StreamState::Built));

        let data = fx.fill_input(10);
        pipeline.push().unwrap();
        assert_eq!(pipeline.stream_state(0), Some(StreamState::Submitted));
        pipeline.pull().unwrap();
        assert_eq!(pipeline.stream_state(0), Some(StreamState::Completed));
        assert_eq!(fx.output.to_vec().unwrap(), plus_one(&data));
        assert_eq!(pipeline.timings().len(), 1);
        assert!(pipeline.timings()[0].device.is_none());

        pipeline.reset().unwrap();
        assert_eq!(pipeline.stream_state(0), Some(StreamState::Reset));
        let data = fx.fill_input(200);
        pipeline.push().unwrap();
        pipeline.pull().unwrap();
        assert_eq!(fx.output.to_vec().unwrap(), plus_one(&data));
        assert_eq!(fx.sim.stats().graph_executions, 2);
    }

    #[test]
    fn test_event_discipline_runs_repeatedly() {
        let config = event_config();
        let fx = Fixture::new(1, &config);
        let mut pipeline = fx.pipeline(&config, 1).unwrap();
        assert_eq!(pipeline.sync_discipline(), SyncDiscipline::Event);
        for round in 0..3u8 {
            let data = fx.fill_input(round * 50);
            pipeline.push().unwrap();
            pipeline.pull().unwrap();
            assert_eq!(fx.output.to_vec().unwrap(), plus_one(&data));
            pipeline.reset().unwrap();
        }
    }

    #[test]
    fn test_batch_split_across_streams() {
        for config in [NpuConfig::default(), event_config()] {
            let fx = Fixture::new(4, &config);
            assert_eq!(fx.graph.batch_size(), Some(4));
            let mut pipeline = fx.pipeline(&config, 4).unwrap();
            assert_eq!(pipeline.stream_count(), 4);

            // Every sample differs, so a stream reading the wrong offset
            // shows up in the output.
            let data = fx.fill_input(0);
            pipeline.push().unwrap();
            pipeline.pull().unwrap();
            assert_eq!(fx.output.to_vec().unwrap(), plus_one(&data));
            assert_eq!(fx.sim.stats().graph_executions, 4);
        }
    }

    #[test]
    fn test_stream_offsets() {
        let tensor = TensorData::new(npu_driver::DeviceAddress(0x1000), 100);
        assert_eq!(tensor.stream_address(0, 2).0, 0x1000);
        assert_eq!(tensor.stream_address(1, 2).0, 0x1000 + 50);
        let tensor = TensorData::new(npu_driver::DeviceAddress(0), 96);
        for i in 0..4 {
            assert_eq!(tensor.stream_address(i, 4).0, (i * 24) as u64);
        }
    }

    #[test]
    fn test_invalid_transitions() {
        let config = NpuConfig::default();
        let fx = Fixture::new(1, &config);
        let mut pipeline = fx.pipeline(&config, 1).unwrap();

        assert!(matches!(
            pipeline.pull(),
            Err(RuntimeError::InvalidState { operation: "pull", .. })
        ));
        assert!(matches!(
            pipeline.reset(),
            Err(RuntimeError::InvalidState { operation: "reset", .. })
        ));
        pipeline.push().unwrap();
        assert!(matches!(
            pipeline.push(),
            Err(RuntimeError::InvalidState {
                operation: "push",
                state: "submitted",
                ..
            })
        ));
        pipeline.pull().unwrap();
        assert!(matches!(
            pipeline.push(),
            Err(RuntimeError::InvalidState { state: "completed", .. })
        ));
    }

    #[test]
    fn test_zero_streams_rejected() {
        let config = NpuConfig::default();
        let fx = Fixture::new(1, &config);
        assert!(matches!(
            fx.pipeline(&config, 0),
            Err(RuntimeError::ConfigError(_))
        ));
    }

    #[test]
    fn test_binding_count_must_match() {
        let config = NpuConfig::default();
        let fx = Fixture::new(1, &config);
        let result = ExecutionPipeline::new(
            &config,
            Arc::clone(&fx.graph),
            ProfilingResources::disabled(),
            &[fx.input.tensor_data()],
            &[],
            1,
        );
        assert!(matches!(result, Err(RuntimeError::ConfigError(_))));
    }

    #[test]
    fn test_export_only_graph_cannot_run() {
        let config = NpuConfig::default();
        let graph = Arc::new(test_support::export_only_graph(&config));
        let result =
            ExecutionPipeline::new(&config, graph, ProfilingResources::disabled(), &[], &[], 1);
        assert!(matches!(
            result,
            Err(RuntimeError::Graph(GraphError::Config(_)))
        ));
    }

    #[test]
    fn test_deferred_graph_cannot_run() {
        let config = NpuConfig {
            create_executor: false,
            ..NpuConfig::default()
        };
        let fx = Fixture::new(1, &config);
        assert!(!fx.graph.is_initialized());
        assert!(matches!(
            fx.pipeline(&config, 1),
            Err(RuntimeError::Graph(GraphError::Config(_)))
        ));
    }

    #[test]
    fn test_update_command_list_rebinds_output() {
        let config = NpuConfig::default();
        let fx = Fixture::new(2, &config);
        let mut pipeline = fx.pipeline(&config, 2).unwrap();
        let data = fx.fill_input(1);
        pipeline.push().unwrap();
        pipeline.pull().unwrap();
        pipeline.reset().unwrap();

        let driver: Arc<dyn Driver> = fx.sim.clone();
        let replacement = DeviceBuffer::new(driver, fx.output.size()).unwrap();
        let index = fx.graph.output_descriptors()[0].binding_index;
        pipeline
            .update_command_list(replacement.tensor_data(), index)
            .unwrap();

        fx.output.write(&vec![0; fx.output.size()]).unwrap();
        pipeline.push().unwrap();
        pipeline.pull().unwrap();
        assert_eq!(replacement.to_vec().unwrap(), plus_one(&data));
        assert_eq!(fx.output.to_vec().unwrap(), vec![0; fx.output.size()]);
    }

    #[test]
    fn test_update_rejected_while_submitted() {
        let config = NpuConfig::default();
        let fx = Fixture::new(1, &config);
        let mut pipeline = fx.pipeline(&config, 1).unwrap();
        pipeline.push().unwrap();
        assert!(matches!(
            pipeline.update_command_list(fx.output.tensor_data(), 1),
            Err(RuntimeError::InvalidState { .. })
        ));
        pipeline.pull().unwrap();
    }

    #[test]
    fn test_update_needs_mutable_command_lists() {
        let config = NpuConfig::default();
        let sim = Arc::new(SimDriver::with_options(SimOptions {
            mutable_command_lists: false,
            ..SimOptions::default()
        }));
        let graph = test_support::graph_on(sim.clone(), 1, &config);
        let fx = Fixture::with_graph(sim, graph, 1);
        let mut pipeline = fx.pipeline(&config, 1).unwrap();
        assert!(matches!(
            pipeline.update_command_list(fx.output.tensor_data(), 1),
            Err(RuntimeError::Driver(DriverError::Unsupported(_)))
        ));
    }

    #[test]
    fn test_profiling_query_and_timestamps() {
        let config = NpuConfig {
            perf_count: true,
            ..NpuConfig::default()
        };
        let fx = Fixture::new(2, &config);
        let profiling = ProfilingResources::new(&fx.graph, &config, true, 2).unwrap();
        let mut pipeline = ExecutionPipeline::new(
            &config,
            Arc::clone(&fx.graph),
            profiling,
            &[fx.input.tensor_data()],
            &[fx.output.tensor_data()],
            2,
        )
        .unwrap();
        fx.fill_input(0);
        pipeline.push().unwrap();
        pipeline.pull().unwrap();

        let timings = pipeline.timings();
        assert_eq!(timings.len(), 2);
        for timing in &timings {
            let device = timing.device.unwrap();
            assert!(device.ticks() >= TICKS_PER_OPERATION);
        }
        assert!(timings[1].device.unwrap().begin > timings[0].device.unwrap().end);

        let raw = pipeline.profiling().query_data().unwrap().unwrap();
        let entries = fx.graph.process_profiling_output(&raw, &config).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].node_name, "add");
    }

    #[test]
    fn test_sequential_pipelines_chain_through_events() {
        let config = NpuConfig {
            run_inferences_sequentially: true,
            ..NpuConfig::default()
        };
        let fx = Fixture::new(1, &config);
        assert_eq!(fx.graph.sequential_lanes(), 1);

        let mut first = fx.pipeline(&config, 1).unwrap();
        let mut second = fx.pipeline(&config, 1).unwrap();
        assert!(first.is_sequential());
        assert_eq!(first.sync_discipline(), SyncDiscipline::Event);

        let data = fx.fill_input(7);
        first.push().unwrap();
        second.push().unwrap();
        let registered = fx.graph.last_submitted_event(0).unwrap();
        assert!(Arc::ptr_eq(&registered, &second.streams[0].event));
        assert!(second.streams[0].chain.is_some());

        first.pull().unwrap();
        second.pull().unwrap();
        assert_eq!(fx.output.to_vec().unwrap(), plus_one(&data));

        first.reset().unwrap();
        assert!(fx.graph.last_submitted_event(0).is_some());
        second.reset().unwrap();
        assert!(fx.graph.last_submitted_event(0).is_none());

        // With nothing registered the next push needs no chain.
        first.push().unwrap();
        assert!(first.streams[0].chain.is_none());
        first.pull().unwrap();
        first.reset().unwrap();
    }

    #[test]
    fn test_sequential_chain_waits_for_previous_pipeline() {
        let config = NpuConfig {
            run_inferences_sequentially: true,
            ..NpuConfig::default()
        };
        let fx = Fixture::new(1, &config);
        let mut first = fx.pipeline(&config, 1).unwrap();
        let mut second = fx.pipeline(&config, 1).unwrap();

        first.push().unwrap();
        second.push().unwrap();
        // Waiting on the second completes the first along the way.
        second.pull().unwrap();
        assert_eq!(fx.sim.stats().graph_executions, 2);
        first.pull().unwrap();
    }

    #[test]
    fn test_drop_releases_device_objects() {
        let config = event_config();
        let fx = Fixture::new(2, &config);
        let before = fx.sim.stats().live_objects;
        {
            let mut pipeline = fx.pipeline(&config, 2).unwrap();
            pipeline.push().unwrap();
            pipeline.pull().unwrap();
            assert!(fx.sim.stats().live_objects > before);
        }
        assert_eq!(fx.sim.stats().live_objects, before);
    }

    #[test]
    fn test_wait_timeout_is_carried() {
        let config = NpuConfig::default();
        let fx = Fixture::new(1, &config);
        let mut pipeline = fx
            .pipeline(&config, 1)
            .unwrap()
            .with_wait_timeout(Duration::from_millis(5));
        assert_eq!(pipeline.timeout, Duration::from_millis(5));
        pipeline.push().unwrap();
        pipeline.pull().unwrap();
    }

    fn sequential_config() -> NpuConfig {
        NpuConfig {
            run_inferences_sequentially: true,
            ..NpuConfig::default()
        }
    }

    #[test]
    fn test_pull_retries_after_stalled_stream() {
        let config = sequential_config();
        let fx = Fixture::new(2, &config);
        let driver: Arc<dyn Driver> = fx.sim.clone();
        let mut pipeline = fx
            .pipeline(&config, 2)
            .unwrap()
            .with_wait_timeout(Duration::from_millis(5));

        // Lane 1 chains behind work that nobody has finished yet.
        let stalled = test_support::unsignalled_event(&driver);
        fx.graph.set_last_submitted_event(1, Arc::clone(&stalled));

        let data = fx.fill_input(3);
        pipeline.push().unwrap();
        assert!(matches!(
            pipeline.pull(),
            Err(RuntimeError::Driver(DriverError::Timeout(_)))
        ));
        assert_eq!(pipeline.stream_state(0), Some(StreamState::Completed));
        assert_eq!(pipeline.stream_state(1), Some(StreamState::Submitted));
        assert!(!pipeline.is_idle());

        // Still stalled: the retry waits again instead of refusing.
        assert!(matches!(
            pipeline.pull(),
            Err(RuntimeError::Driver(DriverError::Timeout(_)))
        ));

        test_support::signal_from_side_queue(&driver, &stalled);
        pipeline.pull().unwrap();
        assert_eq!(pipeline.stream_state(1), Some(StreamState::Completed));
        assert_eq!(fx.output.to_vec().unwrap(), plus_one(&data));

        pipeline.reset().unwrap();
        assert!(pipeline.is_idle());
        let data = fx.fill_input(90);
        pipeline.push().unwrap();
        pipeline.pull().unwrap();
        assert_eq!(fx.output.to_vec().unwrap(), plus_one(&data));
        pipeline.reset().unwrap();
    }

    #[test]
    fn test_timestamps_follow_barriers() {
        let cases: [(NpuConfig, &[&str]); 2] = [
            (NpuConfig::default(), &[]),
            (event_config(), &["barrier", "signal"]),
        ];
        for (config, tail) in cases {
            let fx = Fixture::new(1, &config);
            let profiling = ProfilingResources::new(&fx.graph, &config, true, 1).unwrap();
            let pipeline = ExecutionPipeline::new(
                &config,
                Arc::clone(&fx.graph),
                profiling,
                &[fx.input.tensor_data()],
                &[fx.output.tensor_data()],
                1,
            )
            .unwrap();

            let mut expected = vec!["barrier", "timestamp", "execute", "barrier", "timestamp"];
            expected.extend_from_slice(tail);
            let list = pipeline.streams[0].command_list.handle();
            assert_eq!(fx.sim.recorded_commands(list), expected);
        }
    }

    #[test]
    fn test_sequential_streams_limited_to_lanes() {
        let config = sequential_config();
        let fx = Fixture::new(1, &config);
        assert_eq!(fx.graph.sequential_lanes(), 1);
        assert!(matches!(
            fx.pipeline(&config, 2),
            Err(RuntimeError::ConfigError(_))
        ));
        assert_eq!(fx.pipeline(&config, 1).unwrap().stream_count(), 1);
    }
}
