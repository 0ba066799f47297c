// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The compiled graph.

use crate::export;
use crate::{blob_hash, GraphError, GraphResult};
use npu_common::{
    ArgumentMetadata, BatchMode, LogLevel, Model, NetworkMetadata, NpuConfig, ProfilingEntry,
};
use npu_compiler::{CompiledArtifact, CompilerService};
use npu_driver::{
    CommandQueue, DeviceAddress, Driver, Event, GraphHandle, QueueDesc, QueueGroupFlags,
};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

/// A declared graph argument and the index it is bound through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDescriptor {
    pub properties: ArgumentMetadata,
    pub binding_index: u32,
}

/// One compiled artifact plus the device resources needed to run it.
///
/// A graph without a hardware handle is export-only: it can still be
/// written out and profiled offline, but binding arguments fails.
#[derive(Debug)]
pub struct CompiledGraph {
    driver: Option<Arc<dyn Driver>>,
    compiler: Arc<dyn CompilerService>,
    handle: Option<GraphHandle>,
    metadata: NetworkMetadata,
    blob: Vec<u8>,
    input_descriptors: Vec<ArgumentDescriptor>,
    output_descriptors: Vec<ArgumentDescriptor>,
    queue: Option<Arc<CommandQueue>>,
    queue_group_ordinal: u32,
    batch_size: Option<usize>,
    /// Per lane, the event of the pipeline submitted last. Only sized when
    /// inferences run sequentially.
    last_submitted: Mutex<Vec<Option<Arc<Event>>>>,
    /// Serialises argument binding with command recording.
    binding: Mutex<()>,
    log_level: LogLevel,
    initialized: bool,
}

impl CompiledGraph {
    /// Wraps `artifact`. Device resources are acquired right away unless the
    /// configuration defers them.
    pub fn new(
        driver: Option<Arc<dyn Driver>>,
        compiler: Arc<dyn CompilerService>,
        handle: Option<GraphHandle>,
        artifact: CompiledArtifact,
        config: &NpuConfig,
    ) -> GraphResult<Self> {
        let mut graph = Self {
            driver,
            compiler,
            handle,
            metadata: artifact.metadata,
            blob: artifact.compiled_binary,
            input_descriptors: Vec::new(),
            output_descriptors: Vec::new(),
            queue: None,
            queue_group_ordinal: 0,
            batch_size: None,
            last_submitted: Mutex::new(Vec::new()),
            binding: Mutex::new(()),
            log_level: config.log_level,
            initialized: false,
        };

        if config.defers_initialization() {
            tracing::info!(
                "Initialization of '{}' is deferred until first use",
                graph.metadata.name
            );
            return Ok(graph);
        }

        graph.initialize(config)?;
        Ok(graph)
    }

    /// Acquires device resources: enumerates arguments, creates the command
    /// queue, runs driver-side graph initialisation and resolves the batch
    /// size. Does nothing for export-only graphs or when already done.
    pub fn initialize(&mut self, config: &NpuConfig) -> GraphResult<()> {
        let (Some(driver), Some(handle)) = (self.driver.clone(), self.handle) else {
            return Ok(());
        };
        if self.initialized {
            tracing::warn!("'{}' is already initialized", self.metadata.name);
            return Ok(());
        }

        tracing::debug!("Initializing '{}'", self.metadata.name);

        let properties = driver.graph_properties(handle)?;
        for index in 0..properties.num_graph_args {
            let descriptor = ArgumentDescriptor {
                properties: driver.argument_properties(handle, index)?,
                binding_index: index,
            };
            if descriptor.properties.is_input() {
                self.input_descriptors.push(descriptor);
            } else {
                self.output_descriptors.push(descriptor);
            }
        }
        self.input_descriptors.shrink_to_fit();
        self.output_descriptors.shrink_to_fit();

        self.queue_group_ordinal = driver.find_queue_group_ordinal(QueueGroupFlags::Compute)?;
        let queue = CommandQueue::new(
            Arc::clone(&driver),
            QueueDesc {
                ordinal: self.queue_group_ordinal,
                priority: config.model_priority.into(),
                turbo: config.turbo.unwrap_or(false),
            },
        )?;
        if let Some(workload) = config.workload_type {
            queue.set_workload_type(workload)?;
        }
        self.queue = Some(Arc::new(queue));

        driver.initialize_graph(handle)?;

        if config.batch_mode != BatchMode::Compiler {
            self.batch_size = self.metadata.batch_size();
        }

        if config.run_inferences_sequentially {
            let lanes = self.batch_size.unwrap_or(1);
            self.lock_registry().resize(lanes, None);
        }

        self.initialized = true;
        tracing::debug!(
            "Initialized '{}': {} inputs, {} outputs, batch {:?}",
            self.metadata.name,
            self.input_descriptors.len(),
            self.output_descriptors.len(),
            self.batch_size
        );
        Ok(())
    }

    /// Writes the compiled blob verbatim. Returns the number of bytes
    /// written, or 0 if the writer failed.
    pub fn export_blob<W: Write>(&self, writer: &mut W) -> usize {
        if let Err(e) = writer.write_all(&self.blob).and_then(|()| writer.flush()) {
            tracing::error!("Write blob to stream failed, blob is broken: {e}");
            return 0;
        }

        if self.log_level.enabled(LogLevel::Info) {
            tracing::info!(
                "Blob size: {}, hash: {:x}",
                self.blob.len(),
                blob_hash(&self.blob)
            );
        }
        tracing::info!("Write blob to stream successfully");
        self.blob.len()
    }

    /// Writes this graph as the main stage together with `init_graph` and
    /// the model it was compiled from. Returns the bytes written, or 0.
    pub fn export_with_weights<W: Write>(
        &self,
        writer: &mut W,
        init_graph: &CompiledGraph,
        init_model: &Model,
    ) -> usize {
        let result = init_model.serialize().map_err(GraphError::from).and_then(
            |(description, weights)| {
                let written = export::write_with_weights(
                    writer,
                    &description,
                    &weights,
                    &self.blob,
                    &init_graph.blob,
                )?;
                Ok((written, description.len() + weights.len()))
            },
        );

        match result {
            Ok((written, model_bytes)) => {
                if self.log_level.enabled(LogLevel::Info) {
                    let blobs = self.blob.len() + init_graph.blob.len();
                    tracing::info!(
                        "Blob size: {blobs}, with weights: {}",
                        blobs + model_bytes + 4 * std::mem::size_of::<u32>()
                    );
                }
                tracing::info!("Write blob to stream successfully");
                written
            }
            Err(e) => {
                tracing::error!("Write blob to stream failed, blob is broken: {e}");
                0
            }
        }
    }

    /// Like [`Self::export_with_weights`] for any number of init stages.
    pub fn export_with_weights_split_init<W: Write>(
        &self,
        writer: &mut W,
        init_graphs: &[&CompiledGraph],
        init_model: &Model,
    ) -> usize {
        let init_blobs: Vec<&[u8]> = init_graphs.iter().map(|g| g.blob.as_slice()).collect();
        let result = init_model.serialize().map_err(GraphError::from).and_then(
            |(description, weights)| {
                let written = export::write_split_init(
                    writer,
                    &description,
                    &weights,
                    &self.blob,
                    &init_blobs,
                )?;
                Ok(written)
            },
        );

        match result {
            Ok(written) => {
                if self.log_level.enabled(LogLevel::Info) {
                    let blobs =
                        self.blob.len() + init_blobs.iter().map(|b| b.len()).sum::<usize>();
                    tracing::info!(
                        "Blob size: {blobs} across {} init stages, with weights: {written}",
                        init_blobs.len()
                    );
                }
                tracing::info!("Write blob to stream successfully");
                written
            }
            Err(e) => {
                tracing::error!("Write blob to stream failed, blob is broken: {e}");
                0
            }
        }
    }

    /// Maps raw device profiling data to per-operation entries.
    pub fn process_profiling_output(
        &self,
        raw: &[u8],
        config: &NpuConfig,
    ) -> GraphResult<Vec<ProfilingEntry>> {
        Ok(self
            .compiler
            .process_profiling_output(raw, &self.blob, config)?)
    }

    /// Binds argument `index` to `address` for the next recorded execution.
    pub fn set_argument_value(&self, index: u32, address: DeviceAddress) -> GraphResult<()> {
        let (Some(driver), Some(handle)) = (&self.driver, self.handle) else {
            return Err(GraphError::Config(format!(
                "'{}' has no device graph; only export is available",
                self.metadata.name
            )));
        };
        driver.set_argument_value(handle, index, address)?;
        Ok(())
    }

    /// Held while binding arguments and recording the execution that
    /// captures them.
    pub fn lock_arguments(&self) -> MutexGuard<'_, ()> {
        self.binding
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Event of the pipeline last built for `lane`, when inferences run
    /// sequentially.
    pub fn last_submitted_event(&self, lane: usize) -> Option<Arc<Event>> {
        self.lock_registry().get(lane).cloned().flatten()
    }

    /// Records `event` as the one the next pipeline on `lane` must wait for.
    /// Ignored when inferences are not sequential.
    pub fn set_last_submitted_event(&self, lane: usize, event: Arc<Event>) {
        if let Some(slot) = self.lock_registry().get_mut(lane) {
            *slot = Some(event);
        }
    }

    /// Forgets `event` if it is still the one registered for `lane`.
    pub fn clear_last_submitted_event(&self, lane: usize, event: &Arc<Event>) {
        if let Some(slot) = self.lock_registry().get_mut(lane) {
            if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, event)) {
                *slot = None;
            }
        }
    }

    /// Number of lanes tracked for sequential execution; 0 when disabled.
    pub fn sequential_lanes(&self) -> usize {
        self.lock_registry().len()
    }

    pub fn handle(&self) -> Option<GraphHandle> {
        self.handle
    }

    pub fn is_export_only(&self) -> bool {
        self.handle.is_none() || self.driver.is_none()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn driver(&self) -> Option<&Arc<dyn Driver>> {
        self.driver.as_ref()
    }

    pub fn compiler(&self) -> &Arc<dyn CompilerService> {
        &self.compiler
    }

    pub fn metadata(&self) -> &NetworkMetadata {
        &self.metadata
    }

    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn input_descriptors(&self) -> &[ArgumentDescriptor] {
        &self.input_descriptors
    }

    pub fn output_descriptors(&self) -> &[ArgumentDescriptor] {
        &self.output_descriptors
    }

    pub fn command_queue(&self) -> Option<&Arc<CommandQueue>> {
        self.queue.as_ref()
    }

    pub fn queue_group_ordinal(&self) -> u32 {
        self.queue_group_ordinal
    }

    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    fn lock_registry(&self) -> MutexGuard<'_, Vec<Option<Arc<Event>>>> {
        self.last_submitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for CompiledGraph {
    fn drop(&mut self) {
        // Handle first, then pending sync state, then the queue.
        if let (Some(driver), Some(handle)) = (&self.driver, self.handle) {
            match driver.destroy_graph(handle) {
                Ok(()) => self.handle = None,
                Err(e) => tracing::warn!("Failed to destroy graph '{}': {e}", self.metadata.name),
            }
        }
        self.lock_registry().clear();
        self.queue.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npu_common::{ElementType, Operation, Shape, WorkloadType};
    use npu_compiler::ReferenceCompiler;
    use npu_driver::sim::SimDriver;
    use npu_driver::DeviceBuffer;
    use std::io;

    fn model(batch: usize) -> Model {
        let mut model = Model::new("net");
        model.inputs.push(ArgumentMetadata::input(
            "x",
            ElementType::U8,
            Shape::new(vec![batch, 4]),
        ));
        model.outputs.push(ArgumentMetadata::output(
            "y",
            ElementType::U8,
            Shape::new(vec![batch, 4]),
        ));
        model.operations.push(Operation {
            name: "add".into(),
            op_type: "Add".into(),
        });
        model
    }

    fn build(
        sim: &Arc<SimDriver>,
        config: &NpuConfig,
        batch: usize,
    ) -> CompiledGraph {
        let compiler: Arc<dyn CompilerService> = Arc::new(ReferenceCompiler::new());
        let artifact = compiler.compile(&model(batch), config).unwrap();
        let driver: Arc<dyn Driver> = sim.clone();
        let handle = driver.create_graph(&artifact.compiled_binary).unwrap();
        CompiledGraph::new(Some(driver), compiler, Some(handle), artifact, config).unwrap()
    }

    fn export_only(config: &NpuConfig) -> CompiledGraph {
        let compiler: Arc<dyn CompilerService> = Arc::new(ReferenceCompiler::new());
        let artifact = compiler.compile(&model(1), config).unwrap();
        CompiledGraph::new(None, compiler, None, artifact, config).unwrap()
    }

    struct BrokenWriter {
        budget: usize,
    }

    impl Write for BrokenWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_eager_initialization_partitions_arguments() {
        let sim = Arc::new(SimDriver::new());
        let mut config = NpuConfig::default();
        config.workload_type = Some(WorkloadType::Efficient);
        let graph = build(&sim, &config, 1);

        assert!(graph.is_initialized());
        assert_eq!(graph.input_descriptors().len(), 1);
        assert_eq!(graph.output_descriptors()[0].binding_index, 1);
        assert_eq!(graph.output_descriptors()[0].properties.name, "y");
        let queue = graph.command_queue().unwrap();
        assert_eq!(sim.queue_workload(queue.handle()), Some(WorkloadType::Efficient));
        assert!(sim.is_graph_initialized(graph.handle().unwrap()));
    }

    #[test]
    fn test_deferred_initialization() {
        let sim = Arc::new(SimDriver::new());
        let mut config = NpuConfig::default();
        config.defer_weights_load = true;
        let mut graph = build(&sim, &config, 1);
        assert!(!graph.is_initialized());
        assert!(graph.command_queue().is_none());

        graph.initialize(&config).unwrap();
        assert!(graph.is_initialized());
        assert!(graph.command_queue().is_some());
    }

    #[test]
    fn test_batch_size_respects_batch_mode() {
        let sim = Arc::new(SimDriver::new());
        let graph = build(&sim, &NpuConfig::default(), 4);
        assert_eq!(graph.batch_size(), Some(4));

        let mut config = NpuConfig::default();
        config.batch_mode = BatchMode::Compiler;
        let graph = build(&sim, &config, 4);
        assert_eq!(graph.batch_size(), None);
    }

    #[test]
    fn test_sequential_registry_sized_to_batch() {
        let sim = Arc::new(SimDriver::new());
        let mut config = NpuConfig::default();
        config.run_inferences_sequentially = true;
        assert_eq!(build(&sim, &config, 3).sequential_lanes(), 3);
        assert_eq!(build(&sim, &config, 1).sequential_lanes(), 1);
        assert_eq!(build(&sim, &NpuConfig::default(), 3).sequential_lanes(), 0);
    }

    #[test]
    fn test_export_only_graph_rejects_binding() {
        let graph = export_only(&NpuConfig::default());
        assert!(graph.is_export_only());
        assert!(!graph.is_initialized());
        let err = graph
            .set_argument_value(0, DeviceAddress(0x1000))
            .unwrap_err();
        assert!(matches!(err, GraphError::Config(_)));
    }

    #[test]
    fn test_export_blob_writes_verbatim() {
        let graph = export_only(&NpuConfig::default());
        let mut out = Vec::new();
        assert_eq!(graph.export_blob(&mut out), graph.blob().len());
        assert_eq!(out, graph.blob());
    }

    #[test]
    fn test_export_blob_to_broken_stream_returns_zero() {
        let mut config = NpuConfig::default();
        config.log_level = LogLevel::Info;
        let graph = export_only(&config);
        let mut writer = BrokenWriter { budget: 3 };
        assert_eq!(graph.export_blob(&mut writer), 0);
    }

    #[test]
    fn test_export_with_weights_reads_back() {
        let config = NpuConfig::default();
        let main = export_only(&config);
        let init = export_only(&config);
        let init_model = model(1);

        let mut out = Vec::new();
        let written = main.export_with_weights(&mut out, &init, &init_model);
        assert_eq!(written, out.len());

        let container =
            crate::ExportContainer::read_with_weights(&mut io::Cursor::new(out)).unwrap();
        let (description, weights) = init_model.serialize().unwrap();
        assert_eq!(container.model_description.len(), description.len());
        assert_eq!(container.model_weights.len(), weights.len());
        assert_eq!(container.main_blob, main.blob());
        assert_eq!(container.init_blobs, vec![init.blob().to_vec()]);
        assert_eq!(container.init_model().unwrap(), init_model);
    }

    #[test]
    fn test_export_split_init_to_broken_stream_returns_zero() {
        let config = NpuConfig::default();
        let main = export_only(&config);
        let init = export_only(&config);
        let mut writer = BrokenWriter { budget: 64 };
        assert_eq!(
            main.export_with_weights_split_init(&mut writer, &[&init, &init], &model(1)),
            0
        );
    }

    #[test]
    fn test_drop_releases_handle_before_queue() {
        let sim = Arc::new(SimDriver::new());
        drop(build(&sim, &NpuConfig::default(), 1));
        let log = sim.destroy_log();
        let graph_at = log.iter().position(|k| *k == "graph").unwrap();
        let queue_at = log.iter().position(|k| *k == "command queue").unwrap();
        assert!(graph_at < queue_at);
        assert_eq!(sim.stats().live_objects, 0);
    }

    #[test]
    fn test_registry_clear_only_matching_event() {
        let sim = Arc::new(SimDriver::new());
        let mut config = NpuConfig::default();
        config.run_inferences_sequentially = true;
        let graph = build(&sim, &config, 1);
        let driver: Arc<dyn Driver> = sim.clone();
        let pool = npu_driver::EventPool::new(driver, 2).unwrap();
        let first = Arc::new(Event::new(&pool, 0).unwrap());
        let second = Arc::new(Event::new(&pool, 1).unwrap());

        graph.set_last_submitted_event(0, Arc::clone(&first));
        graph.set_last_submitted_event(0, Arc::clone(&second));
        graph.clear_last_submitted_event(0, &first);
        assert!(Arc::ptr_eq(&graph.last_submitted_event(0).unwrap(), &second));
        graph.clear_last_submitted_event(0, &second);
        assert!(graph.last_submitted_event(0).is_none());
        // Lanes outside the registry are ignored.
        graph.set_last_submitted_event(5, first);
        assert!(graph.last_submitted_event(5).is_none());
    }

    #[test]
    fn test_bound_graph_runs_on_device() {
        let sim = Arc::new(SimDriver::new());
        let graph = build(&sim, &NpuConfig::default(), 1);
        let driver = Arc::clone(graph.driver().unwrap());
        let input = DeviceBuffer::new(Arc::clone(&driver), 4).unwrap();
        let output = DeviceBuffer::new(Arc::clone(&driver), 4).unwrap();
        input.write(&[10, 20, 30, 40]).unwrap();
        graph.set_argument_value(0, input.address()).unwrap();
        graph.set_argument_value(1, output.address()).unwrap();

        let list = npu_driver::CommandList::new(Arc::clone(&driver), graph.queue_group_ordinal(), false)
            .unwrap();
        list.append_graph_execute(graph.handle().unwrap(), None).unwrap();
        list.close().unwrap();
        let queue = graph.command_queue().unwrap();
        let fence = npu_driver::Fence::new(Arc::clone(&driver), queue).unwrap();
        queue.execute(&list, Some(&fence)).unwrap();
        fence.host_synchronize(npu_driver::WAIT_FOREVER).unwrap();
        assert_eq!(output.to_vec().unwrap(), vec![11, 21, 31, 41]);
    }
}
