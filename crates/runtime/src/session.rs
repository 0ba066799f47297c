// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Inference sessions with a type-state enforced lifecycle.
//!
//! ```text
//! InferenceSession<Idle>
//!     │  .compile() / .compile_weight_separated() / .import() / .import_container()
//!     ▼
//! InferenceSession<Compiled>      export_blob / export_with_weights
//!     │  .prepare()
//!     ▼
//! InferenceSession<Ready>
//!     │  .run()
//!     ▼
//!   InferenceOutput
//! ```
//!
//! Each state transition consumes the old value and returns a new one,
//! making invalid state sequences a compile error.

use crate::{InferRequest, InferenceOutput, RuntimeConfig, RuntimeError, RuntimeResult};
use compiler_adapter::{CompilerAdapter, CompilerAdapterFactory};
use npu_common::Model;
use npu_driver::Driver;
use npu_graph::{CompiledGraph, ExportContainer};
use std::io::Write;
use std::sync::Arc;

// ── Type-state markers ─────────────────────────────────────────

/// Nothing compiled yet.
#[derive(Debug)]
pub struct Idle;

/// A main graph, and possibly init stages, are available.
#[derive(Debug)]
pub struct Compiled {
    graph: CompiledGraph,
    init_graphs: Vec<CompiledGraph>,
}

/// Device buffers and a pipeline are bound to the graph.
#[derive(Debug)]
pub struct Ready {
    request: InferRequest,
    graph: Arc<CompiledGraph>,
    init_graphs: Vec<CompiledGraph>,
}

/// Sealed trait for session states.
pub trait SessionState: std::fmt::Debug {}
impl SessionState for Idle {}
impl SessionState for Compiled {}
impl SessionState for Ready {}

// ── Session ────────────────────────────────────────────────────

/// Compiles or imports one model and runs inferences on it.
///
/// # Example
/// ```no_run
/// use compiler_adapter::CompilerAdapter;
/// use npu_compiler::ReferenceCompiler;
/// use npu_driver::sim::SimDriver;
/// use runtime::{InferenceSession, RuntimeConfig};
/// use std::sync::Arc;
///
/// # fn example(model: &npu_common::Model) -> Result<(), runtime::RuntimeError> {
/// let adapter = CompilerAdapter::new(
///     Arc::new(ReferenceCompiler::new()),
///     Some(Arc::new(SimDriver::new())),
/// );
/// let mut session = InferenceSession::new(RuntimeConfig::default(), adapter)
///     .compile(model)?
///     .prepare()?;
/// let output = session.run(&[&[0u8; 16]])?;
/// println!("{}", output.metrics.summary());
/// # Ok(())
/// # }
/// ```
pub struct InferenceSession<S: SessionState = Idle> {
    config: RuntimeConfig,
    adapter: CompilerAdapter,
    state: S,
}

// ── Idle → Compiled ────────────────────────────────────────────

impl InferenceSession<Idle> {
    pub fn new(config: RuntimeConfig, adapter: CompilerAdapter) -> Self {
        tracing::info!(
            "Session created, compiler version {:#x}",
            adapter.get_version()
        );
        Self {
            config,
            adapter,
            state: Idle,
        }
    }

    /// Picks the compiler from `COMPILER_TYPE` through `factory`. A
    /// configured `compiler_library_dir` replaces the factory's own.
    pub fn from_factory(
        config: RuntimeConfig,
        factory: &CompilerAdapterFactory,
        driver: Option<Arc<dyn Driver>>,
    ) -> RuntimeResult<Self> {
        let adapter = match &config.compiler_library_dir {
            Some(dir) => factory
                .clone()
                .with_library_dir(dir.clone())
                .create(&config.npu, driver)?,
            None => factory.create(&config.npu, driver)?,
        };
        Ok(Self::new(config, adapter))
    }

    /// Compiles `model` into a single graph.
    pub fn compile(self, model: &Model) -> RuntimeResult<InferenceSession<Compiled>> {
        let graph = self.adapter.compile(model, &self.config.npu)?;
        tracing::info!("Compiled '{}'", graph.metadata().name);
        Ok(self.into_compiled(graph, Vec::new()))
    }

    /// Weight-separated compilation keeping every init stage.
    pub fn compile_weight_separated(
        self,
        model: &Model,
    ) -> RuntimeResult<InferenceSession<Compiled>> {
        let stages = self
            .adapter
            .compile_weight_separated_stages(model, &self.config.npu)?;
        tracing::info!(
            "Compiled '{}' with {} init stages",
            stages.main.metadata().name,
            stages.init.len()
        );
        Ok(self.into_compiled(stages.main, stages.init))
    }

    /// Rebuilds the graph from a previously exported blob.
    pub fn import(self, blob: Vec<u8>) -> RuntimeResult<InferenceSession<Compiled>> {
        let graph = self.adapter.parse(blob, &self.config.npu)?;
        tracing::info!("Imported '{}'", graph.metadata().name);
        Ok(self.into_compiled(graph, Vec::new()))
    }

    /// Rebuilds the main graph and every init stage from a container.
    pub fn import_container(
        self,
        container: ExportContainer,
    ) -> RuntimeResult<InferenceSession<Compiled>> {
        let graph = self.adapter.parse(container.main_blob, &self.config.npu)?;
        let init_graphs = container
            .init_blobs
            .into_iter()
            .map(|blob| self.adapter.parse(blob, &self.config.npu))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!(
            "Imported '{}' with {} init stages",
            graph.metadata().name,
            init_graphs.len()
        );
        Ok(self.into_compiled(graph, init_graphs))
    }

    fn into_compiled(
        self,
        graph: CompiledGraph,
        init_graphs: Vec<CompiledGraph>,
    ) -> InferenceSession<Compiled> {
        InferenceSession {
            config: self.config,
            adapter: self.adapter,
            state: Compiled { graph, init_graphs },
        }
    }
}

// ── Compiled → Ready ───────────────────────────────────────────

impl InferenceSession<Compiled> {
    /// The main graph.
    pub fn graph(&self) -> &CompiledGraph {
        &self.state.graph
    }

    pub fn init_graphs(&self) -> &[CompiledGraph] {
        &self.state.init_graphs
    }

    /// Writes the main blob. Returns 0 if the writer failed.
    pub fn export_blob<W: Write>(&self, writer: &mut W) -> usize {
        self.state.graph.export_blob(writer)
    }

    /// Writes the main blob with the init stages and `init_model`. A single
    /// init stage uses the plain layout, several the split-init layout.
    pub fn export_with_weights<W: Write>(
        &self,
        writer: &mut W,
        init_model: &Model,
    ) -> RuntimeResult<usize> {
        let main = &self.state.graph;
        match self.state.init_graphs.as_slice() {
            [] => Err(RuntimeError::ConfigError(format!(
                "'{}' has no init stages to export",
                main.metadata().name
            ))),
            [init] => Ok(main.export_with_weights(writer, init, init_model)),
            several => {
                let init: Vec<&CompiledGraph> = several.iter().collect();
                Ok(main.export_with_weights_split_init(writer, &init, init_model))
            }
        }
    }

    /// Acquires any deferred device resources and binds buffers.
    pub fn prepare(self) -> RuntimeResult<InferenceSession<Ready>> {
        let Compiled {
            mut graph,
            init_graphs,
        } = self.state;
        if !graph.is_initialized() {
            graph.initialize(&self.config.npu)?;
        }
        let graph = Arc::new(graph);
        let request = InferRequest::new(Arc::clone(&graph), &self.config)?;
        tracing::info!(
            "Session ready: '{}' on {} streams",
            graph.metadata().name,
            request.pipeline().stream_count()
        );
        Ok(InferenceSession {
            config: self.config,
            adapter: self.adapter,
            state: Ready {
                request,
                graph,
                init_graphs,
            },
        })
    }
}

// ── Ready: run inference ───────────────────────────────────────

impl InferenceSession<Ready> {
    pub fn graph(&self) -> &Arc<CompiledGraph> {
        &self.state.graph
    }

    pub fn init_graphs(&self) -> &[CompiledGraph] {
        &self.state.init_graphs
    }

    /// The request [`run`](Self::run) uses.
    pub fn request(&self) -> &InferRequest {
        &self.state.request
    }

    /// Another request on the same graph, for concurrent inferences.
    pub fn create_request(&self) -> RuntimeResult<InferRequest> {
        InferRequest::new(Arc::clone(&self.state.graph), &self.config)
    }

    /// Runs one inference on `inputs`, given in declaration order.
    pub fn run(&mut self, inputs: &[&[u8]]) -> RuntimeResult<InferenceOutput> {
        self.state.request.infer(inputs)
    }
}

impl<S: SessionState> InferenceSession<S> {
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn adapter(&self) -> &CompilerAdapter {
        &self.adapter
    }
}

impl<S: SessionState> std::fmt::Debug for InferenceSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSession")
            .field("state", &std::any::type_name::<S>())
            .field("compiler_type", &self.config.npu.compiler_type)
            .field("compiler_version", &self.adapter.get_version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, SAMPLE_BYTES};
    use npu_compiler::ReferenceCompiler;
    use npu_driver::sim::SimDriver;
    use npu_graph::GraphError;

    fn session(config: RuntimeConfig, with_device: bool) -> InferenceSession<Idle> {
        let driver: Option<Arc<dyn Driver>> = if with_device {
            Some(Arc::new(SimDriver::new()))
        } else {
            None
        };
        let adapter = CompilerAdapter::new(Arc::new(ReferenceCompiler::new()), driver);
        InferenceSession::new(config, adapter)
    }

    #[test]
    fn test_idle_to_ready() {
        let mut ready = session(RuntimeConfig::default(), true)
            .compile(&test_support::model(1))
            .unwrap()
            .prepare()
            .unwrap();
        assert_eq!(ready.request().input_sizes(), vec![SAMPLE_BYTES]);

        let input: Vec<u8> = (0..SAMPLE_BYTES as u8).collect();
        let output = ready.run(&[&input]).unwrap();
        let expected: Vec<u8> = input.iter().map(|b| b + 1).collect();
        assert_eq!(output.outputs, vec![expected]);
        assert_eq!(output.metrics.stream_metrics.len(), 1);
    }

    #[test]
    fn test_batched_run_uses_one_stream_per_sample() {
        let mut ready = session(RuntimeConfig::default(), true)
            .compile(&test_support::model(3))
            .unwrap()
            .prepare()
            .unwrap();
        assert_eq!(ready.request().pipeline().stream_count(), 3);

        let input: Vec<u8> = (0..3 * SAMPLE_BYTES as u8).collect();
        let output = ready.run(&[&input]).unwrap();
        assert_eq!(output.outputs[0][SAMPLE_BYTES], input[SAMPLE_BYTES] + 1);
        assert_eq!(output.metrics.batch_size, 3);
    }

    #[test]
    fn test_run_rejects_wrong_input_size() {
        let mut ready = session(RuntimeConfig::default(), true)
            .compile(&test_support::model(1))
            .unwrap()
            .prepare()
            .unwrap();
        assert!(matches!(
            ready.run(&[&[1, 2, 3]]),
            Err(RuntimeError::TensorSizeMismatch { expected: 16, actual: 3, .. })
        ));
        assert!(matches!(ready.run(&[]), Err(RuntimeError::ConfigError(_))));
        // The pipeline was never submitted, so the session stays usable.
        ready.run(&[&[0; SAMPLE_BYTES]]).unwrap();
    }

    #[test]
    fn test_deferred_graph_initialized_on_prepare() {
        let mut config = RuntimeConfig::default();
        config.npu.defer_weights_load = true;
        let compiled = session(config, true)
            .compile(&test_support::model(1))
            .unwrap();
        assert!(!compiled.graph().is_initialized());
        let ready = compiled.prepare().unwrap();
        assert!(ready.graph().is_initialized());
    }

    #[test]
    fn test_export_only_session_cannot_prepare() {
        let compiled = session(RuntimeConfig::default(), false)
            .compile(&test_support::model(1))
            .unwrap();
        let mut blob = Vec::new();
        assert_eq!(compiled.export_blob(&mut blob), compiled.graph().blob().len());
        assert!(matches!(
            compiled.prepare(),
            Err(RuntimeError::Graph(GraphError::Config(_)))
        ));
    }

    #[test]
    fn test_import_round_trip() {
        let compiled = session(RuntimeConfig::default(), true)
            .compile(&test_support::model(1))
            .unwrap();
        let mut blob = Vec::new();
        compiled.export_blob(&mut blob);

        let mut ready = session(RuntimeConfig::default(), true)
            .import(blob)
            .unwrap()
            .prepare()
            .unwrap();
        let output = ready.run(&[&[9; SAMPLE_BYTES]]).unwrap();
        assert_eq!(output.outputs[0], vec![10; SAMPLE_BYTES]);
    }

    #[test]
    fn test_weight_separated_export_and_container_import() {
        let mut config = RuntimeConfig::default();
        config.npu.separate_weights_version = 2;
        let model = test_support::model(1);
        let compiled = session(config.clone(), true)
            .compile_weight_separated(&model)
            .unwrap();
        assert_eq!(compiled.init_graphs().len(), 1);

        let mut container = Vec::new();
        let written = compiled.export_with_weights(&mut container, &model).unwrap();
        assert_eq!(written, container.len());

        let parsed = ExportContainer::read_with_weights(&mut container.as_slice()).unwrap();
        let imported = session(config, true).import_container(parsed).unwrap();
        assert_eq!(imported.init_graphs().len(), 1);
        assert_eq!(imported.graph().blob(), compiled.graph().blob());
    }

    #[test]
    fn test_export_with_weights_needs_init_stage() {
        let model = test_support::model(1);
        let compiled = session(RuntimeConfig::default(), true)
            .compile(&model)
            .unwrap();
        assert!(matches!(
            compiled.export_with_weights(&mut Vec::new(), &model),
            Err(RuntimeError::ConfigError(_))
        ));
    }

    #[test]
    fn test_requests_share_the_graph() {
        let ready = session(RuntimeConfig::default(), true)
            .compile(&test_support::model(1))
            .unwrap()
            .prepare()
            .unwrap();
        let mut other = ready.create_request().unwrap();
        assert!(Arc::ptr_eq(other.pipeline().graph(), ready.graph()));
        let output = other.infer(&[&[1; SAMPLE_BYTES]]).unwrap();
        assert_eq!(output.outputs[0], vec![2; SAMPLE_BYTES]);
    }

    #[test]
    fn test_debug_format() {
        let idle = session(RuntimeConfig::default(), false);
        let debug = format!("{idle:?}");
        assert!(debug.contains("InferenceSession"));
        assert!(debug.contains("Idle"));
    }
}
