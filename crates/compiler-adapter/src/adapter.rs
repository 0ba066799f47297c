// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The compiler adapter.

use crate::{AdapterError, AdapterResult, StageArtifacts, WeightSeparationProtocol};
use npu_common::{Model, NpuConfig};
use npu_compiler::{CompiledArtifact, CompilerLibrary, CompilerService, SupportedOps};
use npu_driver::{Driver, GraphHandle};
use npu_graph::CompiledGraph;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Graphs for every stage of a weight-separated compilation.
#[derive(Debug)]
pub struct StageGraphs {
    pub init: Vec<CompiledGraph>,
    pub main: CompiledGraph,
}

/// Drives a [`CompilerService`] and wraps its artifacts in graphs.
///
/// Without a driver every graph is export-only.
#[derive(Debug, Clone)]
pub struct CompilerAdapter {
    compiler: Arc<dyn CompilerService>,
    driver: Option<Arc<dyn Driver>>,
}

impl CompilerAdapter {
    pub fn new(compiler: Arc<dyn CompilerService>, driver: Option<Arc<dyn Driver>>) -> Self {
        tracing::debug!("Initializing compiler adapter");
        if let Some(driver) = &driver {
            let (major, minor) = driver.graph_ext_version();
            tracing::info!("Compiler adapter ready, using graph extension {major}.{minor}");
        }
        Self { compiler, driver }
    }

    /// Loads the compiler from the shared library at `path`. Failure to
    /// load the library or its factory symbol is fatal.
    pub fn load(path: &Path, driver: Option<Arc<dyn Driver>>) -> AdapterResult<Self> {
        tracing::info!("MLIR compiler will be used");
        // SAFETY: the library is the runtime's own compiler build, installed
        // next to the runtime and exporting the factory symbol.
        let library = unsafe { CompilerLibrary::load(path)? };
        Ok(Self::new(Arc::new(library), driver))
    }

    /// Compiles `model` into a single graph.
    pub fn compile(&self, model: &Model, config: &NpuConfig) -> AdapterResult<CompiledGraph> {
        tracing::debug!("compile start");
        let artifact = self.compiler.compile(model, config)?;
        tracing::debug!("compile end");
        self.into_graph(artifact, config)
    }

    /// Weight-separated compilation with the graph sequence the runtime has
    /// always returned: every stage for version 1, and for versions 2 and 3
    /// only the first init stage followed by the main stage.
    pub fn compile_weight_separated(
        &self,
        model: &Model,
        config: &NpuConfig,
    ) -> AdapterResult<Vec<CompiledGraph>> {
        let protocol = WeightSeparationProtocol::from_version(config.separate_weights_version)?;
        let StageArtifacts { init, main } = self.compile_stages(protocol, model, config)?;

        let init = match protocol {
            WeightSeparationProtocol::AllAtOnce => init,
            _ => {
                if init.len() > 1 {
                    tracing::debug!(
                        "Keeping the first of {} init stages; use compile_weight_separated_stages for all",
                        init.len()
                    );
                }
                let first = init.into_iter().next().ok_or(AdapterError::MissingInitStage)?;
                vec![first]
            }
        };

        let mut graphs = Vec::with_capacity(init.len() + 1);
        for artifact in init.into_iter().chain(std::iter::once(main)) {
            graphs.push(self.into_graph(artifact, config)?);
        }
        Ok(graphs)
    }

    /// Weight-separated compilation keeping every init stage.
    pub fn compile_weight_separated_stages(
        &self,
        model: &Model,
        config: &NpuConfig,
    ) -> AdapterResult<StageGraphs> {
        let protocol = WeightSeparationProtocol::from_version(config.separate_weights_version)?;
        let StageArtifacts { init, main } = self.compile_stages(protocol, model, config)?;
        let init = init
            .into_iter()
            .map(|artifact| self.into_graph(artifact, config))
            .collect::<AdapterResult<Vec<_>>>()?;
        let main = self.into_graph(main, config)?;
        Ok(StageGraphs { init, main })
    }

    /// Rebuilds a graph from a compiled blob.
    pub fn parse(&self, blob: Vec<u8>, config: &NpuConfig) -> AdapterResult<CompiledGraph> {
        tracing::debug!("parse start");
        let metadata = self.compiler.parse(&blob, config)?;
        tracing::debug!("parse end");

        let handle = match &self.driver {
            Some(driver) => Some(driver.create_graph(&blob)?),
            None => None,
        };
        Ok(CompiledGraph::new(
            self.driver.clone(),
            Arc::clone(&self.compiler),
            handle,
            CompiledArtifact::new(blob, metadata),
            config,
        )?)
    }

    pub fn query(&self, model: &Model, config: &NpuConfig) -> AdapterResult<SupportedOps> {
        Ok(self.compiler.query(model, config)?)
    }

    pub fn get_version(&self) -> u32 {
        self.compiler.get_version()
    }

    pub fn compiler(&self) -> &Arc<dyn CompilerService> {
        &self.compiler
    }

    pub fn driver(&self) -> Option<&Arc<dyn Driver>> {
        self.driver.as_ref()
    }

    fn compile_stages(
        &self,
        protocol: WeightSeparationProtocol,
        model: &Model,
        config: &NpuConfig,
    ) -> AdapterResult<StageArtifacts> {
        let started = Instant::now();
        tracing::debug!("compile start (weights separation v{})", protocol.version());
        let stages = protocol.run(self.compiler.as_ref(), model, config)?;
        tracing::debug!("compile end");
        tracing::info!(
            "Compile net time: {} ms ({} init stages)",
            started.elapsed().as_millis(),
            stages.init.len()
        );
        Ok(stages)
    }

    fn into_graph(
        &self,
        artifact: CompiledArtifact,
        config: &NpuConfig,
    ) -> AdapterResult<CompiledGraph> {
        let handle = self.graph_handle(&artifact);
        Ok(CompiledGraph::new(
            self.driver.clone(),
            Arc::clone(&self.compiler),
            handle,
            artifact,
            config,
        )?)
    }

    /// Loads the artifact on the device, or leaves it export-only.
    fn graph_handle(&self, artifact: &CompiledArtifact) -> Option<GraphHandle> {
        let driver = self.driver.as_ref()?;
        match driver.create_graph(&artifact.compiled_binary) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::info!(
                    "Failed to obtain the graph handle for '{}' ({e}). Inference requests for this model are not allowed, only exports are available",
                    artifact.name()
                );
                None
            }
        }
    }
}
