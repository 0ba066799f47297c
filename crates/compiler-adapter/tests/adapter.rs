// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! End-to-end adapter behaviour against scripted and reference compilers.

use compiler_adapter::{AdapterError, CompilerAdapter};
use npu_common::{
    ArgumentMetadata, ElementType, Model, NetworkMetadata, NpuConfig, Operation, ProfilingEntry,
    Shape,
};
use npu_compiler::{
    CompiledArtifact, CompilerError, CompilerResult, CompilerService, ReferenceCompiler,
    StageKind, SupportedOps,
};
use npu_driver::sim::SimDriver;
use npu_driver::{DeviceAddress, Driver};
use npu_graph::GraphError;
use std::sync::{Arc, Mutex};

fn model() -> Model {
    let mut model = Model::new("net");
    model.inputs.push(ArgumentMetadata::input(
        "x",
        ElementType::U8,
        Shape::new(vec![1, 16]),
    ));
    model.outputs.push(ArgumentMetadata::output(
        "y",
        ElementType::U8,
        Shape::new(vec![1, 16]),
    ));
    model.operations.push(Operation {
        name: "add".into(),
        op_type: "Add".into(),
    });
    model
}

fn config(version: u32) -> NpuConfig {
    NpuConfig {
        separate_weights_version: version,
        ..NpuConfig::default()
    }
}

/// Replays a fixed list of stage names. Names containing `broken` come
/// with a blob the device rejects.
#[derive(Debug)]
struct ScriptedCompiler {
    names: Vec<String>,
    template: CompiledArtifact,
    cursor: Mutex<usize>,
    saw_rewritten_model: Mutex<bool>,
}

impl ScriptedCompiler {
    fn new(names: &[&str]) -> Self {
        let template = ReferenceCompiler::new()
            .compile(&model(), &NpuConfig::default())
            .unwrap();
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            template,
            cursor: Mutex::new(0),
            saw_rewritten_model: Mutex::new(false),
        }
    }

    fn artifact(&self, name: &str) -> CompiledArtifact {
        let blob = if name.contains("broken") {
            b"not a loadable graph".to_vec()
        } else {
            self.template.compiled_binary.clone()
        };
        CompiledArtifact::new(
            blob,
            NetworkMetadata {
                name: name.to_string(),
                ..self.template.metadata.clone()
            },
        )
    }
}

impl CompilerService for ScriptedCompiler {
    fn get_version(&self) -> u32 {
        7
    }

    fn compile(&self, model: &Model, _config: &NpuConfig) -> CompilerResult<CompiledArtifact> {
        let name = self.names.last().ok_or_else(|| CompilerError::Compilation {
            model: model.name.clone(),
            detail: "nothing scripted".into(),
        })?;
        Ok(self.artifact(name))
    }

    fn compile_ws_v1(
        &self,
        _model: &Model,
        _config: &NpuConfig,
    ) -> CompilerResult<Vec<CompiledArtifact>> {
        Ok(self.names.iter().map(|n| self.artifact(n)).collect())
    }

    fn compile_ws_v2(
        &self,
        _model: &Model,
        _config: &NpuConfig,
    ) -> CompilerResult<Option<CompiledArtifact>> {
        let mut cursor = self.cursor.lock().unwrap();
        let next = self.names.get(*cursor).map(|n| self.artifact(n));
        *cursor += 1;
        Ok(next)
    }

    fn compile_ws_v3(
        &self,
        model: &mut Model,
        _config: &NpuConfig,
        stage: usize,
    ) -> CompilerResult<Option<CompiledArtifact>> {
        if model.rt_info.contains_key("rewritten") {
            *self.saw_rewritten_model.lock().unwrap() = true;
        }
        model.rt_info.insert("rewritten".into(), stage.to_string());
        Ok(self.names.get(stage).map(|n| self.artifact(n)))
    }

    fn parse(&self, _blob: &[u8], _config: &NpuConfig) -> CompilerResult<NetworkMetadata> {
        Ok(self.template.metadata.clone())
    }

    fn query(&self, _model: &Model, _config: &NpuConfig) -> CompilerResult<SupportedOps> {
        Ok(SupportedOps::new())
    }

    fn process_profiling_output(
        &self,
        _raw: &[u8],
        _blob: &[u8],
        _config: &NpuConfig,
    ) -> CompilerResult<Vec<ProfilingEntry>> {
        Ok(Vec::new())
    }
}

fn adapter(compiler: impl CompilerService + 'static) -> CompilerAdapter {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let driver: Arc<dyn Driver> = Arc::new(SimDriver::new());
    CompilerAdapter::new(Arc::new(compiler), Some(driver))
}

#[test]
fn test_v1_returns_every_stage_with_main_last() {
    let adapter = adapter(ScriptedCompiler::new(&["init_a", "init_b", "main"]));
    let graphs = adapter
        .compile_weight_separated(&model(), &config(1))
        .unwrap();
    assert_eq!(graphs.len(), 3);
    let last = graphs.last().unwrap();
    assert_eq!(StageKind::classify(&last.metadata().name), StageKind::Main);
    assert!(graphs.iter().all(|g| !g.is_export_only()));
}

#[test]
fn test_v1_rejects_sequence_not_ending_in_main() {
    let adapter = adapter(ScriptedCompiler::new(&["init_a", "main", "init_b"]));
    let err = adapter
        .compile_weight_separated(&model(), &config(1))
        .unwrap_err();
    match err {
        AdapterError::UnexpectedArtifactName { name, .. } => assert_eq!(name, "init_b"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_v2_returns_first_init_and_main() {
    let adapter = adapter(ScriptedCompiler::new(&["init_0", "init_1", "init_2", "main"]));
    let graphs = adapter
        .compile_weight_separated(&model(), &config(2))
        .unwrap();
    assert_eq!(graphs.len(), 2);
    assert_eq!(graphs[0].metadata().name, "init_0");
    assert_eq!(graphs[1].metadata().name, "main");
}

#[test]
fn test_v2_stages_keep_every_init() {
    let adapter = adapter(ScriptedCompiler::new(&["init_0", "init_1", "init_2", "main"]));
    let stages = adapter
        .compile_weight_separated_stages(&model(), &config(2))
        .unwrap();
    let names: Vec<_> = stages.init.iter().map(|g| g.metadata().name.clone()).collect();
    assert_eq!(names, vec!["init_0", "init_1", "init_2"]);
    assert_eq!(stages.main.metadata().name, "main");
}

#[test]
fn test_v2_rejects_unexpected_name() {
    let adapter = adapter(ScriptedCompiler::new(&["init_0", "weights", "main"]));
    assert!(matches!(
        adapter.compile_weight_separated(&model(), &config(2)),
        Err(AdapterError::UnexpectedArtifactName { .. })
    ));
}

#[test]
fn test_v2_without_main_stage() {
    let adapter = adapter(ScriptedCompiler::new(&["init_0", "init_1"]));
    assert!(matches!(
        adapter.compile_weight_separated(&model(), &config(2)),
        Err(AdapterError::MissingMainStage)
    ));
}

#[test]
fn test_v2_without_init_stage() {
    let adapter = adapter(ScriptedCompiler::new(&["main"]));
    assert!(matches!(
        adapter.compile_weight_separated(&model(), &config(2)),
        Err(AdapterError::MissingInitStage)
    ));
    // The full-sequence variant accepts a main stage on its own.
    let adapter = adapter_with_reference(0);
    let stages = adapter
        .compile_weight_separated_stages(&model(), &config(2))
        .unwrap();
    assert!(stages.init.is_empty());
}

#[test]
fn test_v3_uses_pristine_model_for_each_init() {
    let compiler = Arc::new(ScriptedCompiler::new(&["init_0", "init_1", "main"]));
    let driver: Arc<dyn Driver> = Arc::new(SimDriver::new());
    let adapter = CompilerAdapter::new(compiler.clone(), Some(driver));

    let graphs = adapter
        .compile_weight_separated(&model(), &config(3))
        .unwrap();
    assert_eq!(graphs.len(), 2);
    assert_eq!(graphs[1].metadata().name, "main");
    assert!(!*compiler.saw_rewritten_model.lock().unwrap());
}

#[test]
fn test_invalid_separate_weights_version() {
    let adapter = adapter(ScriptedCompiler::new(&["main"]));
    for version in [0, 4, 42] {
        assert!(matches!(
            adapter.compile_weight_separated(&model(), &config(version)),
            Err(AdapterError::InvalidSeparateWeightsVersion(v)) if v == version
        ));
    }
}

#[test]
fn test_handle_failure_leaves_graph_export_only() {
    let adapter = adapter(ScriptedCompiler::new(&["broken_net"]));
    let graph = adapter.compile(&model(), &NpuConfig::default()).unwrap();
    assert!(graph.is_export_only());

    let err = graph
        .set_argument_value(0, DeviceAddress(0x1000))
        .unwrap_err();
    assert!(matches!(err, GraphError::Config(_)));

    let mut out = Vec::new();
    assert_eq!(graph.export_blob(&mut out), graph.blob().len());
}

#[test]
fn test_handle_failure_is_per_artifact() {
    let adapter = adapter(ScriptedCompiler::new(&["init_broken", "init_ok", "main"]));
    let graphs = adapter
        .compile_weight_separated(&model(), &config(1))
        .unwrap();
    let export_only: Vec<bool> = graphs.iter().map(|g| g.is_export_only()).collect();
    assert_eq!(export_only, vec![true, false, false]);
}

#[test]
fn test_compile_failure_propagates() {
    let adapter = adapter(ScriptedCompiler::new(&[]));
    assert!(matches!(
        adapter.compile(&model(), &NpuConfig::default()),
        Err(AdapterError::Compiler(CompilerError::Compilation { .. }))
    ));
}

#[test]
fn test_without_driver_everything_is_export_only() {
    let adapter = CompilerAdapter::new(Arc::new(ReferenceCompiler::new()), None);
    let graph = adapter.compile(&model(), &NpuConfig::default()).unwrap();
    assert!(graph.is_export_only());
    let graph = adapter
        .parse(graph.blob().to_vec(), &NpuConfig::default())
        .unwrap();
    assert!(graph.is_export_only());
}

fn adapter_with_reference(init_stages: usize) -> CompilerAdapter {
    adapter(ReferenceCompiler::new().with_init_stages(init_stages))
}

#[test]
fn test_export_then_parse_reproduces_graph() {
    let adapter = adapter_with_reference(1);
    let config = NpuConfig::default();
    let original = adapter.compile(&model(), &config).unwrap();

    let mut exported = Vec::new();
    let written = original.export_blob(&mut exported);
    assert_eq!(written, exported.len());

    let parsed = adapter.parse(exported, &config).unwrap();
    assert_eq!(parsed.blob(), original.blob());
    assert_eq!(parsed.metadata(), original.metadata());
    assert_eq!(parsed.input_descriptors(), original.input_descriptors());
    assert_eq!(parsed.output_descriptors(), original.output_descriptors());
}

#[test]
fn test_parse_of_foreign_blob_fails() {
    let adapter = adapter_with_reference(1);
    assert!(adapter
        .parse(b"junk".to_vec(), &NpuConfig::default())
        .is_err());
}

#[test]
fn test_reference_compiler_across_versions() {
    let adapter = adapter_with_reference(2);
    let expected = [(1, 3), (2, 2), (3, 2)];
    for (version, count) in expected {
        let graphs = adapter
            .compile_weight_separated(&model(), &config(version))
            .unwrap();
        assert_eq!(graphs.len(), count, "version {version}");
        assert_eq!(graphs.last().unwrap().metadata().name, "main_net");
    }
}

#[test]
fn test_query_and_version_pass_through() {
    let adapter = adapter_with_reference(1);
    let supported = adapter.query(&model(), &NpuConfig::default()).unwrap();
    assert_eq!(supported.get("add").map(String::as_str), Some("NPU"));
    assert_eq!(adapter.get_version(), ReferenceCompiler::VERSION);
}
