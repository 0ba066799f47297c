// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! An in-process compiler producing blobs for the simulated device.
//!
//! The reference compiler does no optimisation. It lays out a model's
//! arguments the way the device will see them, records the operation list
//! for profiling, and supports all three weight-separation protocols with a
//! configurable number of init stages.
//!
//! Blob payload: `[metadata length: u32 LE][NetworkMetadata JSON][weights]`.
//! Weight-separated main stages carry no weights.

use crate::{
    CompiledArtifact, CompilerError, CompilerResult, CompilerService, SupportedOps, INIT_PREFIX,
    MAIN_PREFIX,
};
use npu_common::{
    ArgumentMetadata, BatchMode, ElementType, ExecStatus, IoDescriptor, Model, NetworkMetadata,
    NpuConfig, Operation, ProfilingEntry, Shape,
};
use npu_driver::sim::{SimBlob, SimGraphDesc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Operation types the simulated device executes.
const SUPPORTED_OP_TYPES: &[&str] = &[
    "Add",
    "Concat",
    "Convolution",
    "MatMul",
    "Multiply",
    "Relu",
    "Reshape",
    "Softmax",
];

/// Annotation written into a model once a weight-separated stage has been
/// carved out of it.
const STAGE_ANNOTATION: &str = "weights_separated_stage";

const DEVICE_NAME: &str = "NPU";

#[derive(Debug)]
pub struct ReferenceCompiler {
    init_stages: usize,
    bias: u8,
    /// Next v2 stage per model name.
    v2_cursor: Mutex<HashMap<String, usize>>,
}

impl Default for ReferenceCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceCompiler {
    /// Interface version, 5.1.
    pub const VERSION: u32 = (5 << 16) | 1;

    pub fn new() -> Self {
        Self {
            init_stages: 1,
            bias: 1,
            v2_cursor: Mutex::new(HashMap::new()),
        }
    }

    /// Number of init stages produced by weight-separated compilation.
    pub fn with_init_stages(mut self, count: usize) -> Self {
        self.init_stages = count;
        self
    }

    /// Value the compiled kernels add to every element.
    pub fn with_bias(mut self, bias: u8) -> Self {
        self.bias = bias;
        self
    }

    fn main_stage(
        &self,
        model: &Model,
        config: &NpuConfig,
        name: String,
        with_weights: bool,
    ) -> CompilerResult<CompiledArtifact> {
        model.validate()?;
        let reshape = plugin_batch(model, config).is_some();

        let io = |arg: &ArgumentMetadata| {
            let compiled = if reshape {
                arg.shape.with_batch(1)
            } else {
                arg.shape.clone()
            };
            (
                IoDescriptor {
                    name: arg.name.clone(),
                    element_type: arg.element_type,
                    shape_from_model: arg.shape.clone(),
                    shape_from_compiler: compiled.clone(),
                },
                ArgumentMetadata {
                    shape: compiled,
                    ..arg.clone()
                },
            )
        };
        let (inputs, mut arguments): (Vec<_>, Vec<_>) = model.inputs.iter().map(&io).unzip();
        let (outputs, output_args): (Vec<_>, Vec<_>) = model.outputs.iter().map(&io).unzip();
        arguments.extend(output_args);

        let metadata = NetworkMetadata {
            name,
            inputs,
            outputs,
        };
        let weights = if with_weights {
            model
                .constants
                .iter()
                .flat_map(|c| c.data.iter().copied())
                .collect()
        } else {
            Vec::new()
        };
        self.emit(metadata, arguments, model.operations.clone(), self.bias, weights)
    }

    fn init_stage(&self, model: &Model, index: usize) -> CompilerResult<CompiledArtifact> {
        model.validate()?;
        let len = model.weights_size_bytes().max(1);
        let input = ArgumentMetadata::input("weights", ElementType::U8, Shape::new(vec![len]));
        let output =
            ArgumentMetadata::output("weights_prepared", ElementType::U8, Shape::new(vec![len]));
        let descriptor = |arg: &ArgumentMetadata| IoDescriptor {
            name: arg.name.clone(),
            element_type: arg.element_type,
            shape_from_model: arg.shape.clone(),
            shape_from_compiler: arg.shape.clone(),
        };
        let metadata = NetworkMetadata {
            name: format!("{INIT_PREFIX}_{index}_{}", model.name),
            inputs: vec![descriptor(&input)],
            outputs: vec![descriptor(&output)],
        };
        let operations = model
            .constants
            .iter()
            .map(|c| Operation {
                name: format!("{}/prepare", c.name),
                op_type: "Convert".into(),
            })
            .collect();
        self.emit(metadata, vec![input, output], operations, 0, Vec::new())
    }

    /// Stage `stage` of a weight-separated compilation: init stages first,
    /// then the main stage, then nothing.
    fn stage(&self, model: &Model, config: &NpuConfig, stage: usize) -> CompilerResult<Option<CompiledArtifact>> {
        if stage < self.init_stages {
            self.init_stage(model, stage).map(Some)
        } else if stage == self.init_stages {
            self.main_stage(model, config, format!("{MAIN_PREFIX}_{}", model.name), false)
                .map(Some)
        } else {
            Ok(None)
        }
    }

    fn emit(
        &self,
        metadata: NetworkMetadata,
        arguments: Vec<ArgumentMetadata>,
        operations: Vec<Operation>,
        bias: u8,
        weights: Vec<u8>,
    ) -> CompilerResult<CompiledArtifact> {
        let compile_error = |detail: String| CompilerError::Compilation {
            model: metadata.name.clone(),
            detail,
        };
        let meta = serde_json::to_vec(&metadata).map_err(|e| compile_error(e.to_string()))?;
        let meta_len = u32::try_from(meta.len())
            .map_err(|_| compile_error("metadata too large".into()))?;

        let mut payload = Vec::with_capacity(4 + meta.len() + weights.len());
        payload.extend_from_slice(&meta_len.to_le_bytes());
        payload.extend_from_slice(&meta);
        payload.extend_from_slice(&weights);

        let blob = SimBlob::new(
            SimGraphDesc {
                name: metadata.name.clone(),
                arguments,
                operations,
                bias,
            },
            payload,
        )
        .encode()
        .map_err(|e| compile_error(e.to_string()))?;

        tracing::debug!("Emitted '{}' ({} bytes)", metadata.name, blob.len());
        Ok(CompiledArtifact::new(blob, metadata))
    }
}

/// Batch the runtime will split across streams, if any.
fn plugin_batch(model: &Model, config: &NpuConfig) -> Option<usize> {
    if config.batch_mode == BatchMode::Compiler {
        return None;
    }
    let batch = model.inputs.first()?.shape.batch()?;
    let shared = model
        .inputs
        .iter()
        .chain(model.outputs.iter())
        .all(|a| a.shape.batch() == Some(batch));
    (batch > 1 && shared).then_some(batch)
}

fn decode_metadata(blob: &[u8]) -> CompilerResult<(SimBlob, NetworkMetadata)> {
    let decoded = SimBlob::decode(blob).map_err(|e| CompilerError::Parse(e.to_string()))?;
    let payload = &decoded.payload;
    if payload.len() < 4 {
        return Err(CompilerError::Parse("payload too short".into()));
    }
    let len = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let meta = payload
        .get(4..4 + len)
        .ok_or_else(|| CompilerError::Parse("truncated metadata".into()))?;
    let metadata = serde_json::from_slice(meta).map_err(|e| CompilerError::Parse(e.to_string()))?;
    Ok((decoded, metadata))
}

impl CompilerService for ReferenceCompiler {
    fn get_version(&self) -> u32 {
        Self::VERSION
    }

    fn compile(&self, model: &Model, config: &NpuConfig) -> CompilerResult<CompiledArtifact> {
        self.main_stage(model, config, model.name.clone(), true)
    }

    fn compile_ws_v1(
        &self,
        model: &Model,
        config: &NpuConfig,
    ) -> CompilerResult<Vec<CompiledArtifact>> {
        (0..=self.init_stages)
            .filter_map(|stage| self.stage(model, config, stage).transpose())
            .collect()
    }

    fn compile_ws_v2(
        &self,
        model: &Model,
        config: &NpuConfig,
    ) -> CompilerResult<Option<CompiledArtifact>> {
        let stage = {
            let mut cursor = self
                .v2_cursor
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let next = cursor.entry(model.name.clone()).or_insert(0);
            let stage = *next;
            if stage >= self.init_stages {
                // Main stage or past it: the sequence starts over next time.
                cursor.remove(&model.name);
            } else {
                *next += 1;
            }
            stage
        };
        self.stage(model, config, stage)
    }

    fn compile_ws_v3(
        &self,
        model: &mut Model,
        config: &NpuConfig,
        stage: usize,
    ) -> CompilerResult<Option<CompiledArtifact>> {
        if let Some(previous) = model.rt_info.get(STAGE_ANNOTATION) {
            return Err(CompilerError::Compilation {
                model: model.name.clone(),
                detail: format!("model was already rewritten by stage {previous}"),
            });
        }
        let artifact = self.stage(model, config, stage)?;
        if artifact.is_some() {
            model
                .rt_info
                .insert(STAGE_ANNOTATION.to_string(), stage.to_string());
        }
        Ok(artifact)
    }

    fn parse(&self, blob: &[u8], _config: &NpuConfig) -> CompilerResult<NetworkMetadata> {
        decode_metadata(blob).map(|(_, metadata)| metadata)
    }

    fn query(&self, model: &Model, _config: &NpuConfig) -> CompilerResult<SupportedOps> {
        Ok(model
            .operations
            .iter()
            .filter(|op| SUPPORTED_OP_TYPES.contains(&op.op_type.as_str()))
            .map(|op| (op.name.clone(), DEVICE_NAME.to_string()))
            .collect())
    }

    fn process_profiling_output(
        &self,
        raw: &[u8],
        blob: &[u8],
        _config: &NpuConfig,
    ) -> CompilerResult<Vec<ProfilingEntry>> {
        let (decoded, _) = decode_metadata(blob)?;
        let operations = &decoded.desc.operations;
        if raw.len() != operations.len() * 8 {
            return Err(CompilerError::Profiling(format!(
                "{} bytes of profiling data for {} operations",
                raw.len(),
                operations.len()
            )));
        }

        Ok(operations
            .iter()
            .zip(raw.chunks_exact(8))
            .map(|(op, ticks)| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(ticks);
                ProfilingEntry {
                    node_name: op.name.clone(),
                    node_type: op.op_type.clone(),
                    exec_type: "SIM_KERNEL".into(),
                    status: ExecStatus::Executed,
                    real_time: Duration::from_nanos(u64::from_le_bytes(bytes)),
                    cpu_time: Duration::ZERO,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StageKind;
    use npu_common::Constant;

    fn model(batch: usize) -> Model {
        let mut model = Model::new("tiny");
        model.inputs.push(ArgumentMetadata::input(
            "x",
            ElementType::U8,
            Shape::new(vec![batch, 8]),
        ));
        model.outputs.push(ArgumentMetadata::output(
            "y",
            ElementType::U8,
            Shape::new(vec![batch, 8]),
        ));
        model.operations.push(Operation {
            name: "add".into(),
            op_type: "Add".into(),
        });
        model.operations.push(Operation {
            name: "custom".into(),
            op_type: "CustomOp".into(),
        });
        model.constants.push(Constant {
            name: "bias".into(),
            element_type: ElementType::U8,
            shape: Shape::new(vec![8]),
            data: vec![1; 8],
        });
        model
    }

    #[test]
    fn test_compile_then_parse_recovers_metadata() {
        let compiler = ReferenceCompiler::new();
        let config = NpuConfig::default();
        let artifact = compiler.compile(&model(1), &config).unwrap();
        assert_eq!(artifact.name(), "tiny");
        let parsed = compiler.parse(&artifact.compiled_binary, &config).unwrap();
        assert_eq!(parsed, artifact.metadata);
    }

    #[test]
    fn test_plugin_batching_compiles_for_batch_one() {
        let compiler = ReferenceCompiler::new();
        let artifact = compiler.compile(&model(4), &NpuConfig::default()).unwrap();
        assert_eq!(artifact.metadata.batch_size(), Some(4));
        assert_eq!(artifact.metadata.inputs[0].shape_from_compiler.dims(), &[1, 8]);

        let mut config = NpuConfig::default();
        config.batch_mode = BatchMode::Compiler;
        let artifact = compiler.compile(&model(4), &config).unwrap();
        assert_eq!(artifact.metadata.batch_size(), None);
    }

    #[test]
    fn test_v1_returns_inits_then_main() {
        let compiler = ReferenceCompiler::new().with_init_stages(2);
        let stages = compiler
            .compile_ws_v1(&model(1), &NpuConfig::default())
            .unwrap();
        let kinds: Vec<_> = stages.iter().map(|a| a.stage()).collect();
        assert_eq!(kinds, vec![StageKind::Init, StageKind::Init, StageKind::Main]);
    }

    #[test]
    fn test_v2_pulls_until_exhausted_then_restarts() {
        let compiler = ReferenceCompiler::new().with_init_stages(2);
        let config = NpuConfig::default();
        let m = model(1);
        let names: Vec<String> = std::iter::from_fn(|| compiler.compile_ws_v2(&m, &config).unwrap())
            .take(5)
            .map(|a| a.name().to_string())
            .collect();
        // The main stage resets the cursor, so the sequence repeats.
        assert_eq!(names[0], "init_0_tiny");
        assert_eq!(names[1], "init_1_tiny");
        assert_eq!(names[2], "main_tiny");
        assert_eq!(names[3], "init_0_tiny");
    }

    #[test]
    fn test_v3_rejects_rewritten_model() {
        let compiler = ReferenceCompiler::new();
        let config = NpuConfig::default();
        let mut m = model(1);
        let init = compiler.compile_ws_v3(&mut m, &config, 0).unwrap().unwrap();
        assert_eq!(init.stage(), StageKind::Init);
        assert!(compiler.compile_ws_v3(&mut m, &config, 1).is_err());

        let mut pristine = model(1);
        let main = compiler
            .compile_ws_v3(&mut pristine, &config, 1)
            .unwrap()
            .unwrap();
        assert_eq!(main.stage(), StageKind::Main);

        let mut past_end = model(1);
        assert!(compiler
            .compile_ws_v3(&mut past_end, &config, 2)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_query_lists_supported_operations() {
        let compiler = ReferenceCompiler::new();
        let supported = compiler.query(&model(1), &NpuConfig::default()).unwrap();
        assert_eq!(supported.len(), 1);
        assert_eq!(supported["add"], "NPU");
    }

    #[test]
    fn test_profiling_output_maps_ticks_to_operations() {
        let compiler = ReferenceCompiler::new();
        let config = NpuConfig::default();
        let artifact = compiler.compile(&model(1), &config).unwrap();
        let mut raw = Vec::new();
        raw.extend_from_slice(&1_500u64.to_le_bytes());
        raw.extend_from_slice(&250u64.to_le_bytes());

        let entries = compiler
            .process_profiling_output(&raw, &artifact.compiled_binary, &config)
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].node_name, "add");
        assert_eq!(entries[1].real_time, Duration::from_nanos(250));

        assert!(compiler
            .process_profiling_output(&raw[..8], &artifact.compiled_binary, &config)
            .is_err());
    }

    #[test]
    fn test_parse_rejects_foreign_blob() {
        let compiler = ReferenceCompiler::new();
        assert!(matches!(
            compiler.parse(b"garbage", &NpuConfig::default()),
            Err(CompilerError::Parse(_))
        ));
    }
}
