// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! One inference request: device buffers plus the pipeline bound to them.

use crate::{
    ExecutionPipeline, InferenceMetrics, ProfilingResources, RuntimeConfig, RuntimeError,
    RuntimeResult,
};
use npu_common::NpuConfig;
use npu_driver::DeviceBuffer;
use npu_graph::{ArgumentDescriptor, CompiledGraph, GraphError};
use std::sync::Arc;
use std::time::Instant;

/// The result of a single inference.
#[derive(Debug)]
pub struct InferenceOutput {
    /// Output tensors in declaration order.
    pub outputs: Vec<Vec<u8>>,
    pub metrics: InferenceMetrics,
}

/// Buffers sized for the whole request and a pipeline splitting them across
/// streams. Requests built from the same graph can run concurrently.
#[derive(Debug)]
pub struct InferRequest {
    pipeline: ExecutionPipeline,
    inputs: Vec<DeviceBuffer>,
    outputs: Vec<DeviceBuffer>,
    config: NpuConfig,
}

impl InferRequest {
    pub fn new(graph: Arc<CompiledGraph>, config: &RuntimeConfig) -> RuntimeResult<Self> {
        let Some(driver) = graph.driver().cloned().filter(|_| !graph.is_export_only()) else {
            return Err(GraphError::Config(format!(
                "'{}' has no device graph; only export is available",
                graph.metadata().name
            ))
            .into());
        };
        let stream_count = config.resolve_stream_count(graph.batch_size())?;

        let allocate = |descriptors: &[ArgumentDescriptor]| {
            descriptors
                .iter()
                .map(|d| {
                    DeviceBuffer::new(Arc::clone(&driver), d.properties.size_bytes() * stream_count)
                })
                .collect::<Result<Vec<_>, _>>()
        };
        let inputs = allocate(graph.input_descriptors())?;
        let outputs = allocate(graph.output_descriptors())?;

        let profiling =
            ProfilingResources::new(&graph, &config.npu, config.timestamps, stream_count)?;
        let input_tensors: Vec<_> = inputs.iter().map(DeviceBuffer::tensor_data).collect();
        let output_tensors: Vec<_> = outputs.iter().map(DeviceBuffer::tensor_data).collect();
        let pipeline = ExecutionPipeline::new(
            &config.npu,
            graph,
            profiling,
            &input_tensors,
            &output_tensors,
            stream_count,
        )?
        .with_wait_timeout(config.wait_timeout());

        Ok(Self {
            pipeline,
            inputs,
            outputs,
            config: config.npu.clone(),
        })
    }

    /// Expected byte size of every input, in declaration order.
    pub fn input_sizes(&self) -> Vec<usize> {
        self.inputs.iter().map(DeviceBuffer::size).collect()
    }

    pub fn output_sizes(&self) -> Vec<usize> {
        self.outputs.iter().map(DeviceBuffer::size).collect()
    }

    pub fn pipeline(&self) -> &ExecutionPipeline {
        &self.pipeline
    }

    /// Copies `inputs` in, runs every stream and copies the outputs back.
    pub fn infer(&mut self, inputs: &[&[u8]]) -> RuntimeResult<InferenceOutput> {
        let started = Instant::now();
        let graph = Arc::clone(self.pipeline.graph());
        let mut metrics = InferenceMetrics::new(self.pipeline.stream_count());

        if !self.pipeline.is_idle() {
            // A previous run failed while waiting; finish it before reusing the streams.
            self.pipeline.pull()?;
            self.pipeline.reset()?;
        }

        if inputs.len() != self.inputs.len() {
            return Err(RuntimeError::ConfigError(format!(
                "'{}' takes {} inputs, got {}",
                graph.metadata().name,
                self.inputs.len(),
                inputs.len()
            )));
        }
        for ((buffer, data), descriptor) in self
            .inputs
            .iter()
            .zip(inputs)
            .zip(graph.input_descriptors())
        {
            if data.len() != buffer.size() {
                return Err(RuntimeError::TensorSizeMismatch {
                    name: descriptor.properties.name.clone(),
                    expected: buffer.size(),
                    actual: data.len(),
                });
            }
            buffer.write(data)?;
        }
        metrics.input_copy_duration = started.elapsed();

        self.pipeline.push()?;
        self.pipeline.pull()?;
        metrics.record_streams(&self.pipeline.timings());
        if let Some(raw) = self.pipeline.profiling().query_data()? {
            metrics.operations = graph.process_profiling_output(&raw, &self.config)?;
        }

        let copy_started = Instant::now();
        let outputs = self
            .outputs
            .iter()
            .map(DeviceBuffer::to_vec)
            .collect::<Result<Vec<_>, _>>()?;
        metrics.output_copy_duration = copy_started.elapsed();

        self.pipeline.reset()?;
        metrics.finalise(started.elapsed());
        tracing::debug!("{}", metrics.summary());
        Ok(InferenceOutput { outputs, metrics })
    }
}
