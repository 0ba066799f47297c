// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! Executes compiled NPU graphs.
//!
//! The runtime takes:
//! - A [`CompiledGraph`](npu_graph::CompiledGraph) from `compiler-adapter`.
//! - Device buffers for its inputs and outputs.
//! - Optional [`ProfilingResources`].
//!
//! And drives the graph through an [`ExecutionPipeline`]: one command list
//! per stream, submitted with [`push`](ExecutionPipeline::push), waited on
//! with [`pull`](ExecutionPipeline::pull) and rearmed with
//! [`reset`](ExecutionPipeline::reset).
//!
//! # Type-State Sessions
//! [`InferenceSession`] wraps the whole flow:
//! ```text
//! InferenceSession<Idle> → InferenceSession<Compiled> → InferenceSession<Ready>
//! ```
//! Transitions are compile-time checked.
//!
//! # Concurrency
//! A session hands out further [`InferRequest`]s on the same graph. Each
//! request owns its pipeline and buffers and can run on its own thread; the
//! graph's command queue is shared.

mod config;
mod error;
mod metrics;
mod pipeline;
mod profiling;
mod request;
mod session;

#[cfg(test)]
mod test_support;

pub use config::RuntimeConfig;
pub use error::{RuntimeError, RuntimeResult};
pub use metrics::{InferenceMetrics, StreamMetrics};
pub use pipeline::{ExecutionPipeline, StreamState, StreamTiming};
pub use profiling::{ProfilingResources, StreamTimestamps, TIMESTAMP_BYTES};
pub use request::{InferRequest, InferenceOutput};
pub use session::{Compiled, Idle, InferenceSession, Ready, SessionState};
