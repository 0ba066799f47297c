// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the runtime.

/// Errors raised while building or driving an execution pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// An operation was called on a stream in the wrong state.
    #[error("stream {stream}: cannot {operation} while {state}")]
    InvalidState {
        stream: usize,
        operation: &'static str,
        state: &'static str,
    },

    /// The pipeline or session was set up with inconsistent parameters.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A tensor handed to a session does not match the compiled argument.
    #[error("tensor '{name}' holds {actual} bytes, the graph expects {expected}")]
    TensorSizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// The device returned an error.
    #[error("device error: {0}")]
    Driver(#[from] npu_driver::DriverError),

    /// The compiled graph rejected the request.
    #[error("graph error: {0}")]
    Graph(#[from] npu_graph::GraphError),

    /// Compilation failed.
    #[error("compilation error: {0}")]
    Adapter(#[from] compiler_adapter::AdapterError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Common(#[from] npu_common::CommonError),
}

/// Convenience alias used across the runtime.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
