// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for compiled graph operations.

use npu_compiler::CompilerError;
use npu_driver::DriverError;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The graph has no device resources for the requested operation.
    #[error("configuration error: {0}")]
    Config(String),

    /// An export container did not match its expected layout.
    #[error("malformed export container: {0}")]
    Container(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Compiler(#[from] CompilerError),

    #[error(transparent)]
    Common(#[from] npu_common::CommonError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GraphResult<T> = Result<T, GraphError>;
