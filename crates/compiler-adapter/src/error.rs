// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the compiler adapter.

use npu_common::CompilerType;
use npu_compiler::CompilerError;
use npu_driver::DriverError;
use npu_graph::GraphError;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The compiler returned a stage whose name breaks the protocol.
    #[error("unexpected network name '{name}', expected a {expected} stage")]
    UnexpectedArtifactName { name: String, expected: &'static str },

    #[error("invalid SEPARATE_WEIGHTS_VERSION {0}, expected 1, 2 or 3")]
    InvalidSeparateWeightsVersion(u32),

    #[error("weight-separated compilation produced no main stage")]
    MissingMainStage,

    #[error("weight-separated compilation produced no init stage")]
    MissingInitStage,

    /// No compiler is available for the configured `COMPILER_TYPE`.
    #[error("no compiler available for COMPILER_TYPE {0:?}")]
    CompilerUnavailable(CompilerType),

    #[error(transparent)]
    Compiler(#[from] CompilerError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

pub type AdapterResult<T> = Result<T, AdapterError>;
