// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for compiler service calls.

use npu_common::CommonError;

#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    /// The compiler library could not be opened.
    #[error("failed to load compiler library '{path}': {detail}")]
    LibraryLoad { path: String, detail: String },

    /// The compiler library does not export the factory symbol.
    #[error("compiler library '{path}' has no usable '{symbol}' symbol: {detail}")]
    SymbolLoad {
        path: String,
        symbol: String,
        detail: String,
    },

    /// The service rejected or failed to compile the model.
    #[error("compilation of '{model}' failed: {detail}")]
    Compilation { model: String, detail: String },

    /// A blob could not be parsed by the service.
    #[error("failed to parse compiled blob: {0}")]
    Parse(String),

    /// Raw profiling data did not match the compiled blob.
    #[error("failed to process profiling output: {0}")]
    Profiling(String),

    /// The service does not implement the requested entry point.
    #[error("compiler does not support {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Common(#[from] CommonError),
}

pub type CompilerResult<T> = Result<T, CompilerError>;
