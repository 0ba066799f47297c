// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # npu-compiler
//!
//! The compiler service the runtime talks to, and the ways of obtaining one.
//!
//! - [`CompilerService`] is the contract: single compilation, three
//!   weight-separated compilation protocols, blob parsing, operation
//!   queries and profiling post-processing.
//! - [`CompilerLibrary`] loads a service from a shared library exporting
//!   `CreateNPUCompiler`; [`export_compiler!`] produces that symbol.
//! - [`ReferenceCompiler`] is an in-process service emitting blobs for the
//!   simulated device.

mod artifact;
mod error;
mod loader;
mod reference;
mod service;

pub use artifact::{CompiledArtifact, StageKind, INIT_PREFIX, MAIN_PREFIX};
pub use error::{CompilerError, CompilerResult};
pub use loader::{
    compiler_library_path, CompilerLibrary, CreateCompilerFn, COMPILER_LIBRARY_BASE_NAME,
    CREATE_COMPILER_SYMBOL,
};
pub use reference::ReferenceCompiler;
pub use service::{CompilerService, SupportedOps};
