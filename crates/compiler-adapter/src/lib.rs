// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # compiler-adapter
//!
//! [`CompilerAdapter`] resolves a compilation request into
//! [`CompiledGraph`](npu_graph::CompiledGraph)s, whatever weight-separation
//! protocol the loaded compiler speaks. Handle acquisition failures never
//! abort a compilation: the affected graph is returned export-only.
//!
//! [`CompilerAdapterFactory`] picks the compiler from `COMPILER_TYPE` and
//! attaches the device only when it can load graphs.

mod adapter;
mod error;
mod factory;
mod weights;

pub use adapter::{CompilerAdapter, StageGraphs};
pub use error::{AdapterError, AdapterResult};
pub use factory::CompilerAdapterFactory;
pub use weights::{StageArtifacts, WeightSeparationProtocol};
