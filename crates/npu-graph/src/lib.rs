// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # npu-graph
//!
//! [`CompiledGraph`] owns one compiled artifact for its whole life. Device
//! resources (the hardware graph handle and a dedicated command queue) are
//! acquired by [`CompiledGraph::initialize`], either at construction or
//! later, and torn down in a fixed order when the graph is dropped.
//!
//! The [`export`] module holds the on-disk container formats: the raw blob,
//! and the size-prefixed layouts that carry an init model and its compiled
//! init stages next to the main blob.

pub mod export;

mod error;
mod graph;

pub use error::{GraphError, GraphResult};
pub use export::{blob_hash, ExportContainer};
pub use graph::{ArgumentDescriptor, CompiledGraph};
