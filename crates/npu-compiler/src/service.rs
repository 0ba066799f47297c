// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The compiler service contract.

use crate::{CompiledArtifact, CompilerResult};
use npu_common::{Model, NetworkMetadata, NpuConfig, ProfilingEntry};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Operation name to device name, as answered by [`CompilerService::query`].
pub type SupportedOps = BTreeMap<String, String>;

/// A model compiler.
///
/// One service instance is shared by every graph an adapter produces, so
/// the trait is object safe and methods take `&self`. The pull-style
/// weight-separated entry points keep their cursor internally.
pub trait CompilerService: Send + Sync + Debug {
    /// Version of the compiler interface, `major << 16 | minor`.
    fn get_version(&self) -> u32;

    /// Compiles `model` into a single artifact.
    fn compile(&self, model: &Model, config: &NpuConfig) -> CompilerResult<CompiledArtifact>;

    /// Weight-separated compilation, all stages at once. The last artifact
    /// is the main stage.
    fn compile_ws_v1(
        &self,
        model: &Model,
        config: &NpuConfig,
    ) -> CompilerResult<Vec<CompiledArtifact>>;

    /// Weight-separated compilation, one stage per call. Returns `None`
    /// once the sequence is exhausted.
    fn compile_ws_v2(
        &self,
        model: &Model,
        config: &NpuConfig,
    ) -> CompilerResult<Option<CompiledArtifact>>;

    /// Weight-separated compilation of stage `stage`. The service may
    /// rewrite `model` while doing so. Returns `None` past the last stage.
    fn compile_ws_v3(
        &self,
        model: &mut Model,
        config: &NpuConfig,
        stage: usize,
    ) -> CompilerResult<Option<CompiledArtifact>>;

    /// Recovers the metadata of a previously compiled blob.
    fn parse(&self, blob: &[u8], config: &NpuConfig) -> CompilerResult<NetworkMetadata>;

    /// Reports which operations of `model` the device can run.
    fn query(&self, model: &Model, config: &NpuConfig) -> CompilerResult<SupportedOps>;

    /// Maps raw device profiling data back to the operations of `blob`.
    fn process_profiling_output(
        &self,
        raw: &[u8],
        blob: &[u8],
        config: &NpuConfig,
    ) -> CompilerResult<Vec<ProfilingEntry>>;
}
