// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Compiled artifacts and their stage classification.

use npu_common::NetworkMetadata;

/// Name prefix of weight-initialisation stages.
pub const INIT_PREFIX: &str = "init";
/// Name prefix of the inference stage.
pub const MAIN_PREFIX: &str = "main";

/// Role of an artifact in a weight-separated compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Init,
    Main,
    /// Neither prefix; only valid outside weight separation.
    Other,
}

impl StageKind {
    pub fn classify(name: &str) -> Self {
        if name.starts_with(INIT_PREFIX) {
            StageKind::Init
        } else if name.starts_with(MAIN_PREFIX) {
            StageKind::Main
        } else {
            StageKind::Other
        }
    }
}

/// A compiled binary plus the metadata the compiler reported for it.
///
/// Produced by a [`crate::CompilerService`] and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    pub compiled_binary: Vec<u8>,
    pub metadata: NetworkMetadata,
}

impl CompiledArtifact {
    pub fn new(compiled_binary: Vec<u8>, metadata: NetworkMetadata) -> Self {
        Self {
            compiled_binary,
            metadata,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn stage(&self) -> StageKind {
        StageKind::classify(self.name())
    }
}
