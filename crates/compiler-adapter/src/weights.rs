// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Weight-separation protocols.
//!
//! A weight-separated compilation splits a model into init stages, which
//! prepare the weights once, and a main stage run for every inference.
//! Compilers expose this through one of three protocols, selected by
//! `SEPARATE_WEIGHTS_VERSION`:
//!
//! | Version | Shape of the exchange |
//! |---|---|
//! | 1 | one call returns every stage, main last |
//! | 2 | pull stages one at a time until main (or the end) |
//! | 3 | pull stage `i` explicitly, each init stage against a pristine model |

use crate::{AdapterError, AdapterResult};
use npu_common::{Model, NpuConfig};
use npu_compiler::{CompiledArtifact, CompilerService, StageKind};

/// Every stage of one weight-separated compilation.
#[derive(Debug, Clone)]
pub struct StageArtifacts {
    /// Init stages in the order the compiler produced them.
    pub init: Vec<CompiledArtifact>,
    pub main: CompiledArtifact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightSeparationProtocol {
    /// Version 1.
    AllAtOnce,
    /// Version 2.
    Pull,
    /// Version 3.
    PullFromPristineModel,
}

impl WeightSeparationProtocol {
    pub fn from_version(version: u32) -> AdapterResult<Self> {
        match version {
            1 => Ok(Self::AllAtOnce),
            2 => Ok(Self::Pull),
            3 => Ok(Self::PullFromPristineModel),
            other => Err(AdapterError::InvalidSeparateWeightsVersion(other)),
        }
    }

    pub fn version(self) -> u32 {
        match self {
            Self::AllAtOnce => 1,
            Self::Pull => 2,
            Self::PullFromPristineModel => 3,
        }
    }

    /// Runs the protocol against `compiler` and collects every stage.
    pub fn run(
        self,
        compiler: &dyn CompilerService,
        model: &Model,
        config: &NpuConfig,
    ) -> AdapterResult<StageArtifacts> {
        match self {
            Self::AllAtOnce => all_at_once(compiler, model, config),
            Self::Pull => pull(|event| match event {
                PullEvent::Next(_) => compiler.compile_ws_v2(model, config),
                PullEvent::InitConsumed => Ok(None),
            }),
            Self::PullFromPristineModel => {
                let original = model.clone();
                let mut target = model.clone();
                pull(|event| match event {
                    PullEvent::Next(stage) => compiler.compile_ws_v3(&mut target, config, stage),
                    PullEvent::InitConsumed => {
                        target = original.clone();
                        Ok(None)
                    }
                })
            }
        }
    }
}

fn all_at_once(
    compiler: &dyn CompilerService,
    model: &Model,
    config: &NpuConfig,
) -> AdapterResult<StageArtifacts> {
    let mut artifacts = compiler.compile_ws_v1(model, config)?;
    let main = artifacts.pop().ok_or(AdapterError::MissingMainStage)?;
    if main.stage() != StageKind::Main {
        return Err(AdapterError::UnexpectedArtifactName {
            name: main.name().to_string(),
            expected: "main",
        });
    }
    Ok(StageArtifacts {
        init: artifacts,
        main,
    })
}

enum PullEvent {
    /// Ask for stage `n`.
    Next(usize),
    /// An init stage was accepted.
    InitConsumed,
}

/// Pulls stages until a main stage arrives or the compiler runs dry.
fn pull<F>(mut next: F) -> AdapterResult<StageArtifacts>
where
    F: FnMut(PullEvent) -> npu_compiler::CompilerResult<Option<CompiledArtifact>>,
{
    let mut init = Vec::new();
    let mut stage = 0;
    while let Some(artifact) = next(PullEvent::Next(stage))? {
        stage += 1;
        match artifact.stage() {
            StageKind::Init => {
                tracing::debug!("Received init stage '{}'", artifact.name());
                init.push(artifact);
                next(PullEvent::InitConsumed)?;
            }
            StageKind::Main => {
                tracing::debug!("Received main stage '{}'", artifact.name());
                return Ok(StageArtifacts {
                    init,
                    main: artifact,
                });
            }
            StageKind::Other => {
                return Err(AdapterError::UnexpectedArtifactName {
                    name: artifact.name().to_string(),
                    expected: "init or main",
                });
            }
        }
    }
    Err(AdapterError::MissingMainStage)
}
