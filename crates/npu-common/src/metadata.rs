// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Network and argument metadata reported by the compiler and the device.
//!
//! Two views of every network argument exist:
//!
//! - [`IoDescriptor`] is what the compiler service reports alongside a
//!   compiled artifact. It remembers both the shape the original model
//!   declared and the shape the compiler actually built for, which is how
//!   the runtime detects that batching was left to the plugin.
//! - [`ArgumentMetadata`] is what the device reports when a compiled graph
//!   is loaded and its arguments are enumerated.

use crate::{ElementType, Shape};

/// Whether a graph argument is consumed or produced by the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentDirection {
    Input,
    Output,
}

/// Properties of a single argument of a loaded hardware graph.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArgumentMetadata {
    /// Argument name as declared by the network.
    pub name: String,
    /// Input or output.
    pub direction: ArgumentDirection,
    /// Element precision.
    pub element_type: ElementType,
    /// Shape the compiled graph expects for one execution.
    pub shape: Shape,
}

impl ArgumentMetadata {
    /// Creates an input argument.
    pub fn input(name: impl Into<String>, element_type: ElementType, shape: Shape) -> Self {
        Self {
            name: name.into(),
            direction: ArgumentDirection::Input,
            element_type,
            shape,
        }
    }

    /// Creates an output argument.
    pub fn output(name: impl Into<String>, element_type: ElementType, shape: Shape) -> Self {
        Self {
            name: name.into(),
            direction: ArgumentDirection::Output,
            element_type,
            shape,
        }
    }

    /// Returns the buffer size in bytes for one execution of this argument.
    pub fn size_bytes(&self) -> usize {
        self.shape.size_bytes(self.element_type)
    }

    /// Returns `true` for input arguments.
    pub fn is_input(&self) -> bool {
        self.direction == ArgumentDirection::Input
    }
}

/// A network input or output as described by the compiler service.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IoDescriptor {
    /// Tensor name.
    pub name: String,
    /// Element precision.
    pub element_type: ElementType,
    /// Shape declared by the original model.
    pub shape_from_model: Shape,
    /// Shape the compiler produced code for.
    pub shape_from_compiler: Shape,
}

impl IoDescriptor {
    /// Size in bytes of a full tensor as the model declares it.
    pub fn model_size_bytes(&self) -> usize {
        self.shape_from_model.size_bytes(self.element_type)
    }
}

/// Metadata attached to a compiled artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct NetworkMetadata {
    /// Artifact name. In weight-separated compilation the prefix tells init
    /// stages (`init`) apart from the main stage (`main`).
    pub name: String,
    /// Network inputs in declaration order.
    pub inputs: Vec<IoDescriptor>,
    /// Network outputs in declaration order.
    pub outputs: Vec<IoDescriptor>,
}

impl NetworkMetadata {
    /// Derives the batch size the runtime must handle itself.
    ///
    /// Returns `Some(n)` when every input and output shares the same leading
    /// dimension `n > 1` in the model while the compiler built each of them
    /// for a leading dimension of 1. Any other layout means the compiler
    /// owns the batch dimension (or there is none) and `None` is returned.
    pub fn batch_size(&self) -> Option<usize> {
        let first = self.inputs.first()?;
        let candidate = first.shape_from_model.batch()?;
        if candidate <= 1 {
            return None;
        }

        for desc in self.inputs.iter().chain(self.outputs.iter()) {
            if desc.shape_from_model.batch() != Some(candidate) {
                tracing::debug!(
                    "'{}' does not share batch {candidate} with the first input; batching stays with the compiler",
                    desc.name,
                );
                return None;
            }
            if desc.shape_from_compiler.batch() != Some(1) {
                tracing::debug!(
                    "'{}' was compiled with shape {}; batching stays with the compiler",
                    desc.name,
                    desc.shape_from_compiler,
                );
                return None;
            }
        }

        Some(candidate)
    }
}
