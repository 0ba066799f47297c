// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Portable model representation handed to the compiler service.
//!
//! A [`Model`] serialises to two documents, mirroring how a model travels
//! next to a compiled blob in a weights-carrying export:
//!
//! - a **description** (JSON) listing inputs, outputs, operations and the
//!   names/shapes of constant tensors, and
//! - a **weights** file (SafeTensors) holding the constant tensor data.

use crate::{ArgumentMetadata, CommonError, ElementType, Shape};
use std::collections::BTreeMap;

/// A single operation in the model.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Operation {
    /// Unique operation name.
    pub name: String,
    /// Operation type (e.g., `"MatMul"`, `"Add"`).
    pub op_type: String,
}

/// A constant (weight) tensor owned by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    pub name: String,
    pub element_type: ElementType,
    pub shape: Shape,
    pub data: Vec<u8>,
}

/// The model graph in portable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    /// Model name.
    pub name: String,
    /// Graph parameters, with the shapes the model declares.
    pub inputs: Vec<ArgumentMetadata>,
    /// Graph results, with the shapes the model declares.
    pub outputs: Vec<ArgumentMetadata>,
    /// Operations in topological order.
    pub operations: Vec<Operation>,
    /// Constant tensors referenced by the operations.
    pub constants: Vec<Constant>,
    /// Free-form runtime annotations. Compilers may rewrite these while
    /// producing weight-separated stages.
    pub rt_info: BTreeMap<String, String>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ModelDescription {
    name: String,
    inputs: Vec<ArgumentMetadata>,
    outputs: Vec<ArgumentMetadata>,
    operations: Vec<Operation>,
    constants: Vec<ConstantRef>,
    #[serde(default)]
    rt_info: BTreeMap<String, String>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ConstantRef {
    name: String,
    element_type: ElementType,
    shape: Shape,
}

impl Model {
    /// Creates an empty model with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            operations: Vec::new(),
            constants: Vec::new(),
            rt_info: BTreeMap::new(),
        }
    }

    /// Total size of all constant tensors in bytes.
    pub fn weights_size_bytes(&self) -> usize {
        self.constants.iter().map(|c| c.data.len()).sum()
    }

    /// Checks the model for internal consistency.
    ///
    /// - At least one input and one output.
    /// - Argument directions match the list they appear in.
    /// - Operation and constant names are unique.
    /// - Constant data length matches its shape and element type.
    pub fn validate(&self) -> Result<(), CommonError> {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(self.invalid("model needs at least one input and one output"));
        }
        if self.inputs.iter().any(|a| !a.is_input()) {
            return Err(self.invalid("output argument listed among inputs"));
        }
        if self.outputs.iter().any(|a| a.is_input()) {
            return Err(self.invalid("input argument listed among outputs"));
        }

        let mut seen = std::collections::HashSet::new();
        for op in &self.operations {
            if !seen.insert(op.name.as_str()) {
                return Err(self.invalid(&format!("duplicate operation name '{}'", op.name)));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for constant in &self.constants {
            if !seen.insert(constant.name.as_str()) {
                return Err(self.invalid(&format!("duplicate constant '{}'", constant.name)));
            }
            let expected = constant.shape.size_bytes(constant.element_type);
            if constant.data.len() != expected {
                return Err(self.invalid(&format!(
                    "constant '{}' holds {} bytes, shape {} needs {expected}",
                    constant.name,
                    constant.data.len(),
                    constant.shape,
                )));
            }
        }
        Ok(())
    }

    /// Serialises the model into `(description, weights)` documents.
    pub fn serialize(&self) -> Result<(Vec<u8>, Vec<u8>), CommonError> {
        let description = ModelDescription {
            name: self.name.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            operations: self.operations.clone(),
            constants: self
                .constants
                .iter()
                .map(|c| ConstantRef {
                    name: c.name.clone(),
                    element_type: c.element_type,
                    shape: c.shape.clone(),
                })
                .collect(),
            rt_info: self.rt_info.clone(),
        };
        let description = serde_json::to_vec_pretty(&description)
            .map_err(|e| CommonError::Serialization(format!("description: {e}")))?;

        let mut views = Vec::with_capacity(self.constants.len());
        for c in &self.constants {
            let view = safetensors::tensor::TensorView::new(
                c.element_type.to_safetensors(),
                c.shape.dims().to_vec(),
                &c.data,
            )
            .map_err(|e| CommonError::Serialization(format!("constant '{}': {e:?}", c.name)))?;
            views.push((c.name.clone(), view));
        }
        let weights = safetensors::serialize(views, &None)
            .map_err(|e| CommonError::Serialization(format!("weights: {e:?}")))?;

        Ok((description, weights))
    }

    /// Rebuilds a model from the documents produced by [`Model::serialize`].
    pub fn deserialize(description: &[u8], weights: &[u8]) -> Result<Self, CommonError> {
        let description: ModelDescription = serde_json::from_slice(description)
            .map_err(|e| CommonError::Serialization(format!("description: {e}")))?;
        let tensors = safetensors::SafeTensors::deserialize(weights)
            .map_err(|e| CommonError::Serialization(format!("weights: {e:?}")))?;

        let mut constants = Vec::with_capacity(description.constants.len());
        for c in description.constants {
            let view = tensors.tensor(&c.name).map_err(|e| {
                CommonError::Serialization(format!("constant '{}' missing from weights: {e:?}", c.name))
            })?;
            if ElementType::from_safetensors(view.dtype()) != Some(c.element_type) {
                return Err(CommonError::Serialization(format!(
                    "constant '{}' stored as {:?}, description says {}",
                    c.name,
                    view.dtype(),
                    c.element_type,
                )));
            }
            constants.push(Constant {
                name: c.name,
                element_type: c.element_type,
                shape: c.shape,
                data: view.data().to_vec(),
            });
        }

        Ok(Self {
            name: description.name,
            inputs: description.inputs,
            outputs: description.outputs,
            operations: description.operations,
            constants,
            rt_info: description.rt_info,
        })
    }

    /// Loads a model from a description file and a SafeTensors weights file.
    pub fn from_files(
        description: &std::path::Path,
        weights: &std::path::Path,
    ) -> Result<Self, CommonError> {
        let description = std::fs::read(description)?;
        let weights = std::fs::read(weights)?;
        let model = Self::deserialize(&description, &weights)?;
        model.validate()?;
        Ok(model)
    }

    fn invalid(&self, detail: &str) -> CommonError {
        CommonError::InvalidModel {
            model: self.name.clone(),
            detail: detail.to_string(),
        }
    }
}
