// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types shared by the configuration and model layers.

/// Errors raised while building models or reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    /// A configuration key or value is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The model representation is malformed.
    #[error("invalid model '{model}': {detail}")]
    InvalidModel { model: String, detail: String },

    /// Serialising or deserialising a model failed.
    #[error("model serialisation failed: {0}")]
    Serialization(String),

    /// An I/O error while reading a model or configuration file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
