// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for device calls.

/// Errors reported by a [`crate::Driver`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// A driver entry point returned a failure code.
    #[error("{call} failed: {detail}")]
    CallFailed { call: &'static str, detail: String },

    /// A handle was unknown to the driver or already destroyed.
    #[error("invalid {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },

    /// The compiled blob could not be loaded as a hardware graph.
    #[error("graph creation rejected the blob: {0}")]
    InvalidBlob(String),

    /// An object was used in a state that does not allow the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A memory access fell outside every allocation.
    #[error("memory access out of bounds: {len} bytes at {address:#x}")]
    OutOfBounds { address: u64, len: usize },

    /// A host wait on a fence or event did not complete.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// The device does not implement the requested capability.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Convenience alias used across the driver API.
pub type DriverResult<T> = Result<T, DriverError>;
