// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # npu-common
//!
//! Types shared by every layer of the NPU runtime.
//!
//! - [`ElementType`] and [`Shape`] describe the tensors a compiled network
//!   consumes and produces.
//! - [`ArgumentMetadata`] and [`NetworkMetadata`] carry what the compiler
//!   reports about a compiled artifact, including the batch information the
//!   execution pipeline uses to split work across streams.
//! - [`Model`] is the portable model representation handed to the compiler
//!   service; it serialises to a description document plus a weights file.
//! - [`NpuConfig`] holds the configuration surface consumed by the compiler
//!   adapter, the compiled graph and the execution pipeline.

mod config;
mod element;
mod error;
mod metadata;
mod model;
mod profiling;
mod shape;

pub use config::{
    BatchMode, CompilerType, LogLevel, ModelPriority, NpuConfig, SyncDiscipline, WorkloadType,
};
pub use element::ElementType;
pub use error::CommonError;
pub use metadata::{ArgumentDirection, ArgumentMetadata, IoDescriptor, NetworkMetadata};
pub use model::{Constant, Model, Operation};
pub use profiling::{ExecStatus, ProfilingEntry};
pub use shape::Shape;
