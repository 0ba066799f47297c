// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-operation profiling records produced from raw device profiling data.

use std::time::Duration;

/// Execution status of a profiled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    NotRun,
    OptimizedOut,
    Executed,
}

/// One row of a profiling report.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProfilingEntry {
    /// Operation name from the original model.
    pub node_name: String,
    /// Operation type (e.g., `"Convolution"`).
    pub node_type: String,
    /// Kernel or execution unit label reported by the compiler.
    pub exec_type: String,
    /// Execution status.
    pub status: ExecStatus,
    /// Device time spent in the operation.
    pub real_time: Duration,
    /// Host time attributed to the operation.
    pub cpu_time: Duration,
}
