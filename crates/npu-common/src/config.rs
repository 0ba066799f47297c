// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Configuration surface consumed by the compiler adapter, the compiled
//! graph and the execution pipeline.
//!
//! Keys are spelled exactly as the runtime's property names, so a TOML file
//! looks like:
//!
//! ```toml
//! COMPILER_TYPE = "MLIR"
//! SEPARATE_WEIGHTS_VERSION = 2
//! CREATE_EXECUTOR = true
//! DEFER_WEIGHTS_LOAD = false
//! MODEL_PRIORITY = "HIGH"
//! TURBO = true
//! BATCH_MODE = "PLUGIN"
//! RUN_INFERENCES_SEQUENTIALLY = false
//! LOG_LEVEL = "INFO"
//! PERF_COUNT = false
//! SYNC_DISCIPLINE = "FENCE"
//! ```

use crate::CommonError;
use std::path::Path;

/// Which component hosts the model compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompilerType {
    /// Compiler shipped inside the device driver.
    Driver,
    /// Compiler loaded as a plugin library next to the runtime.
    Mlir,
}

/// Scheduling priority of the command queue a graph submits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelPriority {
    Low,
    Medium,
    High,
}

/// Workload hint applied to a graph's command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkloadType {
    Default,
    Efficient,
}

/// Who handles the batch dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchMode {
    /// The runtime decides from the compiled metadata.
    Auto,
    /// The compiler fixed the batch dimension; the runtime never splits.
    Compiler,
    /// The runtime splits batched tensors across parallel streams.
    Plugin,
}

/// How a pipeline learns that submitted work has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncDiscipline {
    /// Each submission carries a fence that the host waits on.
    Fence,
    /// Each command list signals an event after a trailing barrier.
    Event,
}

/// Log verbosity, ordered from quietest to loudest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Off,
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Returns `true` when messages at `level` should be produced.
    pub fn enabled(self, level: LogLevel) -> bool {
        level != LogLevel::Off && self >= level
    }

    /// Directive string for a `tracing` env filter.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default, deny_unknown_fields)]
pub struct NpuConfig {
    /// Selects driver-hosted or plugin-hosted compilation.
    pub compiler_type: CompilerType,
    /// Weight-separation protocol version (1, 2 or 3). Validated when a
    /// weight-separated compilation is requested.
    pub separate_weights_version: u32,
    /// Whether graphs acquire device resources at construction.
    pub create_executor: bool,
    /// Defers device resource acquisition even when `create_executor` is set.
    pub defer_weights_load: bool,
    /// Command queue priority.
    pub model_priority: ModelPriority,
    /// Optional turbo hint for the command queue.
    pub turbo: Option<bool>,
    /// Optional workload hint for the command queue.
    pub workload_type: Option<WorkloadType>,
    /// Batch handling mode.
    pub batch_mode: BatchMode,
    /// Chain inferences of one graph so they execute in submission order.
    pub run_inferences_sequentially: bool,
    /// Log verbosity.
    pub log_level: LogLevel,
    /// Enables profiling resources in execution pipelines.
    pub perf_count: bool,
    /// Synchronisation discipline of execution pipelines.
    pub sync_discipline: SyncDiscipline,
}

impl Default for NpuConfig {
    fn default() -> Self {
        Self {
            compiler_type: CompilerType::Mlir,
            separate_weights_version: 1,
            create_executor: true,
            defer_weights_load: false,
            model_priority: ModelPriority::Medium,
            turbo: None,
            workload_type: None,
            batch_mode: BatchMode::Auto,
            run_inferences_sequentially: false,
            log_level: LogLevel::Warning,
            perf_count: false,
            sync_discipline: SyncDiscipline::Fence,
        }
    }
}

impl NpuConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, CommonError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CommonError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, CommonError> {
        toml::from_str(toml_str).map_err(|e| CommonError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, CommonError> {
        toml::to_string_pretty(self)
            .map_err(|e| CommonError::Config(format!("TOML serialise error: {e}")))
    }

    /// Updates one property from its string form, e.g. `("TURBO", "YES")`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), CommonError> {
        let value = value.trim();
        match key.trim().to_uppercase().as_str() {
            "COMPILER_TYPE" => self.compiler_type = parse_enum(key, value)?,
            "SEPARATE_WEIGHTS_VERSION" => {
                self.separate_weights_version = value.parse().map_err(|_| {
                    CommonError::Config(format!("{key} expects an integer, got '{value}'"))
                })?
            }
            "CREATE_EXECUTOR" => self.create_executor = parse_bool(key, value)?,
            "DEFER_WEIGHTS_LOAD" => self.defer_weights_load = parse_bool(key, value)?,
            "MODEL_PRIORITY" => self.model_priority = parse_enum(key, value)?,
            "TURBO" => self.turbo = Some(parse_bool(key, value)?),
            "WORKLOAD_TYPE" => self.workload_type = Some(parse_enum(key, value)?),
            "BATCH_MODE" => self.batch_mode = parse_enum(key, value)?,
            "RUN_INFERENCES_SEQUENTIALLY" => {
                self.run_inferences_sequentially = parse_bool(key, value)?
            }
            "LOG_LEVEL" => self.log_level = parse_enum(key, value)?,
            "PERF_COUNT" => self.perf_count = parse_bool(key, value)?,
            "SYNC_DISCIPLINE" => self.sync_discipline = parse_enum(key, value)?,
            other => {
                return Err(CommonError::Config(format!(
                    "unknown configuration key '{other}'"
                )))
            }
        }
        Ok(())
    }

    /// Applies a list of `KEY=VALUE` strings in order.
    pub fn apply_overrides<'a>(
        &mut self,
        overrides: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), CommonError> {
        for entry in overrides {
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                CommonError::Config(format!("expected KEY=VALUE, got '{entry}'"))
            })?;
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Returns `true` when graphs must postpone device resource acquisition.
    pub fn defers_initialization(&self) -> bool {
        !self.create_executor || self.defer_weights_load
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, CommonError> {
    match value.to_uppercase().as_str() {
        "YES" | "TRUE" | "1" | "ON" => Ok(true),
        "NO" | "FALSE" | "0" | "OFF" => Ok(false),
        _ => Err(CommonError::Config(format!(
            "{key} expects YES/NO, got '{value}'"
        ))),
    }
}

fn parse_enum<T: serde::de::DeserializeOwned>(key: &str, value: &str) -> Result<T, CommonError> {
    let normalised = value.to_uppercase().replace('-', "_");
    serde_json::from_value(serde_json::Value::String(normalised))
        .map_err(|_| CommonError::Config(format!("invalid value '{value}' for {key}")))
}
