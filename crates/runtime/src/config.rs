// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! stream_count = 4
//! timestamps = true
//! wait_timeout_ms = 5000
//!
//! [npu]
//! COMPILER_TYPE = "DRIVER"
//! SEPARATE_WEIGHTS_VERSION = 2
//! SYNC_DISCIPLINE = "EVENT"
//! ```

use crate::{RuntimeError, RuntimeResult};
use npu_common::NpuConfig;
use npu_driver::WAIT_FOREVER;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for inference sessions.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Directory holding the compiler library. Defaults to the directory of
    /// the running executable.
    pub compiler_library_dir: Option<PathBuf>,
    /// Streams per pipeline. When unset, a batch handled by the runtime is
    /// split one sample per stream and anything else runs on one stream.
    pub stream_count: Option<usize>,
    /// Record device timestamps around every graph execution.
    pub timestamps: bool,
    /// Host wait limit in milliseconds; unset waits as long as the device
    /// takes.
    pub wait_timeout_ms: Option<u64>,
    /// Device and compiler properties.
    pub npu: NpuConfig,
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> RuntimeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> RuntimeResult<Self> {
        toml::from_str(toml_str)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> RuntimeResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML serialise error: {e}")))
    }

    /// Applies `KEY=VALUE` property overrides to the device configuration.
    pub fn apply_overrides<'a>(
        &mut self,
        overrides: impl IntoIterator<Item = &'a str>,
    ) -> RuntimeResult<()> {
        self.npu.apply_overrides(overrides)?;
        Ok(())
    }

    /// Host wait limit for fences and events.
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(WAIT_FOREVER)
    }

    /// Resolves the number of pipeline streams for a graph whose runtime
    /// batch is `batch`.
    pub fn resolve_stream_count(&self, batch: Option<usize>) -> RuntimeResult<usize> {
        match self.stream_count {
            Some(0) => Err(RuntimeError::ConfigError(
                "stream_count must be at least 1".into(),
            )),
            Some(count) => Ok(count),
            None => Ok(batch.unwrap_or(1)),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            compiler_library_dir: None,
            stream_count: None,
            timestamps: false,
            wait_timeout_ms: None,
            npu: NpuConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npu_common::{CompilerType, SyncDiscipline};

    #[test]
    fn test_default() {
        let c = RuntimeConfig::default();
        assert_eq!(c.stream_count, None);
        assert!(!c.timestamps);
        assert_eq!(c.wait_timeout(), WAIT_FOREVER);
        assert_eq!(c.npu, NpuConfig::default());
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
compiler_library_dir = "/opt/npu/lib"
stream_count = 2
timestamps = true
wait_timeout_ms = 250

[npu]
COMPILER_TYPE = "DRIVER"
SEPARATE_WEIGHTS_VERSION = 3
SYNC_DISCIPLINE = "EVENT"
"#;
        let c = RuntimeConfig::from_toml(toml).unwrap();
        assert_eq!(c.compiler_library_dir, Some(PathBuf::from("/opt/npu/lib")));
        assert_eq!(c.stream_count, Some(2));
        assert!(c.timestamps);
        assert_eq!(c.wait_timeout(), Duration::from_millis(250));
        assert_eq!(c.npu.compiler_type, CompilerType::Driver);
        assert_eq!(c.npu.separate_weights_version, 3);
        assert_eq!(c.npu.sync_discipline, SyncDiscipline::Event);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(RuntimeConfig::from_toml("streams = 2").is_err());
        assert!(RuntimeConfig::from_toml("[npu]\nTURBO_MODE = true").is_err());
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let mut c = RuntimeConfig {
            stream_count: Some(4),
            timestamps: true,
            ..Default::default()
        };
        c.npu.run_inferences_sequentially = true;
        let toml = c.to_toml().unwrap();
        let back = RuntimeConfig::from_toml(&toml).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_overrides_reach_device_config() {
        let mut c = RuntimeConfig::default();
        c.apply_overrides(["PERF_COUNT=YES", "MODEL_PRIORITY=HIGH"])
            .unwrap();
        assert!(c.npu.perf_count);
        assert!(c.apply_overrides(["NOT_A_KEY=1"]).is_err());
    }

    #[test]
    fn test_resolve_stream_count() {
        let c = RuntimeConfig::default();
        assert_eq!(c.resolve_stream_count(None).unwrap(), 1);
        assert_eq!(c.resolve_stream_count(Some(4)).unwrap(), 4);

        let c = RuntimeConfig {
            stream_count: Some(2),
            ..Default::default()
        };
        assert_eq!(c.resolve_stream_count(Some(4)).unwrap(), 2);

        let c = RuntimeConfig {
            stream_count: Some(0),
            ..Default::default()
        };
        assert!(c.resolve_stream_count(None).is_err());
    }
}
