// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Adapter selection from configuration.

use crate::{AdapterError, AdapterResult, CompilerAdapter};
use npu_common::{CompilerType, NpuConfig};
use npu_compiler::{compiler_library_path, CompilerError, CompilerService};
use npu_driver::{BackendKind, Driver};
use std::path::PathBuf;
use std::sync::Arc;

/// Builds a [`CompilerAdapter`] for `COMPILER_TYPE`.
///
/// - `MLIR` loads the compiler library, by default from the directory of
///   the running executable.
/// - `DRIVER` uses the compiler hosted by the device driver, registered
///   with [`Self::with_driver_compiler`].
#[derive(Debug, Default, Clone)]
pub struct CompilerAdapterFactory {
    library_dir: Option<PathBuf>,
    driver_compiler: Option<Arc<dyn CompilerService>>,
}

impl CompilerAdapterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory searched for the compiler library.
    pub fn with_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_dir = Some(dir.into());
        self
    }

    pub fn with_driver_compiler(mut self, compiler: Arc<dyn CompilerService>) -> Self {
        self.driver_compiler = Some(compiler);
        self
    }

    pub fn create(
        &self,
        config: &NpuConfig,
        driver: Option<Arc<dyn Driver>>,
    ) -> AdapterResult<CompilerAdapter> {
        let driver = driver.filter(|d| {
            let usable = d.backend_kind() == BackendKind::LevelZero;
            if !usable {
                tracing::warn!("Device backend cannot load graphs; every graph will be export-only");
            }
            usable
        });

        match config.compiler_type {
            CompilerType::Mlir => {
                let dir = match &self.library_dir {
                    Some(dir) => dir.clone(),
                    None => runtime_library_dir()?,
                };
                CompilerAdapter::load(&compiler_library_path(&dir), driver)
            }
            CompilerType::Driver => {
                let compiler = self
                    .driver_compiler
                    .clone()
                    .ok_or(AdapterError::CompilerUnavailable(CompilerType::Driver))?;
                tracing::info!("Driver compiler will be used");
                Ok(CompilerAdapter::new(compiler, driver))
            }
        }
    }
}

fn runtime_library_dir() -> AdapterResult<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| CompilerError::LibraryLoad {
        path: "<runtime directory>".into(),
        detail: e.to_string(),
    })?;
    Ok(exe
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".")))
}
