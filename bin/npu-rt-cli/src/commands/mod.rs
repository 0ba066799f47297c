// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations and the state they share.

pub mod compile;
pub mod inspect;
pub mod query;
pub mod run;

use anyhow::Context as _;
use compiler_adapter::CompilerAdapterFactory;
use npu_common::{CompilerType, LogLevel, Model};
use npu_compiler::ReferenceCompiler;
use npu_driver::sim::SimDriver;
use npu_driver::Driver;
use runtime::{Idle, InferenceSession, RuntimeConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Model description and weights, as accepted by every subcommand that
/// compiles.
#[derive(clap::Args)]
pub struct ModelArgs {
    /// Model description (JSON).
    #[arg(short, long)]
    pub model: PathBuf,

    /// Model weights (SafeTensors).
    #[arg(short, long)]
    pub weights: PathBuf,
}

impl ModelArgs {
    pub fn load(&self) -> anyhow::Result<Model> {
        Model::from_files(&self.model, &self.weights).with_context(|| {
            format!(
                "failed to load model from '{}' and '{}'",
                self.model.display(),
                self.weights.display()
            )
        })
    }
}

/// Configuration plus the device every command runs against.
pub struct Context {
    pub config: RuntimeConfig,
    pub device: Arc<SimDriver>,
}

impl Context {
    /// Reads the config file (if any), then applies `-o` overrides and the
    /// compiler library directory.
    pub fn load(
        path: Option<&Path>,
        overrides: &[String],
        compiler_lib: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => RuntimeConfig::from_file(path)?,
            None => RuntimeConfig::default(),
        };
        config.apply_overrides(overrides.iter().map(String::as_str))?;
        if compiler_lib.is_some() {
            config.compiler_library_dir = compiler_lib;
        }
        Ok(Self {
            config,
            device: Arc::new(SimDriver::new()),
        })
    }

    /// A fresh session on the simulated device.
    ///
    /// Without a compiler library directory, `MLIR` falls back to the
    /// driver-hosted reference compiler.
    pub fn session(&self) -> anyhow::Result<InferenceSession<Idle>> {
        let mut config = self.config.clone();
        if config.npu.compiler_type == CompilerType::Mlir && config.compiler_library_dir.is_none() {
            tracing::warn!("No compiler library directory given, using the driver compiler");
            config.npu.compiler_type = CompilerType::Driver;
        }
        let factory =
            CompilerAdapterFactory::new().with_driver_compiler(Arc::new(ReferenceCompiler::new()));
        let device: Arc<dyn Driver> = self.device.clone();
        Ok(InferenceSession::from_factory(config, &factory, Some(device))?)
    }
}

/// Installs the global tracing subscriber. `-v` repetitions win over the
/// configured `LOG_LEVEL`; `RUST_LOG` wins over both.
pub fn init_tracing(verbose: u8, level: LogLevel) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match verbose {
        0 => level.as_filter(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    fmt()
        .with_env_filter(env_filter)
        .with_target(verbose >= 2)
        .init();
}

pub fn banner(title: &str) {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║ {:^52} ║", format!("npu-rt · {title}"));
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
}

/// Byte count in human units.
pub fn format_bytes(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let bytes = bytes as f64;
    if bytes >= KB * KB {
        format!("{:.2} MB", bytes / (KB * KB))
    } else if bytes >= KB {
        format!("{:.1} KB", bytes / KB)
    } else {
        format!("{bytes} B")
    }
}
