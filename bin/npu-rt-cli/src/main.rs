// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # npu-rt
//!
//! Command-line interface for the NPU compiled-graph runtime.
//!
//! ## Usage
//! ```bash
//! # Compile a model and write the blob
//! npu-rt compile --model net.json --weights net.safetensors --output net.blob
//!
//! # Weight-separated compilation, written as a container
//! npu-rt -o SEPARATE_WEIGHTS_VERSION=2 compile --model net.json \
//!     --weights net.safetensors --output net.npuc --weight-separated
//!
//! # Inspect a blob or container
//! npu-rt inspect --input net.npuc --layout weights
//!
//! # Run four concurrent requests on the simulated device
//! npu-rt -o PERF_COUNT=YES run --model net.json --weights net.safetensors --requests 4
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "npu-rt",
    about = "Compile, inspect and run NPU graphs",
    version,
    author
)]
struct Cli {
    /// Path to a TOML runtime configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Configuration override, e.g. `-o BATCH_MODE=PLUGIN` (repeatable).
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE", global = true)]
    options: Vec<String>,

    /// Directory holding the compiler library (used with COMPILER_TYPE=MLIR).
    #[arg(long, global = true)]
    compiler_lib: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a model and export the result.
    Compile {
        #[command(flatten)]
        model: commands::ModelArgs,

        /// Where to write the blob or container.
        #[arg(long)]
        output: PathBuf,

        /// Compile init and main stages separately and write a container.
        #[arg(long)]
        weight_separated: bool,
    },

    /// Parse an exported blob or container and print its descriptors.
    Inspect {
        /// File produced by `compile`.
        #[arg(short, long)]
        input: PathBuf,

        /// How the file is laid out.
        #[arg(long, value_enum, default_value_t = commands::inspect::Layout::Blob)]
        layout: commands::inspect::Layout,
    },

    /// Compile a model and run inferences on the simulated device.
    Run {
        #[command(flatten)]
        model: commands::ModelArgs,

        /// Number of requests run concurrently over the shared graph.
        #[arg(long, default_value_t = 1)]
        requests: usize,

        /// Inferences per request.
        #[arg(long, default_value_t = 1)]
        iterations: usize,
    },

    /// Report which operations the compiler supports.
    Query {
        #[command(flatten)]
        model: commands::ModelArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let ctx = commands::Context::load(cli.config.as_deref(), &cli.options, cli.compiler_lib)?;
    commands::init_tracing(cli.verbose, ctx.config.npu.log_level);

    match cli.command {
        Commands::Compile {
            model,
            output,
            weight_separated,
        } => commands::compile::execute(&ctx, &model, output, weight_separated).await,
        Commands::Inspect { input, layout } => commands::inspect::execute(&ctx, input, layout).await,
        Commands::Run {
            model,
            requests,
            iterations,
        } => commands::run::execute(&ctx, &model, requests, iterations).await,
        Commands::Query { model } => commands::query::execute(&ctx, &model).await,
    }
}
