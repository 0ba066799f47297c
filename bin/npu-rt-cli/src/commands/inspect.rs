// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `npu-rt inspect` command: parse an exported file and print what the
//! device would see.

use super::{banner, format_bytes, Context};
use anyhow::Context as _;
use npu_graph::{CompiledGraph, ExportContainer};
use std::fs::File;
use std::path::PathBuf;

/// Layout of the file given to `inspect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Layout {
    /// A bare compiled blob.
    Blob,
    /// Main blob with one init stage and the init model.
    Weights,
    /// Main blob with several init stages and the init model.
    SplitInit,
}

pub async fn execute(ctx: &Context, input: PathBuf, layout: Layout) -> anyhow::Result<()> {
    banner("Inspector");

    let file = File::open(&input).with_context(|| format!("cannot open '{}'", input.display()))?;
    // SAFETY: the file is opened read-only and only read while mapped.
    let mmap = unsafe { memmap2::Mmap::map(&file) }
        .with_context(|| format!("cannot map '{}'", input.display()))?;
    println!("  File: {} ({})", input.display(), format_bytes(mmap.len()));
    println!();

    let adapter = ctx.session()?.adapter().clone();
    let npu = &ctx.config.npu;

    let (main_blob, init_blobs) = match layout {
        Layout::Blob => (mmap.to_vec(), Vec::new()),
        Layout::Weights | Layout::SplitInit => {
            let mut bytes: &[u8] = &mmap;
            let container = if layout == Layout::Weights {
                ExportContainer::read_with_weights(&mut bytes)?
            } else {
                ExportContainer::read_split_init(&mut bytes)?
            };
            let init_model = container.init_model()?;
            println!(
                "  Init model: {} ({} constants, {})",
                init_model.name,
                init_model.constants.len(),
                format_bytes(init_model.weights_size_bytes()),
            );
            println!();
            (container.main_blob, container.init_blobs)
        }
    };

    let main = adapter.parse(main_blob, npu)?;
    print_graph("Main", &main);
    for (i, blob) in init_blobs.into_iter().enumerate() {
        let init = adapter.parse(blob, npu)?;
        print_graph(&format!("Init {i}"), &init);
    }
    Ok(())
}

fn print_graph(label: &str, graph: &CompiledGraph) {
    let metadata = graph.metadata();
    println!("  {label}: {} ({})", metadata.name, format_bytes(graph.blob().len()));
    if let Some(batch) = graph.batch_size() {
        println!("   Batch handled by the runtime: {batch}");
    }

    // ── Arguments ──────────────────────────────────────────────
    println!(
        "   {:<4} {:<7} {:<24} {:<6} {:<16} {:>10}",
        "Idx", "Dir", "Name", "Type", "Shape", "Size",
    );
    println!("   {}", "-".repeat(72));
    let arguments = graph
        .input_descriptors()
        .iter()
        .map(|d| ("in", d))
        .chain(graph.output_descriptors().iter().map(|d| ("out", d)));
    for (direction, descriptor) in arguments {
        let arg = &descriptor.properties;
        println!(
            "   {:<4} {:<7} {:<24} {:<6} {:<16} {:>10}",
            descriptor.binding_index,
            direction,
            arg.name,
            arg.element_type.as_str(),
            arg.shape.to_string(),
            format_bytes(arg.size_bytes()),
        );
    }
    println!();
}
