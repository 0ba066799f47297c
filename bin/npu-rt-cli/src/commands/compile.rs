// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `npu-rt compile` command: compile a model and export the result.
//!
//! A plain compilation writes the main blob. A weight-separated one writes
//! the blob together with the init stages and the init model:
//! ```text
//! one init stage     → [desc][weights][main][:][init]
//! several init stages → [desc][weights][main][:][count][init 0]..[init n-1]
//! ```

use super::{banner, format_bytes, Context, ModelArgs};
use anyhow::Context as _;
use npu_graph::blob_hash;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

pub async fn execute(
    ctx: &Context,
    model_args: &ModelArgs,
    output: PathBuf,
    weight_separated: bool,
) -> anyhow::Result<()> {
    banner("Compiler");

    let model = model_args.load()?;
    let session = ctx.session()?;

    println!("  Model:    {}", model.name);
    println!("  Compiler: {:#x}", session.adapter().get_version());
    println!(
        "  Mode:     {}",
        if weight_separated {
            format!(
                "weight-separated (v{})",
                ctx.config.npu.separate_weights_version
            )
        } else {
            "single graph".to_string()
        }
    );
    println!();

    let compiled = if weight_separated {
        session.compile_weight_separated(&model)?
    } else {
        session.compile(&model)?
    };

    let file = File::create(&output)
        .with_context(|| format!("cannot create '{}'", output.display()))?;
    let mut writer = BufWriter::new(file);
    let written = if weight_separated {
        compiled.export_with_weights(&mut writer, &model)?
    } else {
        compiled.export_blob(&mut writer)
    };
    writer.flush()?;
    if written == 0 {
        anyhow::bail!("export to '{}' failed", output.display());
    }

    // ── Summary ────────────────────────────────────────────────
    let graph = compiled.graph();
    println!("  Main:     {} ({})", graph.metadata().name, format_bytes(graph.blob().len()));
    for init in compiled.init_graphs() {
        println!("  Init:     {} ({})", init.metadata().name, format_bytes(init.blob().len()));
    }
    println!("  Hash:     {:#010x}", blob_hash(graph.blob()));
    println!("  Export-only: {}", graph.is_export_only());
    println!();
    println!("  Wrote {} to {}", format_bytes(written), output.display());
    Ok(())
}
