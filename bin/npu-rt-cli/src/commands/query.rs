// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `npu-rt query` command: report operation support.

use super::{banner, Context, ModelArgs};

pub async fn execute(ctx: &Context, model_args: &ModelArgs) -> anyhow::Result<()> {
    banner("Operation Query");

    let model = model_args.load()?;
    let session = ctx.session()?;
    let supported = session.adapter().query(&model, &ctx.config.npu)?;

    println!("  {:<32} {:<16} {}", "Operation", "Type", "Device");
    println!("  {}", "-".repeat(60));
    for op in &model.operations {
        let device = supported.get(&op.name).map(String::as_str).unwrap_or("-");
        println!("  {:<32} {:<16} {device}", op.name, op.op_type);
    }
    println!();
    println!(
        "  {} of {} operations supported",
        model
            .operations
            .iter()
            .filter(|op| supported.contains_key(&op.name))
            .count(),
        model.operations.len()
    );
    Ok(())
}
