// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `npu-rt run` command: compile, prepare and run on the simulated device.
//!
//! Demonstrates the full type-state pipeline:
//! ```text
//! InferenceSession<Idle> → compile → <Compiled> → prepare → <Ready> → run
//! ```
//! Extra requests share the prepared graph and run concurrently on the
//! blocking thread pool.

use super::{banner, format_bytes, Context, ModelArgs};
use runtime::{InferRequest, InferenceOutput};

pub async fn execute(
    ctx: &Context,
    model_args: &ModelArgs,
    requests: usize,
    iterations: usize,
) -> anyhow::Result<()> {
    banner("Inference Runner");

    if requests == 0 || iterations == 0 {
        anyhow::bail!("--requests and --iterations must be at least 1");
    }

    let model = model_args.load()?;
    let npu = &ctx.config.npu;
    println!("  Config:");
    println!("   Model:       {}", model.name);
    println!("   Batch mode:  {:?}", npu.batch_mode);
    println!("   Sync:        {:?}", npu.sync_discipline);
    println!("   Sequential:  {}", npu.run_inferences_sequentially);
    println!("   Profiling:   {}", npu.perf_count);
    println!("   Requests:    {requests} x {iterations}");
    println!();

    // ── Type-State Pipeline ──────────────────────────────────
    let ready = ctx.session()?.compile(&model)?.prepare()?;
    let graph = ready.graph();
    println!(
        "  Graph '{}' ready on {} streams",
        graph.metadata().name,
        ready.request().pipeline().stream_count()
    );
    println!();

    let inputs: Vec<Vec<u8>> = ready
        .request()
        .input_sizes()
        .into_iter()
        .enumerate()
        .map(|(i, size)| (0..size).map(|b| (b + i) as u8).collect())
        .collect();

    let mut handles = Vec::with_capacity(requests);
    for id in 0..requests {
        let request = ready.create_request()?;
        let inputs = inputs.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            run_request(id, request, &inputs, iterations)
        }));
    }

    for handle in handles {
        let (id, output) = handle.await??;
        print_output(id, &output);
    }

    drop(ready);
    tracing::debug!("Device stats after teardown: {:?}", ctx.device.stats());
    Ok(())
}

fn run_request(
    id: usize,
    mut request: InferRequest,
    inputs: &[Vec<u8>],
    iterations: usize,
) -> anyhow::Result<(usize, InferenceOutput)> {
    let inputs: Vec<&[u8]> = inputs.iter().map(Vec::as_slice).collect();
    let mut last = request.infer(&inputs)?;
    for _ in 1..iterations {
        last = request.infer(&inputs)?;
    }
    Ok((id, last))
}

fn print_output(id: usize, output: &InferenceOutput) {
    println!("  Request {id}:");
    for (i, data) in output.outputs.iter().enumerate() {
        let checksum = data.iter().fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)));
        println!(
            "   Output {i}: {} checksum {checksum:#010x}",
            format_bytes(data.len())
        );
    }
    println!("   {}", output.metrics.summary());
    for entry in &output.metrics.operations {
        println!(
            "   {:<24} {:<12} {:<12} {:>10.3} us",
            entry.node_name,
            entry.node_type,
            entry.exec_type,
            entry.real_time.as_secs_f64() * 1e6,
        );
    }
    println!();
}
