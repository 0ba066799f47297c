// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shared fixtures for unit tests.

use compiler_adapter::CompilerAdapter;
use npu_common::{ArgumentMetadata, ElementType, Model, NpuConfig, Operation, Shape};
use npu_compiler::ReferenceCompiler;
use npu_driver::sim::SimDriver;
use npu_driver::{
    CommandList, CommandQueue, Driver, Event, EventPool, QueueDesc, QueuePriority, WAIT_FOREVER,
};
use npu_graph::CompiledGraph;
use std::sync::Arc;

/// Bytes per sample of the test model's input and output.
pub const SAMPLE_BYTES: usize = 16;

pub fn model(batch: usize) -> Model {
    let mut model = Model::new("net");
    model.inputs.push(ArgumentMetadata::input(
        "x",
        ElementType::U8,
        Shape::new(vec![batch, SAMPLE_BYTES]),
    ));
    model.outputs.push(ArgumentMetadata::output(
        "y",
        ElementType::U8,
        Shape::new(vec![batch, SAMPLE_BYTES]),
    ));
    model.operations.push(Operation {
        name: "add".into(),
        op_type: "Add".into(),
    });
    model
}

/// A graph loaded on a fresh simulated device. The compiled kernel adds 1.
pub fn graph(batch: usize, config: &NpuConfig) -> (Arc<SimDriver>, CompiledGraph) {
    let sim = Arc::new(SimDriver::new());
    let graph = graph_on(sim.clone(), batch, config);
    (sim, graph)
}

pub fn graph_on(driver: Arc<dyn Driver>, batch: usize, config: &NpuConfig) -> CompiledGraph {
    let adapter = CompilerAdapter::new(Arc::new(ReferenceCompiler::new()), Some(driver));
    adapter.compile(&model(batch), config).unwrap()
}

pub fn export_only_graph(config: &NpuConfig) -> CompiledGraph {
    let adapter = CompilerAdapter::new(Arc::new(ReferenceCompiler::new()), None);
    adapter.compile(&model(1), config).unwrap()
}

/// An event nothing signals until [`signal_from_side_queue`] is called.
pub fn unsignalled_event(driver: &Arc<dyn Driver>) -> Arc<Event> {
    let pool = EventPool::new(Arc::clone(driver), 1).unwrap();
    Arc::new(Event::new(&pool, 0).unwrap())
}

/// Signals `event` from a queue of its own and waits for it.
pub fn signal_from_side_queue(driver: &Arc<dyn Driver>, event: &Event) {
    let queue = CommandQueue::new(
        Arc::clone(driver),
        QueueDesc {
            ordinal: 0,
            priority: QueuePriority::Normal,
            turbo: false,
        },
    )
    .unwrap();
    let list = CommandList::new(Arc::clone(driver), 0, false).unwrap();
    event.append_signal(&list).unwrap();
    list.close().unwrap();
    queue.execute(&list, None).unwrap();
    event.host_synchronize(WAIT_FOREVER).unwrap();
}
