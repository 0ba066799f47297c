// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device-side profiling resources handed to a pipeline.
//!
//! Two independent facilities:
//! - a profiling query bound to every graph-execute command, whose raw
//!   data maps back to per-operation timings through
//!   [`CompiledGraph::process_profiling_output`];
//! - a host-visible timestamp buffer with a begin/end slot pair per stream.

use crate::RuntimeResult;
use npu_common::NpuConfig;
use npu_driver::{DeviceAddress, DeviceBuffer, ProfilingPool, ProfilingQuery, QueryHandle};
use npu_graph::{CompiledGraph, GraphError};
use std::sync::Arc;

/// Size of one device timestamp.
pub const TIMESTAMP_BYTES: usize = 8;

/// Device ticks written before and after one stream's graph execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTimestamps {
    pub begin: u64,
    pub end: u64,
}

impl StreamTimestamps {
    pub fn ticks(&self) -> u64 {
        self.end.saturating_sub(self.begin)
    }
}

#[derive(Debug, Default)]
pub struct ProfilingResources {
    query: Option<ProfilingQuery>,
    timestamps: Option<DeviceBuffer>,
    streams: usize,
}

impl ProfilingResources {
    /// No query, no timestamps.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Creates the query when `PERF_COUNT` is set and the timestamp buffer
    /// when `timestamps` is, sized for `stream_count` streams.
    pub fn new(
        graph: &CompiledGraph,
        config: &NpuConfig,
        timestamps: bool,
        stream_count: usize,
    ) -> RuntimeResult<Self> {
        if !config.perf_count && !timestamps {
            return Ok(Self::disabled());
        }
        let (Some(driver), Some(handle)) = (graph.driver(), graph.handle()) else {
            return Err(GraphError::Config(format!(
                "'{}' has no device graph to profile",
                graph.metadata().name
            ))
            .into());
        };

        let query = if config.perf_count {
            let pool = ProfilingPool::new(Arc::clone(driver), handle, 1)?;
            Some(ProfilingQuery::new(&pool, 0)?)
        } else {
            None
        };
        let timestamps = if timestamps {
            Some(DeviceBuffer::new(
                Arc::clone(driver),
                stream_count * 2 * TIMESTAMP_BYTES,
            )?)
        } else {
            None
        };

        tracing::debug!(
            "Profiling for '{}': query {}, timestamps for {} streams",
            graph.metadata().name,
            query.is_some(),
            if timestamps.is_some() { stream_count } else { 0 }
        );
        Ok(Self {
            query,
            timestamps,
            streams: stream_count,
        })
    }

    pub fn query_handle(&self) -> Option<QueryHandle> {
        self.query.as_ref().map(ProfilingQuery::handle)
    }

    pub fn is_enabled(&self) -> bool {
        self.query.is_some() || self.timestamps.is_some()
    }

    pub fn has_timestamps(&self) -> bool {
        self.timestamps.is_some()
    }

    /// Slot the device writes the begin (`end == false`) or end timestamp
    /// of `stream` to.
    pub fn timestamp_address(&self, stream: usize, end: bool) -> Option<DeviceAddress> {
        let buffer = self.timestamps.as_ref()?;
        if stream >= self.streams {
            return None;
        }
        let slot = stream * 2 + usize::from(end);
        Some(buffer.address().offset(slot * TIMESTAMP_BYTES))
    }

    /// Reads both timestamps of `stream`.
    pub fn read_timestamps(&self, stream: usize) -> RuntimeResult<Option<StreamTimestamps>> {
        let Some(buffer) = self.timestamps.as_ref() else {
            return Ok(None);
        };
        if stream >= self.streams {
            return Ok(None);
        }
        let mut begin = [0u8; TIMESTAMP_BYTES];
        let mut end = [0u8; TIMESTAMP_BYTES];
        buffer.read_at(stream * 2 * TIMESTAMP_BYTES, &mut begin)?;
        buffer.read_at((stream * 2 + 1) * TIMESTAMP_BYTES, &mut end)?;
        Ok(Some(StreamTimestamps {
            begin: u64::from_le_bytes(begin),
            end: u64::from_le_bytes(end),
        }))
    }

    /// Raw profiling data of the last graph execution.
    pub fn query_data(&self) -> RuntimeResult<Option<Vec<u8>>> {
        match &self.query {
            Some(query) => Ok(Some(query.data()?)),
            None => Ok(None),
        }
    }
}
