// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph profiling pools and queries.

use crate::types::{GraphHandle, ProfilingPoolHandle, QueryHandle};
use crate::{Driver, DriverResult};
use std::sync::Arc;

/// A pool of profiling queries tied to one loaded graph.
#[derive(Debug)]
pub struct ProfilingPool {
    driver: Arc<dyn Driver>,
    handle: ProfilingPoolHandle,
}

impl ProfilingPool {
    pub fn new(driver: Arc<dyn Driver>, graph: GraphHandle, count: u32) -> DriverResult<Arc<Self>> {
        let handle = driver.create_profiling_pool(graph, count.max(1))?;
        Ok(Arc::new(Self { driver, handle }))
    }

    pub fn handle(&self) -> ProfilingPoolHandle {
        self.handle
    }
}

impl Drop for ProfilingPool {
    fn drop(&mut self) {
        if let Err(e) = self.driver.destroy_profiling_pool(self.handle) {
            tracing::warn!("Failed to destroy profiling pool {}: {e}", self.handle);
        }
    }
}

/// A profiling query. Bound to a graph-execute command, it collects the
/// device's raw per-operation profiling data for that execution.
#[derive(Debug)]
pub struct ProfilingQuery {
    pool: Arc<ProfilingPool>,
    handle: QueryHandle,
}

impl ProfilingQuery {
    pub fn new(pool: &Arc<ProfilingPool>, index: u32) -> DriverResult<Self> {
        let handle = pool.driver.create_profiling_query(pool.handle, index)?;
        Ok(Self {
            pool: Arc::clone(pool),
            handle,
        })
    }

    pub fn handle(&self) -> QueryHandle {
        self.handle
    }

    /// Raw profiling bytes of the last execution.
    pub fn data(&self) -> DriverResult<Vec<u8>> {
        self.pool.driver.profiling_query_data(self.handle)
    }
}

impl Drop for ProfilingQuery {
    fn drop(&mut self) {
        if let Err(e) = self.pool.driver.destroy_profiling_query(self.handle) {
            tracing::warn!("Failed to destroy profiling query {}: {e}", self.handle);
        }
    }
}
