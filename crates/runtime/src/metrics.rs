// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Inference metrics.
//!
//! [`InferenceMetrics`] aggregates host wall-clock durations and device
//! timestamps of every pipeline stream, plus the per-operation profile when
//! `PERF_COUNT` is enabled.

use crate::StreamTiming;
use npu_common::ProfilingEntry;
use std::time::Duration;

/// Metrics for one pipeline stream.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StreamMetrics {
    pub stream: usize,
    /// Submission until the host observed completion.
    pub host_duration: Duration,
    /// Device ticks between the timestamps around the graph execution.
    pub device_ticks: Option<u64>,
}

/// Aggregate metrics for one inference.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InferenceMetrics {
    /// Wall-clock time from writing inputs to reading outputs.
    pub total_duration: Duration,
    /// Time spent copying inputs to the device.
    pub input_copy_duration: Duration,
    /// Time spent copying outputs back.
    pub output_copy_duration: Duration,
    pub stream_metrics: Vec<StreamMetrics>,
    /// Per-operation profile reported by the compiler.
    pub operations: Vec<ProfilingEntry>,
    /// Samples carried by the request.
    pub batch_size: usize,
}

impl InferenceMetrics {
    pub fn new(batch_size: usize) -> Self {
        Self {
            total_duration: Duration::ZERO,
            input_copy_duration: Duration::ZERO,
            output_copy_duration: Duration::ZERO,
            stream_metrics: Vec::new(),
            operations: Vec::new(),
            batch_size,
        }
    }

    pub fn record_streams(&mut self, timings: &[StreamTiming]) {
        self.stream_metrics = timings
            .iter()
            .enumerate()
            .map(|(stream, timing)| StreamMetrics {
                stream,
                host_duration: timing.host,
                device_ticks: timing.device.map(|d| d.ticks()),
            })
            .collect();
    }

    pub fn finalise(&mut self, total: Duration) {
        self.total_duration = total;
    }

    /// Longest host wait across streams.
    pub fn slowest_stream(&self) -> Duration {
        self.stream_metrics
            .iter()
            .map(|s| s.host_duration)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Sum of device ticks across streams, if timestamps were recorded.
    pub fn device_ticks(&self) -> Option<u64> {
        self.stream_metrics
            .iter()
            .map(|s| s.device_ticks)
            .sum::<Option<u64>>()
            .filter(|_| !self.stream_metrics.is_empty())
    }

    pub fn samples_per_second(&self) -> f64 {
        let secs = self.total_duration.as_secs_f64();
        if secs <= 0.0 || self.batch_size == 0 {
            return 0.0;
        }
        self.batch_size as f64 / secs
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let ticks = match self.device_ticks() {
            Some(ticks) => format!(", {ticks} device ticks"),
            None => String::new(),
        };
        format!(
            "Inference: {:.3}ms total, {} streams (slowest {:.3}ms){ticks}, \
             {:.3}ms in / {:.3}ms out copies, {} samples ({:.1} samples/s)",
            self.total_duration.as_secs_f64() * 1000.0,
            self.stream_metrics.len(),
            self.slowest_stream().as_secs_f64() * 1000.0,
            self.input_copy_duration.as_secs_f64() * 1000.0,
            self.output_copy_duration.as_secs_f64() * 1000.0,
            self.batch_size,
            self.samples_per_second(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamTimestamps;

    fn timing(host_ms: u64, ticks: Option<u64>) -> StreamTiming {
        StreamTiming {
            host: Duration::from_millis(host_ms),
            device: ticks.map(|t| StreamTimestamps { begin: 5, end: 5 + t }),
        }
    }

    #[test]
    fn test_empty_metrics() {
        let m = InferenceMetrics::new(1);
        assert_eq!(m.samples_per_second(), 0.0);
        assert_eq!(m.slowest_stream(), Duration::ZERO);
        assert_eq!(m.device_ticks(), None);
    }

    #[test]
    fn test_record_streams() {
        let mut m = InferenceMetrics::new(2);
        m.record_streams(&[timing(3, Some(1000)), timing(7, Some(2001))]);
        m.finalise(Duration::from_millis(10));

        assert_eq!(m.stream_metrics.len(), 2);
        assert_eq!(m.stream_metrics[1].stream, 1);
        assert_eq!(m.slowest_stream(), Duration::from_millis(7));
        assert_eq!(m.device_ticks(), Some(3001));
        assert!((m.samples_per_second() - 200.0).abs() < 0.01);
    }

    #[test]
    fn test_ticks_need_every_stream() {
        let mut m = InferenceMetrics::new(2);
        m.record_streams(&[timing(1, Some(1000)), timing(1, None)]);
        assert_eq!(m.device_ticks(), None);
    }

    #[test]
    fn test_summary_format() {
        let mut m = InferenceMetrics::new(4);
        m.record_streams(&[timing(1, Some(1001))]);
        m.finalise(Duration::from_millis(2));

        let s = m.summary();
        assert!(s.contains("Inference:"));
        assert!(s.contains("1 streams"));
        assert!(s.contains("1001 device ticks"));
        assert!(s.contains("4 samples"));

        m.record_streams(&[timing(1, None)]);
        assert!(!m.summary().contains("device ticks"));
    }
}
