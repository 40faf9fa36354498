// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::{Duration, Instant};
use tracing::info;

use super::OperationOutcome;

#[derive(Debug)]
pub(super) struct SignerLaneMetrics {
    enabled: bool,
    log_interval: Duration,
    window_started_at: Instant,
    operations: u64,
    succeeded: u64,
    failed: u64,
    timed_out: u64,
    restarts: u64,
    max_queue_depth: usize,
    queue_wait: Duration,
    max_queue_wait: Duration,
    execution: Duration,
    max_execution: Duration,
}

impl SignerLaneMetrics {
    pub(super) fn new(enabled: bool, log_interval: Duration) -> Self {
        Self {
            enabled,
            log_interval,
            window_started_at: Instant::now(),
            operations: 0,
            succeeded: 0,
            failed: 0,
            timed_out: 0,
            restarts: 0,
            max_queue_depth: 0,
            queue_wait: Duration::ZERO,
            max_queue_wait: Duration::ZERO,
            execution: Duration::ZERO,
            max_execution: Duration::ZERO,
        }
    }

    pub(super) fn on_operation_start(&mut self, queue_depth: usize, queue_wait: Duration) {
        if !self.enabled {
            return;
        }
        self.max_queue_depth = self.max_queue_depth.max(queue_depth);
        self.queue_wait = self.queue_wait.saturating_add(queue_wait);
        self.max_queue_wait = self.max_queue_wait.max(queue_wait);
    }

    pub(super) fn on_operation_end(
        &mut self,
        outcome: OperationOutcome,
        execution: Duration,
        restarted: bool,
    ) {
        if !self.enabled {
            return;
        }
        self.operations = self.operations.saturating_add(1);
        match outcome {
            OperationOutcome::Succeeded => self.succeeded = self.succeeded.saturating_add(1),
            OperationOutcome::Failed => self.failed = self.failed.saturating_add(1),
            OperationOutcome::TimedOut => self.timed_out = self.timed_out.saturating_add(1),
        }
        if restarted {
            self.restarts = self.restarts.saturating_add(1);
        }
        self.execution = self.execution.saturating_add(execution);
        self.max_execution = self.max_execution.max(execution);
    }

    pub(super) fn maybe_log_window(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed = self.window_started_at.elapsed();
        if elapsed < self.log_interval {
            return;
        }
        self.log_window(elapsed, false);
        self.reset_window();
    }

    pub(super) fn log_final(&mut self) {
        if !self.enabled || self.operations == 0 {
            return;
        }
        self.log_window(self.window_started_at.elapsed(), true);
    }

    fn log_window(&self, elapsed: Duration, final_window: bool) {
        info!(
            final_window,
            window_ms = elapsed.as_millis() as u64,
            operations = self.operations,
            succeeded = self.succeeded,
            failed = self.failed,
            timed_out = self.timed_out,
            restarts = self.restarts,
            max_queue_depth = self.max_queue_depth,
            avg_queue_wait_ms = average_ms(self.queue_wait, self.operations),
            max_queue_wait_ms = self.max_queue_wait.as_millis() as u64,
            avg_execution_ms = average_ms(self.execution, self.operations),
            max_execution_ms = self.max_execution.as_millis() as u64,
            "signer lane metrics"
        );
    }

    fn reset_window(&mut self) {
        *self = Self::new(self.enabled, self.log_interval);
    }
}

fn average_ms(total: Duration, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    total.as_secs_f64() * 1000.0 / count as f64
}
