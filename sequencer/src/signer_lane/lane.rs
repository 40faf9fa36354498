// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use alloy_primitives::Address;
use app_core::LedgerCall;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::profiling::SignerLaneMetrics;
use super::slot::{RetryPolicy, SignerSlot};
use super::types::LaneOperation;
use super::{
    OperationOutcome, QueuedOperation, SequencerError, SignerLaneError, SignerLaneInput,
    SubmitOptions, TransactionReceipt,
};
use crate::ledger::SharedLedger;

#[derive(Debug, Clone, Copy)]
pub struct SignerLaneConfig {
    pub queue_capacity: usize,
    /// How long `enqueue` waits for queue capacity before reporting `QueueFull`.
    pub queue_timeout: Duration,
    /// Upper bound for one operation, receipt wait included.
    pub operation_timeout: Duration,
    pub retry: RetryPolicy,
    pub metrics_enabled: bool,
    pub metrics_log_interval: Duration,
}

impl Default for SignerLaneConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            queue_timeout: Duration::from_millis(100),
            operation_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            metrics_enabled: false,
            metrics_log_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignerLaneStop {
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl SignerLaneStop {
    /// The lane finishes the operation it is running, then exits. Operations
    /// still queued are dropped and their callers see `LaneUnavailable`.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.wake.notify_one();
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    async fn wait_for_shutdown(&self) {
        while !self.is_shutdown_requested() {
            self.wake.notified().await;
        }
    }
}

/// Cloneable entry point to the lane, shared by every caller.
#[derive(Debug, Clone)]
pub struct SignerHandle {
    tx: mpsc::Sender<SignerLaneInput>,
    queue_timeout: Duration,
    operation_timeout: Duration,
}

impl SignerHandle {
    /// Runs `operation` with exclusive access to the signer, after every
    /// operation enqueued before it has finished.
    ///
    /// The operation keeps running if the caller stops waiting; only its
    /// result is discarded.
    pub async fn enqueue<T, F>(&self, operation: F) -> Result<T, SequencerError>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut SignerSlot) -> BoxFuture<'a, Result<T, SequencerError>>
            + Send
            + 'static,
    {
        let (respond_to, recv) = oneshot::channel();
        let timeout = self.operation_timeout;

        let operation = lane_operation(move |slot| {
            Box::pin(async move {
                let outcome = tokio::time::timeout(timeout, operation(&mut *slot)).await;
                let (result, lane_outcome) = match outcome {
                    Ok(Ok(value)) => (Ok(value), OperationOutcome::Succeeded),
                    Ok(Err(err)) => (Err(err), OperationOutcome::Failed),
                    Err(_) => {
                        // The operation may have allocated a nonce it never used.
                        slot.invalidate_sequence_number();
                        let tx_hash = slot.take_unconfirmed();
                        (
                            Err(SequencerError::OperationTimedOut { timeout, tx_hash }),
                            OperationOutcome::TimedOut,
                        )
                    }
                };
                let _ = respond_to.send(result);
                lane_outcome
            })
        });

        let queued = QueuedOperation {
            operation,
            enqueued_at: Instant::now(),
        };
        match self
            .tx
            .send_timeout(SignerLaneInput::Operation(queued), self.queue_timeout)
            .await
        {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => return Err(SequencerError::QueueFull),
            Err(SendTimeoutError::Closed(_)) => return Err(SequencerError::LaneUnavailable),
        }

        recv.await.map_err(|_| SequencerError::LaneUnavailable)?
    }

    /// Queues one ledger submission and waits for its receipt.
    pub async fn submit(
        &self,
        call: LedgerCall,
        options: SubmitOptions,
    ) -> Result<TransactionReceipt, SequencerError> {
        self.enqueue(move |slot| Box::pin(async move { slot.submit(&call, options).await }))
            .await
    }

    /// Number of operations waiting behind the one in flight.
    pub fn queue_depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

fn lane_operation<F>(operation: F) -> LaneOperation
where
    F: for<'a> FnOnce(&'a mut SignerSlot) -> BoxFuture<'a, OperationOutcome> + Send + 'static,
{
    Box::new(operation)
}

/// Single consumer of the signer queue.
pub struct SignerLane {
    rx: mpsc::Receiver<SignerLaneInput>,
    stop: SignerLaneStop,
    slot: SignerSlot,
    metrics: SignerLaneMetrics,
}

impl SignerLane {
    pub fn new(
        ledger: SharedLedger,
        signer: Address,
        config: SignerLaneConfig,
    ) -> (Self, SignerHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let lane = Self {
            rx,
            stop: SignerLaneStop::default(),
            slot: SignerSlot::new(ledger, signer, config.retry),
            metrics: SignerLaneMetrics::new(config.metrics_enabled, config.metrics_log_interval),
        };
        let handle = SignerHandle {
            tx,
            queue_timeout: config.queue_timeout,
            operation_timeout: config.operation_timeout,
        };
        (lane, handle)
    }

    pub fn spawn(self) -> (JoinHandle<SignerLaneError>, SignerLaneStop) {
        let stop = self.stop.clone();
        let handle = tokio::spawn(async move {
            let mut lane = self;
            match lane.run_forever().await {
                Err(err) => err,
                Ok(()) => unreachable!("signer lane run loop is expected to be non-terminating"),
            }
        });
        (handle, stop)
    }

    async fn run_forever(&mut self) -> Result<(), SignerLaneError> {
        info!(signer = %self.slot.signer(), "signer lane started");
        loop {
            let input = tokio::select! {
                biased;
                _ = self.stop.wait_for_shutdown() => break,
                input = self.rx.recv() => input,
            };
            match input {
                Some(SignerLaneInput::Operation(queued)) => self.execute(queued).await,
                None => {
                    self.metrics.log_final();
                    return Err(SignerLaneError::ChannelClosed);
                }
            }
            self.metrics.maybe_log_window();
        }

        self.metrics.log_final();
        Err(SignerLaneError::ShutdownRequested)
    }

    async fn execute(&mut self, queued: QueuedOperation) {
        let QueuedOperation {
            operation,
            enqueued_at,
        } = queued;
        let queue_wait = enqueued_at.elapsed();
        self.metrics.on_operation_start(self.rx.len(), queue_wait);

        let generation_before = self.slot.generation();
        let started_at = Instant::now();
        let outcome = operation(&mut self.slot).await;
        let execution = started_at.elapsed();
        let restarted = self.slot.generation() != generation_before;

        debug!(
            ?outcome,
            queue_wait_ms = queue_wait.as_millis() as u64,
            execution_ms = execution.as_millis() as u64,
            restarted,
            "signer lane operation finished"
        );
        self.metrics.on_operation_end(outcome, execution, restarted);
    }
}
