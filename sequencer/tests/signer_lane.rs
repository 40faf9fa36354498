// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use alloy_primitives::{Address, U256};
use app_core::{ContractAddresses, Currency, FundingLeg, LedgerCall};
use sequencer::ledger::{MockLedger, MockLedgerEvent, SharedLedger};
use sequencer::signer_lane::{
    RetryPolicy, SequencerError, SignerHandle, SignerLane, SignerLaneConfig, SignerLaneError,
    SignerLaneStop, SubmitOptions,
};
use tokio::task::JoinHandle;

struct LaneRuntime {
    ledger: Arc<MockLedger>,
    handle: SignerHandle,
    stop: SignerLaneStop,
    join: Option<JoinHandle<SignerLaneError>>,
}

impl Drop for LaneRuntime {
    fn drop(&mut self) {
        self.stop.request_shutdown();
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

fn start_lane(ledger: MockLedger, config: SignerLaneConfig) -> LaneRuntime {
    let ledger = Arc::new(ledger);
    let shared: SharedLedger = ledger.clone();
    let (lane, handle) = SignerLane::new(shared, ledger.admin(), config);
    let (join, stop) = lane.spawn();
    LaneRuntime {
        ledger,
        handle,
        stop,
        join: Some(join),
    }
}

fn test_config() -> SignerLaneConfig {
    SignerLaneConfig {
        queue_capacity: 128,
        queue_timeout: Duration::from_millis(500),
        operation_timeout: Duration::from_secs(2),
        retry: RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        },
        metrics_enabled: true,
        metrics_log_interval: Duration::from_millis(10),
    }
}

fn admin() -> Address {
    Address::repeat_byte(0xad)
}

fn native_transfer(recipient: Address) -> LedgerCall {
    let contracts = ContractAddresses {
        identity_registry: Address::repeat_byte(0x01),
        role_registry: Address::repeat_byte(0x02),
        token: Address::repeat_byte(0x03),
    };
    contracts.fund(
        recipient,
        &FundingLeg {
            currency: Currency::Native,
            amount: U256::from(1_000_u64),
        },
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_operations_never_overlap() {
    let runtime = start_lane(MockLedger::new(admin()), test_config());
    let busy = Arc::new(AtomicBool::new(false));
    let spans = Arc::new(Mutex::new(Vec::<(Instant, Instant)>::new()));

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let handle = runtime.handle.clone();
        let busy = busy.clone();
        let spans = spans.clone();
        tasks.push(tokio::spawn(async move {
            handle
                .enqueue(move |_slot| {
                    Box::pin(async move {
                        assert!(!busy.swap(true, Ordering::SeqCst), "operations overlapped");
                        let started = Instant::now();
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        let finished = Instant::now();
                        busy.store(false, Ordering::SeqCst);
                        spans.lock().expect("spans lock").push((started, finished));
                        Ok(())
                    })
                })
                .await
        }));
    }
    for task in tasks {
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("operation finishes")
            .expect("join operation")
            .expect("operation succeeds");
    }

    let spans = spans.lock().expect("spans lock").clone();
    assert_eq!(spans.len(), 20);
    for pair in spans.windows(2) {
        assert!(pair[1].0 >= pair[0].1, "operation started before previous finished");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequence_numbers_are_gapless_without_restarts() {
    let runtime = start_lane(MockLedger::new(admin()).with_block_height(3), test_config());

    let mut tasks = Vec::new();
    for index in 0..12_u8 {
        let handle = runtime.handle.clone();
        tasks.push(tokio::spawn(async move {
            handle
                .submit(
                    native_transfer(Address::repeat_byte(index)),
                    SubmitOptions::default(),
                )
                .await
        }));
    }
    let mut receipts = Vec::new();
    for task in tasks {
        receipts.push(task.await.expect("join submit").expect("submit succeeds"));
    }

    assert_eq!(runtime.ledger.submitted_nonces(), (0..12).collect::<Vec<u64>>());
    assert_eq!(runtime.ledger.transaction_count_queries(), 1);
    let mut issued: Vec<u64> = receipts.iter().map(|receipt| receipt.sequence_number).collect();
    issued.sort_unstable();
    assert_eq!(issued, (0..12).collect::<Vec<u64>>());
    assert!(receipts.iter().all(|receipt| receipt.confirmed && receipt.generation == 0));
}

#[tokio::test]
async fn restart_between_operations_requeries_count() {
    let runtime = start_lane(MockLedger::new(admin()).with_block_height(42), test_config());

    let first = runtime
        .handle
        .submit(native_transfer(Address::repeat_byte(1)), SubmitOptions::default())
        .await
        .expect("first submit");
    assert_eq!(first.sequence_number, 0);

    runtime.ledger.restart(0);
    runtime.ledger.bump_transaction_count(4);

    let second = runtime
        .handle
        .submit(native_transfer(Address::repeat_byte(2)), SubmitOptions::default())
        .await
        .expect("second submit");
    assert_eq!(second.sequence_number, 4);
    assert_eq!(second.generation, 1);
    assert_eq!(runtime.ledger.transaction_count_queries(), 2);
}

#[tokio::test]
async fn single_stale_rejection_is_retried_transparently() {
    let runtime = start_lane(MockLedger::new(admin()), test_config());
    runtime.ledger.reject_next_submissions_as_stale(1);

    let receipt = runtime
        .handle
        .submit(native_transfer(Address::repeat_byte(1)), SubmitOptions::default())
        .await
        .expect("retried submit succeeds");
    assert_eq!(receipt.sequence_number, 0);
    assert!(receipt.confirmed);
    assert_eq!(runtime.ledger.transaction_count_queries(), 2);

    let events = runtime.ledger.events();
    assert!(matches!(events[0], MockLedgerEvent::StaleRejected { nonce: 0 }));
    assert!(matches!(events[1], MockLedgerEvent::Submitted { nonce: 0, .. }));
}

#[tokio::test]
async fn out_of_band_transactions_are_recovered_from() {
    let runtime = start_lane(MockLedger::new(admin()), test_config());
    runtime
        .handle
        .submit(native_transfer(Address::repeat_byte(1)), SubmitOptions::default())
        .await
        .expect("first submit");

    // Someone else used the administrator key twice.
    runtime.ledger.bump_transaction_count(2);

    let receipt = runtime
        .handle
        .submit(native_transfer(Address::repeat_byte(2)), SubmitOptions::default())
        .await
        .expect("second submit recovers");
    assert_eq!(receipt.sequence_number, 3);
    assert_eq!(runtime.ledger.submitted_nonces(), vec![0, 3]);
}

#[tokio::test]
async fn persistent_staleness_escalates_after_bound() {
    let runtime = start_lane(MockLedger::new(admin()), test_config());
    runtime.ledger.reject_next_submissions_as_stale(10);

    let err = runtime
        .handle
        .submit(native_transfer(Address::repeat_byte(1)), SubmitOptions::default())
        .await
        .expect_err("staleness escalates");
    assert!(matches!(err, SequencerError::StaleSequenceNumber { attempts: 3, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn timed_out_operation_releases_lane() {
    let config = SignerLaneConfig {
        operation_timeout: Duration::from_millis(50),
        ..test_config()
    };
    let runtime = start_lane(MockLedger::new(admin()), config);
    runtime.ledger.stall_confirmations(true);

    let err = runtime
        .handle
        .submit(native_transfer(Address::repeat_byte(1)), SubmitOptions::default())
        .await
        .expect_err("stalled receipt times out");
    let SequencerError::OperationTimedOut { timeout, tx_hash } = err.clone() else {
        panic!("expected timeout, got {err:?}");
    };
    assert_eq!(timeout, Duration::from_millis(50));
    // The transaction was broadcast before the deadline, so its hash survives.
    let broadcast = runtime.ledger.events().iter().find_map(|event| match event {
        MockLedgerEvent::Submitted { tx_hash, .. } => Some(*tx_hash),
        _ => None,
    });
    assert!(tx_hash.is_some());
    assert_eq!(tx_hash, broadcast);
    assert!(!err.is_retryable());

    runtime.ledger.stall_confirmations(false);
    let receipt = tokio::time::timeout(
        Duration::from_secs(2),
        runtime
            .handle
            .submit(native_transfer(Address::repeat_byte(2)), SubmitOptions::default()),
    )
    .await
    .expect("lane serves next operation")
    .expect("next submit succeeds");
    // The timed-out transaction was accepted, so the count moved on.
    assert_eq!(receipt.sequence_number, 1);
    assert_eq!(runtime.ledger.transaction_count_queries(), 2);
}

#[tokio::test]
async fn operations_run_in_enqueue_order() {
    let runtime = start_lane(MockLedger::new(admin()), test_config());
    let order = Arc::new(Mutex::new(Vec::new()));

    let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let gate = runtime.handle.clone();
    let gate_task = tokio::spawn(async move {
        gate.enqueue(|_slot| {
            Box::pin(async move {
                let _ = started_tx.send(());
                let _ = release_rx.await;
                Ok(())
            })
        })
        .await
    });
    started_rx.await.expect("gate operation started");

    let mut tasks = Vec::new();
    for index in 0..5_usize {
        let handle = runtime.handle.clone();
        let order = order.clone();
        tasks.push(tokio::spawn(async move {
            handle
                .enqueue(move |_slot| {
                    Box::pin(async move {
                        order.lock().expect("order lock").push(index);
                        Ok(())
                    })
                })
                .await
        }));
        wait_for_depth(&runtime.handle, index + 1).await;
    }

    let _ = release_tx.send(());
    gate_task.await.expect("join gate").expect("gate op");
    for task in tasks {
        task.await.expect("join op").expect("op succeeds");
    }
    assert_eq!(*order.lock().expect("order lock"), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn shutdown_stops_the_lane() {
    let mut runtime = start_lane(MockLedger::new(admin()), test_config());
    runtime.stop.request_shutdown();
    let join = runtime.join.take().expect("join handle");
    let result = tokio::time::timeout(Duration::from_secs(2), join)
        .await
        .expect("lane stops")
        .expect("join lane");
    assert!(matches!(result, SignerLaneError::ShutdownRequested));

    let err = runtime
        .handle
        .submit(native_transfer(Address::repeat_byte(1)), SubmitOptions::default())
        .await
        .expect_err("stopped lane refuses work");
    assert_eq!(err, SequencerError::LaneUnavailable);
}

async fn wait_for_depth(handle: &SignerHandle, depth: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while handle.queue_depth() != depth {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("queue reaches expected depth");
}
