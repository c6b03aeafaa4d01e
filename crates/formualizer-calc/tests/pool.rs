mod common;

use common::SpyFactory;
use crossbeam_channel::bounded;
use formualizer_calc::service::{self, Reply};
use formualizer_calc::{
    CalculationOutcome, CalculationRequest, CellValue, ExecutionPool, FailureKind,
    FormualizerFactory, PoolConfig, PoolError,
};
use std::thread;
use std::time::{Duration, Instant};

fn config(workers: usize, queue_capacity: usize) -> PoolConfig {
    PoolConfig {
        queue_capacity,
        shutdown_timeout: Duration::from_secs(10),
        ..PoolConfig::with_workers(workers)
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn concurrent_requests_all_complete() {
    let pool = ExecutionPool::start(config(4, 16), FormualizerFactory).unwrap();
    let pending: Vec<_> = (0..32)
        .map(|i| {
            let request = CalculationRequest::new("#n * 2").with_variable("n", i);
            pool.submit(request).unwrap()
        })
        .collect();
    for (i, pending) in pending.into_iter().enumerate() {
        let outcome = pending.wait().unwrap();
        assert_eq!(outcome, CalculationOutcome::success(i as f64 * 2.0));
    }
    let report = pool.drain();
    assert_eq!(report.completed, 32);
    assert!(!report.timed_out);
}

#[test]
fn panics_are_contained_to_their_request() {
    let factory = SpyFactory {
        panic_marker: Some("PANIC".into()),
        result: Some(Ok(CellValue::Number(1.0))),
        ..SpyFactory::new()
    };
    let log = factory.log.clone();
    let pool = ExecutionPool::start(config(1, 8), factory).unwrap();

    let crashed = pool.run(CalculationRequest::new("PANIC()")).unwrap();
    assert_eq!(
        crashed,
        CalculationOutcome::Failure {
            kind: FailureKind::Internal,
            message: "Worker execution failed".into(),
        }
    );

    let fine = pool.run(CalculationRequest::new("1")).unwrap();
    assert_eq!(fine, CalculationOutcome::success(1.0));
    assert_eq!(pool.live_workers(), 1);
    assert_eq!(pool.status().panicked, 1);

    pool.drain();
    assert_eq!(log.created(), 2);
    assert_eq!(log.disposed(), 2);
}

#[test]
fn try_submit_fails_fast_when_the_queue_is_full() {
    let (open, gate) = bounded::<()>(0);
    let factory = SpyFactory {
        gate: Some(gate),
        ..SpyFactory::new()
    };
    let pool = ExecutionPool::start(config(1, 1), factory).unwrap();

    let running = pool.submit(CalculationRequest::new("1")).unwrap();
    wait_until(|| pool.in_flight() == 1);
    let queued = pool.try_submit(CalculationRequest::new("2")).unwrap();
    assert_eq!(pool.queued(), 1);
    assert_eq!(
        pool.try_submit(CalculationRequest::new("3")).err(),
        Some(PoolError::Busy)
    );

    drop(open);
    assert!(running.wait().unwrap().is_success());
    assert!(queued.wait().unwrap().is_success());
    pool.drain();
}

#[test]
fn drain_finishes_queued_work() {
    let (open, gate) = bounded::<()>(0);
    let factory = SpyFactory {
        gate: Some(gate),
        ..SpyFactory::new()
    };
    let log = factory.log.clone();
    let pool = ExecutionPool::start(config(2, 8), factory).unwrap();
    let pending: Vec<_> = (0..6)
        .map(|_| pool.submit(CalculationRequest::new("1")).unwrap())
        .collect();

    let opener = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        drop(open);
    });
    let report = pool.drain();
    opener.join().unwrap();

    assert!(!report.timed_out);
    assert_eq!(report.completed, 6);
    assert_eq!(report.workers_joined, 2);
    assert_eq!(report.unfinished, 0);
    for pending in pending {
        assert!(pending.wait().unwrap().is_success());
    }
    assert_eq!(log.disposed(), 6);
}

#[test]
fn drain_gives_up_after_the_shutdown_timeout() {
    let (open, gate) = bounded::<()>(0);
    let factory = SpyFactory {
        gate: Some(gate),
        ..SpyFactory::new()
    };
    let pool = ExecutionPool::start(
        PoolConfig {
            shutdown_timeout: Duration::from_millis(50),
            ..config(1, 4)
        },
        factory,
    )
    .unwrap();
    let stuck = pool.submit(CalculationRequest::new("1")).unwrap();
    wait_until(|| pool.in_flight() == 1);

    let report = pool.drain();
    assert!(report.timed_out);
    assert_eq!(report.unfinished, 1);
    assert_eq!(report.workers_joined, 0);

    drop(open);
    assert!(stuck.wait().unwrap().is_success());
}

#[test]
fn calculate_flow_maps_bodies_to_replies() {
    let pool = ExecutionPool::start(config(1, 4), FormualizerFactory).unwrap();

    let reply: Reply = service::handle_calculate(&pool, br#"{"formula": "2 * (3 + 4)"}"#);
    assert_eq!(reply.status_code, 200);
    assert_eq!(reply.body.result, Some(CellValue::Number(14.0)));

    let reply = service::handle_calculate(&pool, br#"{"formula": "1/0"}"#);
    assert_eq!(reply.status_code, 422);
    assert_eq!(reply.body.error_type.as_deref(), Some("DIV_BY_ZERO"));

    let reply = service::handle_calculate(&pool, br#"{"variables": {}}"#);
    assert_eq!(reply.status_code, 400);

    let health = service::health(&pool);
    assert_eq!(health.status, "ok");
    assert_eq!(health.workers, 1);

    pool.drain();
    let reply = service::handle_calculate(&pool, br#"{"formula": "1"}"#);
    assert_eq!(reply.status_code, 500);
}
