use grove_engine::{
    EngineError, EnginePool, EnginePoolConfig, EvalRequest, JobId, RetryPolicy,
};
use grove_stats::StatKey;
use grove_test_utils::{
    encode_build, fixture_build, launcher_from_build_fn, stats_response, unsupported_response,
    ScriptAction, ScriptedLauncher,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fast_config(workers: usize) -> EnginePoolConfig {
    EnginePoolConfig {
        workers,
        request_timeout: Duration::from_millis(200),
        ready_timeout: Duration::from_millis(200),
        max_start_attempts: 2,
        max_restarts: 4,
        retry: RetryPolicy {
            max_attempts: 2,
            backoff: Duration::from_millis(10),
        },
        start_backoff: Duration::from_millis(10),
        shutdown_grace: Duration::from_millis(100),
        queue_depth: 8,
    }
}

#[tokio::test]
async fn evaluate_round_trips_stats() {
    let launcher = launcher_from_build_fn(|build, _| {
        stats_response(
            &[(StatKey::TotalDps, 1000.0 + build.level as f64)],
            build.allocation.len() as u64,
        )
    });
    let pool = EnginePool::connect(Arc::new(launcher), fast_config(2), CancellationToken::new())
        .await
        .unwrap();

    let build = fixture_build(&[1, 2, 3], &[(StatKey::TotalDps, 500.0)]);
    let evaluation = pool.evaluate(&encode_build(&build), 3).await.unwrap();

    assert_eq!(evaluation.allocated, 3);
    assert_eq!(evaluation.stats.get(&StatKey::TotalDps), 1090.0);
    pool.shutdown().await;
}

#[tokio::test]
async fn crashed_worker_is_restarted_and_request_retried_once() {
    use grove_build::{BuildCodec, HexJsonCodec};
    use grove_engine::protocol::{EngineRequest, EngineResponse};

    let deaths = Arc::new(AtomicUsize::new(0));
    let script_deaths = Arc::clone(&deaths);
    let launcher = ScriptedLauncher::new(move |request| match request {
        EngineRequest::Ping => ScriptAction::Respond(EngineResponse::Pong),
        EngineRequest::Exit => ScriptAction::Die,
        EngineRequest::Eval { build, .. } => {
            let decoded = HexJsonCodec.decode(build).expect("test token decodes");
            // the level-13 build crashes its worker exactly once
            if decoded.level == 13 && script_deaths.fetch_add(1, Ordering::SeqCst) == 0 {
                ScriptAction::Die
            } else {
                ScriptAction::Respond(stats_response(
                    &[(StatKey::TotalDps, decoded.level as f64)],
                    decoded.allocation.len() as u64,
                ))
            }
        }
    });

    let pool = EnginePool::connect(Arc::new(launcher), fast_config(2), CancellationToken::new())
        .await
        .unwrap();

    let mut doomed = fixture_build(&[1, 2], &[]);
    doomed.level = 13;
    let requests = vec![
        EvalRequest {
            id: JobId(0),
            token: encode_build(&fixture_build(&[1], &[])),
            expected_nodes: 1,
        },
        EvalRequest {
            id: JobId(1),
            token: encode_build(&doomed),
            expected_nodes: 2,
        },
        EvalRequest {
            id: JobId(2),
            token: encode_build(&fixture_build(&[1, 2, 3], &[])),
            expected_nodes: 3,
        },
    ];

    let mut results = pool.evaluate_batch(requests).await;
    results.sort_by_key(|(id, _)| *id);

    // every entry succeeded; the crash was absorbed by one retry
    for (id, result) in &results {
        assert!(result.is_ok(), "job {id} failed: {result:?}");
    }
    assert_eq!(results[1].1.as_ref().unwrap().stats.get(&StatKey::TotalDps), 13.0);

    let stats = pool.stats().await;
    assert_eq!(stats.retried, 1);
    assert!(stats.restarts >= 1);
    pool.shutdown().await;
}

#[tokio::test]
async fn timeout_restarts_worker_and_retries() {
    use grove_engine::protocol::{EngineRequest, EngineResponse};

    let hangs = Arc::new(AtomicUsize::new(0));
    let script_hangs = Arc::clone(&hangs);
    let launcher = ScriptedLauncher::new(move |request| match request {
        EngineRequest::Ping => ScriptAction::Respond(EngineResponse::Pong),
        EngineRequest::Exit => ScriptAction::Die,
        EngineRequest::Eval { .. } => {
            if script_hangs.fetch_add(1, Ordering::SeqCst) == 0 {
                ScriptAction::Silence
            } else {
                ScriptAction::Respond(stats_response(&[(StatKey::Life, 100.0)], 1))
            }
        }
    });

    let pool = EnginePool::connect(Arc::new(launcher), fast_config(2), CancellationToken::new())
        .await
        .unwrap();

    let build = fixture_build(&[1], &[]);
    let evaluation = pool.evaluate(&encode_build(&build), 1).await.unwrap();
    assert_eq!(evaluation.stats.get(&StatKey::Life), 100.0);

    let stats = pool.stats().await;
    assert_eq!(stats.retried, 1);
    assert!(stats.restarts >= 1);
    pool.shutdown().await;
}

#[tokio::test]
async fn unsupported_build_is_terminal_and_not_retried() {
    let evals = Arc::new(AtomicUsize::new(0));
    let script_evals = Arc::clone(&evals);
    let launcher = launcher_from_build_fn(move |_, _| {
        script_evals.fetch_add(1, Ordering::SeqCst);
        unsupported_response("timeless jewel")
    });

    let pool = EnginePool::connect(Arc::new(launcher), fast_config(1), CancellationToken::new())
        .await
        .unwrap();

    let build = fixture_build(&[1, 2], &[]);
    let result = pool.evaluate(&encode_build(&build), 2).await;
    assert!(matches!(result, Err(EngineError::Unsupported(_))));
    assert_eq!(evals.load(Ordering::SeqCst), 1);
    pool.shutdown().await;
}

#[tokio::test]
async fn import_defect_triggers_exactly_one_forced_reload() {
    let reloads = Arc::new(AtomicUsize::new(0));
    let script_reloads = Arc::clone(&reloads);
    let launcher = launcher_from_build_fn(move |build, force_reload| {
        if force_reload {
            script_reloads.fetch_add(1, Ordering::SeqCst);
            stats_response(&[(StatKey::TotalDps, 50.0)], build.allocation.len() as u64)
        } else {
            // import defect: substructure never materializes on the normal path
            stats_response(&[(StatKey::TotalDps, 0.0)], 0)
        }
    });

    let pool = EnginePool::connect(Arc::new(launcher), fast_config(1), CancellationToken::new())
        .await
        .unwrap();

    let build = fixture_build(&[1, 2, 3], &[]);
    let evaluation = pool.evaluate(&encode_build(&build), 3).await.unwrap();
    assert_eq!(evaluation.allocated, 3);
    assert_eq!(reloads.load(Ordering::SeqCst), 1);
    pool.shutdown().await;
}

#[tokio::test]
async fn import_defect_unrecovered_is_unsupported() {
    let launcher = launcher_from_build_fn(|_, _| stats_response(&[(StatKey::TotalDps, 0.0)], 0));
    let pool = EnginePool::connect(Arc::new(launcher), fast_config(1), CancellationToken::new())
        .await
        .unwrap();

    let build = fixture_build(&[1, 2], &[]);
    let result = pool.evaluate(&encode_build(&build), 2).await;
    assert!(matches!(result, Err(EngineError::Unsupported(_))));
    pool.shutdown().await;
}

#[tokio::test]
async fn empty_build_skips_the_defect_check() {
    let reloads = Arc::new(AtomicUsize::new(0));
    let script_reloads = Arc::clone(&reloads);
    let launcher = launcher_from_build_fn(move |_, force_reload| {
        if force_reload {
            script_reloads.fetch_add(1, Ordering::SeqCst);
        }
        stats_response(&[(StatKey::Life, 38.0)], 0)
    });
    let pool = EnginePool::connect(Arc::new(launcher), fast_config(1), CancellationToken::new())
        .await
        .unwrap();

    let build = fixture_build(&[], &[]);
    let evaluation = pool.evaluate(&encode_build(&build), 0).await.unwrap();
    assert_eq!(evaluation.allocated, 0);
    assert_eq!(reloads.load(Ordering::SeqCst), 0);
    pool.shutdown().await;
}

#[tokio::test]
async fn pool_unavailable_when_no_worker_starts() {
    let launcher = launcher_from_build_fn(|_, _| stats_response(&[], 0))
        .with_failed_launches(usize::MAX);
    let result =
        EnginePool::connect(Arc::new(launcher), fast_config(2), CancellationToken::new()).await;
    assert!(matches!(result, Err(EngineError::PoolUnavailable)));
}

#[tokio::test]
async fn missing_ready_signal_is_retried_at_startup() {
    let launcher = launcher_from_build_fn(|build, _| {
        stats_response(&[(StatKey::Mana, 60.0)], build.allocation.len() as u64)
    })
    .with_muted_ready(1);

    let pool = EnginePool::connect(Arc::new(launcher), fast_config(1), CancellationToken::new())
        .await
        .unwrap();

    let build = fixture_build(&[1], &[]);
    assert!(pool.evaluate(&encode_build(&build), 1).await.is_ok());
    pool.shutdown().await;
}

#[tokio::test]
async fn ping_reports_worker_health() {
    let launcher = launcher_from_build_fn(|_, _| stats_response(&[], 0));
    let pool = EnginePool::connect(Arc::new(launcher), fast_config(3), CancellationToken::new())
        .await
        .unwrap();

    let health = pool.ping().await;
    assert_eq!(health.len(), 3);
    assert!(health.iter().all(|(_, ok)| *ok));
    assert_eq!(pool.live_workers(), 3);
    pool.shutdown().await;
}

#[tokio::test]
async fn cancellation_aborts_in_flight_requests() {
    use grove_engine::protocol::{EngineRequest, EngineResponse};

    let launcher = ScriptedLauncher::new(|request| match request {
        EngineRequest::Ping => ScriptAction::Respond(EngineResponse::Pong),
        // every eval hangs; only cancellation can end the request
        _ => ScriptAction::Silence,
    });

    let mut config = fast_config(1);
    config.request_timeout = Duration::from_secs(30);
    let cancel = CancellationToken::new();
    let pool = EnginePool::connect(Arc::new(launcher), config, cancel.clone())
        .await
        .unwrap();

    let build = fixture_build(&[1], &[]);
    let token = encode_build(&build);
    let (result, ()) = tokio::join!(pool.evaluate(&token, 1), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    assert!(matches!(result, Err(EngineError::Cancelled)));
}
