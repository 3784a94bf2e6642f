mod common;

use common::{
    compound_source, number_of, sparql_source, Behaviour, ErrorChannel, ScriptedEngine,
};
use oxigraph::model::Term;
use quarry::api::query_session::{QuerySession, SessionError, SessionHooks};
use quarry::config::SessionConfig;
use quarry::core::RunState;
use quarry::querying::SourceDescriptor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const QUERY: &str = "SELECT * WHERE { ?s ?p ?o }";
const ASK: &str = "ASK { ?s ?p ?o }";

struct Counters {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

/// Submits `QUERY` against source `a`.
async fn run(session: &QuerySession) {
    session
        .run_query(QUERY, &[sparql_source("a")])
        .await
        .unwrap();
}

fn session_with_counters(engine: ScriptedEngine) -> (QuerySession, Counters) {
    let starts = Arc::new(AtomicUsize::new(0));
    let stops = Arc::new(AtomicUsize::new(0));
    let (s, t) = (Arc::clone(&starts), Arc::clone(&stops));
    let hooks = SessionHooks::default()
        .on_start(move || {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .on_stop(move || {
            t.fetch_add(1, Ordering::SeqCst);
        });
    let session = QuerySession::with_hooks(Arc::new(engine), SessionConfig::default(), hooks);
    (session, Counters { starts, stops })
}

#[tokio::test(start_paused = true)]
async fn test_small_result_set_completes() {
    let engine = ScriptedEngine::new(Behaviour::Rows(10));
    let session = QuerySession::new(engine.clone());

    let query = format!("{QUERY} LIMIT 10");
    let sources = [sparql_source("a")];
    session.run_query(&query, &sources).await.unwrap();
    let status = session.wait_until_stopped().await;

    assert_eq!(status.run_state, RunState::StoppedComplete);
    assert!(!status.is_running());
    assert!(!status.possibly_incomplete);
    assert_eq!(status.error_message, None);
    assert_eq!(status.columns.len(), 1);
    assert_eq!(session.results().len(), 10);
    assert_eq!(
        engine.last_context().sources,
        vec![SourceDescriptor::Sparql("https://example.org/a/sparql".into())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_two_compound_sources_use_fragment_endpoints() {
    let engine = ScriptedEngine::new(Behaviour::Rows(1));
    let session = QuerySession::new(engine.clone());

    let sources = [compound_source("spoke"), compound_source("sockg")];
    session.run_query(QUERY, &sources).await.unwrap();
    session.wait_until_stopped().await;

    assert_eq!(
        engine.last_context().sources,
        vec![
            SourceDescriptor::Fragments("https://frink.apps.renci.org/ldf/spoke".into()),
            SourceDescriptor::Fragments("https://frink.apps.renci.org/ldf/sockg".into()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_slow_stream() {
    let engine = ScriptedEngine::new(Behaviour::SlowRows {
        count: 1_000,
        interval: Duration::from_millis(10),
    });
    let (session, counters) = session_with_counters(engine.clone());

    run(&session).await;
    assert!(session.is_running());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(session.stop_query());
    let status = session.status();
    assert_eq!(status.run_state, RunState::StoppedInterrupted);
    assert!(status.possibly_incomplete);

    let received = session.results().len();
    assert!((4..=5).contains(&received), "received {received} rows");
    let elapsed = session.ms_elapsed();
    assert!((40..=60).contains(&elapsed), "elapsed {elapsed} ms");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        session.results().len(),
        received,
        "no rows may arrive after stop"
    );
    assert_eq!(session.ms_elapsed(), elapsed, "timer must be frozen");
    assert!(engine.was_destroyed());

    assert!(!session.stop_query(), "second stop is a no-op");
    assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
    assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_engine_rejection_becomes_errored_state() {
    let engine = ScriptedEngine::new(Behaviour::Reject("timeout".into()));
    let (session, counters) = session_with_counters(engine);

    run(&session).await;
    let status = session.status();

    assert_eq!(status.run_state, RunState::Errored);
    assert!(status.error_message.unwrap().contains("timeout"));
    assert!(status.possibly_incomplete);
    assert!(!status.is_running());
    assert!(session.results().is_empty());
    assert_eq!(counters.starts.load(Ordering::SeqCst), 0);
    assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_contract_errors_leave_state_untouched() {
    let engine = ScriptedEngine::new(Behaviour::Rows(1));
    let session = QuerySession::new(engine.clone());

    let blank = session.run_query("   ", &[sparql_source("a")]).await;
    assert_eq!(blank, Err(SessionError::MissingQuery));
    let unsourced = session.run_query(QUERY, &[]).await;
    assert_eq!(unsourced, Err(SessionError::NoSources));

    let status = session.status();
    assert_eq!(status.run_id, 0);
    assert_eq!(status.run_state, RunState::Idle);
    assert!(status.last_submitted.is_none());
    assert_eq!(engine.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_tail_is_published_and_order_preserved() {
    let engine = ScriptedEngine::new(Behaviour::Rows(1_234));
    let session = QuerySession::new(engine);

    run(&session).await;
    let status = session.wait_until_stopped().await;

    assert_eq!(status.run_state, RunState::StoppedComplete);
    let results = session.results();
    assert_eq!(results.len(), 1_234);
    assert!(results
        .iter()
        .enumerate()
        .all(|(i, record)| number_of(record) == i));
}

#[tokio::test(start_paused = true)]
async fn test_published_results_are_growing_prefixes() {
    let engine = ScriptedEngine::new(Behaviour::SlowRows {
        count: 400,
        interval: Duration::from_millis(1),
    });
    let session = QuerySession::new(engine);
    let mut results = session.subscribe_results();

    run(&session).await;

    let mut previous = 0;
    let mut publishes = 0;
    while results.changed().await.is_ok() {
        let snapshot = results.borrow_and_update().clone();
        assert!(snapshot.records.len() >= previous);
        assert!(snapshot
            .records
            .iter()
            .enumerate()
            .all(|(i, record)| number_of(record) == i));
        previous = snapshot.records.len();
        publishes += 1;
        if previous == 400 {
            break;
        }
    }
    assert_eq!(previous, 400);
    // 100 immediate publishes, then roughly one per 250 ms over the remaining 300 ms.
    assert!(publishes < 120, "{publishes} publishes");
}

#[tokio::test(start_paused = true)]
async fn test_resubmission_interrupts_previous_run() {
    let engine = ScriptedEngine::new(Behaviour::SlowRows {
        count: 1_000,
        interval: Duration::from_millis(10),
    });
    let session = QuerySession::new(engine.clone());

    run(&session).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    let first_run = session.status().run_id;

    engine.set_behaviour(Behaviour::Rows(3));
    let sources = [sparql_source("b")];
    session.run_query(ASK, &sources).await.unwrap();
    let status = session.wait_until_stopped().await;

    assert!(status.run_id > first_run);
    assert_eq!(status.run_state, RunState::StoppedComplete);
    assert_eq!(status.last_submitted.unwrap().query, ASK);
    assert_eq!(session.results().len(), 3);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(engine.was_destroyed(), "first stream must be released");
    assert_eq!(
        session.results().len(),
        3,
        "first run must not leak into the second"
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_dispatch_pending_discards_late_result() {
    let engine = ScriptedEngine::new(Behaviour::Delayed {
        delay: Duration::from_millis(100),
        rows: 5,
    });
    let (session, counters) = session_with_counters(engine.clone());

    let running = session.clone();
    let submission =
        tokio::spawn(async move { running.run_query(QUERY, &[sparql_source("a")]).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(session.status().run_state, RunState::Idle);

    assert!(session.stop_query());
    let status = session.status();
    assert_eq!(status.run_state, RunState::StoppedInterrupted);
    assert!(status.possibly_incomplete);

    submission.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(session.status().run_state, RunState::StoppedInterrupted);
    assert!(session.results().is_empty());
    assert!(engine.was_destroyed());
    assert_eq!(counters.starts.load(Ordering::SeqCst), 0);
    assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_in_band_stream_error_keeps_received_rows() {
    let engine = ScriptedEngine::new(Behaviour::FailAfter {
        after: 5,
        message: Some("connection reset".into()),
        channel: ErrorChannel::InBand,
    });
    let session = QuerySession::new(engine.clone());

    run(&session).await;
    let status = session.wait_until_stopped().await;

    assert_eq!(status.run_state, RunState::Errored);
    assert_eq!(status.error_message.as_deref(), Some("connection reset"));
    assert!(status.possibly_incomplete);
    assert_eq!(session.results().len(), 5);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(engine.was_destroyed());
}

#[tokio::test(start_paused = true)]
async fn test_out_of_band_error_without_message_uses_fallback() {
    let engine = ScriptedEngine::new(Behaviour::FailAfter {
        after: 0,
        message: None,
        channel: ErrorChannel::OutOfBand,
    });
    let session = QuerySession::new(engine);

    run(&session).await;
    let status = session.wait_until_stopped().await;

    assert_eq!(status.run_state, RunState::Errored);
    assert_eq!(
        status.error_message.as_deref(),
        Some("An unknown error occurred while streaming data.")
    );
    assert!(status.possibly_incomplete);
}

#[tokio::test(start_paused = true)]
async fn test_both_error_channels_finish_once() {
    let engine = ScriptedEngine::new(Behaviour::FailAfter {
        after: 3,
        message: Some("connection reset".into()),
        channel: ErrorChannel::Both,
    });
    let (session, counters) = session_with_counters(engine.clone());

    run(&session).await;
    let status = session.wait_until_stopped().await;
    assert_eq!(status.run_state, RunState::Errored);
    assert_eq!(status.error_message.as_deref(), Some("connection reset"));
    assert!(status.possibly_incomplete);
    let elapsed = session.ms_elapsed();
    let received = session.results().len();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!session.stop_query(), "run already finished");
    assert_eq!(session.status(), status);
    assert_eq!(session.ms_elapsed(), elapsed, "timer must be frozen");
    assert_eq!(session.results().len(), received);
    assert!(engine.was_destroyed());
    assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
    assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_when_idle_is_noop() {
    let (session, counters) = session_with_counters(ScriptedEngine::new(Behaviour::Rows(1)));

    assert!(!session.stop_query());
    assert_eq!(session.status().run_state, RunState::Idle);
    assert_eq!(counters.stops.load(Ordering::SeqCst), 0);
    assert_eq!(session.wait_until_stopped().await.run_id, 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_after_completion_is_noop() {
    let (session, counters) = session_with_counters(ScriptedEngine::new(Behaviour::Rows(2)));

    run(&session).await;
    session.wait_until_stopped().await;
    assert!(!session.stop_query());

    let status = session.status();
    assert_eq!(status.run_state, RunState::StoppedComplete);
    assert!(!status.possibly_incomplete);
    assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_boolean_result() {
    let session = QuerySession::new(ScriptedEngine::new(Behaviour::Boolean(true)));

    let sources = [sparql_source("a")];
    session.run_query(ASK, &sources).await.unwrap();
    let status = session.wait_until_stopped().await;

    let columns: Vec<_> = status.columns.iter().map(|v| v.as_str()).collect();
    assert_eq!(columns, ["result"]);
    let results = session.results();
    assert_eq!(results.len(), 1);
    match results[0].get("result") {
        Some(Term::Literal(literal)) => assert_eq!(literal.value(), "true"),
        other => panic!("expected a boolean literal, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_staleness_tracks_last_submission() {
    let session = QuerySession::new(ScriptedEngine::new(Behaviour::Rows(1)));
    let sources = [sparql_source("a"), sparql_source("b")];
    assert!(session.is_stale(QUERY, &sources));

    session.run_query(QUERY, &sources).await.unwrap();
    let reordered = [sparql_source("b"), sparql_source("a")];
    assert!(!session.is_stale(QUERY, &reordered));
    assert!(session.is_stale(QUERY, &[sparql_source("a")]));
    assert!(session.is_stale("SELECT ?s WHERE { ?s ?p ?o }", &sources));
}

#[tokio::test(start_paused = true)]
async fn test_export_csv() {
    let session = QuerySession::new(ScriptedEngine::new(Behaviour::Rows(2)));
    assert_eq!(session.export_csv().unwrap(), None);

    run(&session).await;
    session.wait_until_stopped().await;
    assert_eq!(
        session.export_csv().unwrap().as_deref(),
        Some("n\r\n0\r\n1\r\n")
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropping_session_stops_active_run() {
    let engine = ScriptedEngine::new(Behaviour::SlowRows {
        count: 1_000,
        interval: Duration::from_millis(10),
    });
    let session = QuerySession::new(engine.clone());

    run(&session).await;
    tokio::time::sleep(Duration::from_millis(25)).await;
    drop(session);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.was_destroyed());
}

#[tokio::test(start_paused = true)]
async fn test_view_reads_consistent_state() {
    let session = QuerySession::new(ScriptedEngine::new(Behaviour::Rows(3)));
    run(&session).await;
    session.wait_until_stopped().await;

    let view = session.view();
    assert_eq!(view.status.run_state, RunState::StoppedComplete);
    assert_eq!(view.results.len(), 3);
    assert_eq!(view.seconds_string(), session.seconds_string());
}
