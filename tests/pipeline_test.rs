//! Integration tests for the order pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use orderflow::config::PipelineConfig;
use orderflow::error::Error;
use orderflow::event::{EventKind, EventLog, MemorySink, NullSink};
use orderflow::handoff;
use orderflow::model::{WorkId, WorkItem};
use orderflow::pipeline::processor::timed;
use orderflow::pipeline::{
    Generator, Pipeline, PipelineReport, ProcessingFailure, Processor, ShutdownCoordinator,
    SimulatedProcessor, WorkerPool,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Fast config: no generation delay, no simulated processing time.
fn fast_config(orders: u64, workers: usize, max_attempts: u32) -> PipelineConfig {
    PipelineConfig {
        orders,
        workers,
        max_attempts,
        generation_interval_ms: 0,
        processing_min_ms: 0,
        processing_max_ms: 0,
        seed: Some(42),
        ..PipelineConfig::default()
    }
}

async fn run_with_timeout<P: Processor>(pipeline: Pipeline<P>) -> PipelineReport {
    tokio::time::timeout(Duration::from_secs(10), pipeline.run())
        .await
        .expect("pipeline did not terminate")
        .expect("pipeline failed")
}

/// Succeeds on a scripted attempt per order; fails every attempt for
/// orders without a script. Counts invocations per order. Clones share the
/// call log.
#[derive(Clone, Default)]
struct ScriptedProcessor {
    succeed_on: Arc<HashMap<u64, u32>>,
    calls: Arc<Mutex<HashMap<u64, u32>>>,
}

impl ScriptedProcessor {
    fn new(script: &[(u64, u32)]) -> Self {
        Self {
            succeed_on: Arc::new(script.iter().copied().collect()),
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> HashMap<u64, u32> {
        self.calls.lock().unwrap().clone()
    }
}

impl Processor for ScriptedProcessor {
    async fn process(&self, item: &WorkItem) -> Result<(), ProcessingFailure> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(item.id.0).or_insert(0);
            *n += 1;
            *n
        };
        tokio::task::yield_now().await;
        match self.succeed_on.get(&item.id.0) {
            Some(&k) if call >= k => Ok(()),
            _ => Err(ProcessingFailure::new(
                item.id,
                format!("scripted failure on attempt {call}"),
            )),
        }
    }
}

/// Flags any order being processed by two workers at once.
#[derive(Clone, Default)]
struct ExclusiveProcessor {
    in_flight: Arc<Mutex<HashSet<WorkId>>>,
    violations: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl Processor for ExclusiveProcessor {
    async fn process(&self, item: &WorkItem) -> Result<(), ProcessingFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fresh = self.in_flight.lock().unwrap().insert(item.id);
        if !fresh {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.in_flight.lock().unwrap().remove(&item.id);
        // Fail odd attempts to exercise retries under contention.
        if self.calls.load(Ordering::SeqCst) % 2 == 0 {
            Ok(())
        } else {
            Err(ProcessingFailure::new(item.id, "contention"))
        }
    }
}

fn delivered(sink: &MemorySink) -> Vec<(WorkId, bool, u32, Option<String>)> {
    sink.events()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::ResultDelivered {
                id,
                success,
                attempts,
                failure,
                ..
            } => Some((id, success, attempts, failure)),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scripted_successes_are_all_recorded() {
    let processor = ScriptedProcessor::new(&[
        (1, 1),
        (2, 3),
        (3, 1),
        (4, 2),
        (5, 1),
    ]);
    let sink = MemorySink::new();
    let pipeline = Pipeline::new(fast_config(5, 2, 3))
        .unwrap()
        .with_processor(processor.clone())
        .with_sink(sink.clone());

    let report = run_with_timeout(pipeline).await;

    assert_eq!(report.generated, 5);
    assert_eq!(report.summary.total, 5);
    assert_eq!(report.summary.succeeded, 5);
    assert_eq!(report.summary.failed, 0);
    assert_eq!(report.summary.success_rate(), 100.0);

    let calls = processor.calls();
    assert_eq!(calls, HashMap::from([(1, 1), (2, 3), (3, 1), (4, 2), (5, 1)]));

    let mut results = delivered(&sink);
    results.sort_by_key(|r| r.0);
    let attempts: Vec<u32> = results.iter().map(|r| r.2).collect();
    assert_eq!(attempts, vec![1, 3, 1, 2, 1]);
    assert!(results.iter().all(|r| r.1 && r.3.is_none()));

    let retries = sink
        .events()
        .iter()
        .filter(|e| matches!(e.kind, EventKind::AttemptFailed { .. }))
        .count();
    assert_eq!(retries, 3);
}

#[tokio::test]
async fn always_failing_order_exhausts_retries() {
    let processor = ScriptedProcessor::default();
    let sink = MemorySink::new();
    let pipeline = Pipeline::new(fast_config(1, 1, 3))
        .unwrap()
        .with_processor(processor.clone())
        .with_sink(sink.clone());

    let report = run_with_timeout(pipeline).await;

    assert_eq!(processor.calls(), HashMap::from([(1, 3)]));
    assert_eq!(report.summary.total, 1);
    assert_eq!(report.summary.succeeded, 0);
    assert_eq!(report.summary.failed, 1);

    let results = delivered(&sink);
    assert_eq!(results.len(), 1);
    let (id, success, attempts, failure) = &results[0];
    assert_eq!(*id, WorkId(1));
    assert!(!success);
    assert_eq!(*attempts, 3);
    let failure = failure.as_deref().expect("failure description");
    assert!(failure.contains("order 1"), "{failure}");
    assert!(failure.contains("attempt 3"), "last attempt's reason: {failure}");

    let last_attempt = sink
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::AttemptFailed {
                attempt,
                will_retry,
                ..
            } => Some((attempt, will_retry)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(last_attempt, vec![(1, true), (2, true), (3, false)]);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_order_yields_exactly_one_result() {
    let mut config = fast_config(60, 8, 3);
    config.success_probability = 0.5;
    let sink = MemorySink::new();
    let pipeline = Pipeline::new(config).unwrap().with_sink(sink.clone());

    let report = run_with_timeout(pipeline).await;

    let mut ids: Vec<u64> = delivered(&sink).iter().map(|r| r.0.0).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=60).collect::<Vec<_>>());

    let summary = report.summary;
    assert_eq!(summary.total, 60);
    assert_eq!(summary.succeeded + summary.failed, summary.total);
    assert!((summary.success_rate() + summary.failure_rate() - 100.0).abs() < 1e-9);

    for (_, success, attempts, failure) in delivered(&sink) {
        assert!((1..=3).contains(&attempts));
        assert_eq!(success, failure.is_none());
        if !success {
            assert_eq!(attempts, 3);
        }
    }

    let processed: u64 = report.workers.iter().map(|w| w.processed).sum();
    assert_eq!(processed, 60);
    assert_eq!(report.workers.len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn workers_never_share_an_order() {
    let processor = ExclusiveProcessor::default();
    let pipeline = Pipeline::new(fast_config(40, 6, 3))
        .unwrap()
        .with_processor(processor.clone())
        .with_sink(MemorySink::new());

    let report = run_with_timeout(pipeline).await;

    assert_eq!(report.summary.total, 40);
    assert_eq!(processor.violations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_run_terminates_with_zero_rates() {
    let sink = MemorySink::new();
    let pipeline = Pipeline::new(fast_config(0, 3, 3))
        .unwrap()
        .with_sink(sink.clone());

    let report = run_with_timeout(pipeline).await;

    assert_eq!(report.generated, 0);
    assert_eq!(report.summary.total, 0);
    assert_eq!(report.summary.success_rate(), 0.0);
    assert_eq!(report.summary.failure_rate(), 0.0);
    assert!(sink.events().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn more_workers_than_orders_still_terminates() {
    let pipeline = Pipeline::new(fast_config(2, 16, 1))
        .unwrap()
        .with_sink(MemorySink::new());

    let report = run_with_timeout(pipeline).await;
    assert_eq!(report.summary.total, 2);
    assert_eq!(report.workers.len(), 16);
}

#[tokio::test]
async fn generated_orders_follow_config() {
    let mut config = fast_config(10, 2, 1);
    config.max_items_per_order = 3;
    config.success_probability = 1.0;
    let customers = config.customers.clone();
    let catalog = config.catalog.clone();
    let sink = MemorySink::new();
    let pipeline = Pipeline::new(config).unwrap().with_sink(sink.clone());

    run_with_timeout(pipeline).await;

    let generated: Vec<_> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::OrderGenerated {
                id,
                customer,
                items,
                total_amount,
            } => Some((id, customer, items, total_amount)),
            _ => None,
        })
        .collect();

    let ids: Vec<u64> = generated.iter().map(|g| g.0.0).collect();
    assert_eq!(ids, (1..=10).collect::<Vec<_>>(), "ids are strictly increasing");
    for (_, customer, items, total) in &generated {
        assert!(customers.contains(customer));
        assert!((1..=3).contains(&items.len()));
        assert!(items.iter().all(|i| catalog.contains(i)));
        assert!((100.0..1000.0).contains(total));
    }
}

#[tokio::test]
async fn seeded_runs_generate_identical_orders() {
    async fn generated(seed: u64) -> Vec<EventKind> {
        let mut config = fast_config(8, 1, 1);
        config.seed = Some(seed);
        let sink = MemorySink::new();
        let pipeline = Pipeline::new(config).unwrap().with_sink(sink.clone());
        run_with_timeout(pipeline).await;
        sink.events()
            .into_iter()
            .map(|e| e.kind)
            .filter(|k| matches!(k, EventKind::OrderGenerated { .. }))
            .collect()
    }

    assert_eq!(generated(7).await, generated(7).await);
}

/// Panics while processing one chosen order, after an optional delay.
struct PanickingProcessor {
    on: WorkId,
    after: Duration,
}

impl Processor for PanickingProcessor {
    async fn process(&self, item: &WorkItem) -> Result<(), ProcessingFailure> {
        if item.id == self.on {
            tokio::time::sleep(self.after).await;
            panic!("processor crashed on order {}", item.id);
        }
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_fails_instead_of_hanging_when_the_only_worker_panics() {
    let pipeline = Pipeline::new(fast_config(3, 1, 3))
        .unwrap()
        .with_sink(MemorySink::new())
        .with_processor(PanickingProcessor {
            on: WorkId(1),
            after: Duration::from_millis(100),
        });

    let result = tokio::time::timeout(Duration::from_secs(3), pipeline.run())
        .await
        .expect("pipeline hung after its only worker panicked");

    assert!(
        matches!(result, Err(Error::Join(_))),
        "worker panic should be reported: {result:?}"
    );
}

#[tokio::test]
async fn coordinator_closes_outtake_and_reports_a_panicked_worker() {
    let (intake_tx, intake_rx) = handoff::channel();
    let (outtake_tx, outtake_rx) = handoff::channel::<orderflow::model::ResultRecord>();
    let pool = WorkerPool::spawn(
        1,
        intake_rx,
        &outtake_tx,
        Arc::new(PanickingProcessor {
            on: WorkId(1),
            after: Duration::ZERO,
        }),
        3,
        Arc::new(EventLog::new(NullSink)),
    );
    let coordinator = tokio::spawn(ShutdownCoordinator::new(pool, outtake_tx).run());

    intake_tx.send(item(1)).await.unwrap();

    let next = tokio::time::timeout(Duration::from_secs(2), outtake_rx.recv())
        .await
        .expect("outtake was never closed");
    assert!(next.is_none());

    let joined = coordinator.await.unwrap();
    assert!(matches!(joined, Err(Error::Join(_))), "{joined:?}");

    // No worker is left to take further orders.
    let resend = tokio::time::timeout(Duration::from_secs(2), intake_tx.send(item(2)))
        .await
        .expect("send blocked with no receiver left");
    assert!(matches!(resend, Err(Error::Protocol(_))));
}

#[test]
fn generator_rejects_configs_it_cannot_draw_from() {
    let events = Arc::new(EventLog::new(NullSink));
    for config in [
        PipelineConfig {
            catalog: Vec::new(),
            ..PipelineConfig::default()
        },
        PipelineConfig {
            customers: Vec::new(),
            ..PipelineConfig::default()
        },
    ] {
        let result = Generator::new(&config, StdRng::seed_from_u64(3), Arc::clone(&events));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

#[test]
fn invalid_config_is_rejected_before_running() {
    let config = PipelineConfig {
        workers: 0,
        ..PipelineConfig::default()
    };
    assert!(Pipeline::new(config).is_err());
}

// ---------------------------------------------------------------------------
// Simulated processor
// ---------------------------------------------------------------------------

fn simulated(success_probability: f64) -> SimulatedProcessor {
    SimulatedProcessor::new(
        StdRng::seed_from_u64(1),
        (Duration::ZERO, Duration::from_millis(2)),
        success_probability,
    )
}

fn item(id: u64) -> WorkItem {
    WorkItem {
        id: WorkId(id),
        customer: "Celina".to_string(),
        items: vec!["Monitor".to_string()],
        total_amount: 250.0,
    }
}

#[tokio::test]
async fn simulated_processor_honours_certain_outcomes() {
    let always = simulated(1.0);
    let never = simulated(0.0);

    for id in 1..=10 {
        assert!(always.process(&item(id)).await.is_ok());

        let failure = never.process(&item(id)).await.unwrap_err();
        assert_eq!(failure.id, WorkId(id));
        assert_eq!(
            failure.to_string(),
            format!("processing failed for order {id}: simulated fault")
        );
    }
}

#[tokio::test]
async fn timed_attempt_measures_the_processing_time() {
    let processor = SimulatedProcessor::new(
        StdRng::seed_from_u64(1),
        (Duration::from_millis(5), Duration::from_millis(5)),
        1.0,
    );
    let original = item(9);

    let attempt = timed(&processor, &original).await;

    assert!(attempt.outcome.is_ok());
    assert!(attempt.elapsed >= Duration::from_millis(5));
    assert_eq!(original, item(9), "processing must not touch the item");
}
