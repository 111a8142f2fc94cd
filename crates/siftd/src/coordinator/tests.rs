//! Tests for the coordinator loop. Jobs run in real execution units.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::mpsc::Receiver;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use sift_config::MemorySettings;
use sift_plugins::{StateLabel, SubExecution};

use super::*;
use crate::tests::support::{EchoPlugin, RecordingDispatcher, job, unavailable};

struct Harness {
    _dir: TempDir,
    settings: Settings,
}

#[fixture]
fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = Settings {
        request_retry_count: 3,
        request_retry_delay_ms: 1,
        delay_after_exception_ms: 1,
        idle_delay_ms: 5,
        result_dir: dir.path().join("results"),
        memory: MemorySettings::disabled(),
        ..Settings::default()
    };
    Harness {
        _dir: dir,
        settings,
    }
}

fn recorded_markers(receiver: &Receiver<Option<String>>) -> Vec<Option<String>> {
    receiver.try_iter().collect()
}

#[rstest]
fn drain_finishes_the_job_in_flight(harness: Harness) {
    let token = ShutdownToken::new();
    let dispatcher = RecordingDispatcher {
        drain_on_report: Some(token.clone()),
        ..RecordingDispatcher::with_fetches([job("job-1"), job("job-2")])
    };
    let (observer, markers) = ChannelObserver::new();
    let coordinator = Coordinator::new(Arc::new(EchoPlugin::new("Echo")), harness.settings, dispatcher)
        .with_observer(observer)
        .with_shutdown(token);

    let summary = coordinator.run_loop(None).expect("loop");

    assert!(summary.drained);
    assert_eq!(summary.jobs_completed, 1);
    assert_eq!(
        recorded_markers(&markers),
        [None, Some(String::from("job-1")), None]
    );
    assert_eq!(coordinator.dispatcher().fetch_calls(), 1);
    let reports = coordinator.dispatcher().reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].job_id, "job-1");
    assert_eq!(reports[0].entity_id, "job-1-entity");
    assert_eq!(reports[0].result.state.label(), StateLabel::Completed);
}

#[rstest]
fn transient_fetch_failures_are_retried(harness: Harness) {
    let dispatcher =
        RecordingDispatcher::with_fetches([Err(unavailable()), Err(unavailable()), job("job-1")]);
    let coordinator = Coordinator::new(Arc::new(EchoPlugin::new("Echo")), harness.settings, dispatcher);

    let summary = coordinator.run_loop(Some(1)).expect("loop");

    assert_eq!(summary.jobs_completed, 1);
    assert_eq!(summary.failures, 0);
    assert_eq!(coordinator.dispatcher().fetch_calls(), 3);
}

#[rstest]
fn exhausted_retries_skip_the_cycle(harness: Harness) {
    let dispatcher = RecordingDispatcher::with_fetches([
        Err(unavailable()),
        Err(unavailable()),
        Err(unavailable()),
        Err(unavailable()),
        job("job-1"),
    ]);
    let coordinator = Coordinator::new(Arc::new(EchoPlugin::new("Echo")), harness.settings, dispatcher);

    let summary = coordinator.run_loop(Some(1)).expect("loop");

    assert_eq!(summary.failures, 1);
    assert_eq!(summary.jobs_completed, 0);
    assert_eq!(coordinator.dispatcher().fetch_calls(), 4, "first call plus three retries");
}

#[rstest]
#[case::no_retries(0, 1, 0)]
#[case::one_retry(1, 2, 1)]
fn retry_count_bounds_the_extra_attempts(
    mut harness: Harness,
    #[case] retry_count: u32,
    #[case] expected_calls: usize,
    #[case] expected_jobs: usize,
) {
    harness.settings.request_retry_count = retry_count;
    let dispatcher = RecordingDispatcher::with_fetches([Err(unavailable()), job("job-1")]);
    let coordinator = Coordinator::new(Arc::new(EchoPlugin::new("Echo")), harness.settings, dispatcher);

    let summary = coordinator.run_loop(Some(1)).expect("loop");

    assert_eq!(coordinator.dispatcher().fetch_calls(), expected_calls);
    assert_eq!(summary.jobs_completed, expected_jobs);
    assert_eq!(summary.failures, 1 - expected_jobs);
}

#[rstest]
fn drain_interrupts_fetch_backoff(mut harness: Harness) {
    harness.settings.request_retry_delay_ms = 10_000;
    let token = ShutdownToken::new();
    let dispatcher = RecordingDispatcher::with_fetches([Err(unavailable()), job("job-1")]);
    let coordinator = Coordinator::new(Arc::new(EchoPlugin::new("Echo")), harness.settings, dispatcher)
        .with_shutdown(token.clone());

    let drainer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        token.request_drain();
    });
    let started = Instant::now();
    let summary = coordinator.run_loop(None).expect("loop");
    drainer.join().expect("drain thread");

    assert!(started.elapsed() < Duration::from_secs(5), "backoff ignored the drain");
    assert!(summary.drained);
    assert_eq!(summary.jobs_completed, 0);
    assert_eq!(coordinator.dispatcher().fetch_calls(), 1, "no fetch after the drain");
}

#[rstest]
fn rejected_calls_are_not_retried(harness: Harness) {
    let rejected = DispatchError::Rejected {
        message: String::from("unknown plugin"),
    };
    let dispatcher = RecordingDispatcher::with_fetches([Err(rejected), job("job-1")]);
    let coordinator = Coordinator::new(Arc::new(EchoPlugin::new("Echo")), harness.settings, dispatcher);

    let summary = coordinator.run_loop(Some(1)).expect("loop");

    assert_eq!(summary.failures, 1);
    assert_eq!(coordinator.dispatcher().fetch_calls(), 1);
}

#[rstest]
fn failed_report_is_retried(harness: Harness) {
    let dispatcher = RecordingDispatcher {
        report_failures: Mutex::new(VecDeque::from([unavailable()])),
        ..RecordingDispatcher::with_fetches([job("job-1")])
    };
    let coordinator = Coordinator::new(Arc::new(EchoPlugin::new("Echo")), harness.settings, dispatcher);

    let summary = coordinator.run_loop(Some(1)).expect("loop");

    assert_eq!(summary.jobs_completed, 1);
    assert_eq!(coordinator.dispatcher().reports().len(), 1);
    assert_eq!(coordinator.dispatcher().statuses().len(), 1);
}

#[rstest]
fn sub_executions_are_registered_and_reported(harness: Harness) {
    let mut plugin = EchoPlugin::new("SleepMultiPlugin");
    plugin.subs = vec![SubExecution::new("MultiPluginName", "1.0")];
    let dispatcher = RecordingDispatcher::with_fetches([job("job-1")]);
    let coordinator = Coordinator::new(Arc::new(plugin), harness.settings, dispatcher);

    let summary = coordinator.run_loop(Some(1)).expect("loop");
    assert_eq!(summary.jobs_completed, 1);

    let expected = vec![
        (String::from("SleepMultiPlugin"), String::from("1.0")),
        (
            String::from("SleepMultiPlugin-MultiPluginName"),
            String::from("1.0-1.0"),
        ),
    ];
    assert_eq!(coordinator.dispatcher().registrations(), expected);
    let reported: Vec<String> = coordinator
        .dispatcher()
        .reports()
        .into_iter()
        .map(|report| report.identity.name)
        .collect();
    assert_eq!(reported, ["SleepMultiPlugin", "SleepMultiPlugin-MultiPluginName"]);
    let statuses = coordinator.dispatcher().statuses();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|status| status.entity.input_id == "job-1-entity"));
}

#[rstest]
fn unready_plugin_never_fetches(harness: Harness) {
    let mut plugin = EchoPlugin::new("Echo");
    plugin.ready = false;
    let (observer, markers) = ChannelObserver::new();
    let coordinator = Coordinator::new(
        Arc::new(plugin),
        harness.settings,
        RecordingDispatcher::with_fetches([job("job-1")]),
    )
    .with_observer(observer);

    let summary = coordinator.run_loop(Some(2)).expect("loop");

    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.jobs_completed, 0);
    assert_eq!(coordinator.dispatcher().fetch_calls(), 0);
    assert_eq!(recorded_markers(&markers), [None, None]);
}

#[rstest]
fn empty_queue_idles(harness: Harness) {
    let coordinator = Coordinator::new(
        Arc::new(EchoPlugin::new("Echo")),
        harness.settings,
        RecordingDispatcher::default(),
    );

    let summary = coordinator.run_loop(Some(3)).expect("loop");

    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.jobs_completed, 0);
    assert_eq!(summary.failures, 0);
    assert_eq!(coordinator.dispatcher().fetch_calls(), 3);
}

#[rstest]
fn forced_shutdown_stops_before_fetching(harness: Harness) {
    let token = ShutdownToken::new();
    token.request_force();
    let coordinator = Coordinator::new(
        Arc::new(EchoPlugin::new("Echo")),
        harness.settings,
        RecordingDispatcher::with_fetches([job("job-1")]),
    )
    .with_shutdown(token);

    let summary = coordinator.run_loop(None).expect("loop");

    assert!(summary.drained);
    assert_eq!(coordinator.dispatcher().fetch_calls(), 0);
}

#[rstest]
fn registration_failure_is_fatal(harness: Harness) {
    let dispatcher = RecordingDispatcher {
        register_failure: Some(DispatchError::Rejected {
            message: String::from("duplicate"),
        }),
        ..RecordingDispatcher::default()
    };
    let coordinator = Coordinator::new(Arc::new(EchoPlugin::new("Echo")), harness.settings, dispatcher);

    let err = coordinator.run_loop(Some(1)).expect_err("registration fails");
    assert!(matches!(err, CoordinatorError::Registration { .. }));
}

#[rstest]
fn invalid_settings_are_rejected(mut harness: Harness) {
    harness.settings.memory.used_mem_warning_frac = 0.95;
    let coordinator = Coordinator::new(
        Arc::new(EchoPlugin::new("Echo")),
        harness.settings,
        RecordingDispatcher::default(),
    );

    let err = coordinator.run_loop(Some(1)).expect_err("settings rejected");
    assert!(matches!(err, CoordinatorError::Settings { .. }));
}

#[test]
fn escalation_moves_from_drain_to_force() {
    let token = ShutdownToken::new();
    assert_eq!(token.escalate(), ShutdownLevel::Drain);
    assert!(token.drain_requested());
    assert!(!token.force_requested());
    assert_eq!(token.escalate(), ShutdownLevel::Force);
    assert!(token.force_requested());
    assert!(token.force_flag().load(std::sync::atomic::Ordering::SeqCst));
}
