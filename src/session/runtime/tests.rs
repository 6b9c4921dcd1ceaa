use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};

use super::*;
use crate::session::channel::BroadcastHub;
use crate::session::controller::SubmitAvailability;
use crate::session::fullscreen::tests::FakeFullscreen;
use crate::session::integrity::Visibility;
use crate::test_support;

/// Records every draft it is handed; fails the first `failures` writes.
struct RecordingSink {
    drafts: Mutex<Vec<ResultDraft>>,
    failures: AtomicUsize,
    delay: Duration,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Self::with(0, Duration::ZERO)
    }

    fn with(failures: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            drafts: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(failures),
            delay,
        })
    }

    fn drafts(&self) -> Vec<ResultDraft> {
        self.drafts.lock().expect("drafts lock").clone()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn submit_result(&self, draft: ResultDraft) -> Result<ExamResult, SubmitError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let attempt = {
            let mut drafts = self.drafts.lock().expect("drafts lock");
            drafts.push(draft.clone());
            drafts.len()
        };

        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(SubmitError::Rejected { status: 503, detail: "store offline".into() });
        }

        Ok(ExamResult {
            id: format!("result-{attempt}"),
            exam_id: draft.exam_id,
            student: draft.student,
            score: draft.score,
            total: draft.total,
            submitted_at: OffsetDateTime::UNIX_EPOCH,
            answers: draft.answers,
        })
    }
}

fn deps(sink: Arc<dyn ResultSink>, exam_active: watch::Receiver<bool>) -> SessionDeps {
    SessionDeps {
        sink,
        exam_active,
        channel: ChannelSupport::Unavailable,
        fullscreen: FullscreenCapability::Unsupported,
        integrity: IntegrityConfig::default(),
        initial_width: 1280,
        rng: StdRng::seed_from_u64(7),
        tab_id: TabId::new(),
    }
}

fn start(
    exam: Exam,
    sink: &Arc<RecordingSink>,
    exam_active: watch::Receiver<bool>,
) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
    start_session(exam, test_support::sample_student("5/1"), deps(sink.clone(), exam_active))
        .expect("start session")
}

async fn wait_for(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    matches: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(3_600), async {
        loop {
            match events.recv().await {
                Some(event) if matches(&event) => return event,
                Some(_) => continue,
                None => panic!("session ended before the expected event"),
            }
        }
    })
    .await
    .expect("expected event in time")
}

fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

async fn answer_current(handle: &SessionHandle, exam: &Exam, correct: bool) {
    let snapshot = handle.snapshot().await.expect("snapshot");
    let question = exam.question(&snapshot.view.question.id).expect("question from bank");
    let index = if correct {
        question.correct_answer_index
    } else {
        (question.correct_answer_index + 1) % 4
    };
    handle.select_answer(&question.id, index).await.expect("select answer");
}

fn hidden() -> EnvSignal {
    EnvSignal::Visibility { state: Visibility::Hidden }
}

fn visible() -> EnvSignal {
    EnvSignal::Visibility { state: Visibility::Visible }
}

#[tokio::test(start_paused = true)]
async fn answered_exam_is_scored_and_submitted_once() {
    let exam = test_support::sample_exam(5, 3);
    let sink = RecordingSink::with(0, Duration::from_secs(1));
    let (_active_tx, active) = watch::channel(true);
    let (handle, mut events) = start(exam.clone(), &sink, active);

    assert_eq!(handle.advance().await, Err(SessionError::Unanswered));
    assert_eq!(handle.snapshot().await.expect("snapshot").view.position, 0);

    answer_current(&handle, &exam, true).await;
    handle.advance().await.expect("advance");
    answer_current(&handle, &exam, false).await;
    handle.advance().await.expect("advance");
    answer_current(&handle, &exam, true).await;

    handle.request_submit().await.expect("request submit");
    handle.confirm_submit().await.expect("confirm submit");
    assert_eq!(handle.confirm_submit().await, Err(SessionError::AlreadyClaimed));

    let SessionEvent::Submitted(result) =
        wait_for(&mut events, |event| matches!(event, SessionEvent::Submitted(_))).await
    else {
        unreachable!();
    };
    assert_eq!((result.score, result.total), (2, 3));
    assert_eq!(result.answers.len(), 3);

    let drafts = sink.drafts();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].trigger, SubmitTrigger::Manual);

    assert!(matches!(handle.snapshot().await, Err(SessionError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn start_is_refused_while_exam_is_closed() {
    let sink = RecordingSink::new();
    let (_active_tx, active) = watch::channel(false);
    let result = start_session(
        test_support::sample_exam(5, 3),
        test_support::sample_student("5/1"),
        deps(sink, active),
    );
    assert!(matches!(result, Err(SessionError::ExamInactive)));
}

#[tokio::test(start_paused = true)]
async fn staying_hidden_past_grace_restarts_the_attempt() {
    let exam = test_support::sample_exam(10, 5);
    let sink = RecordingSink::new();
    let (_active_tx, active) = watch::channel(true);
    let (handle, mut events) = start(exam.clone(), &sink, active);

    answer_current(&handle, &exam, true).await;
    handle.signal(hidden()).await.expect("signal");

    let raised = wait_for(&mut events, |event| {
        matches!(event, SessionEvent::WarningRaised { .. })
    })
    .await;
    assert_eq!(
        raised,
        SessionEvent::WarningRaised { kind: ViolationKind::Visibility, seconds_left: 5 }
    );

    wait_for(&mut events, |event| {
        *event == SessionEvent::IntegrityViolation(ViolationKind::Visibility)
    })
    .await;
    let restarted =
        wait_for(&mut events, |event| matches!(event, SessionEvent::Restarted { .. })).await;
    assert_eq!(
        restarted,
        SessionEvent::Restarted {
            reason: RestartReason::Violation(ViolationKind::Visibility),
            restarts: 1,
        }
    );

    let snapshot = handle.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.view.answered_count, 0);
    assert_eq!(snapshot.view.position, 0);
    assert_eq!(snapshot.view.time_remaining_seconds, 600);
    assert_eq!(snapshot.view.restarts, 1);
    assert!(sink.drafts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn narrowing_from_start_width_restarts_the_attempt() {
    let exam = test_support::sample_exam(10, 5);
    let sink = RecordingSink::new();
    let (_active_tx, active) = watch::channel(true);
    let (handle, mut events) = start(exam.clone(), &sink, active);

    answer_current(&handle, &exam, true).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    // The first width the page reports is already the split-screen one.
    handle.signal(EnvSignal::Resize { width: 600 }).await.expect("signal");

    let raised = wait_for(&mut events, |event| {
        matches!(event, SessionEvent::WarningRaised { .. })
    })
    .await;
    assert_eq!(
        raised,
        SessionEvent::WarningRaised { kind: ViolationKind::Resize, seconds_left: 5 }
    );

    let restarted =
        wait_for(&mut events, |event| matches!(event, SessionEvent::Restarted { .. })).await;
    assert_eq!(
        restarted,
        SessionEvent::Restarted {
            reason: RestartReason::Violation(ViolationKind::Resize),
            restarts: 1,
        }
    );
    let snapshot = handle.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.view.answered_count, 0);
    assert_eq!(snapshot.view.restarts, 1);
}

#[tokio::test(start_paused = true)]
async fn returning_within_grace_keeps_progress() {
    let exam = test_support::sample_exam(10, 5);
    let sink = RecordingSink::new();
    let (_active_tx, active) = watch::channel(true);
    let (handle, mut events) = start(exam.clone(), &sink, active);

    answer_current(&handle, &exam, true).await;
    handle.signal(hidden()).await.expect("signal");
    tokio::time::sleep(Duration::from_secs(3)).await;
    handle.signal(visible()).await.expect("signal");
    wait_for(&mut events, |event| *event == SessionEvent::WarningCleared).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    let later = drain(&mut events);
    assert!(!later.iter().any(|event| matches!(event, SessionEvent::IntegrityViolation(_))));

    let snapshot = handle.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.view.answered_count, 1);
    assert_eq!(snapshot.view.restarts, 0);
    assert_eq!(snapshot.warning_seconds_left, None);
}

#[tokio::test(start_paused = true)]
async fn expired_timer_submits_even_before_minimum_time() {
    let mut exam = test_support::sample_exam(5, 3);
    exam.time_limit = 1;
    exam.min_submit_time = 1;
    let sink = RecordingSink::new();
    let (_active_tx, active) = watch::channel(true);
    let (handle, mut events) = start(exam, &sink, active);

    assert_eq!(
        handle.request_submit().await,
        Err(SessionError::TooEarly { remaining_seconds: 60 })
    );
    wait_for(&mut events, |event| {
        *event == SessionEvent::SubmitRejected { remaining_seconds: 60 }
    })
    .await;

    wait_for(&mut events, |event| matches!(event, SessionEvent::Submitted(_))).await;
    let drafts = sink.drafts();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].trigger, SubmitTrigger::Timeout);
    assert_eq!(drafts[0].score, 0);
}

#[tokio::test(start_paused = true)]
async fn closing_the_exam_forces_submission() {
    let exam = test_support::sample_exam(5, 3);
    let sink = RecordingSink::new();
    let (active_tx, active) = watch::channel(true);
    let (handle, mut events) = start(exam.clone(), &sink, active);

    answer_current(&handle, &exam, true).await;
    active_tx.send(false).expect("exam watcher alive");

    wait_for(&mut events, |event| *event == SessionEvent::ForcedClosure).await;
    let SessionEvent::Submitted(result) =
        wait_for(&mut events, |event| matches!(event, SessionEvent::Submitted(_))).await
    else {
        unreachable!();
    };
    assert_eq!(result.score, 1);

    let drafts = sink.drafts();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].trigger, SubmitTrigger::ExamClosed);
}

#[tokio::test(start_paused = true)]
async fn failed_write_waits_for_manual_retry() {
    let exam = test_support::sample_exam(5, 3);
    let sink = RecordingSink::with(1, Duration::ZERO);
    let (_active_tx, active) = watch::channel(true);
    let (handle, mut events) = start(exam.clone(), &sink, active);

    assert_eq!(handle.retry_submit().await, Err(SessionError::NothingToRetry));

    answer_current(&handle, &exam, true).await;
    handle.request_submit().await.expect("request submit");
    handle.confirm_submit().await.expect("confirm submit");

    let failed =
        wait_for(&mut events, |event| matches!(event, SessionEvent::SubmitFailed { .. })).await;
    assert_eq!(failed, SessionEvent::SubmitFailed { message: SUBMIT_FAILED_MESSAGE.into() });

    let snapshot = handle.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.view.phase, SessionPhase::SubmitFailed);
    assert_eq!(snapshot.view.answered_count, 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(sink.drafts().len(), 1);
    let idle = handle.snapshot().await.expect("snapshot");
    assert_eq!(idle.view.time_remaining_seconds, snapshot.view.time_remaining_seconds);

    handle.retry_submit().await.expect("retry");
    wait_for(&mut events, |event| matches!(event, SessionEvent::Submitted(_))).await;

    let drafts = sink.drafts();
    assert_eq!(drafts.len(), 2);
    assert_eq!(drafts[0].answers, drafts[1].answers);
    assert_eq!(drafts[1].score, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_forced_write_can_be_retried_before_minimum_time() {
    let mut exam = test_support::sample_exam(5, 3);
    exam.min_submit_time = 5;
    let sink = RecordingSink::with(1, Duration::ZERO);
    let (active_tx, active) = watch::channel(true);
    let (handle, mut events) = start(exam, &sink, active);

    active_tx.send(false).expect("exam watcher alive");
    wait_for(&mut events, |event| matches!(event, SessionEvent::SubmitFailed { .. })).await;

    let snapshot = handle.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.view.phase, SessionPhase::SubmitFailed);
    assert_eq!(snapshot.view.submit, SubmitAvailability::Open);

    handle.retry_submit().await.expect("retry");
    wait_for(&mut events, |event| matches!(event, SessionEvent::Submitted(_))).await;
    let drafts = sink.drafts();
    assert_eq!(drafts.len(), 2);
    assert_eq!(drafts[0].trigger, SubmitTrigger::ExamClosed);
    assert_eq!(drafts[1].trigger, SubmitTrigger::Manual);
}

#[tokio::test(start_paused = true)]
async fn signals_during_submission_do_not_restart_or_resubmit() {
    let mut exam = test_support::sample_exam(5, 3);
    exam.require_fullscreen = true;
    let fake = FakeFullscreen::default();
    let sink = RecordingSink::with(0, Duration::from_secs(10));
    let (active_tx, active) = watch::channel(true);

    let mut session_deps = deps(sink.clone(), active);
    session_deps.fullscreen = FullscreenCapability::Supported(Box::new(fake.clone()));
    let (handle, mut events) =
        start_session(exam.clone(), test_support::sample_student("5/1"), session_deps)
            .expect("start session");

    answer_current(&handle, &exam, true).await;
    handle.request_submit().await.expect("request submit");
    handle.confirm_submit().await.expect("confirm submit");

    handle.signal(hidden()).await.expect("signal");
    fake.active.store(false, Ordering::SeqCst);
    handle.signal(EnvSignal::Fullscreen { active: false }).await.expect("signal");
    active_tx.send(false).expect("exam watcher alive");

    let seen = tokio::time::timeout(Duration::from_secs(3_600), async {
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }
        seen
    })
    .await
    .expect("session finishes");

    assert!(seen.iter().any(|event| matches!(event, SessionEvent::Submitted(_))));
    assert!(!seen.iter().any(|event| matches!(
        event,
        SessionEvent::Restarted { .. }
            | SessionEvent::WarningRaised { .. }
            | SessionEvent::IntegrityViolation(_)
            | SessionEvent::FullscreenExitDetected
            | SessionEvent::ForcedClosure
    )));
    let drafts = sink.drafts();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].trigger, SubmitTrigger::Manual);
    assert_eq!(drafts[0].score, 1);
}

#[tokio::test(start_paused = true)]
async fn second_tab_is_frozen_while_first_continues() {
    let exam = test_support::sample_exam(5, 3);
    let hub = BroadcastHub::new();
    let sink = RecordingSink::new();
    let (_active_tx, active) = watch::channel(true);

    let mut first_deps = deps(sink.clone(), active.clone());
    first_deps.channel = ChannelSupport::Available(Box::new(hub.open("exam-session")));
    let (first, mut first_events) =
        start_session(exam.clone(), test_support::sample_student("5/1"), first_deps)
            .expect("first tab");
    // The first tab has mounted once it answers.
    first.snapshot().await.expect("snapshot");

    let mut second_deps = deps(sink.clone(), active);
    second_deps.channel = ChannelSupport::Available(Box::new(hub.open("exam-session")));
    let (second, mut second_events) =
        start_session(exam, test_support::sample_student("5/1"), second_deps)
            .expect("second tab");

    wait_for(&mut second_events, |event| *event == SessionEvent::DuplicateSession).await;
    assert_eq!(second.select_displayed(0).await, Err(SessionError::DuplicateSession));
    assert_eq!(second.request_submit().await, Err(SessionError::DuplicateSession));

    assert!(first.select_displayed(0).await.is_ok());
    tokio::time::sleep(Duration::from_secs(5)).await;

    let first_snapshot = first.snapshot().await.expect("snapshot");
    let second_snapshot = second.snapshot().await.expect("snapshot");
    assert!(!first_snapshot.duplicate);
    assert!(first_snapshot.view.time_remaining_seconds < 600);
    assert!(second_snapshot.duplicate);
    assert_eq!(second_snapshot.view.time_remaining_seconds, 600);
    assert!(!drain(&mut first_events).contains(&SessionEvent::DuplicateSession));
}

#[tokio::test(start_paused = true)]
async fn missing_channel_degrades_to_unprotected_session() {
    let sink = RecordingSink::new();
    let (_active_tx, active) = watch::channel(true);
    let (handle, mut events) = start(test_support::sample_exam(5, 3), &sink, active);

    let first = events.recv().await.expect("event");
    assert_eq!(first, SessionEvent::ProtectionDegraded(Protection::SingleInstance));
    assert!(handle.select_displayed(2).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn leaving_fullscreen_restarts_and_blocks_until_reentry() {
    let mut exam = test_support::sample_exam(5, 3);
    exam.require_fullscreen = true;
    let fake = FakeFullscreen::default();
    let sink = RecordingSink::new();
    let (_active_tx, active) = watch::channel(true);

    let mut session_deps = deps(sink.clone(), active);
    session_deps.fullscreen = FullscreenCapability::Supported(Box::new(fake.clone()));
    let (handle, mut events) =
        start_session(exam.clone(), test_support::sample_student("5/1"), session_deps)
            .expect("start session");

    answer_current(&handle, &exam, true).await;
    assert!(fake.active.load(Ordering::SeqCst));

    fake.active.store(false, Ordering::SeqCst);
    handle.signal(EnvSignal::Fullscreen { active: false }).await.expect("signal");

    wait_for(&mut events, |event| {
        *event
            == SessionEvent::Restarted { reason: RestartReason::FullscreenExit, restarts: 1 }
    })
    .await;
    wait_for(&mut events, |event| *event == SessionEvent::FullscreenExitDetected).await;

    let snapshot = handle.snapshot().await.expect("snapshot");
    assert!(snapshot.fullscreen_prompt);
    assert_eq!(snapshot.view.answered_count, 0);
    assert_eq!(handle.select_displayed(0).await, Err(SessionError::FullscreenRequired));

    handle.reenter_fullscreen().await.expect("reenter");
    assert!(fake.active.load(Ordering::SeqCst));
    assert!(handle.select_displayed(0).await.is_ok());

    handle.request_submit().await.expect("request submit");
    handle.confirm_submit().await.expect("confirm submit");
    wait_for(&mut events, |event| matches!(event, SessionEvent::Submitted(_))).await;
    assert!(!fake.active.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn denied_reentry_keeps_the_prompt_open() {
    let mut exam = test_support::sample_exam(5, 3);
    exam.require_fullscreen = true;
    let fake = FakeFullscreen::default();
    let sink = RecordingSink::new();
    let (_active_tx, active) = watch::channel(true);

    let mut session_deps = deps(sink, active);
    session_deps.fullscreen = FullscreenCapability::Supported(Box::new(fake.clone()));
    let (handle, _events) =
        start_session(exam, test_support::sample_student("5/1"), session_deps)
            .expect("start session");

    fake.active.store(false, Ordering::SeqCst);
    fake.deny.store(true, Ordering::SeqCst);
    handle.signal(EnvSignal::Fullscreen { active: false }).await.expect("signal");

    assert!(matches!(handle.reenter_fullscreen().await, Err(SessionError::Fullscreen(_))));
    assert!(handle.snapshot().await.expect("snapshot").fullscreen_prompt);
}

#[tokio::test(start_paused = true)]
async fn clipboard_and_context_menu_are_suppressed() {
    let sink = RecordingSink::new();
    let (_active_tx, active) = watch::channel(true);
    let (handle, _events) = start(test_support::sample_exam(5, 3), &sink, active);

    for signal in [EnvSignal::ContextMenu, EnvSignal::Copy, EnvSignal::Paste] {
        assert_eq!(handle.signal(signal).await, Ok(MonitorVerdict::SuppressDefault));
    }
    assert_eq!(handle.signal(visible()).await, Ok(MonitorVerdict::Allow));
    assert_eq!(handle.snapshot().await.expect("snapshot").view.restarts, 0);
}

#[tokio::test(start_paused = true)]
async fn closed_handle_stops_the_session() {
    let sink = RecordingSink::new();
    let (_active_tx, active) = watch::channel(true);
    let (handle, mut events) = start(test_support::sample_exam(5, 3), &sink, active);

    handle.close().await;
    tokio::time::timeout(Duration::from_secs(60), async {
        while events.recv().await.is_some() {}
    })
    .await
    .expect("event stream ends");
    assert_eq!(handle.advance().await, Err(SessionError::Closed));
}

#[test]
fn partial_seconds_round_up() {
    assert_eq!(whole_seconds(Duration::from_millis(4_001)), 5);
    assert_eq!(whole_seconds(Duration::from_secs(5)), 5);
    assert_eq!(whole_seconds(Duration::ZERO), 0);
}
