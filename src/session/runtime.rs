use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};

use crate::db::models::{Exam, ExamResult, Student};
use crate::session::channel::{ChannelSupport, SessionChannel, TabId, TabMessage};
use crate::session::controller::{
    ExamSession, RestartReason, SessionPhase, SessionView, TickOutcome,
};
use crate::session::fullscreen::{FullscreenCapability, FullscreenGuard, FullscreenReaction};
use crate::session::guard::{GuardAction, SingleInstanceGuard};
use crate::session::integrity::{
    EnvSignal, IntegrityConfig, IntegrityMonitor, MonitorEvent, MonitorVerdict, ViolationKind,
};
use crate::session::submission::{ResultDraft, ResultSink, SubmitError, SubmitTrigger};
use crate::session::SessionError;

const TICK: Duration = Duration::from_secs(1);
const COMMAND_BUFFER: usize = 32;
const SUBMIT_FAILED_MESSAGE: &str = "Your answers could not be saved. Please try submitting again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Protection {
    Fullscreen,
    SingleInstance,
}

/// Everything the shell hears from a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Tick { time_remaining_seconds: u32 },
    WarningRaised { kind: ViolationKind, seconds_left: u64 },
    WarningCountdown { seconds_left: u64 },
    WarningCleared,
    IntegrityViolation(ViolationKind),
    FullscreenExitDetected,
    Restarted { reason: RestartReason, restarts: u32 },
    DuplicateSession,
    ProtectionDegraded(Protection),
    SubmitRejected { remaining_seconds: u32 },
    SubmitFailed { message: String },
    ForcedClosure,
    Submitted(ExamResult),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub view: SessionView,
    pub tab_id: TabId,
    pub duplicate: bool,
    pub fullscreen_prompt: bool,
    pub warning_seconds_left: Option<u64>,
}

/// Collaborators of one session. The shell builds these once per attempt.
pub struct SessionDeps {
    pub sink: Arc<dyn ResultSink>,
    pub exam_active: watch::Receiver<bool>,
    pub channel: ChannelSupport,
    pub fullscreen: FullscreenCapability,
    pub integrity: IntegrityConfig,
    /// Page width when the session mounts; resize checks measure against it.
    pub initial_width: u32,
    pub rng: StdRng,
    pub tab_id: TabId,
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum SessionCommand {
    SelectAnswer { question_id: String, index: u8, reply: Reply<()> },
    SelectDisplayed { display_index: usize, reply: Reply<u8> },
    Advance { reply: Reply<usize> },
    Retreat { reply: Reply<usize> },
    RequestSubmit { reply: Reply<()> },
    ConfirmSubmit { reply: Reply<()> },
    CancelSubmit { reply: Reply<()> },
    RetrySubmit { reply: Reply<()> },
    ReenterFullscreen { reply: Reply<()> },
    Signal { signal: EnvSignal, reply: oneshot::Sender<MonitorVerdict> },
    Snapshot { reply: oneshot::Sender<SessionSnapshot> },
    Close,
}

/// Cheap handle to a running session. Every call is answered by the session
/// task in order; calls after the session ended fail with `Closed`.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn select_answer(&self, question_id: &str, index: u8) -> Result<(), SessionError> {
        let question_id = question_id.to_string();
        self.call(|reply| SessionCommand::SelectAnswer { question_id, index, reply }).await
    }

    pub async fn select_displayed(&self, display_index: usize) -> Result<u8, SessionError> {
        self.call(|reply| SessionCommand::SelectDisplayed { display_index, reply }).await
    }

    pub async fn advance(&self) -> Result<usize, SessionError> {
        self.call(|reply| SessionCommand::Advance { reply }).await
    }

    pub async fn retreat(&self) -> Result<usize, SessionError> {
        self.call(|reply| SessionCommand::Retreat { reply }).await
    }

    pub async fn request_submit(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::RequestSubmit { reply }).await
    }

    pub async fn confirm_submit(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::ConfirmSubmit { reply }).await
    }

    pub async fn cancel_submit(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::CancelSubmit { reply }).await
    }

    pub async fn retry_submit(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::RetrySubmit { reply }).await
    }

    pub async fn reenter_fullscreen(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::ReenterFullscreen { reply }).await
    }

    /// Reports an environment observation. The verdict says whether the page
    /// should suppress the default action (context menu, clipboard).
    pub async fn signal(&self, signal: EnvSignal) -> Result<MonitorVerdict, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Signal { signal, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Snapshot { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Unmounts the session: tells other tabs this one is gone and stops.
    pub async fn close(&self) {
        let _ = self.commands.send(SessionCommand::Close).await;
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(build(reply)).await.map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }
}

/// Initializes the attempt and spawns its event loop on the current runtime.
///
/// Precondition failures are returned before anything is spawned.
pub fn start_session(
    exam: Exam,
    student: Student,
    deps: SessionDeps,
) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
    if !*deps.exam_active.borrow() {
        return Err(SessionError::ExamInactive);
    }

    let require_fullscreen = exam.require_fullscreen;
    let session = ExamSession::start(exam, student, deps.rng)?;

    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (completion_tx, completion_rx) = mpsc::channel(1);

    let channel = match deps.channel {
        ChannelSupport::Available(channel) => Some(channel),
        ChannelSupport::Unavailable => None,
    };

    let now = Instant::now();
    let session_loop = SessionLoop {
        session,
        monitor: IntegrityMonitor::new(deps.integrity),
        initial_width: deps.initial_width,
        guard: SingleInstanceGuard::new(deps.tab_id),
        fullscreen: FullscreenGuard::new(deps.fullscreen, require_fullscreen),
        channel,
        exam_active: deps.exam_active,
        watching_active: true,
        sink: deps.sink,
        events: event_tx,
        commands: command_rx,
        completion_tx,
        completion_rx,
        ticker: new_ticker(now),
        finished: false,
    };

    tokio::spawn(session_loop.run());

    Ok((SessionHandle { commands: command_tx }, event_rx))
}

fn new_ticker(now: Instant) -> Interval {
    let mut ticker = interval_at(now + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Owns the controller, monitor and guard; nothing else touches them.
struct SessionLoop {
    session: ExamSession,
    monitor: IntegrityMonitor,
    initial_width: u32,
    guard: SingleInstanceGuard,
    fullscreen: FullscreenGuard,
    channel: Option<Box<dyn SessionChannel>>,
    exam_active: watch::Receiver<bool>,
    watching_active: bool,
    sink: Arc<dyn ResultSink>,
    events: mpsc::UnboundedSender<SessionEvent>,
    commands: mpsc::Receiver<SessionCommand>,
    completion_tx: mpsc::Sender<Result<ExamResult, SubmitError>>,
    completion_rx: mpsc::Receiver<Result<ExamResult, SubmitError>>,
    ticker: Interval,
    finished: bool,
}

impl SessionLoop {
    async fn run(mut self) {
        self.mount();

        while !self.finished {
            let deadline = self.monitor.next_deadline();
            let ticking = self.session.is_live() && self.guard.is_primary();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => self.finished = true,
                },
                _ = self.ticker.tick(), if ticking => self.on_tick(),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.poll_monitor();
                }
                message = recv_tab(&mut self.channel) => match message {
                    Some(message) => self.on_tab_message(message),
                    None => {
                        tracing::warn!(tab_id = %self.guard.id(), "Session channel closed");
                        self.channel = None;
                    }
                },
                changed = self.exam_active.changed(), if self.watching_active => match changed {
                    Ok(()) => self.on_exam_active_changed(),
                    Err(_) => self.watching_active = false,
                },
                Some(outcome) = self.completion_rx.recv() => self.on_submission_finished(outcome),
            }
        }

        self.unmount();
    }

    fn mount(&mut self) {
        match &self.channel {
            Some(channel) => {
                if let Err(err) = channel.post(&self.guard.mount()) {
                    tracing::warn!(error = %err, "Failed to probe for other exam tabs");
                }
            }
            None => {
                tracing::warn!(
                    tab_id = %self.guard.id(),
                    "Session channel unavailable; single-tab protection disabled"
                );
                self.emit(SessionEvent::ProtectionDegraded(Protection::SingleInstance));
            }
        }

        if self.fullscreen.degraded() {
            tracing::warn!(
                exam_id = %self.session.exam().id,
                "Fullscreen unsupported; fullscreen protection disabled"
            );
            self.emit(SessionEvent::ProtectionDegraded(Protection::Fullscreen));
        } else if let Err(err) = self.fullscreen.enter() {
            tracing::warn!(error = %err, "Failed to enter fullscreen at session start");
        }

        self.monitor.arm(Instant::now(), Some(self.initial_width));
    }

    fn unmount(&mut self) {
        self.monitor.disarm();
        if let Some(channel) = &self.channel {
            if let Err(err) = channel.post(&self.guard.unmount()) {
                tracing::debug!(error = %err, "Failed to announce tab close");
            }
        }
        tracing::debug!(tab_id = %self.guard.id(), "Exam session loop stopped");
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SelectAnswer { question_id, index, reply } => {
                let result = self
                    .ensure_input()
                    .and_then(|_| self.session.select_answer(&question_id, index));
                let _ = reply.send(result);
            }
            SessionCommand::SelectDisplayed { display_index, reply } => {
                let result =
                    self.ensure_input().and_then(|_| self.session.select_displayed(display_index));
                let _ = reply.send(result);
            }
            SessionCommand::Advance { reply } => {
                let result = self.ensure_input().and_then(|_| self.session.advance());
                let _ = reply.send(result);
            }
            SessionCommand::Retreat { reply } => {
                let result = self.ensure_input().and_then(|_| self.session.retreat());
                let _ = reply.send(result);
            }
            SessionCommand::RequestSubmit { reply } => {
                let result = self.ensure_input().and_then(|_| self.session.request_submit());
                if let Err(SessionError::TooEarly { remaining_seconds }) = result {
                    self.emit(SessionEvent::SubmitRejected { remaining_seconds });
                }
                let _ = reply.send(result);
            }
            SessionCommand::ConfirmSubmit { reply } => {
                let result = self
                    .ensure_input()
                    .and_then(|_| self.session.confirm_submit())
                    .map(|draft| self.dispatch(draft));
                let _ = reply.send(result);
            }
            SessionCommand::CancelSubmit { reply } => {
                self.session.cancel_submit();
                let _ = reply.send(Ok(()));
            }
            SessionCommand::RetrySubmit { reply } => {
                let result = self.retry_submit();
                let _ = reply.send(result);
            }
            SessionCommand::ReenterFullscreen { reply } => {
                let result = self
                    .fullscreen
                    .reenter()
                    .map_err(|err| SessionError::Fullscreen(err.to_string()));
                let _ = reply.send(result);
            }
            SessionCommand::Signal { signal, reply } => {
                let verdict = self.on_signal(signal);
                let _ = reply.send(verdict);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionCommand::Close => self.finished = true,
        }
    }

    fn ensure_input(&self) -> Result<(), SessionError> {
        if !self.guard.is_primary() {
            return Err(SessionError::DuplicateSession);
        }
        if self.fullscreen.prompt_open() {
            return Err(SessionError::FullscreenRequired);
        }
        Ok(())
    }

    fn retry_submit(&mut self) -> Result<(), SessionError> {
        if !self.guard.is_primary() {
            return Err(SessionError::DuplicateSession);
        }
        if self.session.phase() != SessionPhase::SubmitFailed {
            return Err(SessionError::NothingToRetry);
        }
        let draft = self.session.claim_submission(SubmitTrigger::Manual)?;
        self.dispatch(draft);
        Ok(())
    }

    fn on_tick(&mut self) {
        match self.session.tick() {
            TickOutcome::Running { time_remaining_seconds } => {
                self.emit(SessionEvent::Tick { time_remaining_seconds });
                if let Some(left) = self.monitor.warning_remaining(Instant::now()) {
                    self.emit(SessionEvent::WarningCountdown { seconds_left: whole_seconds(left) });
                }
            }
            TickOutcome::Expired => {
                self.emit(SessionEvent::Tick { time_remaining_seconds: 0 });
                tracing::info!(exam_id = %self.session.exam().id, "Exam time expired");
                self.claim(SubmitTrigger::Timeout);
            }
            TickOutcome::Idle => {}
        }
    }

    fn on_signal(&mut self, signal: EnvSignal) -> MonitorVerdict {
        let now = Instant::now();
        let verdict = self.monitor.observe(signal, now);

        if let EnvSignal::Fullscreen { active } = signal {
            if self.session.is_live() && self.guard.is_primary() {
                if self.fullscreen.on_change(active) == FullscreenReaction::Restart {
                    tracing::warn!(
                        exam_id = %self.session.exam().id,
                        "Fullscreen left during exam; restarting attempt"
                    );
                    self.restart(RestartReason::FullscreenExit);
                    self.emit(SessionEvent::FullscreenExitDetected);
                }
            }
        }

        self.poll_monitor();
        verdict
    }

    fn poll_monitor(&mut self) {
        let now = Instant::now();
        while let Some(event) = self.monitor.poll(now) {
            match event {
                MonitorEvent::WarningRaised { kind, deadline } => {
                    metrics::counter!("integrity_warnings_total", "kind" => kind.as_str())
                        .increment(1);
                    self.emit(SessionEvent::WarningRaised {
                        kind,
                        seconds_left: whole_seconds(deadline.saturating_duration_since(now)),
                    });
                }
                MonitorEvent::WarningCleared => self.emit(SessionEvent::WarningCleared),
                MonitorEvent::Violation(kind) => {
                    metrics::counter!("integrity_violations_total", "kind" => kind.as_str())
                        .increment(1);
                    tracing::warn!(
                        exam_id = %self.session.exam().id,
                        kind = kind.as_str(),
                        "Integrity violation"
                    );
                    self.emit(SessionEvent::IntegrityViolation(kind));
                    self.restart(RestartReason::Violation(kind));
                    break;
                }
            }
        }
    }

    /// Restart clears every pending timer before arming new ones.
    fn restart(&mut self, reason: RestartReason) {
        if !self.session.restart(reason) {
            return;
        }

        let now = Instant::now();
        self.monitor.disarm();
        self.ticker = new_ticker(now);
        self.monitor.arm(now, None);

        metrics::counter!("session_restarts_total", "reason" => reason.as_str()).increment(1);
        self.emit(SessionEvent::Restarted { reason, restarts: self.session.restarts() });
    }

    fn on_tab_message(&mut self, message: TabMessage) {
        match self.guard.handle(&message) {
            GuardAction::Ignore => {}
            GuardAction::Reply(reply) => {
                if let Some(channel) = &self.channel {
                    if let Err(err) = channel.post(&reply) {
                        tracing::warn!(error = %err, "Failed to answer tab message");
                    }
                }
            }
            GuardAction::Demoted => {
                // Frozen, not restarted: a duplicate tab simply stops.
                self.monitor.disarm();
                self.session.cancel_submit();
                metrics::counter!("duplicate_sessions_total").increment(1);
                self.emit(SessionEvent::DuplicateSession);
            }
        }
    }

    fn on_exam_active_changed(&mut self) {
        let active = *self.exam_active.borrow_and_update();
        if active || !self.session.is_live() || !self.guard.is_primary() {
            return;
        }

        tracing::info!(exam_id = %self.session.exam().id, "Exam closed by teacher; submitting");
        self.emit(SessionEvent::ForcedClosure);
        self.claim(SubmitTrigger::ExamClosed);
    }

    fn claim(&mut self, trigger: SubmitTrigger) {
        match self.session.claim_submission(trigger) {
            Ok(draft) => self.dispatch(draft),
            Err(err) => {
                tracing::debug!(trigger = trigger.as_str(), error = %err, "Submission not claimed");
            }
        }
    }

    /// Hands the claimed draft to the sink without blocking the loop.
    fn dispatch(&mut self, draft: ResultDraft) {
        self.monitor.disarm();
        self.fullscreen.release();
        metrics::counter!("results_submitted_total", "trigger" => draft.trigger.as_str())
            .increment(1);

        let sink = Arc::clone(&self.sink);
        let completion = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = sink.submit_result(draft).await;
            let _ = completion.send(outcome).await;
        });
    }

    fn on_submission_finished(&mut self, outcome: Result<ExamResult, SubmitError>) {
        match outcome {
            Ok(result) => {
                self.session.mark_submitted(&result);
                self.emit(SessionEvent::Submitted(result));
                self.finished = true;
            }
            Err(err) => {
                metrics::counter!("result_submit_failures_total").increment(1);
                tracing::error!(
                    exam_id = %self.session.exam().id,
                    error = %err,
                    "Failed to submit exam result"
                );
                self.session.submission_failed();
                self.emit(SessionEvent::SubmitFailed {
                    message: SUBMIT_FAILED_MESSAGE.to_string(),
                });
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            view: self.session.view(),
            tab_id: self.guard.id(),
            duplicate: !self.guard.is_primary(),
            fullscreen_prompt: self.fullscreen.prompt_open(),
            warning_seconds_left: self.monitor.warning_remaining(Instant::now()).map(whole_seconds),
        }
    }

    fn emit(&self, event: SessionEvent) {
        // The shell may stop listening; the session keeps running regardless.
        let _ = self.events.send(event);
    }
}

async fn recv_tab(channel: &mut Option<Box<dyn SessionChannel>>) -> Option<TabMessage> {
    match channel {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}

fn whole_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests;
