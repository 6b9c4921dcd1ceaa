//! Client-side exam session: a timed, randomized attempt guarded by an
//! integrity monitor and a single-instance guard, ending in one scored result.
//!
//! [`controller::ExamSession`], [`integrity::IntegrityMonitor`] and
//! [`guard::SingleInstanceGuard`] are synchronous state machines. The
//! [`runtime`] module drives them from one tokio task.

pub mod channel;
pub mod controller;
pub mod fullscreen;
pub mod guard;
pub mod integrity;
pub mod runtime;
mod shuffle;
pub mod submission;

use thiserror::Error;

use crate::db::models::AnswerKeyError;

pub use channel::{BroadcastHub, ChannelSupport, SessionChannel, TabId, TabMessage, TabSignal};
pub use controller::{ExamSession, RestartReason, SessionPhase, SessionView, TickOutcome};
pub use fullscreen::{FullscreenCapability, FullscreenControl, FullscreenError};
pub use guard::{GuardAction, SingleInstanceGuard};
pub use integrity::{
    EnvSignal, IntegrityConfig, IntegrityMonitor, MonitorEvent, MonitorVerdict, ViolationKind,
    Visibility,
};
pub use runtime::{start_session, SessionDeps, SessionEvent, SessionHandle, SessionSnapshot};
pub use submission::{ResultDraft, ResultSink, StoreResultSink, SubmitError, SubmitTrigger};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("exam is not accepting attempts")]
    ExamInactive,
    #[error("student first and last name are required")]
    MissingStudent,
    #[error("exam cannot be administered: {0}")]
    InvalidExam(#[from] AnswerKeyError),
    #[error("question '{0}' is not the one on screen")]
    NotCurrentQuestion(String),
    #[error("option {0} does not exist")]
    InvalidOption(usize),
    #[error("current question has not been answered")]
    Unanswered,
    #[error("submission opens in {remaining_seconds} seconds")]
    TooEarly { remaining_seconds: u32 },
    #[error("submission has not been requested")]
    NotConfirming,
    #[error("submission already claimed")]
    AlreadyClaimed,
    #[error("no failed submission to retry")]
    NothingToRetry,
    #[error("the exam is open in another tab")]
    DuplicateSession,
    #[error("return to fullscreen to continue")]
    FullscreenRequired,
    #[error("fullscreen request failed: {0}")]
    Fullscreen(String),
    #[error("session has ended")]
    Closed,
}
