use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::core::config::IntegritySettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Raw observations from the page environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvSignal {
    Visibility { state: Visibility },
    Resize { width: u32 },
    Fullscreen { active: bool },
    ContextMenu,
    Copy,
    Paste,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Visibility,
    Resize,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visibility => "visibility",
            Self::Resize => "resize",
        }
    }
}

/// What the page should do with the signal's default action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorVerdict {
    Allow,
    SuppressDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    WarningRaised { kind: ViolationKind, deadline: Instant },
    WarningCleared,
    Violation(ViolationKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityConfig {
    pub grace: Duration,
    pub resize_debounce: Duration,
    pub resize_threshold_percent: u32,
    pub baseline_settle: Duration,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            resize_debounce: Duration::from_millis(500),
            resize_threshold_percent: 70,
            baseline_settle: Duration::from_millis(500),
        }
    }
}

impl From<&IntegritySettings> for IntegrityConfig {
    fn from(settings: &IntegritySettings) -> Self {
        Self {
            grace: Duration::from_secs(settings.grace_seconds),
            resize_debounce: Duration::from_millis(settings.resize_debounce_ms),
            resize_threshold_percent: settings.resize_threshold_percent,
            baseline_settle: Duration::from_millis(settings.baseline_settle_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorState {
    Idle,
    Warning { kind: ViolationKind, deadline: Instant },
}

/// Debounced visibility/resize watchdog with a single in-flight warning.
///
/// Warnings start on a trigger edge (page becomes hidden, width drops below
/// the threshold). A warning resolves once the page is visible and wide
/// again; otherwise it expires into exactly one [`MonitorEvent::Violation`].
/// All state is owned by the instance.
#[derive(Debug)]
pub struct IntegrityMonitor {
    config: IntegrityConfig,
    state: MonitorState,
    armed: bool,
    hidden: bool,
    narrow: bool,
    pending: Option<ViolationKind>,
    baseline_width: Option<u32>,
    last_width: Option<u32>,
    settle_at: Option<Instant>,
    resize_check_at: Option<Instant>,
}

impl IntegrityMonitor {
    pub fn new(config: IntegrityConfig) -> Self {
        Self {
            config,
            state: MonitorState::Idle,
            armed: false,
            hidden: false,
            narrow: false,
            pending: None,
            baseline_width: None,
            last_width: None,
            settle_at: None,
            resize_check_at: None,
        }
    }

    pub fn config(&self) -> &IntegrityConfig {
        &self.config
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Starts watching. `width` is the page width right now, when the caller
    /// knows it; `None` keeps the widths already observed. The baseline is
    /// re-captured once after the settle period, when layout has stabilized.
    pub fn arm(&mut self, now: Instant, width: Option<u32>) {
        if let Some(width) = width {
            self.baseline_width = Some(width);
            self.last_width = Some(width);
            self.narrow = false;
        }
        self.armed = true;
        self.state = MonitorState::Idle;
        self.pending = None;
        self.settle_at = Some(now + self.config.baseline_settle);
    }

    /// Cancels any warning and pending timers. Environment flags are kept so a
    /// later `arm` starts from what the page currently looks like.
    pub fn disarm(&mut self) {
        self.armed = false;
        self.state = MonitorState::Idle;
        self.pending = None;
        self.settle_at = None;
        self.resize_check_at = None;
    }

    pub fn in_warning(&self) -> bool {
        matches!(self.state, MonitorState::Warning { .. })
    }

    pub fn warning_remaining(&self, now: Instant) -> Option<Duration> {
        match self.state {
            MonitorState::Warning { deadline, .. } => Some(deadline.saturating_duration_since(now)),
            MonitorState::Idle => None,
        }
    }

    pub fn observe(&mut self, signal: EnvSignal, now: Instant) -> MonitorVerdict {
        match signal {
            EnvSignal::ContextMenu | EnvSignal::Copy | EnvSignal::Paste => {
                return MonitorVerdict::SuppressDefault;
            }
            EnvSignal::Visibility { state } => {
                let hidden = state == Visibility::Hidden;
                if hidden && !self.hidden && self.armed {
                    self.pending = Some(ViolationKind::Visibility);
                }
                self.hidden = hidden;
            }
            EnvSignal::Resize { width } => {
                if self.baseline_width.is_none() {
                    self.baseline_width = Some(width);
                }
                self.last_width = Some(width);
                if self.armed {
                    self.resize_check_at = Some(now + self.config.resize_debounce);
                }
            }
            EnvSignal::Fullscreen { .. } => {}
        }
        MonitorVerdict::Allow
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.armed {
            return None;
        }

        let warning = match self.state {
            MonitorState::Warning { deadline, .. } => Some(deadline),
            MonitorState::Idle => None,
        };

        [self.settle_at, self.resize_check_at, warning].into_iter().flatten().min()
    }

    /// Applies due timers and performs at most one state transition.
    pub fn poll(&mut self, now: Instant) -> Option<MonitorEvent> {
        if !self.armed {
            return None;
        }

        if self.settle_at.is_some_and(|at| at <= now) {
            self.settle_at = None;
            if let Some(width) = self.last_width {
                self.baseline_width = Some(width);
                self.narrow = false;
            }
        }

        if self.resize_check_at.is_some_and(|at| at <= now) {
            self.resize_check_at = None;
            let narrow = self.is_narrow();
            if narrow && !self.narrow {
                self.pending = Some(ViolationKind::Resize);
            }
            self.narrow = narrow;
        }

        match self.state {
            MonitorState::Idle => {
                let kind = self.pending.take()?;
                let deadline = now + self.config.grace;
                self.state = MonitorState::Warning { kind, deadline };
                tracing::debug!(kind = kind.as_str(), "Integrity warning raised");
                Some(MonitorEvent::WarningRaised { kind, deadline })
            }
            MonitorState::Warning { kind, deadline } => {
                // Triggers during a warning are absorbed by it.
                self.pending = None;
                if !self.hidden && !self.narrow {
                    self.state = MonitorState::Idle;
                    return Some(MonitorEvent::WarningCleared);
                }
                if now >= deadline {
                    self.state = MonitorState::Idle;
                    return Some(MonitorEvent::Violation(kind));
                }
                None
            }
        }
    }

    fn is_narrow(&self) -> bool {
        match (self.baseline_width, self.last_width) {
            (Some(baseline), Some(width)) => {
                u64::from(width) * 100
                    < u64::from(baseline) * u64::from(self.config.resize_threshold_percent)
            }
            _ => false,
        }
    }
}
