use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FullscreenError {
    #[error("fullscreen request denied: {0}")]
    Denied(String),
}

/// Platform fullscreen switch. Vendor differences live behind this trait.
pub trait FullscreenControl: Send {
    fn is_active(&self) -> bool;
    fn request(&mut self) -> Result<(), FullscreenError>;
    fn exit(&mut self) -> Result<(), FullscreenError>;
}

pub enum FullscreenCapability {
    Supported(Box<dyn FullscreenControl>),
    Unsupported,
}

impl std::fmt::Debug for FullscreenCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Supported(_) => f.write_str("Supported"),
            Self::Unsupported => f.write_str("Unsupported"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FullscreenReaction {
    Ignore,
    /// Left fullscreen during a live attempt: restart and block until re-entry.
    Restart,
}

/// Enforces `require_fullscreen` for one session. Reacts immediately, with no
/// grace period.
pub(crate) struct FullscreenGuard {
    capability: FullscreenCapability,
    required: bool,
    prompt_open: bool,
}

impl FullscreenGuard {
    pub(crate) fn new(capability: FullscreenCapability, required: bool) -> Self {
        Self { capability, required, prompt_open: false }
    }

    /// Required but the platform cannot do it: protection is off.
    pub(crate) fn degraded(&self) -> bool {
        self.required && matches!(self.capability, FullscreenCapability::Unsupported)
    }

    pub(crate) fn enforced(&self) -> bool {
        self.required && matches!(self.capability, FullscreenCapability::Supported(_))
    }

    pub(crate) fn prompt_open(&self) -> bool {
        self.prompt_open
    }

    pub(crate) fn enter(&mut self) -> Result<(), FullscreenError> {
        if !self.enforced() {
            return Ok(());
        }
        match &mut self.capability {
            FullscreenCapability::Supported(control) if !control.is_active() => control.request(),
            _ => Ok(()),
        }
    }

    pub(crate) fn on_change(&mut self, active: bool) -> FullscreenReaction {
        if !self.enforced() || active || self.prompt_open {
            return FullscreenReaction::Ignore;
        }
        self.prompt_open = true;
        FullscreenReaction::Restart
    }

    /// Retries fullscreen from the blocking prompt; the prompt closes on success.
    pub(crate) fn reenter(&mut self) -> Result<(), FullscreenError> {
        self.enter()?;
        self.prompt_open = false;
        Ok(())
    }

    /// Leaves fullscreen once the attempt is over.
    pub(crate) fn release(&mut self) {
        self.prompt_open = false;
        if let FullscreenCapability::Supported(control) = &mut self.capability {
            if control.is_active() {
                if let Err(err) = control.exit() {
                    tracing::warn!(error = %err, "Failed to leave fullscreen after submission");
                }
            }
        }
    }
}
