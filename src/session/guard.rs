use crate::session::channel::{TabId, TabMessage, TabSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardAction {
    Ignore,
    Reply(TabMessage),
    /// Another tab announced itself; this tab stops accepting input for good.
    Demoted,
}

/// Primary-tab election over a broadcast channel.
///
/// A tab assumes it is primary, asks who else is there, and steps down as
/// soon as another tab announces itself. Demotion is never undone.
#[derive(Debug)]
pub struct SingleInstanceGuard {
    id: TabId,
    primary: bool,
}

impl SingleInstanceGuard {
    pub fn new(id: TabId) -> Self {
        Self { id, primary: true }
    }

    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn mount(&self) -> TabMessage {
        self.message(TabSignal::Query)
    }

    pub fn unmount(&self) -> TabMessage {
        self.message(TabSignal::Close)
    }

    pub fn handle(&mut self, message: &TabMessage) -> GuardAction {
        if message.from == self.id {
            return GuardAction::Ignore;
        }

        match message.signal {
            TabSignal::Query if self.primary => {
                GuardAction::Reply(self.message(TabSignal::Announcement))
            }
            TabSignal::Query => GuardAction::Ignore,
            TabSignal::Announcement if self.primary => {
                self.primary = false;
                tracing::warn!(
                    tab_id = %self.id,
                    other = %message.from,
                    "Exam already open in another tab"
                );
                GuardAction::Demoted
            }
            TabSignal::Announcement => GuardAction::Ignore,
            // Re-probe only; a closing tab does not promote anyone.
            TabSignal::Close => GuardAction::Reply(self.message(TabSignal::Query)),
        }
    }

    fn message(&self, signal: TabSignal) -> TabMessage {
        TabMessage { signal, from: self.id }
    }
}
