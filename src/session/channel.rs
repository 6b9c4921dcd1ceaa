use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

/// Identity of one tab, generated once at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabSignal {
    Query,
    Announcement,
    Close,
}

/// Wire form: `{"type":"query","from":"<uuid>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabMessage {
    #[serde(rename = "type")]
    pub signal: TabSignal,
    pub from: TabId,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to encode tab message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("session channel closed")]
    Closed,
}

/// Best-effort broadcast between tabs sharing a channel name.
#[async_trait]
pub trait SessionChannel: Send {
    fn post(&self, message: &TabMessage) -> Result<(), ChannelError>;

    /// Next message from any tab on the channel, own posts included.
    /// `None` once the channel is gone.
    async fn recv(&mut self) -> Option<TabMessage>;
}

pub enum ChannelSupport {
    Available(Box<dyn SessionChannel>),
    Unavailable,
}

/// In-process stand-in for the browser's named broadcast channels.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, name: &str) -> BroadcastEndpoint {
        let sender = {
            let mut channels = match self.channels.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            channels
                .entry(name.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .clone()
        };
        let receiver = sender.subscribe();
        BroadcastEndpoint { sender, receiver }
    }
}

pub struct BroadcastEndpoint {
    sender: broadcast::Sender<String>,
    receiver: broadcast::Receiver<String>,
}

#[async_trait]
impl SessionChannel for BroadcastEndpoint {
    fn post(&self, message: &TabMessage) -> Result<(), ChannelError> {
        let payload = serde_json::to_string(message)?;
        // Our own receiver keeps the channel open, so a send cannot lack subscribers.
        self.sender.send(payload).map(|_| ()).map_err(|_| ChannelError::Closed)
    }

    async fn recv(&mut self) -> Option<TabMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => match serde_json::from_str(&payload) {
                    Ok(message) => return Some(message),
                    Err(err) => {
                        tracing::warn!(error = %err, "Dropping malformed tab message");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Session channel lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
