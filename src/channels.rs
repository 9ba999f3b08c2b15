//! Outbound channel registry.
//!
//! Maps a channel identifier to the sender half of that connection's
//! outbound queue. Delivery is best-effort: a message addressed to an
//! unbound or closed channel is logged and dropped, never queued.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::models::outbound::Outbound;

/// Opaque identifier of one connected channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(String);

impl ChannelId {
    /// Wrap an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry of live channels and their outbound senders.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<ChannelId, mpsc::UnboundedSender<Outbound>>>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel, returning the receiver half the transport pumps
    /// to the client. Re-registering an id replaces the old sender.
    pub async fn register(&self, id: ChannelId) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.write().await.insert(id, tx);
        rx
    }

    /// Remove a channel after its connection closes.
    pub async fn unregister(&self, id: &ChannelId) {
        self.channels.write().await.remove(id);
    }

    /// Deliver a message to `channel`, best-effort.
    pub async fn deliver(&self, channel: Option<&ChannelId>, message: Outbound) {
        let Some(id) = channel else {
            warn!("no channel bound, dropping outbound message");
            return;
        };
        let channels = self.channels.read().await;
        match channels.get(id) {
            Some(sender) => {
                if sender.send(message).is_err() {
                    warn!(channel = %id, "channel receiver closed, dropping outbound message");
                } else {
                    debug!(channel = %id, "delivered outbound message");
                }
            }
            None => {
                warn!(channel = %id, "channel not registered, dropping outbound message");
            }
        }
    }
}
