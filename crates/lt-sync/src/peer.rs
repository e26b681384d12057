//! Peer discovery and delivery.
//!
//! The coordinator never looks peers up itself. It asks a [`PeerRegistry`]
//! for the current peers and sends through each [`Peer`] handle. The
//! receiving side is whatever the registry hands the host; for the
//! in-process [`ChannelHub`] that is a [`PeerInbox`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::error::SyncError;
use crate::message::SyncMessage;

lt_core::define_string_id!(
    /// A validated peer identifier.
    PeerId, "peer ID"
);

impl PeerId {
    /// Generates a fresh random peer id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// A handle for delivering messages to one peer.
pub trait Peer: Send + Sync {
    fn id(&self) -> &PeerId;

    /// Delivers `message`. Fails if the peer is gone.
    fn send(&self, message: &SyncMessage) -> Result<(), SyncError>;
}

/// Lists the peers currently participating in sync.
pub trait PeerRegistry {
    fn list_peers(&self) -> Vec<Arc<dyn Peer>>;
}

/// An in-process hub; every member reaches every other member.
///
/// Messages travel as JSON text, the same form an out-of-process transport
/// would carry.
#[derive(Debug, Clone, Default)]
pub struct ChannelHub {
    members: Arc<Mutex<BTreeMap<PeerId, UnboundedSender<String>>>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn members(&self) -> MutexGuard<'_, BTreeMap<PeerId, UnboundedSender<String>>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a member. The returned [`HubMember`] is its registry; the
    /// [`PeerInbox`] receives what the other members send.
    pub fn join(&self) -> (HubMember, PeerInbox) {
        let id = PeerId::generate();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.members().insert(id.clone(), sender);
        tracing::debug!(peer = %id, "peer joined hub");
        (
            HubMember {
                id: id.clone(),
                hub: self.clone(),
            },
            PeerInbox { id, receiver },
        )
    }

    /// Number of current members.
    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }

    fn leave(&self, id: &PeerId) {
        if self.members().remove(id).is_some() {
            tracing::debug!(peer = %id, "peer left hub");
        }
    }
}

/// One member's view of the hub: every member except itself.
///
/// Dropping it removes the member from the hub.
#[derive(Debug)]
pub struct HubMember {
    id: PeerId,
    hub: ChannelHub,
}

impl HubMember {
    pub const fn id(&self) -> &PeerId {
        &self.id
    }
}

impl PeerRegistry for HubMember {
    fn list_peers(&self) -> Vec<Arc<dyn Peer>> {
        self.hub
            .members()
            .iter()
            .filter(|(id, _)| **id != self.id)
            .map(|(id, sender)| {
                Arc::new(ChannelPeer {
                    id: id.clone(),
                    sender: sender.clone(),
                }) as Arc<dyn Peer>
            })
            .collect()
    }
}

impl Drop for HubMember {
    fn drop(&mut self) {
        self.hub.leave(&self.id);
    }
}

#[derive(Debug)]
struct ChannelPeer {
    id: PeerId,
    sender: UnboundedSender<String>,
}

impl Peer for ChannelPeer {
    fn id(&self) -> &PeerId {
        &self.id
    }

    fn send(&self, message: &SyncMessage) -> Result<(), SyncError> {
        let json = message.to_json()?;
        self.sender
            .send(json)
            .map_err(|_| SyncError::PeerClosed(self.id.clone()))
    }
}

/// Receiving side of a hub member.
#[derive(Debug)]
pub struct PeerInbox {
    id: PeerId,
    receiver: UnboundedReceiver<String>,
}

impl PeerInbox {
    pub const fn id(&self) -> &PeerId {
        &self.id
    }

    /// Waits for the next message. `None` once the member has left the hub.
    pub async fn recv(&mut self) -> Option<Result<SyncMessage, SyncError>> {
        let json = self.receiver.recv().await?;
        Some(SyncMessage::from_json(&json))
    }

    /// Takes a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Result<SyncMessage, SyncError>> {
        let json = self.receiver.try_recv().ok()?;
        Some(SyncMessage::from_json(&json))
    }
}
