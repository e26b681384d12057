//! Time synchronization between log viewers.
//!
//! Provides:
//! - The sync wire message exchanged between peers
//! - The [`PeerRegistry`] and [`Peer`] collaborator traits, plus an
//!   in-process [`ChannelHub`] implementing them
//! - The [`TimeSyncCoordinator`], which reconciles fingerprints and drives
//!   per-document clock offsets

mod coordinator;
mod error;
pub mod message;
pub mod peer;

pub use coordinator::{SyncReport, TimeSyncCoordinator, RECONCILE_THRESHOLD};
pub use error::SyncError;
pub use message::SyncMessage;
pub use peer::{ChannelHub, HubMember, Peer, PeerId, PeerInbox, PeerRegistry};
