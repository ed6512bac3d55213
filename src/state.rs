//! Shared application state and the session data model.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the session registry and the deck catalog client. The registry maps
//! public hash ids to `Arc<Mutex<SessionState>>`: the outer `RwLock` guards
//! only map membership, while the per-session mutex serializes every
//! mutation and snapshot read of one session. Independent sessions never
//! contend on each other's lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, mpsc};
use uuid::Uuid;

use crate::deck::{CardDeck, CardPosition, DeckCatalog};
use crate::frame::Frame;

// =============================================================================
// PARTICIPANT IDENTITY
// =============================================================================

/// One logical participant. `connection_id` is client-generated and persisted
/// client-side, so it survives page reloads and transport drops; a new
/// physical connection presenting the same id replaces the prior entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantIdentity {
    pub connection_id: String,
    pub first_name: String,
    pub last_name: String,
    /// Present only for authenticated users; guests carry `None`.
    pub account_id: Option<Uuid>,
}

/// The identity a session's owner was pinned to at creation. Immutable for
/// the session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum OwnerKey {
    Account(Uuid),
    Connection(String),
}

impl OwnerKey {
    /// Whether `identity` is the session owner. Authenticated owners match on
    /// account id, guest owners on connection id.
    #[must_use]
    pub fn matches(&self, identity: &ParticipantIdentity) -> bool {
        match self {
            Self::Account(account_id) => identity.account_id == Some(*account_id),
            Self::Connection(connection_id) => identity.connection_id == *connection_id,
        }
    }
}

// =============================================================================
// ROUND
// =============================================================================

/// One estimation item open for voting. Replaced wholesale when the owner
/// starts a new round; never merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub name: String,
    pub description: String,
    /// Cast votes keyed by connection id. Last write wins; entries survive a
    /// voter's disconnect so a pre-reveal rejoin resumes as "already voted".
    pub votes: HashMap<String, CardPosition>,
    pub revealed: bool,
}

impl Round {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            votes: HashMap::new(),
            revealed: false,
        }
    }
}

// =============================================================================
// SESSION STATE
// =============================================================================

/// Per-session live state. All fields are read and written only while the
/// session's mutex is held.
#[derive(Debug)]
pub struct SessionState {
    pub hash_id: String,
    pub owner: OwnerKey,
    pub deck: CardDeck,
    /// Current roster keyed by connection id.
    pub participants: HashMap<String, ParticipantIdentity>,
    /// Transport senders keyed by connection id. A closed sender is an
    /// implicit disconnect and is pruned on the next delivery.
    pub clients: HashMap<String, mpsc::Sender<Frame>>,
    pub current_round: Option<Round>,
}

impl SessionState {
    #[must_use]
    pub fn new(hash_id: impl Into<String>, deck: CardDeck, owner: OwnerKey) -> Self {
        Self {
            hash_id: hash_id.into(),
            owner,
            deck,
            participants: HashMap::new(),
            clients: HashMap::new(),
            current_round: None,
        }
    }
}

/// Registry entry handle. Cloned out of the registry so callers lock the
/// session without holding the registry lock.
pub type SessionHandle = Arc<Mutex<SessionState>>;

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum — all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    pub catalog: Arc<dyn DeckCatalog>,
}

impl AppState {
    #[must_use]
    pub fn new(catalog: Arc<dyn DeckCatalog>) -> Self {
        Self { sessions: Arc::new(RwLock::new(HashMap::new())), catalog }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
mod tests {
    use super::*;
    use super::test_helpers::{guest, two_by_two_deck};

    #[test]
    fn new_session_starts_idle_and_empty() {
        let session = SessionState::new("ab12cd34ef", two_by_two_deck(), OwnerKey::Connection("O".into()));
        assert!(session.participants.is_empty());
        assert!(session.clients.is_empty());
        assert!(session.current_round.is_none());
    }

    #[test]
    fn connection_owner_matches_on_connection_id() {
        let owner = OwnerKey::Connection("O".into());
        assert!(owner.matches(&guest("O")));
        assert!(!owner.matches(&guest("P1")));
    }

    #[test]
    fn account_owner_matches_on_account_id_only() {
        let account_id = Uuid::new_v4();
        let owner = OwnerKey::Account(account_id);

        let mut authed = guest("conn-a");
        authed.account_id = Some(account_id);
        assert!(owner.matches(&authed));

        // Same connection id without the account does not make you owner.
        assert!(!owner.matches(&guest("conn-a")));
    }

    #[test]
    fn fresh_round_is_unrevealed_with_no_votes() {
        let round = Round::new("Task A", "estimate it");
        assert_eq!(round.name, "Task A");
        assert!(!round.revealed);
        assert!(round.votes.is_empty());
    }

    #[test]
    fn owner_key_serde_round_trip() {
        let owner = OwnerKey::Connection("O".into());
        let json = serde_json::to_string(&owner).expect("serialize");
        let restored: OwnerKey = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, owner);
    }
}
