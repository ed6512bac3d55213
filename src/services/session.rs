//! Session registry and connection management.
//!
//! ARCHITECTURE
//! ============
//! The registry maps public hash ids to live sessions. Sessions are created
//! once (first writer fixes deck and owner; later `get_or_create` calls
//! ignore their arguments) and never removed implicitly — lifetime is the
//! process, or an explicit owner-initiated close.
//!
//! The connection side binds one transport sender per connection id. A join
//! with an already-present connection id is an explicit reconnect path: the
//! roster entry and sender are replaced in place, never duplicated, which is
//! how a reloading client resumes under the same logical identity.

use std::collections::hash_map::Entry;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

use crate::deck::CardDeck;
use crate::frame::{ErrorCode, Frame};
use crate::services::broadcast::{self, Snapshot};
use crate::state::{AppState, OwnerKey, ParticipantIdentity, SessionHandle, SessionState};

// =============================================================================
// ERRORS
// =============================================================================

/// Local validation failures. Each rejects the offending operation with no
/// partial mutation and no broadcast.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("no active round")]
    NoActiveRound,
    #[error("vote position ({row}, {column}) is outside the deck")]
    InvalidPosition { row: usize, column: usize },
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_SESSION_NOT_FOUND",
            Self::Forbidden(_) => "E_FORBIDDEN",
            Self::NoActiveRound => "E_NO_ACTIVE_ROUND",
            Self::InvalidPosition { .. } => "E_INVALID_POSITION",
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Resolve or create the session for `hash_id`. Idempotent: the first call
/// fixes deck and owner; subsequent calls return the existing session and
/// ignore the supplied arguments. The flag reports whether this call created
/// the session, so minting callers can detect a hash id collision instead of
/// silently aliasing someone else's session.
pub async fn get_or_create(
    state: &AppState,
    hash_id: &str,
    deck: CardDeck,
    owner: OwnerKey,
) -> (SessionHandle, bool) {
    let mut sessions = state.sessions.write().await;
    match sessions.entry(hash_id.to_string()) {
        Entry::Occupied(existing) => (existing.get().clone(), false),
        Entry::Vacant(slot) => {
            let handle = Arc::new(Mutex::new(SessionState::new(hash_id, deck, owner)));
            slot.insert(handle.clone());
            (handle, true)
        }
    }
}

/// Look up an existing session.
///
/// # Errors
///
/// Returns `SessionError::NotFound` when no session exists for `hash_id` —
/// the trigger for callers to route clients to a "not found" experience.
pub async fn get(state: &AppState, hash_id: &str) -> Result<SessionHandle, SessionError> {
    let sessions = state.sessions.read().await;
    sessions
        .get(hash_id)
        .cloned()
        .ok_or_else(|| SessionError::NotFound(hash_id.to_string()))
}

/// Explicitly close a session. Owner-only; live connections learn of the
/// close when their next send fails.
///
/// # Errors
///
/// `NotFound` for an unknown hash id, `Forbidden` when `requester` is not
/// the owner key the session was created with.
pub async fn close(state: &AppState, hash_id: &str, requester: &OwnerKey) -> Result<(), SessionError> {
    let handle = get(state, hash_id).await?;
    {
        let session = handle.lock().await;
        if session.owner != *requester {
            warn!(%hash_id, "non-owner attempted session close");
            return Err(SessionError::Forbidden("only the session owner may close it"));
        }
    }
    state.sessions.write().await.remove(hash_id);
    info!(%hash_id, "session closed");
    Ok(())
}

// =============================================================================
// JOIN / LEAVE
// =============================================================================

/// Join (or rejoin) a session. Upserts the roster entry keyed by connection
/// id, binds `tx` as the connection's transport sender, broadcasts the new
/// roster to everyone else, and returns the snapshot for the joiner.
///
/// # Errors
///
/// Returns `SessionError::NotFound` if the session does not exist.
pub async fn join(
    state: &AppState,
    hash_id: &str,
    identity: ParticipantIdentity,
    tx: mpsc::Sender<Frame>,
) -> Result<Snapshot, SessionError> {
    let handle = get(state, hash_id).await?;
    let mut session = handle.lock().await;

    let connection_id = identity.connection_id.clone();
    // Explicit upsert: a duplicate connection id is a reconnect, not a new
    // participant. Last join wins; the replaced sender's socket prunes
    // itself when its channel closes. A pre-reveal vote under this id stays.
    let reconnect = session
        .participants
        .insert(connection_id.clone(), identity)
        .is_some();
    session.clients.insert(connection_id.clone(), tx);

    info!(
        %hash_id,
        %connection_id,
        reconnect,
        roster = session.participants.len(),
        "participant joined session"
    );

    let snap = broadcast::snapshot(&session);
    broadcast::push(&mut session, Some(&connection_id));
    Ok(snap)
}

/// Leave a session, voluntarily or by transport drop — both paths are
/// identical, so rosters self-heal without client cooperation. The departing
/// participant's cast vote is retained for the current round; reveal is
/// never auto-triggered by a departure.
///
/// `departing` must still be the sender registered for `connection_id`: a
/// reconnect replaces the sender under the session lock, and the stale
/// socket's later close must not evict the live replacement.
pub async fn leave(state: &AppState, hash_id: &str, connection_id: &str, departing: &mpsc::Sender<Frame>) {
    let Ok(handle) = get(state, hash_id).await else {
        // Session already closed; nothing to clean up.
        return;
    };
    let mut session = handle.lock().await;

    let still_current = session
        .clients
        .get(connection_id)
        .is_some_and(|registered| registered.same_channel(departing));
    if !still_current {
        info!(%hash_id, %connection_id, "leave ignored: sender no longer registered");
        return;
    }

    session.participants.remove(connection_id);
    session.clients.remove(connection_id);

    info!(
        %hash_id,
        %connection_id,
        roster = session.participants.len(),
        "participant left session"
    );
    broadcast::push(&mut session, None);
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
