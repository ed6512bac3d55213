//! Snapshot construction and session fan-out.
//!
//! DESIGN
//! ======
//! Every state change pushes one `session:state` frame to every connected
//! client of that session. Snapshots are built while the session mutex is
//! held, so each one is a consistent point-in-time view, and pushes for one
//! session leave in mutation order.
//!
//! Vote secrecy: before reveal the snapshot carries only a per-participant
//! `has_voted` boolean. Positions and resolved values appear exactly when
//! `revealed` flips true — never earlier, not even to the voter.
//!
//! BACKPRESSURE
//! ============
//! Delivery is `try_send` per client and never blocks the session writer. A
//! full channel drops that frame for that client only; a closed channel is
//! an implicit disconnect, so the client and its roster entry are pruned and
//! the remaining members get a refreshed roster in the same push pass.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::deck::CardDeck;
use crate::frame::{Data, Frame};
use crate::state::SessionState;

// =============================================================================
// SNAPSHOT TYPES
// =============================================================================

/// Wire view of one session, pushed as the `session:state` payload and
/// returned as the done payload of every successful mutation.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub hash_id: String,
    pub deck: CardDeck,
    pub roster: Vec<RosterEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<RoundView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    pub connection_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Uuid>,
    pub is_owner: bool,
    pub has_voted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundView {
    pub name: String,
    pub description: String,
    pub revealed: bool,
    /// Present only after reveal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<HashMap<String, RevealedVote>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevealedVote {
    pub row: usize,
    pub column: usize,
    pub value: String,
}

impl Snapshot {
    /// Flatten into frame data.
    #[must_use]
    pub fn into_data(self) -> Data {
        let mut data = Data::new();
        data.insert("hash_id".into(), serde_json::json!(self.hash_id));
        data.insert("deck".into(), serde_json::to_value(&self.deck).unwrap_or_default());
        data.insert("roster".into(), serde_json::to_value(&self.roster).unwrap_or_default());
        if let Some(round) = &self.round {
            data.insert("round".into(), serde_json::to_value(round).unwrap_or_default());
        }
        data
    }
}

// =============================================================================
// SNAPSHOT CONSTRUCTION
// =============================================================================

/// Build a consistent snapshot of `session`. Must be called with the session
/// mutex held (enforced by the `&SessionState` flowing out of the lock).
#[must_use]
pub fn snapshot(session: &SessionState) -> Snapshot {
    let mut roster: Vec<RosterEntry> = session
        .participants
        .values()
        .map(|identity| RosterEntry {
            connection_id: identity.connection_id.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            account_id: identity.account_id,
            is_owner: session.owner.matches(identity),
            has_voted: session
                .current_round
                .as_ref()
                .is_some_and(|round| round.votes.contains_key(&identity.connection_id)),
        })
        .collect();
    roster.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));

    let round = session.current_round.as_ref().map(|round| RoundView {
        name: round.name.clone(),
        description: round.description.clone(),
        revealed: round.revealed,
        votes: round.revealed.then(|| {
            round
                .votes
                .iter()
                .map(|(connection_id, pos)| {
                    let value = session.deck.value_at(*pos).unwrap_or_default().to_string();
                    (
                        connection_id.clone(),
                        RevealedVote { row: pos.row, column: pos.column, value },
                    )
                })
                .collect()
        }),
    });

    Snapshot { hash_id: session.hash_id.clone(), deck: session.deck.clone(), roster, round }
}

// =============================================================================
// FAN-OUT
// =============================================================================

/// Push the current snapshot to every client of `session`, excluding
/// `exclude` (the actor, who receives the same snapshot as its reply).
///
/// Clients whose channels have closed are pruned as implicit disconnects,
/// and the pass repeats so survivors see the healed roster. The loop is
/// bounded: every extra pass removed at least one client.
pub fn push(session: &mut SessionState, exclude: Option<&str>) {
    loop {
        let frame = Frame::request("session:state", snapshot(session).into_data())
            .with_session_id(session.hash_id.clone());

        let mut closed: Vec<String> = Vec::new();
        for (connection_id, tx) in &session.clients {
            if exclude == Some(connection_id.as_str()) {
                continue;
            }
            match tx.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    // Slow consumer: drop this frame for this client only.
                    warn!(hash_id = %session.hash_id, %connection_id, "client channel full, snapshot dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push(connection_id.clone()),
            }
        }

        if closed.is_empty() {
            return;
        }
        for connection_id in closed {
            session.clients.remove(&connection_id);
            session.participants.remove(&connection_id);
            info!(hash_id = %session.hash_id, %connection_id, "pruned dead client during broadcast");
        }
    }
}

#[cfg(test)]
#[path = "broadcast_test.rs"]
mod tests;
