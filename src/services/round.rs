//! Voting round state machine.
//!
//! DESIGN
//! ======
//! Per session the machine is Idle → Voting → Revealed, materialized as
//! `Option<Round>` plus the `revealed` flag: `None` and a revealed round are
//! both Idle-for-voting. Transitions happen under the session mutex and
//! every successful transition broadcasts in the same critical section, so
//! clients observe transitions in application order.
//!
//! There are no timeouts anywhere — the owner is the sole clock. A round
//! stays open until the owner reveals it or starts the next one, and reveal
//! with zero votes cast is legal.

use tracing::{info, warn};

use crate::deck::CardPosition;
use crate::services::broadcast::{self, Snapshot};
use crate::services::session::{self, SessionError};
use crate::state::{AppState, ParticipantIdentity, Round};

// =============================================================================
// START
// =============================================================================

/// Start a new round, wholesale-replacing any previous one (its votes are
/// discarded, revealed or not). Owner-only; allowed from any state.
///
/// # Errors
///
/// `NotFound` for an unknown session, `Forbidden` when `requester` is not
/// the owner.
pub async fn start(
    state: &AppState,
    hash_id: &str,
    requester: &ParticipantIdentity,
    name: &str,
    description: &str,
) -> Result<Snapshot, SessionError> {
    let handle = session::get(state, hash_id).await?;
    let mut session = handle.lock().await;

    if !session.owner.matches(requester) {
        // The UI never offers this to non-owners, so log it as a client bug.
        warn!(%hash_id, connection_id = %requester.connection_id, "non-owner attempted round:start");
        return Err(SessionError::Forbidden("only the session owner may start a round"));
    }

    session.current_round = Some(Round::new(name, description));
    info!(%hash_id, round = %name, "round started");

    let snap = broadcast::snapshot(&session);
    broadcast::push(&mut session, Some(&requester.connection_id));
    Ok(snap)
}

// =============================================================================
// VOTE
// =============================================================================

/// Cast (or re-cast) a vote for the active round. Overwrites any prior vote
/// by the same connection id, supporting "change my mind before reveal".
/// Broadcasts only `has_voted` flags — positions stay secret until reveal.
///
/// # Errors
///
/// `NotFound` for an unknown session, `Forbidden` for a non-member,
/// `NoActiveRound` when no round is open (or it is already revealed),
/// `InvalidPosition` when the position is outside the session's deck.
pub async fn cast_vote(
    state: &AppState,
    hash_id: &str,
    requester: &ParticipantIdentity,
    position: CardPosition,
) -> Result<Snapshot, SessionError> {
    let handle = session::get(state, hash_id).await?;
    let mut session = handle.lock().await;

    if !session.participants.contains_key(&requester.connection_id) {
        warn!(%hash_id, connection_id = %requester.connection_id, "vote from non-member rejected");
        return Err(SessionError::Forbidden("only session members may vote"));
    }

    let in_deck = session.deck.contains(position);
    match &mut session.current_round {
        Some(round) if !round.revealed => {
            if !in_deck {
                return Err(SessionError::InvalidPosition { row: position.row, column: position.column });
            }
            round.votes.insert(requester.connection_id.clone(), position);
        }
        _ => return Err(SessionError::NoActiveRound),
    }

    info!(%hash_id, connection_id = %requester.connection_id, "vote cast");

    let snap = broadcast::snapshot(&session);
    broadcast::push(&mut session, Some(&requester.connection_id));
    Ok(snap)
}

// =============================================================================
// REVEAL
// =============================================================================

/// Reveal the active round's votes to every member simultaneously.
/// Owner-only; requires an unrevealed round (a second reveal is rejected so
/// the full-votes broadcast goes out exactly once).
///
/// # Errors
///
/// `NotFound` for an unknown session, `Forbidden` for a non-owner,
/// `NoActiveRound` when nothing is open to reveal.
pub async fn reveal(
    state: &AppState,
    hash_id: &str,
    requester: &ParticipantIdentity,
) -> Result<Snapshot, SessionError> {
    let handle = session::get(state, hash_id).await?;
    let mut session = handle.lock().await;

    if !session.owner.matches(requester) {
        warn!(%hash_id, connection_id = %requester.connection_id, "non-owner attempted round:reveal");
        return Err(SessionError::Forbidden("only the session owner may reveal votes"));
    }

    let vote_count = match &mut session.current_round {
        Some(round) if !round.revealed => {
            round.revealed = true;
            round.votes.len()
        }
        _ => return Err(SessionError::NoActiveRound),
    };

    info!(%hash_id, votes = vote_count, "round revealed");

    let snap = broadcast::snapshot(&session);
    broadcast::push(&mut session, Some(&requester.connection_id));
    Ok(snap)
}

#[cfg(test)]
#[path = "round_test.rs"]
mod tests;
