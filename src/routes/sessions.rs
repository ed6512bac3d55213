//! Session directory routes.
//!
//! DESIGN
//! ======
//! A session record must exist before any realtime join: `POST /api/session`
//! resolves the deck from the catalog, mints a hash id, and seeds the live
//! session through the registry's `get_or_create`. The GET probe backs the
//! lobby's "does this room exist" redirect; DELETE is the explicit
//! owner-initiated close.

use std::fmt::Write;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deck::{CardDeck, CatalogError};
use crate::services::session::{self, SessionError};
use crate::state::{AppState, OwnerKey};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Deserialize)]
pub struct CreateSessionBody {
    pub deck_id: String,
    /// Owner pin for authenticated creators.
    pub owner_account_id: Option<Uuid>,
    /// Owner pin for guest creators.
    pub owner_connection_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CloseSessionBody {
    pub owner_account_id: Option<Uuid>,
    pub owner_connection_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub hash_id: String,
    pub deck_id: String,
    pub participants: usize,
}

// =============================================================================
// HASH IDS
// =============================================================================

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a random 10-char public session id.
#[must_use]
fn generate_hash_id() -> String {
    let bytes: [u8; 5] = rand::rng().random();
    bytes_to_hex(&bytes)
}

fn owner_key(account_id: Option<Uuid>, connection_id: Option<String>) -> Option<OwnerKey> {
    match (account_id, connection_id) {
        (Some(account_id), _) => Some(OwnerKey::Account(account_id)),
        (None, Some(connection_id)) => Some(OwnerKey::Connection(connection_id)),
        (None, None) => None,
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `POST /api/session` — create a session record and its live state.
pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<(StatusCode, Json<SessionResponse>), StatusCode> {
    let Some(owner) = owner_key(body.owner_account_id, body.owner_connection_id) else {
        return Err(StatusCode::BAD_REQUEST);
    };

    let deck = state
        .catalog
        .fetch(&body.deck_id)
        .await
        .map_err(catalog_error_to_status)?;
    let deck_id = deck.id.clone();

    // Re-mint on collision: an occupied id belongs to someone else's session
    // and must not be handed out as fresh.
    let hash_id = loop {
        let candidate = generate_hash_id();
        let (_, created) = session::get_or_create(&state, &candidate, deck.clone(), owner.clone()).await;
        if created {
            break candidate;
        }
    };
    tracing::info!(%hash_id, %deck_id, "session created");

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse { hash_id, deck_id, participants: 0 }),
    ))
}

/// `GET /api/session/:hash_id` — existence probe for the lobby redirect.
pub async fn get_session(
    State(state): State<AppState>,
    Path(hash_id): Path<String>,
) -> Result<Json<SessionResponse>, StatusCode> {
    let handle = session::get(&state, &hash_id)
        .await
        .map_err(session_error_to_status)?;
    let session = handle.lock().await;

    Ok(Json(SessionResponse {
        hash_id: session.hash_id.clone(),
        deck_id: session.deck.id.clone(),
        participants: session.participants.len(),
    }))
}

/// `DELETE /api/session/:hash_id` — owner-initiated close.
pub async fn close_session(
    State(state): State<AppState>,
    Path(hash_id): Path<String>,
    Json(body): Json<CloseSessionBody>,
) -> Result<StatusCode, StatusCode> {
    let Some(requester) = owner_key(body.owner_account_id, body.owner_connection_id) else {
        return Err(StatusCode::BAD_REQUEST);
    };

    session::close(&state, &hash_id, &requester)
        .await
        .map_err(session_error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/decks/:deck_id` — catalog passthrough for clients.
pub async fn get_deck(
    State(state): State<AppState>,
    Path(deck_id): Path<String>,
) -> Result<Json<CardDeck>, StatusCode> {
    let deck = state
        .catalog
        .fetch(&deck_id)
        .await
        .map_err(catalog_error_to_status)?;
    Ok(Json(deck))
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

fn session_error_to_status(err: SessionError) -> StatusCode {
    match err {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Forbidden(_) => StatusCode::FORBIDDEN,
        SessionError::NoActiveRound => StatusCode::CONFLICT,
        SessionError::InvalidPosition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn catalog_error_to_status(err: CatalogError) -> StatusCode {
    match err {
        CatalogError::DeckNotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::Http(_) | CatalogError::Malformed(_) => StatusCode::BAD_GATEWAY,
    }
}

#[cfg(test)]
#[path = "sessions_test.rs"]
mod tests;
