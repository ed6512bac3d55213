//! Card decks and the deck catalog collaborator.
//!
//! DESIGN
//! ======
//! The coordinator treats a deck as an opaque ordered 2-D grid of vote
//! values; it only ever bounds-checks `(row, column)` and resolves values at
//! reveal time. Decks come from an external catalog, consumed through the
//! `DeckCatalog` trait so the coordinator can be tested with the built-in
//! catalog and deployed against an HTTP one (`CATALOG_URL`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::frame::ErrorCode;

// =============================================================================
// CARD DECK
// =============================================================================

/// An ordered 2-D grid of vote values. Rows may differ in length; bounds
/// checks are always per-row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDeck {
    pub id: String,
    pub name: String,
    pub grid: Vec<Vec<String>>,
}

/// One vote position inside a deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPosition {
    pub row: usize,
    pub column: usize,
}

impl CardDeck {
    /// Whether `pos` addresses a card in this deck.
    #[must_use]
    pub fn contains(&self, pos: CardPosition) -> bool {
        self.grid
            .get(pos.row)
            .is_some_and(|row| pos.column < row.len())
    }

    /// Resolve the value at `pos`, if in bounds.
    #[must_use]
    pub fn value_at(&self, pos: CardPosition) -> Option<&str> {
        self.grid
            .get(pos.row)?
            .get(pos.column)
            .map(String::as_str)
    }
}

// =============================================================================
// CATALOG
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("deck not found: {0}")]
    DeckNotFound(String),
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed deck payload: {0}")]
    Malformed(String),
}

impl ErrorCode for CatalogError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::DeckNotFound(_) => "E_DECK_NOT_FOUND",
            Self::Http(_) => "E_CATALOG",
            Self::Malformed(_) => "E_CATALOG_PAYLOAD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

/// External deck catalog. Injected into `AppState` so transports and tests
/// never reach for a global client.
#[async_trait]
pub trait DeckCatalog: Send + Sync {
    async fn fetch(&self, deck_id: &str) -> Result<CardDeck, CatalogError>;
}

// =============================================================================
// BUILT-IN CATALOG
// =============================================================================

/// Catalog of the standard estimation decks, used when no `CATALOG_URL` is
/// configured and by tests.
pub struct BuiltinCatalog;

fn deck(id: &str, name: &str, rows: &[&[&str]]) -> CardDeck {
    CardDeck {
        id: id.to_string(),
        name: name.to_string(),
        grid: rows
            .iter()
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect(),
    }
}

#[async_trait]
impl DeckCatalog for BuiltinCatalog {
    async fn fetch(&self, deck_id: &str) -> Result<CardDeck, CatalogError> {
        match deck_id {
            "fibonacci" => Ok(deck(
                "fibonacci",
                "Fibonacci",
                &[&["0", "1", "2", "3", "5"], &["8", "13", "21", "34", "55"], &["?", "\u{2615}"]],
            )),
            "powers" => Ok(deck(
                "powers",
                "Powers of Two",
                &[&["1", "2", "4", "8"], &["16", "32", "64", "?"]],
            )),
            "tshirt" => Ok(deck("tshirt", "T-Shirt Sizes", &[&["XS", "S", "M"], &["L", "XL", "?"]])),
            other => Err(CatalogError::DeckNotFound(other.to_string())),
        }
    }
}

// =============================================================================
// HTTP CATALOG
// =============================================================================

/// Catalog backed by an external HTTP service exposing
/// `GET {base_url}/decks/{id}` as JSON.
pub struct HttpCatalog {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCatalog {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl DeckCatalog for HttpCatalog {
    async fn fetch(&self, deck_id: &str) -> Result<CardDeck, CatalogError> {
        let url = format!("{}/decks/{deck_id}", self.base_url.trim_end_matches('/'));
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::DeckNotFound(deck_id.to_string()));
        }
        let response = response.error_for_status()?;

        let fetched: CardDeck = response
            .json()
            .await
            .map_err(|e| CatalogError::Malformed(e.to_string()))?;

        if fetched.grid.is_empty() || fetched.grid.iter().all(Vec::is_empty) {
            return Err(CatalogError::Malformed(format!("deck {deck_id} has no cards")));
        }
        Ok(fetched)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtin_catalog_serves_standard_decks() {
        for id in ["fibonacci", "powers", "tshirt"] {
            let deck = BuiltinCatalog.fetch(id).await.expect("deck should exist");
            assert_eq!(deck.id, id);
            assert!(!deck.grid.is_empty());
        }
    }

    #[tokio::test]
    async fn builtin_catalog_rejects_unknown_deck() {
        let err = BuiltinCatalog.fetch("tarot").await.unwrap_err();
        assert!(matches!(err, CatalogError::DeckNotFound(ref id) if id == "tarot"));
        assert_eq!(err.error_code(), "E_DECK_NOT_FOUND");
    }

    #[test]
    fn bounds_check_is_per_row() {
        let deck = deck("d", "D", &[&["1", "2", "3"], &["5"]]);
        assert!(deck.contains(CardPosition { row: 0, column: 2 }));
        assert!(deck.contains(CardPosition { row: 1, column: 0 }));
        assert!(!deck.contains(CardPosition { row: 1, column: 1 }));
        assert!(!deck.contains(CardPosition { row: 2, column: 0 }));
    }

    #[test]
    fn value_at_resolves_in_bounds_only() {
        let deck = deck("d", "D", &[&["1", "2"], &["3", "5"]]);
        assert_eq!(deck.value_at(CardPosition { row: 0, column: 1 }), Some("2"));
        assert_eq!(deck.value_at(CardPosition { row: 1, column: 1 }), Some("5"));
        assert_eq!(deck.value_at(CardPosition { row: 2, column: 0 }), None);
    }

    #[test]
    fn deck_serde_round_trip() {
        let original = deck("fibonacci", "Fibonacci", &[&["1", "2"], &["3", "5"]]);
        let json = serde_json::to_string(&original).expect("serialize");
        let restored: CardDeck = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.id, "fibonacci");
        assert_eq!(restored.grid, original.grid);
    }
}
