use std::sync::Arc;

use pokerplan::deck::{BuiltinCatalog, DeckCatalog, HttpCatalog};
use pokerplan::{routes, state};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    // External catalog when configured, built-in decks otherwise.
    let catalog: Arc<dyn DeckCatalog> = match std::env::var("CATALOG_URL") {
        Ok(url) => {
            tracing::info!(%url, "using HTTP deck catalog");
            Arc::new(HttpCatalog::new(url))
        }
        Err(_) => {
            tracing::info!("CATALOG_URL not set — using built-in decks");
            Arc::new(BuiltinCatalog)
        }
    };

    let state = state::AppState::new(catalog);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "pokerplan listening");
    axum::serve(listener, app).await.expect("server failed");
}
