use super::*;
use crate::state::test_helpers::test_app_state;

fn create_body(deck_id: &str) -> CreateSessionBody {
    CreateSessionBody {
        deck_id: deck_id.to_string(),
        owner_account_id: None,
        owner_connection_id: Some("owner-1".to_string()),
    }
}

#[test]
fn bytes_to_hex_formats_lowercase_pairs() {
    assert_eq!(bytes_to_hex(&[0x00, 0xff, 0x0a]), "00ff0a");
}

#[test]
fn generated_hash_ids_are_ten_chars_and_distinct() {
    let a = generate_hash_id();
    let b = generate_hash_id();
    assert_eq!(a.len(), 10);
    assert_eq!(b.len(), 10);
    assert_ne!(a, b);
}

#[test]
fn owner_key_prefers_account_over_connection() {
    let account_id = Uuid::new_v4();
    let key = owner_key(Some(account_id), Some("conn".into())).expect("key");
    assert_eq!(key, OwnerKey::Account(account_id));

    let key = owner_key(None, Some("conn".into())).expect("key");
    assert_eq!(key, OwnerKey::Connection("conn".into()));

    assert!(owner_key(None, None).is_none());
}

#[tokio::test]
async fn create_session_seeds_registry_and_pins_owner() {
    let state = test_app_state();

    let (status, Json(response)) =
        create_session(State(state.clone()), Json(create_body("fibonacci")))
            .await
            .expect("create succeeds");

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(response.hash_id.len(), 10);
    assert_eq!(response.deck_id, "fibonacci");
    assert_eq!(response.participants, 0);

    let handle = session::get(&state, &response.hash_id)
        .await
        .expect("live session exists");
    let live = handle.lock().await;
    assert_eq!(live.owner, OwnerKey::Connection("owner-1".into()));
    assert_eq!(live.deck.id, "fibonacci");
}

#[tokio::test]
async fn create_session_with_unknown_deck_is_404() {
    let state = test_app_state();
    let status = create_session(State(state), Json(create_body("tarot")))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_session_without_owner_is_400() {
    let state = test_app_state();
    let body = CreateSessionBody {
        deck_id: "fibonacci".into(),
        owner_account_id: None,
        owner_connection_id: None,
    };
    let status = create_session(State(state), Json(body)).await.unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_session_probe_roundtrips() {
    let state = test_app_state();
    let (_, Json(created)) = create_session(State(state.clone()), Json(create_body("tshirt")))
        .await
        .expect("create");

    let Json(found) = get_session(State(state.clone()), Path(created.hash_id.clone()))
        .await
        .expect("probe finds it");
    assert_eq!(found.hash_id, created.hash_id);
    assert_eq!(found.deck_id, "tshirt");

    let status = get_session(State(state), Path("missing".into()))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn close_session_is_owner_only() {
    let state = test_app_state();
    let (_, Json(created)) = create_session(State(state.clone()), Json(create_body("powers")))
        .await
        .expect("create");

    let stranger = CloseSessionBody {
        owner_account_id: None,
        owner_connection_id: Some("stranger".into()),
    };
    let status = close_session(State(state.clone()), Path(created.hash_id.clone()), Json(stranger))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::FORBIDDEN);

    let owner = CloseSessionBody {
        owner_account_id: None,
        owner_connection_id: Some("owner-1".into()),
    };
    let status = close_session(State(state.clone()), Path(created.hash_id.clone()), Json(owner))
        .await
        .expect("owner closes");
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(session::get(&state, &created.hash_id).await.is_err());
}

#[tokio::test]
async fn get_deck_passthrough() {
    let state = test_app_state();

    let Json(deck) = get_deck(State(state.clone()), Path("fibonacci".into()))
        .await
        .expect("known deck");
    assert_eq!(deck.id, "fibonacci");
    assert!(!deck.grid.is_empty());

    let status = get_deck(State(state), Path("tarot".into())).await.unwrap_err();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[test]
fn session_error_to_status_maps_taxonomy() {
    assert_eq!(session_error_to_status(SessionError::NotFound("x".into())), StatusCode::NOT_FOUND);
    assert_eq!(session_error_to_status(SessionError::Forbidden("x")), StatusCode::FORBIDDEN);
    assert_eq!(session_error_to_status(SessionError::NoActiveRound), StatusCode::CONFLICT);
    assert_eq!(
        session_error_to_status(SessionError::InvalidPosition { row: 9, column: 9 }),
        StatusCode::UNPROCESSABLE_ENTITY
    );
}

#[test]
fn catalog_error_to_status_maps_not_found() {
    assert_eq!(
        catalog_error_to_status(CatalogError::DeckNotFound("x".into())),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        catalog_error_to_status(CatalogError::Malformed("x".into())),
        StatusCode::BAD_GATEWAY
    );
}
