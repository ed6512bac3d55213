//! Real-time planning-poker session coordination.
//!
//! Authoritative per-session state, the join/leave/reconnect protocol, the
//! voting round state machine, and the broadcast discipline keeping every
//! connected client's view consistent. Everything else (auth, deck CRUD, UI)
//! lives in external collaborators consumed through narrow seams.

pub mod deck;
pub mod frame;
pub mod routes;
pub mod services;
pub mod state;
