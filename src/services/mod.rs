//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the authoritative session state: registry and roster
//! (`session`), the voting round state machine (`round`), and snapshot
//! construction plus fan-out (`broadcast`). Route handlers stay focused on
//! protocol translation.

pub mod broadcast;
pub mod round;
pub mod session;
