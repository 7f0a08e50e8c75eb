//! smcore Session Storage
//!
//! The only component permitted to read or write persisted session state.
//! All access goes through a read -> compute-diff -> write cycle:
//! `SessionStore` reads sessions for a subscriber set, the caller mutates
//! in-memory `SessionState` objects (producing update criteria), and the
//! store replays those diffs onto freshly read copies before persisting.
//!
//! Two backends implement the `StoreClient` contract: a mutex-guarded
//! in-memory map with exclusive per-subscriber-set grants, and a Redis
//! client using watch/multi/exec optimistic concurrency.

pub mod client;
pub mod error;
pub mod memory;
pub mod redis_client;
pub mod store;

pub use client::*;
pub use error::*;
pub use memory::*;
pub use redis_client::*;
pub use store::*;
