//! bunker-relay: the relay transport for the bunker responder.
//!
//! Speaks the relay wire protocol over WebSocket to any number of relays
//! and presents them as a single [`bunker_core::RelayTransport`].
//!
//! ```no_run
//! use bunker_core::{Filter, Identity, RelayTransport};
//! use bunker_relay::RelayPool;
//!
//! # async fn example() -> bunker_core::BunkerResult<()> {
//! let pool = RelayPool::connect(&["wss://relay.example".to_string()]).await?;
//! let me = Identity::from("79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798");
//! let subscription = pool.subscribe(Filter::addressed_to(&me)).await?;
//! # let _ = subscription;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod pool;
pub mod wire;

pub use connection::{Inbound, RelayConnection};
pub use pool::{RelayPool, SeenEvents};
pub use wire::{ClientMessage, RelayMessage, WireError};
