//! # cadence-protocol
//!
//! Wire protocol definitions for the Cadence shared-timer broker.
//!
//! This crate defines the JSON text-frame contract between clients and the
//! broker: message types, field bounds and sanitizers, and the codec that
//! enforces them in both directions.
//!
//! ## Message Types
//!
//! - `session_join` / `session_update` - Session membership and metadata
//! - `timer_update` - Import a peer's timer view
//! - `user_update` / `user_list` - Roster maintenance
//! - `ping` / `pong` - Application heartbeat
//!
//! ## Example
//!
//! ```rust
//! use cadence_protocol::{codec, ClientMessage};
//!
//! let msg = codec::decode(r#"{"type": "ping"}"#).unwrap();
//! assert_eq!(msg, ClientMessage::Ping);
//! ```

pub mod codec;
pub mod fields;
pub mod messages;

pub use codec::{decode, encode, CodecError};
pub use messages::{
    ClientMessage, Interval, IntervalList, ServerMessage, SessionPatch, SessionPublic, TimerState,
    UserPatch, UserPublic,
};
