//! # cadence-core
//!
//! Session state, timer state machine, and store for the Cadence broker.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Clock** - Injectable wall-clock abstraction
//! - **TimerCore** - Derives `(interval, remaining)` from a wall-clock baseline
//! - **Session / User** - A room's roster, metadata, and socket handles
//! - **SessionStore** - Concurrent id-to-session mapping
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │   Broker    │────▶│ SessionStore │────▶│   Session   │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!                                                 │
//!                                                 ▼
//!                                          ┌─────────────┐
//!                                          │  TimerCore  │
//!                                          └─────────────┘
//! ```

pub mod clock;
pub mod session;
pub mod store;
pub mod timer;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use session::{Session, SocketId, SocketSender, User};
pub use store::{SessionHandle, SessionStore};
pub use timer::{TimerCore, TimerPatch};
