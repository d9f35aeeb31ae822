//! Player session management for beatlobby.
//!
//! This crate owns the shared session set and everything that decides who
//! may be in it:
//!
//! 1. **Admission**: ban and allow lists ([`AccessList`], [`Admission`])
//! 2. **Session tracking**: the ordered session set ([`SessionManager`])
//! 3. **Outbound queues**: one unbounded FIFO per session, drained by a
//!    writer task that the server spawns from [`SessionChannels`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Lobby (above)     ← reads votes/roster, publishes commands into queues
//!     ↕
//! Session (this)    ← identity, connection state, outbound queue
//!     ↕
//! Protocol (below)  ← PlayerId, PlayerInfo
//! ```

mod admission;
mod error;
mod manager;
mod session;

pub use admission::{AccessList, Admission};
pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Session, SessionChannels, SessionId, SessionState};
