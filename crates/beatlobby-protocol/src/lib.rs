//! Wire protocol for beatlobby.
//!
//! - **Types** ([`ClientMessage`], [`ServerCommand`], [`PlayerInfo`],
//!   [`Difficulty`]): what travels on the player and observer channels.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! Framing (the length prefix and frame-size cap) belongs to the
//! transport; this crate only ever sees whole payloads.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{ClientMessage, Difficulty, PlayerId, PlayerInfo, ServerCommand};
