//! Registration with external directory servers.
//!
//! Players find running lobbies through directory servers. At startup the
//! server introduces itself to each configured directory and is handed an
//! id; at shutdown it asks each one to drop it again.
//!
//! - [`RegistrationRecord`] / [`RecordCodec`]: the fixed-layout binary
//!   record both sides exchange
//! - [`DirectoryClient`] / [`Registration`]: the handshake itself

mod client;
mod error;
mod record;

pub use client::{DEFAULT_HANDSHAKE_TIMEOUT, DirectoryClient, Registration};
pub use error::DirectoryError;
pub use record::{ConnectionKind, MAX_RECORD_LEN, RecordCodec, RegistrationRecord};
