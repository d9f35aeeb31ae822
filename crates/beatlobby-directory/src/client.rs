//! The registration handshake.
//!
//! ```text
//! server                          directory
//!   │── register (id 0, first) ──→ │
//!   │←── record with assigned id ──│
//!   │          ... run ...         │
//!   │── deregister (id, remove) ──→│
//!   └── close ─────────────────────┘
//! ```
//!
//! The connection stays open between the two messages. Every failure is
//! logged and swallowed: a directory that cannot be reached simply does not
//! list this server.

use std::time::Duration;

use futures_util::future::join_all;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::{DirectoryError, RecordCodec, RegistrationRecord};

/// How long one handshake may take before the directory is given up on.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// What this server advertises, and how long it waits for directories.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    address: String,
    port: u16,
    name: String,
    timeout: Duration,
}

/// A live registration with one directory.
#[derive(Debug)]
pub struct Registration {
    directory: String,
    id: i32,
    framed: Framed<TcpStream, RecordCodec>,
}

impl Registration {
    /// The `host:port` of the directory.
    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// The id the directory assigned to this server.
    pub fn id(&self) -> i32 {
        self.id
    }
}

impl DirectoryClient {
    /// `address`/`port`/`name` are what players will see in the directory.
    pub fn new(address: impl Into<String>, port: u16, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            name: name.into(),
            timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Registers with every directory concurrently.
    ///
    /// Returns the registrations that succeeded; failures are logged as
    /// warnings and never delay the others beyond the handshake timeout.
    pub async fn register_all(&self, directories: &[String]) -> Vec<Registration> {
        let attempts = directories.iter().map(|dir| async move {
            match self.register(dir).await {
                Ok(registration) => Some(registration),
                Err(e) => {
                    tracing::warn!(directory = %dir, error = %e, "directory registration failed");
                    None
                }
            }
        });
        join_all(attempts).await.into_iter().flatten().collect()
    }

    /// Performs the registration handshake with one directory.
    pub async fn register(&self, directory: &str) -> Result<Registration, DirectoryError> {
        let handshake = async {
            let stream = TcpStream::connect(directory).await?;
            let mut framed = Framed::new(stream, RecordCodec);

            framed
                .send(RegistrationRecord::register(
                    self.address.clone(),
                    self.port,
                    self.name.clone(),
                ))
                .await?;

            let reply = framed
                .next()
                .await
                .ok_or_else(|| DirectoryError::Closed(directory.to_owned()))??;
            Ok::<_, DirectoryError>((reply.id, framed))
        };

        let (id, framed) = tokio::time::timeout(self.timeout, handshake)
            .await
            .map_err(|_| DirectoryError::Timeout {
                directory: directory.to_owned(),
                timeout: self.timeout,
            })??;

        tracing::info!(directory, id, "registered with directory");
        Ok(Registration {
            directory: directory.to_owned(),
            id,
            framed,
        })
    }

    /// Deregisters from every directory concurrently. Failures are logged.
    pub async fn deregister_all(&self, registrations: Vec<Registration>) {
        let attempts = registrations.into_iter().map(|registration| async move {
            let directory = registration.directory.clone();
            if let Err(e) = self.deregister(registration).await {
                tracing::warn!(%directory, error = %e, "directory deregistration failed");
            }
        });
        join_all(attempts).await;
    }

    /// Sends the removal record and closes the connection.
    pub async fn deregister(&self, mut registration: Registration) -> Result<(), DirectoryError> {
        let directory = registration.directory.clone();
        let record = RegistrationRecord::deregister(
            registration.id,
            self.address.clone(),
            self.port,
            self.name.clone(),
        );

        let goodbye = async {
            registration.framed.send(record).await?;
            registration.framed.close().await
        };
        tokio::time::timeout(self.timeout, goodbye)
            .await
            .map_err(|_| DirectoryError::Timeout {
                directory: directory.clone(),
                timeout: self.timeout,
            })??;

        tracing::info!(%directory, "removed from directory");
        Ok(())
    }
}
