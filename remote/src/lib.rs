//! SSH connection setup and the SFTP-backed remote filesystem

use std::sync::Arc;
use tracing::instrument;

pub mod sftp;

pub use sftp::SftpFs;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("ssh error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("unknown host key for {host}:{port}, add it to known_hosts or enable 'insecure'")]
    UnknownHost { host: String, port: u16 },

    #[error("host key verification failed for {host}:{port}: {reason}")]
    HostKeyMismatch {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("authentication rejected by {host} for user {user:?}")]
    AuthenticationRejected { host: String, user: String },

    #[error("cannot open sftp subsystem: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),
}

/// Where and how to connect
#[derive(Clone, PartialEq, Eq)]
pub struct SshSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// accept any host key instead of checking known_hosts
    pub insecure: bool,
}

impl SshSettings {
    pub const DEFAULT_PORT: u16 = 22;

    /// `host:port`, with IPv6 hosts in brackets
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl std::fmt::Debug for SshSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("insecure", &self.insecure)
            .finish()
    }
}

impl std::fmt::Display for SshSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ssh://{}@{}", self.user, self.address())
    }
}

/// Host key verification against the user's known_hosts file
#[derive(Debug)]
pub struct HostKeyCheck {
    host: String,
    port: u16,
    insecure: bool,
}

impl russh::client::Handler for HostKeyCheck {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        if self.insecure {
            tracing::warn!(
                "skipping host key verification for {}:{}",
                self.host,
                self.port
            );
            return Ok(true);
        }
        match russh::keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => {
                tracing::debug!("host key verified for {}:{}", self.host, self.port);
                Ok(true)
            }
            Ok(false) => Err(Error::UnknownHost {
                host: self.host.clone(),
                port: self.port,
            }),
            Err(error) => Err(Error::HostKeyMismatch {
                host: self.host.clone(),
                port: self.port,
                reason: error.to_string(),
            }),
        }
    }
}

/// Dials the server, authenticates with the password and opens an SFTP session.
#[instrument]
pub async fn connect(settings: &SshSettings) -> Result<SftpFs, Error> {
    tracing::info!(address = %settings.address(), "dial ssh");
    let config = russh::client::Config {
        keepalive_interval: Some(std::time::Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    };
    let handler = HostKeyCheck {
        host: settings.host.clone(),
        port: settings.port,
        insecure: settings.insecure,
    };
    let mut handle = russh::client::connect(
        Arc::new(config),
        (settings.host.as_str(), settings.port),
        handler,
    )
    .await?;
    tracing::debug!("ssh handshake completed");
    let auth = handle
        .authenticate_password(&settings.user, &settings.password)
        .await?;
    if !auth.success() {
        return Err(Error::AuthenticationRejected {
            host: settings.host.clone(),
            user: settings.user.clone(),
        });
    }
    tracing::info!("dial successful");
    let channel = handle.channel_open_session().await?;
    channel.request_subsystem(true, "sftp").await?;
    let session = russh_sftp::client::SftpSession::new(channel.into_stream()).await?;
    tracing::debug!("sftp subsystem opened");
    Ok(SftpFs::new(handle, session))
}
