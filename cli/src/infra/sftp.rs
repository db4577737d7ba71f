//! SSH/SFTP file transfer: implements `FileTransfer` with `russh`.
//!
//! One SSH connection authenticated by password, one SFTP subsystem channel
//! over it. The VM is freshly created and its host key unknown, so every
//! server key is accepted.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use russh::client::{self, Handle, Handler};
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;

use crate::application::ports::FileTransfer;
use crate::domain::Credentials;
use crate::domain::config::{REMOTE_USER, SSH_PORT};

/// Idle time after which the SSH connection is dropped.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Client handler that trusts any host key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyHostKey;

impl Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// An open SFTP session on the VM.
pub struct SftpTransfer {
    handle: Handle<AcceptAnyHostKey>,
    sftp: SftpSession,
}

impl SftpTransfer {
    /// Connect to `<address>:22` as `Administrator` and start SFTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, authentication, or the SFTP
    /// subsystem request fails.
    pub async fn connect(credentials: &Credentials) -> Result<Self> {
        let addr = (credentials.address(), SSH_PORT);
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(INACTIVITY_TIMEOUT),
            ..client::Config::default()
        });
        let mut handle = client::connect(config, addr, AcceptAnyHostKey)
            .await
            .with_context(|| format!("connecting to {}:{SSH_PORT}", credentials.address()))?;

        let auth = handle
            .authenticate_password(REMOTE_USER, credentials.password())
            .await
            .context("SSH password authentication")?;
        if !auth.success() {
            anyhow::bail!("SSH password authentication as {REMOTE_USER} was rejected");
        }

        let channel = handle
            .channel_open_session()
            .await
            .context("opening SSH session channel")?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .context("requesting sftp subsystem")?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .context("starting SFTP session")?;
        tracing::info!(address = credentials.address(), "SFTP session open");
        Ok(Self { handle, sftp })
    }
}

impl FileTransfer for SftpTransfer {
    async fn upload(&self, local: &Path, remote: &str) -> Result<u64> {
        let mut source = tokio::fs::File::open(local)
            .await
            .with_context(|| format!("opening {}", local.display()))?;
        let mut target = self
            .sftp
            .create(remote)
            .await
            .with_context(|| format!("creating remote file {remote}"))?;
        let copied = tokio::io::copy(&mut source, &mut target)
            .await
            .with_context(|| format!("copying {} to {remote}", local.display()))?;
        // Shutting down closes the remote handle; Windows keeps the file
        // locked against execution while it is open.
        target
            .shutdown()
            .await
            .with_context(|| format!("closing remote file {remote}"))?;
        tracing::debug!(bytes = copied, %remote, "upload complete");
        Ok(copied)
    }

    async fn close(self) -> Result<()> {
        drop(self.sftp);
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .context("closing SSH connection")?;
        tracing::debug!("SSH connection closed");
        Ok(())
    }
}
