//! Production `SessionFactory`: WinRM for commands, SSH/SFTP for files.

use anyhow::Result;

use crate::application::ports::SessionFactory;
use crate::domain::Credentials;
use crate::infra::sftp::SftpTransfer;
use crate::infra::winrm::WinRmClient;

/// Opens the two remote-access sessions for a VM.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteSessions;

impl SessionFactory for RemoteSessions {
    type Shell = WinRmClient;
    type Transfer = SftpTransfer;

    fn command_client(&self, credentials: &Credentials) -> Result<WinRmClient> {
        WinRmClient::new(credentials)
    }

    async fn transfer_session(&self, credentials: &Credentials) -> Result<SftpTransfer> {
        SftpTransfer::connect(credentials).await
    }
}
