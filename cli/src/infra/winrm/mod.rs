//! WinRM command client: implements `RemoteShell` over WS-Management.
//!
//! Every `run` opens a fresh `cmd` shell, issues one command, drains its
//! output with Receive until the command is done, then signals and deletes
//! the shell. The listener uses a self-signed certificate, so certificate
//! verification is disabled.

pub mod response;
pub mod soap;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::application::ports::RemoteShell;
use crate::domain::Credentials;
use crate::domain::config::{REMOTE_USER, WINRM_HTTPS_PORT};

use self::response::{Fault, ReceiveOutput};
use self::soap::Request;

/// Server-side wait for a single WS-Man operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Extra time the HTTP request may take on top of the operation timeout.
const HTTP_GRACE: Duration = Duration::from_secs(30);

const SOAP_CONTENT_TYPE: &str = "application/soap+xml;charset=UTF-8";

/// WinRM client bound to one VM.
pub struct WinRmClient {
    http: reqwest::Client,
    endpoint: String,
    user: String,
    password: String,
    operation_timeout: Duration,
}

impl std::fmt::Debug for WinRmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WinRmClient")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl WinRmClient {
    /// Client for `https://<address>:5986/wsman` as `Administrator`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let endpoint = format!(
            "https://{}:{WINRM_HTTPS_PORT}/wsman",
            credentials.address()
        );
        Self::with_endpoint(endpoint, REMOTE_USER, credentials.password())
    }

    /// Client for an explicit endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_endpoint(
        endpoint: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let operation_timeout = DEFAULT_OPERATION_TIMEOUT;
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(operation_timeout + HTTP_GRACE)
            .build()
            .context("building WinRM HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            user: user.into(),
            password: password.into(),
            operation_timeout,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one request. Faults come back as `Err(Fault)` in the inner result
    /// so callers can decide which ones to tolerate.
    async fn send(&self, request: Request<'_>) -> Result<std::result::Result<String, Fault>> {
        let message_id = uuid::Uuid::new_v4().to_string();
        let envelope = request.envelope(&self.endpoint, &message_id, self.operation_timeout);
        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(envelope)
            .send()
            .await
            .with_context(|| format!("sending WinRM request to {}", self.endpoint))?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            anyhow::bail!("WinRM authentication as {} was rejected", self.user);
        }
        let body = response
            .text()
            .await
            .context("reading WinRM response body")?;
        if status.is_success() {
            return Ok(Ok(body));
        }
        match response::fault(&body) {
            Some(fault) => Ok(Err(fault)),
            None => anyhow::bail!("WinRM request failed with HTTP {status}"),
        }
    }

    /// Send a request whose faults are all fatal.
    async fn call(&self, request: Request<'_>) -> Result<String> {
        let action = request.action().rsplit('/').next().unwrap_or("request");
        self.send(request)
            .await?
            .map_err(|fault| anyhow::anyhow!("WinRM {action} failed: {fault}"))
    }

    async fn receive(&self, shell_id: &str, command_id: &str) -> Result<ReceiveOutput> {
        match self
            .send(Request::Receive {
                shell_id,
                command_id,
            })
            .await?
        {
            Ok(body) => response::receive_output(&body),
            Err(fault) if fault.is_operation_timeout() => {
                tracing::trace!(command_id, "no output yet");
                Ok(ReceiveOutput::default())
            }
            Err(fault) => Err(anyhow::anyhow!("WinRM Receive failed: {fault}")),
        }
    }

    async fn run_in_shell<O, E>(
        &self,
        shell_id: &str,
        command: &str,
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<i32>
    where
        O: AsyncWrite + Unpin + Send,
        E: AsyncWrite + Unpin + Send,
    {
        let body = self.call(Request::Command { shell_id, command }).await?;
        let command_id = response::command_id(&body)?;

        let exit_code = loop {
            let chunk = self.receive(shell_id, &command_id).await?;
            if !chunk.stdout.is_empty() {
                stdout.write_all(&chunk.stdout).await.context("writing stdout")?;
            }
            if !chunk.stderr.is_empty() {
                stderr.write_all(&chunk.stderr).await.context("writing stderr")?;
            }
            if let Some(code) = chunk.exit_code {
                break code;
            }
        };
        stdout.flush().await.context("flushing stdout")?;
        stderr.flush().await.context("flushing stderr")?;

        if let Err(e) = self
            .call(Request::Signal {
                shell_id,
                command_id: &command_id,
            })
            .await
        {
            tracing::debug!(error = %e, "terminate signal after completion failed");
        }
        Ok(exit_code)
    }
}

impl RemoteShell for WinRmClient {
    async fn run<O, E>(&self, command: &str, stdout: &mut O, stderr: &mut E) -> Result<i32>
    where
        O: AsyncWrite + Unpin + Send,
        E: AsyncWrite + Unpin + Send,
    {
        tracing::debug!(endpoint = %self.endpoint, %command, "winrm run");
        let body = self.call(Request::CreateShell).await?;
        let shell_id = response::shell_id(&body)?;

        let result = self.run_in_shell(&shell_id, command, stdout, stderr).await;

        if let Err(e) = self.call(Request::DeleteShell { shell_id: &shell_id }).await {
            tracing::warn!(error = %e, %shell_id, "failed to delete WinRM shell");
        }
        let code = result?;
        tracing::debug!(exit_code = code, "winrm command finished");
        Ok(code)
    }
}
