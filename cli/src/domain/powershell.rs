//! PowerShell command lines sent to the Windows VM.
//!
//! Every command runs through the remote `cmd` shell, so each one starts
//! with [`POWERSHELL_PREFIX`]. Pure string construction and parsing only.

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Prefix for every command run over WinRM.
pub const POWERSHELL_PREFIX: &str = "powershell.exe -NonInteractive -ExecutionPolicy Bypass ";

/// Windows services that must be running before SSH is usable.
pub const OPENSSH_SERVICES: [&str; 2] = ["sshd", "ssh-agent"];

/// Flag passed to the test binary.
pub const VERBOSE_TEST_FLAG: &str = "--test.v";

/// A named remote setup step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupCommand {
    /// What the step does, for progress output and error context.
    pub description: &'static str,
    /// Full command line including [`POWERSHELL_PREFIX`].
    pub command: String,
}

impl SetupCommand {
    fn new(description: &'static str, script: &str) -> Self {
        Self {
            description,
            command: prefixed(script),
        }
    }
}

/// Prefix a script with the PowerShell invocation.
#[must_use]
pub fn prefixed(script: &str) -> String {
    format!("{POWERSHELL_PREFIX}{script}")
}

/// Run `script` via `-EncodedCommand` so quotes, pipes and `$` reach
/// PowerShell untouched by the `cmd` shell.
#[must_use]
pub fn encoded(script: &str) -> String {
    let utf16: Vec<u8> = script.encode_utf16().flat_map(u16::to_le_bytes).collect();
    format!("{POWERSHELL_PREFIX}-EncodedCommand {}", STANDARD.encode(utf16))
}

/// Commands that install OpenSSH prerequisites and enable both services.
///
/// NuGet 2.8.5.201 is what the OpenSSHUtils module requires.
#[must_use]
pub fn openssh_setup_commands() -> Vec<SetupCommand> {
    vec![
        SetupCommand::new(
            "install NuGet package provider",
            "Install-PackageProvider -Name NuGet -MinimumVersion 2.8.5.201 -Force",
        ),
        SetupCommand::new(
            "install OpenSSHUtils for all users",
            "Install-Module -Force OpenSSHUtils -Scope AllUsers",
        ),
        SetupCommand::new(
            "set ssh-agent startup to Automatic",
            "Set-Service -Name ssh-agent -StartupType 'Automatic'",
        ),
        SetupCommand::new(
            "set sshd startup to Automatic",
            "Set-Service -Name sshd -StartupType 'Automatic'",
        ),
        SetupCommand::new("start ssh-agent", "Start-Service ssh-agent"),
        SetupCommand::new("start sshd", "Start-Service sshd"),
    ]
}

/// Create `dir` on the VM; succeeds if it already exists.
#[must_use]
pub fn create_dir_command(dir: &str) -> SetupCommand {
    SetupCommand::new(
        "create remote working directory",
        &format!("New-Item -ItemType Directory -Force -Path {dir}"),
    )
}

/// Join a file name onto a Windows directory.
#[must_use]
pub fn remote_path(dir: &str, name: &str) -> String {
    format!("{}\\{name}", dir.trim_end_matches('\\'))
}

/// Command that runs the uploaded test binary verbosely.
#[must_use]
pub fn run_test_binary_command(remote_binary: &str) -> String {
    prefixed(&format!("{remote_binary} {VERBOSE_TEST_FLAG}"))
}

/// Query printing one `name=Status` line per requested service.
///
/// Unregistered services are skipped rather than raising an error.
#[must_use]
pub fn service_status_query(services: &[&str]) -> String {
    let names = services.join(",");
    encoded(&format!(
        "Get-Service -Name {names} -ErrorAction SilentlyContinue | \
         ForEach-Object {{ \"$($_.Name)=$($_.Status)\" }}"
    ))
}

/// State of a Windows service as reported by `Get-Service`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Running,
    Stopped,
    Pending,
    Other,
}

impl ServiceStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "Running" => Self::Running,
            "Stopped" => Self::Stopped,
            s if s.ends_with("Pending") => Self::Pending,
            _ => Self::Other,
        }
    }
}

/// Parse the output of [`service_status_query`].
///
/// Lines that are not `name=Status` are ignored. Names are lowercased.
#[must_use]
pub fn parse_service_statuses(output: &str) -> HashMap<String, ServiceStatus> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, status)| (name.to_ascii_lowercase(), ServiceStatus::parse(status.trim())))
        .collect()
}
