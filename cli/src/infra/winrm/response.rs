//! Extraction of the few fields the shell exchange needs from WS-Man
//! response envelopes.
//!
//! Servers are free to choose namespace prefixes, so every pattern accepts
//! any prefix (or none).

use std::sync::LazyLock;

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;

/// WS-Man fault raised when a Receive produced no output within the
/// operation timeout. The command is still running; receive again.
pub const OPERATION_TIMEOUT_FAULT: &str = "2150858793";

static SHELL_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"<(?:\w+:)?ShellId>([^<]+)</(?:\w+:)?ShellId>").expect("valid regex")
});

static SHELL_SELECTOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r#"<(?:\w+:)?Selector\s+Name="ShellId"\s*>([^<]+)</"#).expect("valid regex")
});

static COMMAND_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"<(?:\w+:)?CommandId>([^<]+)</(?:\w+:)?CommandId>").expect("valid regex")
});

static STREAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"<(?:\w+:)?Stream\s+([^>]*?)(?:/>|>([^<]*)</(?:\w+:)?Stream>)")
        .expect("valid regex")
});

static STREAM_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r#"\bName="(\w+)""#).expect("valid regex")
});

static DONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r#"<(?:\w+:)?CommandState\b[^>]*\bState="[^"]*/CommandState/Done""#)
        .expect("valid regex")
});

static EXIT_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"<(?:\w+:)?ExitCode>\s*(-?\d+)\s*</(?:\w+:)?ExitCode>").expect("valid regex")
});

static FAULT_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r#"<(?:\w+:)?WSManFault\b[^>]*\bCode="(\d+)""#).expect("valid regex")
});

static FAULT_MESSAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?s)<(?:\w+:)?Message>(.*?)</(?:\w+:)?Message>").expect("valid regex")
});

static FAULT_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?s)<(?:\w+:)?Text\b[^>]*>(.*?)</(?:\w+:)?Text>").expect("valid regex")
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"<[^>]*>").expect("valid regex")
});

/// Shell id from a Create response.
///
/// # Errors
///
/// Returns an error if the response carries no shell id.
pub fn shell_id(xml: &str) -> Result<String> {
    SHELL_ID_RE
        .captures(xml)
        .or_else(|| SHELL_SELECTOR_RE.captures(xml))
        .map(|c| c[1].trim().to_string())
        .context("no ShellId in create-shell response")
}

/// Command id from a Command response.
///
/// # Errors
///
/// Returns an error if the response carries no command id.
pub fn command_id(xml: &str) -> Result<String> {
    COMMAND_ID_RE
        .captures(xml)
        .map(|c| c[1].trim().to_string())
        .context("no CommandId in command response")
}

/// Output decoded from one Receive response.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReceiveOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Set once the command reached `CommandState/Done`.
    pub exit_code: Option<i32>,
}

impl ReceiveOutput {
    #[must_use]
    pub fn done(&self) -> bool {
        self.exit_code.is_some()
    }
}

/// Decode the streams and completion state of a Receive response.
///
/// # Errors
///
/// Returns an error if a stream is not valid base64, or the command is done
/// without an exit code.
pub fn receive_output(xml: &str) -> Result<ReceiveOutput> {
    let mut out = ReceiveOutput::default();
    for caps in STREAM_RE.captures_iter(xml) {
        let Some(content) = caps.get(2).map(|m| m.as_str().trim()) else {
            continue;
        };
        if content.is_empty() {
            continue;
        }
        let name = STREAM_NAME_RE
            .captures(&caps[1])
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        let bytes = STANDARD
            .decode(content)
            .with_context(|| format!("decoding {name} stream"))?;
        match name.as_str() {
            "stderr" => out.stderr.extend_from_slice(&bytes),
            _ => out.stdout.extend_from_slice(&bytes),
        }
    }
    if DONE_RE.is_match(xml) {
        let raw = EXIT_CODE_RE
            .captures(xml)
            .map(|c| c[1].to_string())
            .context("command finished without an ExitCode")?;
        let wide: i64 = raw
            .parse()
            .with_context(|| format!("invalid ExitCode {raw}"))?;
        // Windows reports NTSTATUS codes such as 3221225477 unsigned; keep
        // the low 32 bits so they read as the usual negative i32.
        #[allow(clippy::cast_possible_truncation)]
        let code = wide as i32;
        out.exit_code = Some(code);
    }
    Ok(out)
}

/// A SOAP fault returned by the WinRM service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: Option<String>,
    pub message: String,
}

impl Fault {
    /// `true` for the "no output yet" operation timeout.
    #[must_use]
    pub fn is_operation_timeout(&self) -> bool {
        self.code.as_deref() == Some(OPERATION_TIMEOUT_FAULT)
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "WS-Man fault {code}: {}", self.message),
            None => write!(f, "SOAP fault: {}", self.message),
        }
    }
}

/// Parse a fault body, or `None` if `xml` is not a fault.
#[must_use]
pub fn fault(xml: &str) -> Option<Fault> {
    if !xml.contains("Fault") {
        return None;
    }
    let code = FAULT_CODE_RE.captures(xml).map(|c| c[1].to_string());
    let message = FAULT_MESSAGE_RE
        .captures(xml)
        .or_else(|| FAULT_TEXT_RE.captures(xml))
        .map(|c| unescape(TAG_RE.replace_all(&c[1], "").trim()))
        .unwrap_or_default();
    Some(Fault { code, message })
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATE: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body>
        <x:ResourceCreated><a:ReferenceParameters><w:SelectorSet>
        <w:Selector Name="ShellId">11111111-AAAA</w:Selector></w:SelectorSet></a:ReferenceParameters></x:ResourceCreated>
        <rsp:Shell><rsp:ShellId>11111111-AAAA</rsp:ShellId></rsp:Shell></s:Body></s:Envelope>"#;

    #[test]
    fn reads_shell_id() {
        assert_eq!(shell_id(CREATE).expect("id"), "11111111-AAAA");
        let selector_only = r#"<w:Selector Name="ShellId">22-BB</w:Selector>"#;
        assert_eq!(shell_id(selector_only).expect("id"), "22-BB");
        assert!(shell_id("<s:Body/>").is_err());
    }

    #[test]
    fn reads_command_id() {
        let xml = "<rsp:CommandResponse><rsp:CommandId>C-42</rsp:CommandId></rsp:CommandResponse>";
        assert_eq!(command_id(xml).expect("id"), "C-42");
    }

    #[test]
    fn decodes_streams_in_order() {
        // "hello " / "world" on stdout, "oops" on stderr
        let xml = r#"<rsp:ReceiveResponse>
            <rsp:Stream Name="stdout" CommandId="C">aGVsbG8g</rsp:Stream>
            <rsp:Stream Name="stderr" CommandId="C">b29wcw==</rsp:Stream>
            <rsp:Stream Name="stdout" CommandId="C">d29ybGQ=</rsp:Stream>
            <rsp:CommandState CommandId="C" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Running"/>
            </rsp:ReceiveResponse>"#;
        let out = receive_output(xml).expect("parse");
        assert_eq!(out.stdout, b"hello world");
        assert_eq!(out.stderr, b"oops");
        assert!(!out.done());
    }

    #[test]
    fn done_state_carries_exit_code() {
        let xml = r#"<rsp:ReceiveResponse>
            <rsp:Stream Name="stdout" CommandId="C" End="true"/>
            <rsp:Stream Name="stderr" CommandId="C" End="true"></rsp:Stream>
            <rsp:CommandState CommandId="C" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done">
            <rsp:ExitCode>3221225477</rsp:ExitCode></rsp:CommandState></rsp:ReceiveResponse>"#;
        let out = receive_output(xml).expect("parse");
        assert!(out.stdout.is_empty());
        assert_eq!(out.exit_code, Some(-1_073_741_819));
    }

    #[test]
    fn done_without_exit_code_is_an_error() {
        let xml = r#"<rsp:CommandState State="x/CommandState/Done"/>"#;
        assert!(receive_output(xml).is_err());
    }

    #[test]
    fn recognises_operation_timeout_fault() {
        let xml = r#"<s:Envelope><s:Body><s:Fault><s:Code><s:Value>s:Receiver</s:Value></s:Code>
            <s:Reason><s:Text xml:lang="en-US">The WS-Management service cannot complete the operation within the time specified in OperationTimeout.</s:Text></s:Reason>
            <s:Detail><f:WSManFault xmlns:f="http://schemas.microsoft.com/wbem/wsman/1/wsmanfault" Code="2150858793" Machine="10.0.0.5">
            <f:Message>The WS-Management service cannot complete the operation within the time specified in OperationTimeout.  </f:Message>
            </f:WSManFault></s:Detail></s:Fault></s:Body></s:Envelope>"#;
        let fault = fault(xml).expect("fault");
        assert!(fault.is_operation_timeout());
        assert!(fault.message.starts_with("The WS-Management service"));
    }

    #[test]
    fn fault_message_strips_nested_markup() {
        let xml = r#"<s:Fault><f:WSManFault Code="5"><f:Message><f:ProviderFault>Access &quot;denied&quot;</f:ProviderFault></f:Message></f:WSManFault></s:Fault>"#;
        let fault = fault(xml).expect("fault");
        assert_eq!(fault.code.as_deref(), Some("5"));
        assert_eq!(fault.message, "Access \"denied\"");
        assert_eq!(fault.to_string(), "WS-Man fault 5: Access \"denied\"");
    }

    #[test]
    fn non_fault_is_none() {
        assert!(fault(CREATE).is_none());
    }
}
