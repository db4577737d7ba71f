//! WS-Management request envelopes for the Windows remote shell.
//!
//! Only the five operations needed to run a single command are built here:
//! create shell, command, receive, signal and delete shell.

use std::fmt::Write as _;
use std::time::Duration;

const NS_SOAP: &str = "http://www.w3.org/2003/05/soap-envelope";
const NS_ADDRESSING: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
const NS_WSMAN: &str = "http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd";
const NS_WSMAN_MS: &str = "http://schemas.microsoft.com/wbem/wsman/1/wsman.xsd";
const NS_SHELL: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell";

const ANONYMOUS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";
const CMD_SHELL_URI: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";
const SIGNAL_TERMINATE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/signal/terminate";

const ACTION_CREATE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create";
const ACTION_DELETE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete";
const ACTION_COMMAND: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command";
const ACTION_RECEIVE: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive";
const ACTION_SIGNAL: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Signal";

/// Upper bound the server may use for a single response envelope.
const MAX_ENVELOPE_SIZE: u32 = 153_600;

/// One WS-Man operation against the `cmd` shell resource.
#[derive(Debug, Clone, Copy)]
pub enum Request<'a> {
    CreateShell,
    Command {
        shell_id: &'a str,
        command: &'a str,
    },
    Receive {
        shell_id: &'a str,
        command_id: &'a str,
    },
    Signal {
        shell_id: &'a str,
        command_id: &'a str,
    },
    DeleteShell {
        shell_id: &'a str,
    },
}

impl Request<'_> {
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::CreateShell => ACTION_CREATE,
            Self::Command { .. } => ACTION_COMMAND,
            Self::Receive { .. } => ACTION_RECEIVE,
            Self::Signal { .. } => ACTION_SIGNAL,
            Self::DeleteShell { .. } => ACTION_DELETE,
        }
    }

    fn shell_id(&self) -> Option<&str> {
        match self {
            Self::CreateShell => None,
            Self::Command { shell_id, .. }
            | Self::Receive { shell_id, .. }
            | Self::Signal { shell_id, .. }
            | Self::DeleteShell { shell_id } => Some(shell_id),
        }
    }

    fn options(&self) -> &'static str {
        match self {
            Self::CreateShell => {
                r#"<w:OptionSet><w:Option Name="WINRS_NOPROFILE">FALSE</w:Option><w:Option Name="WINRS_CODEPAGE">65001</w:Option></w:OptionSet>"#
            }
            Self::Command { .. } => {
                r#"<w:OptionSet><w:Option Name="WINRS_CONSOLEMODE_STDIN">TRUE</w:Option><w:Option Name="WINRS_SKIP_CMD_SHELL">FALSE</w:Option></w:OptionSet>"#
            }
            _ => "",
        }
    }

    fn body(&self) -> String {
        match self {
            Self::CreateShell => "<rsp:Shell><rsp:InputStreams>stdin</rsp:InputStreams>\
                 <rsp:OutputStreams>stdout stderr</rsp:OutputStreams></rsp:Shell>"
                .to_string(),
            Self::Command { command, .. } => format!(
                "<rsp:CommandLine><rsp:Command>{}</rsp:Command></rsp:CommandLine>",
                escape(command)
            ),
            Self::Receive { command_id, .. } => format!(
                r#"<rsp:Receive><rsp:DesiredStream CommandId="{}">stdout stderr</rsp:DesiredStream></rsp:Receive>"#,
                escape(command_id)
            ),
            Self::Signal { command_id, .. } => format!(
                r#"<rsp:Signal CommandId="{}"><rsp:Code>{SIGNAL_TERMINATE}</rsp:Code></rsp:Signal>"#,
                escape(command_id)
            ),
            Self::DeleteShell { .. } => String::new(),
        }
    }

    /// Render the full SOAP envelope.
    #[must_use]
    pub fn envelope(&self, endpoint: &str, message_id: &str, operation_timeout: Duration) -> String {
        let mut xml = String::with_capacity(2048);
        let _ = write!(
            xml,
            r#"<s:Envelope xmlns:s="{NS_SOAP}" xmlns:a="{NS_ADDRESSING}" xmlns:w="{NS_WSMAN}" xmlns:p="{NS_WSMAN_MS}" xmlns:rsp="{NS_SHELL}">"#
        );
        xml.push_str("<s:Header>");
        let _ = write!(xml, "<a:To>{}</a:To>", escape(endpoint));
        let _ = write!(
            xml,
            r#"<a:ReplyTo><a:Address s:mustUnderstand="true">{ANONYMOUS}</a:Address></a:ReplyTo>"#
        );
        let _ = write!(
            xml,
            r#"<w:MaxEnvelopeSize s:mustUnderstand="true">{MAX_ENVELOPE_SIZE}</w:MaxEnvelopeSize>"#
        );
        let _ = write!(xml, "<a:MessageID>uuid:{message_id}</a:MessageID>");
        xml.push_str(r#"<w:Locale xml:lang="en-US" s:mustUnderstand="false"/>"#);
        xml.push_str(r#"<p:DataLocale xml:lang="en-US" s:mustUnderstand="false"/>"#);
        let _ = write!(
            xml,
            "<w:OperationTimeout>PT{}S</w:OperationTimeout>",
            operation_timeout.as_secs()
        );
        let _ = write!(
            xml,
            r#"<w:ResourceURI s:mustUnderstand="true">{CMD_SHELL_URI}</w:ResourceURI>"#
        );
        let _ = write!(
            xml,
            r#"<a:Action s:mustUnderstand="true">{}</a:Action>"#,
            self.action()
        );
        if let Some(shell_id) = self.shell_id() {
            let _ = write!(
                xml,
                r#"<w:SelectorSet><w:Selector Name="ShellId">{}</w:Selector></w:SelectorSet>"#,
                escape(shell_id)
            );
        }
        xml.push_str(self.options());
        xml.push_str("</s:Header><s:Body>");
        xml.push_str(&self.body());
        xml.push_str("</s:Body></s:Envelope>");
        xml
    }
}

/// Escape text for an XML element or attribute value.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
