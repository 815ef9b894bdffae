//! Inbound command buffers and their outcomes.
//!
//! Plain text is an opaque diagnostic command: it is logged and acknowledged.
//! Text starting with [`STRUCTURED_PREFIX`] is a structured command whose verb
//! must come from the closed [`Verb`] vocabulary.

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::descriptor::Capabilities;

/// Largest write the channel accepts.
pub const MAX_COMMAND_LEN: usize = 512;

pub const STRUCTURED_PREFIX: char = '/';

/// One write event from the transport. Borrowed; never retained past dispatch.
#[derive(Debug, Clone, Copy)]
pub struct InboundCommand<'a> {
    raw: &'a [u8],
}

impl<'a> InboundCommand<'a> {
    pub fn new(raw: &'a [u8]) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn decode(&self, max_len: usize) -> Result<&'a str, EncodingFault> {
        if self.raw.len() > max_len {
            return Err(EncodingFault::TooLong {
                len: self.raw.len(),
                max: max_len,
            });
        }
        std::str::from_utf8(self.raw).map_err(|e| EncodingFault::NotUtf8 {
            valid_up_to: e.valid_up_to(),
        })
    }
}

/// Why a buffer could not be decoded as command text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingFault {
    NotUtf8 { valid_up_to: usize },
    TooLong { len: usize, max: usize },
}

impl fmt::Display for EncodingFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotUtf8 { valid_up_to } => {
                write!(f, "invalid UTF-8 after byte {valid_up_to}")
            }
            Self::TooLong { len, max } => write!(f, "{len} bytes exceeds limit of {max}"),
        }
    }
}

/// Structured command verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Replace the capability list.
    Caps,
    /// Restore the descriptor built from configuration.
    Reset,
    Version,
    /// Report the firmware images this module wants provisioned.
    Needs,
}

impl Verb {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "caps" => Some(Self::Caps),
            "reset" => Some(Self::Reset),
            "version" => Some(Self::Version),
            "needs" => Some(Self::Needs),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Caps => "caps",
            Self::Reset => "reset",
            Self::Version => "version",
            Self::Needs => "needs",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredCommand {
    SetCapabilities(Capabilities),
    Reset,
    Version,
    Needs,
}

impl StructuredCommand {
    pub fn verb(&self) -> Verb {
        match self {
            Self::SetCapabilities(_) => Verb::Caps,
            Self::Reset => Verb::Reset,
            Self::Version => Verb::Version,
            Self::Needs => Verb::Needs,
        }
    }
}

/// Decoded command text, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand<'a> {
    Diagnostic(&'a str),
    Structured(StructuredCommand),
    Unknown(&'a str),
    Malformed { verb: Verb, reason: String },
}

pub fn parse_command(text: &str) -> ParsedCommand<'_> {
    let Some(body) = text.strip_prefix(STRUCTURED_PREFIX) else {
        return ParsedCommand::Diagnostic(text);
    };

    let body = body.trim();
    let (word, args) = match body.split_once(char::is_whitespace) {
        Some((word, args)) => (word, args.trim()),
        None => (body, ""),
    };

    let Some(verb) = Verb::parse(word) else {
        return ParsedCommand::Unknown(word);
    };

    let malformed = |reason: String| ParsedCommand::Malformed { verb, reason };

    match verb {
        Verb::Caps => {
            if args.is_empty() {
                return malformed("expected a comma-separated capability list".to_string());
            }
            match Capabilities::parse_list(args) {
                Ok(caps) => ParsedCommand::Structured(StructuredCommand::SetCapabilities(caps)),
                Err(e) => malformed(e.to_string()),
            }
        }
        Verb::Reset | Verb::Version | Verb::Needs if !args.is_empty() => {
            malformed(format!("unexpected argument '{args}'"))
        }
        Verb::Reset => ParsedCommand::Structured(StructuredCommand::Reset),
        Verb::Version => ParsedCommand::Structured(StructuredCommand::Version),
        Verb::Needs => ParsedCommand::Structured(StructuredCommand::Needs),
    }
}

/// Outcome of [`ModuleDescriptorChannel::handle_command`](crate::ModuleDescriptorChannel::handle_command).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Zero-length write; nothing to do.
    Empty,
    Acknowledged(String),
    Applied(Verb),
    InvalidEncoding(EncodingFault),
    UnknownCommand(String),
    Rejected { verb: Verb, reason: String },
    ChannelBusy,
}

impl CommandResult {
    pub fn outcome(&self) -> CommandOutcome {
        match self {
            Self::Empty => CommandOutcome::Empty,
            Self::Acknowledged(_) => CommandOutcome::Acknowledged,
            Self::Applied(_) => CommandOutcome::Applied,
            Self::InvalidEncoding(_) => CommandOutcome::InvalidEncoding,
            Self::UnknownCommand(_) => CommandOutcome::UnknownCommand,
            Self::Rejected { .. } => CommandOutcome::Rejected,
            Self::ChannelBusy => CommandOutcome::ChannelBusy,
        }
    }

    /// Payload worth echoing back to a peer, if any.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Empty | Self::ChannelBusy => None,
            Self::Acknowledged(text) => Some(text.clone()),
            Self::Applied(verb) => Some(verb.to_string()),
            Self::InvalidEncoding(fault) => Some(fault.to_string()),
            Self::UnknownCommand(verb) => Some(verb.clone()),
            Self::Rejected { reason, .. } => Some(reason.clone()),
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidEncoding(_)
                | Self::UnknownCommand(_)
                | Self::Rejected { .. }
                | Self::ChannelBusy
        )
    }
}

/// Peer-supplied text with control characters escaped, so it stays on one
/// console line.
struct ConsoleText<'a>(&'a str);

impl fmt::Display for ConsoleText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            if c.is_control() {
                write!(f, "{}", c.escape_default())?;
            } else {
                f.write_char(c)?;
            }
        }
        Ok(())
    }
}

/// The console line written for each handled buffer.
impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty write received; ignored"),
            Self::Acknowledged(text) => write!(f, "New value: {}", ConsoleText(text)),
            Self::Applied(verb) => write!(f, "Applied {STRUCTURED_PREFIX}{verb}"),
            Self::InvalidEncoding(fault) => write!(f, "Rejected write: {fault}"),
            Self::UnknownCommand(verb) => write!(
                f,
                "Rejected unknown command {STRUCTURED_PREFIX}{}",
                ConsoleText(verb)
            ),
            Self::Rejected { verb, reason } => {
                write!(f, "Rejected {STRUCTURED_PREFIX}{verb}: {}", ConsoleText(reason))
            }
            Self::ChannelBusy => f.write_str("Rejected write: channel busy"),
        }
    }
}

/// Wire-level classification of a [`CommandResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    Empty,
    Acknowledged,
    Applied,
    InvalidEncoding,
    UnknownCommand,
    Rejected,
    ChannelBusy,
}
