//! Line protocol spoken between the catalog server and its clients.
//!
//! Every connection carries exactly one command line. `LIST` is answered with
//! one line of JSON; `STREAM` and `DOWNLOAD` are answered with the raw bytes of
//! the song's file, terminated by the server closing the connection.

use std::fmt;

use crate::SongId;

pub const MAX_COMMAND_LINE: usize = 1024;

pub const ERR_NOT_FOUND: &str = "ERR not found\n";
pub const ERR_UNAVAILABLE: &str = "ERR unavailable\n";
pub const ERR_BUSY: &str = "ERR busy\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferKind {
    Stream,
    Download,
}

impl TransferKind {
    pub fn keyword(self) -> &'static str {
        match self {
            TransferKind::Stream => "STREAM",
            TransferKind::Download => "DOWNLOAD",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    List,
    /// `id` is `None` when the argument was missing or not a valid id.
    Transfer {
        kind: TransferKind,
        id: Option<SongId>,
    },
}

impl Command {
    /// Parses one command line. Returns `None` for anything that is not a
    /// known command, which the server answers by closing silently.
    pub fn parse(line: &str) -> Option<Command> {
        let mut tokens = line.split_whitespace();
        let keyword = tokens.next()?;
        let kind = if keyword.eq_ignore_ascii_case("LIST") {
            return Some(Command::List);
        } else if keyword.eq_ignore_ascii_case("STREAM") {
            TransferKind::Stream
        } else if keyword.eq_ignore_ascii_case("DOWNLOAD") {
            TransferKind::Download
        } else {
            return None;
        };
        let id = tokens.next().and_then(|token| token.parse::<SongId>().ok());
        Some(Command::Transfer { kind, id })
    }

    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::List => write!(f, "LIST"),
            Command::Transfer { kind, id: Some(id) } => write!(f, "{} {}", kind.keyword(), id),
            Command::Transfer { kind, id: None } => write!(f, "{}", kind.keyword()),
        }
    }
}

/// Returns the error sentinel if `payload` starts with one of the server's
/// `ERR` lines. Only meaningful for the first bytes of a response.
pub fn error_sentinel(payload: &[u8]) -> Option<&'static str> {
    [ERR_NOT_FOUND, ERR_UNAVAILABLE, ERR_BUSY]
        .into_iter()
        .find(|sentinel| payload == sentinel.as_bytes())
}
