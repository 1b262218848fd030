use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("SQL script may not be empty")]
    EmptyScript,
    #[error("statement delimiter may not be empty")]
    EmptyDelimiter,
    #[error("invalid single line command pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("unsupported encoding `{0}` (only UTF-8 scripts can be read)")]
    UnsupportedEncoding(String),
    #[error("{} not found", .0.display())]
    FileNotFound(PathBuf),
    #[error("error reading script: {0}")]
    Io(#[from] io::Error),
    #[error("iterator not initialized, call start_iterator() first")]
    IteratorNotStarted,
    #[error("random access to commands is not available while streaming from a file")]
    StreamingMode,
}

/// One statement found in a script.
///
/// `start..end` is the byte range of the statement in the original script.
/// The range never includes the delimiter, but may include trailing whitespace
/// that precedes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandDefinition {
    pub index_in_script: usize,
    pub start: usize,
    pub end: usize,
    /// Statement text, only kept when the source is streamed. In-memory
    /// commands are sliced from the cached script on demand.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl CommandDefinition {
    pub fn new(index_in_script: usize, start: usize, end: usize) -> Self {
        Self {
            index_in_script,
            start,
            end,
            sql: None,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The statement text, taken from the owned copy or sliced from `script`.
    pub fn text<'a>(&'a self, script: &'a str) -> &'a str {
        match &self.sql {
            Some(sql) => sql.as_str(),
            None => &script[self.start..self.end],
        }
    }
}
