use std::fmt;

use super::ScriptError;

/// A statement terminator such as `;`, `GO` or `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimiterDefinition {
    text: String,
    single_line: bool,
}

impl DelimiterDefinition {
    pub fn new(text: &str, single_line: bool) -> Result<Self, ScriptError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ScriptError::EmptyDelimiter);
        }
        Ok(Self {
            text: text.to_string(),
            single_line,
        })
    }

    pub fn standard() -> Self {
        Self {
            text: ";".to_string(),
            single_line: false,
        }
    }

    /// MS SQL Server style batch separator.
    pub fn ms_sql_go() -> Self {
        Self {
            text: "GO".to_string(),
            single_line: true,
        }
    }

    /// SQL*Plus style slash on its own line.
    pub fn oracle_slash() -> Self {
        Self {
            text: "/".to_string(),
            single_line: true,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_single_line(&self) -> bool {
        self.single_line
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Case-insensitive match of the delimiter at the start of `text`.
    pub(crate) fn matches_at(&self, text: &str) -> bool {
        text.as_bytes()
            .get(..self.text.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(self.text.as_bytes()))
    }

    /// True if the line consists of nothing but this delimiter.
    pub fn matches_line(&self, line: &str) -> bool {
        line.trim().eq_ignore_ascii_case(&self.text)
    }

    /// Checks whether the script, ignoring trailing whitespace, ends with this
    /// delimiter. A single line delimiter must also be alone on its last line.
    pub fn terminates_script(&self, script: &str) -> bool {
        let trimmed = script.trim_end();
        if trimmed.len() < self.text.len() {
            return false;
        }
        let split = trimmed.len() - self.text.len();
        if !trimmed.is_char_boundary(split) {
            return false;
        }
        let (head, tail) = trimmed.split_at(split);
        if !tail.eq_ignore_ascii_case(&self.text) {
            return false;
        }
        if !self.single_line {
            return true;
        }
        let line_start = head.rfind('\n').map(|idx| idx + 1).unwrap_or(0);
        head[line_start..].trim().is_empty()
    }
}

impl Default for DelimiterDefinition {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Display for DelimiterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
