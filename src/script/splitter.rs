use log::trace;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use super::source::{MemorySource, ScriptSource};
use super::{CommandDefinition, DelimiterDefinition, ScriptError};

pub const DEFAULT_SINGLE_LINE_PATTERNS: &[&str] = &[
    r"^SET\s+\w+\s+(ON|OFF)\s*;?$",
    r"^ECHO\s+.*$",
    r"^DESC\s+\S+\s*;?$",
    r"^DESCRIBE\s+\S+\s*;?$",
    r"^PROMPT(\s+.*)?$",
];

static DEFAULT_SINGLE_LINE_COMMANDS: Lazy<Vec<Regex>> = Lazy::new(|| {
    DEFAULT_SINGLE_LINE_PATTERNS
        .iter()
        .filter_map(|pattern| compile_pattern(pattern).ok())
        .collect()
});

fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Lines that form a statement of their own without a delimiter, e.g.
/// `SET ECHO ON` or `DESCRIBE emp`. Patterns are matched case-insensitively
/// against the trimmed line.
#[derive(Debug, Clone)]
pub struct SingleLineCommands {
    patterns: Vec<Regex>,
}

impl SingleLineCommands {
    pub fn new<I, S>(patterns: I) -> Result<Self, ScriptError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                compile_pattern(pattern).map_err(|source| ScriptError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn none() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    pub fn is_match(&self, line: &str) -> bool {
        let line = line.trim();
        self.patterns.iter().any(|pattern| pattern.is_match(line))
    }

    pub fn patterns(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.as_str().to_string()).collect()
    }
}

impl Default for SingleLineCommands {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_SINGLE_LINE_COMMANDS.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// A quote preceded by an odd number of backslashes neither opens nor
    /// closes a literal (`'it\'s'`). Turn off for ANSI quoting so that
    /// `'c:\'` is closed properly.
    pub check_escaped_quotes: bool,
    /// A blank line outside of quotes and comments ends the current statement.
    pub empty_line_is_separator: bool,
    /// Lines matching `single_line_commands` are statements of their own
    /// when they start a statement. Ignored while a single line delimiter is
    /// active.
    pub check_single_line_commands: bool,
    pub single_line_commands: SingleLineCommands,
    /// Lines starting with `include_prefix` are statements of their own when
    /// they start a statement.
    pub support_include_directive: bool,
    pub include_prefix: String,
    /// Line comment marker recognized in addition to `--`.
    pub alternate_line_comment: Option<String>,
    /// Keep the whitespace that precedes a statement in its start offset.
    pub keep_leading_whitespace: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            check_escaped_quotes: true,
            empty_line_is_separator: false,
            check_single_line_commands: true,
            single_line_commands: SingleLineCommands::default(),
            support_include_directive: true,
            include_prefix: "@".to_string(),
            alternate_line_comment: None,
            keep_leading_whitespace: false,
        }
    }
}

impl PartialEq for SplitOptions {
    fn eq(&self, other: &Self) -> bool {
        self.check_escaped_quotes == other.check_escaped_quotes
            && self.empty_line_is_separator == other.empty_line_is_separator
            && self.check_single_line_commands == other.check_single_line_commands
            && self.single_line_commands.patterns() == other.single_line_commands.patterns()
            && self.support_include_directive == other.support_include_directive
            && self.include_prefix == other.include_prefix
            && self.alternate_line_comment == other.alternate_line_comment
            && self.keep_leading_whitespace == other.keep_leading_whitespace
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Code,
    LineComment,
    BlockComment,
    Quoted(char),
}

/// What the line starting at the scan position means for the statement.
enum LineAction {
    None,
    /// The pending statement ends before the line, scanning resumes at `resume`.
    Boundary { end: usize, resume: usize },
    /// The line itself is a complete statement.
    Standalone {
        start: usize,
        end: usize,
        resume: usize,
    },
}

/// Incremental statement splitter.
///
/// Every call to [`next_command`](Self::next_command) scans from the end of
/// the previous statement to the next boundary. Quotes or comments left open
/// at the end of the input are not an error, the rest of the script simply
/// becomes the last statement.
pub struct ScriptSplitter<S> {
    source: S,
    delimiter: DelimiterDefinition,
    options: SplitOptions,
    /// Absolute offset of the first byte of the source buffer.
    base: usize,
    /// Scan position relative to the buffer, start of the next region.
    pos: usize,
    at_line_start: bool,
    next_index: usize,
    peeked: Option<CommandDefinition>,
}

impl<S: ScriptSource> ScriptSplitter<S> {
    pub fn new(source: S, delimiter: DelimiterDefinition, options: SplitOptions) -> Self {
        Self {
            source,
            delimiter,
            options,
            base: 0,
            pos: 0,
            at_line_start: true,
            next_index: 0,
            peeked: None,
        }
    }

    pub fn delimiter(&self) -> &DelimiterDefinition {
        &self.delimiter
    }

    pub fn options(&self) -> &SplitOptions {
        &self.options
    }

    pub fn set_delimiter(&mut self, delimiter: DelimiterDefinition) {
        self.delimiter = delimiter;
    }

    pub fn set_options(&mut self, options: SplitOptions) {
        self.options = options;
    }

    /// Rewinds to the beginning of the script.
    pub fn reset(&mut self) -> Result<(), ScriptError> {
        self.source.rewind()?;
        self.base = 0;
        self.pos = 0;
        self.at_line_start = true;
        self.next_index = 0;
        self.peeked = None;
        Ok(())
    }

    pub fn has_more_commands(&mut self) -> Result<bool, ScriptError> {
        if self.peeked.is_none() {
            self.peeked = self.scan()?;
        }
        Ok(self.peeked.is_some())
    }

    pub fn next_command(&mut self) -> Result<Option<CommandDefinition>, ScriptError> {
        match self.peeked.take() {
            Some(command) => Ok(Some(command)),
            None => self.scan(),
        }
    }

    fn scan(&mut self) -> Result<Option<CommandDefinition>, ScriptError> {
        let mut region = self.pos;
        let mut pos = self.pos;
        let mut at_line_start = self.at_line_start;
        let mut state = ScanState::Code;
        let mut backslashes = 0usize;

        loop {
            if !self.ensure(pos + 1)? {
                break;
            }

            if state == ScanState::Code && at_line_start {
                match self.inspect_line(pos, region)? {
                    LineAction::None => {}
                    LineAction::Boundary { end, resume } => {
                        let command = self.emit(region, end);
                        if command.is_some() {
                            self.advance_to(resume, true);
                            return Ok(command);
                        }
                        region = resume;
                        pos = resume;
                        backslashes = 0;
                        continue;
                    }
                    LineAction::Standalone { start, end, resume } => {
                        let command = self.emit_exact(start, end);
                        self.advance_to(resume, true);
                        return Ok(Some(command));
                    }
                }
            }

            let Some(c) = self.source.buffer()[pos..].chars().next() else {
                break;
            };

            match state {
                ScanState::LineComment => {
                    if c == '\n' {
                        state = ScanState::Code;
                    }
                }
                ScanState::BlockComment => {
                    if c == '*' && self.lookahead(pos + 1, "/")? {
                        state = ScanState::Code;
                        pos += 2;
                        backslashes = 0;
                        at_line_start = false;
                        continue;
                    }
                }
                ScanState::Quoted(quote) => {
                    if c == quote && !self.is_escaped(backslashes) {
                        state = ScanState::Code;
                    }
                }
                ScanState::Code => {
                    if c == '\'' || c == '"' {
                        if !self.is_escaped(backslashes) {
                            state = ScanState::Quoted(c);
                        }
                    } else if let Some(len) = self.line_comment_at(pos, c)? {
                        state = ScanState::LineComment;
                        pos += len;
                        backslashes = 0;
                        at_line_start = false;
                        continue;
                    } else if c == '/' && self.lookahead(pos + 1, "*")? {
                        state = ScanState::BlockComment;
                        pos += 2;
                        backslashes = 0;
                        at_line_start = false;
                        continue;
                    } else if !self.delimiter.is_single_line() && self.delimiter_at(pos, c)? {
                        let resume = pos + self.delimiter.len();
                        let command = self.emit(region, pos);
                        if command.is_some() {
                            self.advance_to(resume, false);
                            return Ok(command);
                        }
                        // empty statement, e.g. ";;"
                        region = resume;
                        pos = resume;
                        backslashes = 0;
                        at_line_start = false;
                        continue;
                    }
                }
            }

            backslashes = if c == '\\' { backslashes + 1 } else { 0 };
            at_line_start = c == '\n';
            pos += c.len_utf8();
        }

        // end of input, whatever is left is the last statement
        let end = self.source.buffer().len();
        let command = self.emit(region, end);
        self.advance_to(end, at_line_start);
        Ok(command)
    }

    fn is_escaped(&self, backslashes: usize) -> bool {
        self.options.check_escaped_quotes && backslashes % 2 == 1
    }

    /// Makes sure the buffer holds at least `len` bytes if the input has them.
    fn ensure(&mut self, len: usize) -> Result<bool, ScriptError> {
        while self.source.buffer().len() < len {
            if !self.source.load_more()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Loads the complete line starting at `pos`.
    fn ensure_line(&mut self, pos: usize) -> Result<(), ScriptError> {
        while !self.source.buffer()[pos..].contains('\n') {
            if !self.source.load_more()? {
                break;
            }
        }
        Ok(())
    }

    fn lookahead(&mut self, pos: usize, expected: &str) -> Result<bool, ScriptError> {
        if !self.ensure(pos + expected.len())? {
            return Ok(false);
        }
        Ok(self.source.buffer().as_bytes()[pos..].starts_with(expected.as_bytes()))
    }

    fn line_comment_at(&mut self, pos: usize, c: char) -> Result<Option<usize>, ScriptError> {
        if c == '-' && self.lookahead(pos, "--")? {
            return Ok(Some(2));
        }
        let alternate = match self.options.alternate_line_comment.as_deref() {
            Some(prefix) if prefix.starts_with(c) => prefix.to_string(),
            _ => return Ok(None),
        };
        if self.lookahead(pos, &alternate)? {
            return Ok(Some(alternate.len()));
        }
        Ok(None)
    }

    fn delimiter_at(&mut self, pos: usize, c: char) -> Result<bool, ScriptError> {
        let first = self.delimiter.text().chars().next();
        if !first.is_some_and(|first| first.eq_ignore_ascii_case(&c)) {
            return Ok(false);
        }
        if !self.ensure(pos + self.delimiter.len())? {
            return Ok(false);
        }
        Ok(self.delimiter.matches_at(&self.source.buffer()[pos..]))
    }

    fn inspect_line(&mut self, pos: usize, region: usize) -> Result<LineAction, ScriptError> {
        self.ensure_line(pos)?;
        let buffer = self.source.buffer();
        let rest = &buffer[pos..];
        let (line, resume) = match rest.find('\n') {
            Some(idx) => (&rest[..idx], pos + idx + 1),
            None => (rest, pos + rest.len()),
        };
        let trimmed = line.trim();
        let region_is_blank = buffer[region..pos].trim().is_empty();

        if self.delimiter.is_single_line() && self.delimiter.matches_line(line) {
            return Ok(LineAction::Boundary { end: pos, resume });
        }

        if trimmed.is_empty() {
            if self.options.empty_line_is_separator && !region_is_blank {
                return Ok(LineAction::Boundary { end: pos, resume });
            }
            return Ok(LineAction::None);
        }

        // only a line that starts a statement can be a statement of its own
        if !region_is_blank || !self.is_standalone_line(trimmed) {
            return Ok(LineAction::None);
        }

        let body_start = pos + (line.len() - line.trim_start().len());
        let start = if self.options.keep_leading_whitespace {
            region
        } else {
            body_start
        };
        let mut body = trimmed;
        if !self.delimiter.is_single_line() {
            let text_len = self.delimiter.len();
            if body.len() > text_len && body.is_char_boundary(body.len() - text_len) {
                let split = body.len() - text_len;
                if self.delimiter.matches_at(&body[split..]) {
                    body = body[..split].trim_end();
                }
            }
        }
        Ok(LineAction::Standalone {
            start,
            end: body_start + body.len(),
            resume,
        })
    }

    fn is_standalone_line(&self, trimmed: &str) -> bool {
        let options = &self.options;
        if options.support_include_directive
            && !options.include_prefix.is_empty()
            && trimmed.starts_with(options.include_prefix.as_str())
        {
            return true;
        }
        options.check_single_line_commands
            && !self.delimiter.is_single_line()
            && options.single_line_commands.is_match(trimmed)
    }

    /// Creates the command for the region `start..end` unless it is blank.
    fn emit(&mut self, start: usize, end: usize) -> Option<CommandDefinition> {
        let text = &self.source.buffer()[start..end];
        if text.trim().is_empty() {
            return None;
        }
        let start = if self.options.keep_leading_whitespace {
            start
        } else {
            start + (text.len() - text.trim_start().len())
        };
        Some(self.emit_exact(start, end))
    }

    fn emit_exact(&mut self, start: usize, end: usize) -> CommandDefinition {
        let mut command =
            CommandDefinition::new(self.next_index, self.base + start, self.base + end);
        if self.source.is_streaming() {
            command.sql = Some(self.source.buffer()[start..end].to_string());
        }
        trace!(
            "command {} at {}..{}",
            command.index_in_script,
            command.start,
            command.end
        );
        self.next_index += 1;
        command
    }

    /// Moves the scan position to `resume` and forgets everything before it.
    fn advance_to(&mut self, resume: usize, at_line_start: bool) {
        self.source.discard(resume);
        self.base += resume;
        self.pos = 0;
        self.at_line_start = at_line_start;
    }
}

/// Splits an in-memory script into its commands.
pub fn split_script(
    script: &str,
    delimiter: &DelimiterDefinition,
    options: &SplitOptions,
) -> Vec<CommandDefinition> {
    let mut splitter =
        ScriptSplitter::new(MemorySource::new(script), delimiter.clone(), options.clone());
    let mut commands = Vec::new();
    // a memory source never reports an error
    while let Ok(Some(command)) = splitter.next_command() {
        commands.push(command);
    }
    commands
}
