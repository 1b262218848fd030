use log::debug;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::source::ReaderSource;
use super::{
    split_script, CommandDefinition, DelimiterDefinition, Dialect, ScriptError, ScriptSplitter,
    SplitOptions,
};

/// Scripts at least this large are streamed instead of read into memory.
pub const DEFAULT_MAX_IN_MEMORY_SIZE: u64 = 2 * 1024 * 1024;

/// Chunk size for reading the end of a streamed file to pick the delimiter.
const TAIL_PROBE_SIZE: u64 = 4096;

#[derive(Debug, Clone, PartialEq)]
pub struct ParserSettings {
    pub delimiter: DelimiterDefinition,
    /// Used instead of `delimiter` when the script ends with it.
    pub alternate_delimiter: Option<DelimiterDefinition>,
    pub options: SplitOptions,
    pub max_in_memory_size: u64,
}

impl ParserSettings {
    pub fn for_dialect(dialect: Dialect) -> Self {
        let profile = dialect.profile();
        Self {
            delimiter: profile.delimiter(),
            alternate_delimiter: profile.alternate_delimiter(),
            options: profile.split_options(),
            max_in_memory_size: DEFAULT_MAX_IN_MEMORY_SIZE,
        }
    }
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            delimiter: DelimiterDefinition::standard(),
            alternate_delimiter: None,
            options: SplitOptions::default(),
            max_in_memory_size: DEFAULT_MAX_IN_MEMORY_SIZE,
        }
    }
}

type FileSplitter = ScriptSplitter<ReaderSource<BufReader<File>>>;

enum Mode {
    Empty,
    InMemory {
        script: String,
        commands: Option<Vec<CommandDefinition>>,
    },
    Streaming {
        path: PathBuf,
        /// End of the file, used to detect the alternate delimiter.
        tail: String,
        splitter: Option<FileSplitter>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IteratorState {
    NotStarted,
    Cached(usize),
    Streaming,
}

/// Splits a script into commands and answers questions about them.
///
/// Small scripts are held in memory and parsed once into a cached list that
/// supports random access (by index or by cursor position). Files at least
/// `max_in_memory_size` bytes large are streamed; they can only be walked
/// with the iterator methods, random access returns
/// [`ScriptError::StreamingMode`].
pub struct ScriptParser {
    settings: ParserSettings,
    use_alternate: bool,
    mode: Mode,
    iterator: IteratorState,
}

impl ScriptParser {
    pub fn new(settings: ParserSettings) -> Self {
        Self {
            settings,
            use_alternate: false,
            mode: Mode::Empty,
            iterator: IteratorState::NotStarted,
        }
    }

    pub fn with_script(script: &str, settings: ParserSettings) -> Result<Self, ScriptError> {
        let mut parser = Self::new(settings);
        parser.set_script(script)?;
        Ok(parser)
    }

    pub fn open(
        path: &Path,
        encoding: Option<&str>,
        settings: ParserSettings,
    ) -> Result<Self, ScriptError> {
        let mut parser = Self::new(settings);
        parser.set_file(path, encoding)?;
        Ok(parser)
    }

    pub fn settings(&self) -> &ParserSettings {
        &self.settings
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.mode, Mode::Streaming { .. })
    }

    /// The in-memory script, `None` when nothing was set or while streaming.
    pub fn script(&self) -> Option<&str> {
        match &self.mode {
            Mode::InMemory { script, .. } => Some(script),
            _ => None,
        }
    }

    /// Uses the given file as the script. Depending on its size the file is
    /// read into memory or streamed.
    pub fn set_file(&mut self, path: &Path, encoding: Option<&str>) -> Result<(), ScriptError> {
        check_encoding(encoding)?;
        if !path.exists() {
            return Err(ScriptError::FileNotFound(path.to_path_buf()));
        }
        let size = fs::metadata(path)?.len();
        if size < self.settings.max_in_memory_size {
            debug!("reading {} ({} bytes) into memory", path.display(), size);
            let script = read_script_file(path)?;
            return self.set_script(&script);
        }

        debug!("streaming {} ({} bytes)", path.display(), size);
        let tail = read_tail(path)?;
        self.mode = Mode::Streaming {
            path: path.to_path_buf(),
            tail,
            splitter: None,
        };
        self.iterator = IteratorState::NotStarted;
        self.find_delimiter_to_use();
        Ok(())
    }

    /// Defines the script to be parsed. Setting the same script again keeps
    /// the already parsed commands.
    pub fn set_script(&mut self, script: &str) -> Result<(), ScriptError> {
        if script.is_empty() {
            return Err(ScriptError::EmptyScript);
        }
        if self.script() == Some(script) {
            return Ok(());
        }
        self.mode = Mode::InMemory {
            script: script.to_string(),
            commands: None,
        };
        self.iterator = IteratorState::NotStarted;
        self.find_delimiter_to_use();
        Ok(())
    }

    /// Uses only `delimiter`, without looking for an alternate one.
    pub fn set_delimiter(&mut self, delimiter: DelimiterDefinition) {
        self.set_delimiters(delimiter, None);
    }

    /// Uses the standard `;` unless the script ends with `alternate`.
    pub fn set_alternate_delimiter(&mut self, alternate: DelimiterDefinition) {
        self.set_delimiters(DelimiterDefinition::standard(), Some(alternate));
    }

    pub fn set_delimiters(
        &mut self,
        delimiter: DelimiterDefinition,
        alternate: Option<DelimiterDefinition>,
    ) {
        if self.settings.delimiter == delimiter && self.settings.alternate_delimiter == alternate {
            return;
        }
        self.settings.delimiter = delimiter;
        self.settings.alternate_delimiter = alternate;
        self.find_delimiter_to_use();
        self.invalidate();
    }

    pub fn set_check_escaped_quotes(&mut self, flag: bool) {
        self.update_options(|options| options.check_escaped_quotes = flag);
    }

    pub fn set_empty_line_is_separator(&mut self, flag: bool) {
        self.update_options(|options| options.empty_line_is_separator = flag);
    }

    pub fn set_check_single_line_commands(&mut self, flag: bool) {
        self.update_options(|options| options.check_single_line_commands = flag);
    }

    pub fn set_support_include_directive(&mut self, flag: bool) {
        self.update_options(|options| options.support_include_directive = flag);
    }

    pub fn set_alternate_line_comment(&mut self, prefix: Option<&str>) {
        let prefix = prefix.filter(|p| !p.is_empty()).map(str::to_string);
        self.update_options(|options| options.alternate_line_comment = prefix);
    }

    pub fn set_keep_leading_whitespace(&mut self, flag: bool) {
        self.update_options(|options| options.keep_leading_whitespace = flag);
    }

    fn update_options(&mut self, update: impl FnOnce(&mut SplitOptions)) {
        let before = self.settings.options.clone();
        update(&mut self.settings.options);
        if self.settings.options != before {
            self.invalidate();
        }
    }

    fn find_delimiter_to_use(&mut self) {
        let Some(alternate) = &self.settings.alternate_delimiter else {
            self.use_alternate = false;
            return;
        };
        let text = match &self.mode {
            Mode::Empty => return,
            Mode::InMemory { script, .. } => script.as_str(),
            Mode::Streaming { tail, .. } => tail.as_str(),
        };
        self.use_alternate = alternate.terminates_script(text);
        debug!("using delimiter `{}`", self.active_delimiter());
    }

    fn invalidate(&mut self) {
        match &mut self.mode {
            Mode::InMemory { commands, .. } => *commands = None,
            Mode::Streaming { splitter, .. } => *splitter = None,
            Mode::Empty => {}
        }
        self.iterator = IteratorState::NotStarted;
    }

    pub fn active_delimiter(&self) -> &DelimiterDefinition {
        match &self.settings.alternate_delimiter {
            Some(alternate) if self.use_alternate => alternate,
            _ => &self.settings.delimiter,
        }
    }

    pub fn delimiter_string(&self) -> &str {
        self.active_delimiter().text()
    }

    /// Options for the current pass. Single line commands are never looked
    /// for while the alternate delimiter is in use.
    fn split_options(&self) -> SplitOptions {
        let mut options = self.settings.options.clone();
        if self.use_alternate {
            options.check_single_line_commands = false;
        }
        options
    }

    fn ensure_parsed(&mut self) -> Result<(), ScriptError> {
        let delimiter = self.active_delimiter().clone();
        let options = self.split_options();
        match &mut self.mode {
            Mode::Empty => Ok(()),
            Mode::Streaming { .. } => Err(ScriptError::StreamingMode),
            Mode::InMemory { script, commands } => {
                if commands.is_none() {
                    let parsed = split_script(script, &delimiter, &options);
                    debug!("parsed {} commands delimited by `{}`", parsed.len(), delimiter);
                    *commands = Some(parsed);
                }
                Ok(())
            }
        }
    }

    fn cached(&self) -> (&str, &[CommandDefinition]) {
        match &self.mode {
            Mode::InMemory {
                script,
                commands: Some(commands),
            } => (script, commands),
            _ => ("", &[]),
        }
    }

    /// All commands of an in-memory script.
    pub fn definitions(&mut self) -> Result<&[CommandDefinition], ScriptError> {
        self.ensure_parsed()?;
        Ok(self.cached().1)
    }

    pub fn size(&mut self) -> Result<usize, ScriptError> {
        Ok(self.definitions()?.len())
    }

    pub fn command_definition(
        &mut self,
        index: usize,
    ) -> Result<Option<&CommandDefinition>, ScriptError> {
        Ok(self.definitions()?.get(index))
    }

    /// The SQL of the command at `index`, optionally without trailing
    /// whitespace.
    pub fn command(&mut self, index: usize, right_trim: bool) -> Result<Option<&str>, ScriptError> {
        self.ensure_parsed()?;
        let (script, commands) = self.cached();
        Ok(commands.get(index).map(|command| {
            let text = command.text(script);
            if right_trim {
                text.trim_end()
            } else {
                text
            }
        }))
    }

    pub fn start_pos_for_command(&mut self, index: usize) -> Result<Option<usize>, ScriptError> {
        Ok(self.command_definition(index)?.map(|c| c.start))
    }

    pub fn end_pos_for_command(&mut self, index: usize) -> Result<Option<usize>, ScriptError> {
        Ok(self.command_definition(index)?.map(|c| c.end))
    }

    /// The index of the command at `cursor_pos`. A position between two
    /// commands (delimiter or whitespace) belongs to the following command,
    /// positions before the first or after the last command to none.
    pub fn command_index_at_cursor_pos(
        &mut self,
        cursor_pos: usize,
    ) -> Result<Option<usize>, ScriptError> {
        self.ensure_parsed()?;
        let (script, commands) = self.cached();
        let cursor_pos = clamp_to_char_boundary(script, cursor_pos);
        Ok(command_index_at(commands, cursor_pos))
    }

    /// Maps a position in the whole script to a position inside the command
    /// at `command_index`. Positions in trailing whitespace that the trimmed
    /// command no longer has are clamped to the command's length.
    pub fn index_in_command(
        &mut self,
        command_index: usize,
        cursor_pos: usize,
    ) -> Result<Option<usize>, ScriptError> {
        Ok(self
            .command_definition(command_index)?
            .map(|command| cursor_pos.saturating_sub(command.start).min(command.len())))
    }

    /// The first position at or after `pos` that is not a line break.
    pub fn find_next_line_start(&self, pos: usize) -> Option<usize> {
        let script = self.script()?;
        let bytes = script.as_bytes();
        let mut pos = pos;
        while pos < bytes.len() && matches!(bytes[pos], b'\r' | b'\n') {
            pos += 1;
        }
        Some(pos)
    }

    pub fn start_iterator(&mut self) -> Result<(), ScriptError> {
        if !self.is_streaming() {
            self.ensure_parsed()?;
            self.iterator = IteratorState::Cached(0);
            return Ok(());
        }

        let delimiter = self.active_delimiter().clone();
        let options = self.split_options();
        if let Mode::Streaming { path, splitter, .. } = &mut self.mode {
            match splitter {
                Some(splitter) => {
                    splitter.set_delimiter(delimiter);
                    splitter.set_options(options);
                    splitter.reset()?;
                }
                None => {
                    let source = ReaderSource::open(path)?;
                    *splitter = Some(ScriptSplitter::new(source, delimiter, options));
                }
            }
        }
        self.iterator = IteratorState::Streaming;
        Ok(())
    }

    pub fn has_next(&mut self) -> Result<bool, ScriptError> {
        match self.iterator {
            IteratorState::NotStarted => Err(ScriptError::IteratorNotStarted),
            IteratorState::Cached(index) => Ok(index < self.cached().1.len()),
            IteratorState::Streaming => match &mut self.mode {
                Mode::Streaming {
                    splitter: Some(splitter),
                    ..
                } => splitter.has_more_commands(),
                _ => Ok(false),
            },
        }
    }

    /// The next command, with its SQL always filled in.
    pub fn next_definition(&mut self) -> Result<Option<CommandDefinition>, ScriptError> {
        match self.iterator {
            IteratorState::NotStarted => Err(ScriptError::IteratorNotStarted),
            IteratorState::Cached(index) => {
                let (script, commands) = self.cached();
                let next = commands.get(index).map(|command| {
                    let mut command = command.clone();
                    command.sql = Some(script[command.start..command.end].to_string());
                    command
                });
                if next.is_some() {
                    self.iterator = IteratorState::Cached(index + 1);
                }
                Ok(next)
            }
            IteratorState::Streaming => match &mut self.mode {
                Mode::Streaming {
                    splitter: Some(splitter),
                    ..
                } => splitter.next_command(),
                _ => Ok(None),
            },
        }
    }

    pub fn next_command(&mut self) -> Result<Option<String>, ScriptError> {
        Ok(self
            .next_definition()?
            .map(|command| command.sql.unwrap_or_default()))
    }

    /// Ends the iteration and closes a streamed file.
    pub fn done(&mut self) {
        if let Mode::Streaming { splitter, .. } = &mut self.mode {
            *splitter = None;
        }
        self.iterator = IteratorState::NotStarted;
    }

    /// Iterates over the SQL of all commands. The iteration is ended with
    /// [`done`](Self::done) when the returned iterator is dropped.
    pub fn commands(&mut self) -> Result<Commands<'_>, ScriptError> {
        self.start_iterator()?;
        Ok(Commands {
            parser: self,
            failed: false,
        })
    }
}

pub struct Commands<'p> {
    parser: &'p mut ScriptParser,
    failed: bool,
}

impl Iterator for Commands<'_> {
    type Item = Result<String, ScriptError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.parser.next_command() {
            Ok(Some(sql)) => Some(Ok(sql)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

impl Drop for Commands<'_> {
    fn drop(&mut self) {
        self.parser.done();
    }
}

fn command_index_at(commands: &[CommandDefinition], cursor_pos: usize) -> Option<usize> {
    let first = commands.first()?;
    if cursor_pos < first.start {
        return None;
    }
    let index = commands.partition_point(|command| command.end < cursor_pos);
    (index < commands.len()).then_some(index)
}

fn clamp_to_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return index;
    }
    let mut idx = index;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn check_encoding(encoding: Option<&str>) -> Result<(), ScriptError> {
    match encoding {
        None => Ok(()),
        Some(name) if name.eq_ignore_ascii_case("utf-8") || name.eq_ignore_ascii_case("utf8") => {
            Ok(())
        }
        Some(name) => Err(ScriptError::UnsupportedEncoding(name.to_string())),
    }
}

/// Reads a whole script, every line terminated by a single `\n`.
fn read_script_file(path: &Path) -> Result<String, ScriptError> {
    let content = fs::read_to_string(path)?;
    let mut script = String::with_capacity(content.len() + 1);
    for line in content.lines() {
        script.push_str(line);
        script.push('\n');
    }
    Ok(script)
}

/// Reads the end of a file backwards until the last non-blank line is
/// complete, so that a line-alone delimiter can be recognized.
fn read_tail(path: &Path) -> Result<String, ScriptError> {
    let mut file = File::open(path)?;
    let mut end = file.metadata()?.len();
    let mut tail: Vec<u8> = Vec::new();
    while end > 0 {
        let start = end.saturating_sub(TAIL_PROBE_SIZE);
        let mut chunk = vec![0; (end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut chunk)?;
        end = start;

        // trailing whitespace says nothing about the delimiter
        if tail.is_empty() {
            let content = chunk
                .iter()
                .rposition(|b| !b.is_ascii_whitespace())
                .map_or(0, |idx| idx + 1);
            chunk.truncate(content);
        }
        chunk.extend_from_slice(&tail);
        tail = chunk;

        if !tail.is_empty() && tail.contains(&b'\n') {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&tail).into_owned())
}
