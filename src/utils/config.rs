use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::script::{
    DelimiterDefinition, Dialect, ParserSettings, ScriptError, SingleLineCommands, SplitOptions,
    DEFAULT_MAX_IN_MEMORY_SIZE, DEFAULT_SINGLE_LINE_PATTERNS,
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SplitterConfig {
    pub delimiter: String,
    pub alternate_delimiter: Option<String>,
    pub alternate_delimiter_single_line: bool,
    pub max_in_memory_size: u64,
    pub check_escaped_quotes: bool,
    pub empty_line_is_separator: bool,
    pub check_single_line_commands: bool,
    pub single_line_command_patterns: Vec<String>,
    pub support_include_directive: bool,
    pub include_prefix: String,
    pub alternate_line_comment: Option<String>,
    pub keep_leading_whitespace: bool,
    /// Preset applied before the settings above are turned into parser
    /// settings. Replaces the delimiters, quoting and comment settings.
    pub dialect: Option<String>,
}

impl SplitterConfig {
    pub fn new() -> Self {
        Self {
            delimiter: ";".to_string(),
            alternate_delimiter: None,
            alternate_delimiter_single_line: true,
            max_in_memory_size: DEFAULT_MAX_IN_MEMORY_SIZE,
            check_escaped_quotes: true,
            empty_line_is_separator: false,
            check_single_line_commands: true,
            single_line_command_patterns: DEFAULT_SINGLE_LINE_PATTERNS
                .iter()
                .map(|pattern| pattern.to_string())
                .collect(),
            support_include_directive: true,
            include_prefix: "@".to_string(),
            alternate_line_comment: None,
            keep_leading_whitespace: false,
            dialect: None,
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("sql_splitter");
            path.push("config.json");
            path
        })
    }

    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Self::new(),
        }
    }

    /// Reads the configuration at `path`, falling back to the defaults when
    /// the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                warn!("cannot read {}: {err}, using defaults", path.display());
                return Self::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                warn!("invalid configuration in {}: {err}, using defaults", path.display());
                Self::new()
            }
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        match Self::config_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Overwrites the delimiter, quoting and comment settings with the
    /// preset of `dialect`.
    pub fn apply_dialect(&mut self, dialect: Dialect) {
        let profile = dialect.profile();
        self.delimiter = profile.delimiter.to_string();
        self.alternate_delimiter = profile
            .alternate_delimiter
            .map(|(text, _)| text.to_string());
        self.alternate_delimiter_single_line = profile
            .alternate_delimiter
            .map_or(true, |(_, single_line)| single_line);
        self.check_escaped_quotes = profile.backslash_escapes;
        self.alternate_line_comment = profile.alternate_line_comment.map(str::to_string);
        self.support_include_directive = profile.include_directive;
    }

    /// Applies and clears the configured dialect, so that fields changed
    /// afterwards are no longer overwritten by its preset.
    pub fn resolve_dialect(&mut self) {
        if let Some(name) = self.dialect.take() {
            match Dialect::from_name(&name) {
                Some(dialect) => self.apply_dialect(dialect),
                None => warn!("unknown dialect `{name}` in configuration, ignored"),
            }
        }
    }

    pub fn to_settings(&self) -> Result<ParserSettings, ScriptError> {
        let mut config = self.clone();
        config.resolve_dialect();

        let alternate_delimiter = match config.alternate_delimiter.as_deref() {
            Some(text) if !text.trim().is_empty() => Some(DelimiterDefinition::new(
                text,
                config.alternate_delimiter_single_line,
            )?),
            _ => None,
        };
        let alternate_line_comment = config
            .alternate_line_comment
            .filter(|prefix| !prefix.trim().is_empty());

        Ok(ParserSettings {
            delimiter: DelimiterDefinition::new(&config.delimiter, false)?,
            alternate_delimiter,
            options: SplitOptions {
                check_escaped_quotes: config.check_escaped_quotes,
                empty_line_is_separator: config.empty_line_is_separator,
                check_single_line_commands: config.check_single_line_commands,
                single_line_commands: SingleLineCommands::new(
                    &config.single_line_command_patterns,
                )?,
                support_include_directive: config.support_include_directive,
                include_prefix: config.include_prefix,
                alternate_line_comment,
                keep_leading_whitespace: config.keep_leading_whitespace,
            },
            max_in_memory_size: config.max_in_memory_size,
        })
    }
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self::new()
    }
}
