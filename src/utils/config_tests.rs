use super::*;

use crate::script::{DelimiterDefinition, ParserSettings, ScriptError};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_defaults_match_parser_defaults() {
    let settings = SplitterConfig::new().to_settings().unwrap();
    assert_eq!(settings, ParserSettings::default());
}

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = SplitterConfig::new();
    config.alternate_delimiter = Some("GO".to_string());
    config.empty_line_is_separator = true;
    config.max_in_memory_size = 1024;
    config.save_to(&path).unwrap();

    assert_eq!(SplitterConfig::load_from(&path), config);
}

#[test]
fn test_partial_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{ "delimiter": "//", "keep_leading_whitespace": true }"#).unwrap();

    let config = SplitterConfig::load_from(&path);
    assert_eq!(config.delimiter, "//");
    assert!(config.keep_leading_whitespace);
    assert!(config.check_escaped_quotes);
    assert_eq!(config.include_prefix, "@");
}

#[test]
fn test_invalid_file_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();
    assert_eq!(SplitterConfig::load_from(&path), SplitterConfig::new());
}

#[test]
fn test_rejects_empty_delimiter() {
    let mut config = SplitterConfig::new();
    config.delimiter = "  ".to_string();
    assert!(matches!(
        config.to_settings(),
        Err(ScriptError::EmptyDelimiter)
    ));
}

#[test]
fn test_rejects_invalid_pattern() {
    let mut config = SplitterConfig::new();
    config.single_line_command_patterns = vec!["^(PRINT".to_string()];
    assert!(matches!(
        config.to_settings(),
        Err(ScriptError::InvalidPattern { .. })
    ));
}

#[test]
fn test_alternate_delimiter_settings() {
    let mut config = SplitterConfig::new();
    config.alternate_delimiter = Some("$$".to_string());
    config.alternate_delimiter_single_line = false;
    config.alternate_line_comment = Some(String::new());

    let settings = config.to_settings().unwrap();
    assert_eq!(
        settings.alternate_delimiter,
        Some(DelimiterDefinition::new("$$", false).unwrap())
    );
    assert_eq!(settings.options.alternate_line_comment, None);
}

#[test]
fn test_dialect_preset() {
    let mut config = SplitterConfig::new();
    config.dialect = Some("MSSQL".to_string());
    let settings = config.to_settings().unwrap();
    assert_eq!(
        settings.alternate_delimiter,
        Some(DelimiterDefinition::ms_sql_go())
    );
    assert!(!settings.options.check_escaped_quotes);

    config.dialect = Some("unknown".to_string());
    let settings = config.to_settings().unwrap();
    assert_eq!(settings.alternate_delimiter, None);
}

#[test]
fn test_resolved_dialect_keeps_later_changes() {
    let mut config = SplitterConfig::new();
    config.dialect = Some("oracle".to_string());
    config.resolve_dialect();
    assert_eq!(config.dialect, None);
    assert_eq!(config.alternate_delimiter.as_deref(), Some("/"));

    config.delimiter = "//".to_string();
    let settings = config.to_settings().unwrap();
    assert_eq!(settings.delimiter.text(), "//");
}
