use clap::Parser;
use log::{info, warn};
use std::error::Error;
use std::path::PathBuf;

use sql_script_splitter::{
    CommandDefinition, Dialect, ParserSettings, ScriptError, ScriptParser, SplitterConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "sql_splitter",
    about = "Split a SQL script into statements and report their positions"
)]
pub struct Cli {
    /// Script to split
    pub file: PathBuf,

    /// Text encoding of the script (only UTF-8 is supported)
    #[arg(long)]
    pub encoding: Option<String>,

    /// Default statement delimiter
    #[arg(long)]
    pub delimiter: Option<String>,

    /// Delimiter used instead of the default one when the script ends with it
    #[arg(long)]
    pub alternate: Option<String>,

    /// The alternate delimiter does not have to stand on a line of its own
    #[arg(long)]
    pub alternate_inline: bool,

    /// Start from the presets of a database dialect
    #[arg(long, value_parser = parse_dialect)]
    pub dialect: Option<Dialect>,

    /// Blank lines separate statements
    #[arg(long)]
    pub empty_line_separator: bool,

    /// Backslashes do not escape quotes
    #[arg(long)]
    pub no_escaped_quotes: bool,

    /// Print only the statement containing this byte offset
    #[arg(long)]
    pub cursor: Option<usize>,

    /// Print statement descriptors as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_dialect(name: &str) -> Result<Dialect, String> {
    Dialect::from_name(name).ok_or_else(|| {
        let known: Vec<&str> = Dialect::all().map(Dialect::name).collect();
        format!("unknown dialect `{name}`, expected one of: {}", known.join(", "))
    })
}

pub struct App {
    config: SplitterConfig,
    cli: Cli,
}

impl App {
    pub fn new(cli: Cli) -> Self {
        let config = SplitterConfig::load();
        Self { config, cli }
    }

    /// Command line flags win over the stored configuration.
    fn settings(&self) -> Result<ParserSettings, ScriptError> {
        let mut config = self.config.clone();
        // presets first, so that the individual flags below win
        config.resolve_dialect();
        if let Some(dialect) = self.cli.dialect {
            config.apply_dialect(dialect);
        }
        if let Some(delimiter) = &self.cli.delimiter {
            config.delimiter = delimiter.clone();
        }
        if let Some(alternate) = &self.cli.alternate {
            config.alternate_delimiter = Some(alternate.clone());
        }
        if self.cli.alternate_inline {
            config.alternate_delimiter_single_line = false;
        }
        if self.cli.empty_line_separator {
            config.empty_line_is_separator = true;
        }
        if self.cli.no_escaped_quotes {
            config.check_escaped_quotes = false;
        }
        config.to_settings()
    }

    pub fn run(&self) -> Result<(), Box<dyn Error>> {
        let settings = self.settings()?;
        let mut parser =
            ScriptParser::open(&self.cli.file, self.cli.encoding.as_deref(), settings)?;
        info!(
            "splitting {} with delimiter `{}`",
            self.cli.file.display(),
            parser.delimiter_string()
        );

        if let Some(cursor) = self.cli.cursor {
            return self.print_at_cursor(&mut parser, cursor);
        }

        if self.cli.json {
            let mut commands = Vec::new();
            parser.start_iterator()?;
            while let Some(command) = parser.next_definition()? {
                commands.push(command);
            }
            parser.done();
            println!("{}", serde_json::to_string_pretty(&commands)?);
            return Ok(());
        }

        let delimiter = parser.active_delimiter().clone();
        for sql in parser.commands()? {
            let sql = sql?;
            if delimiter.is_single_line() {
                println!("{}\n{delimiter}", sql.trim_end());
            } else {
                println!("{}{delimiter}", sql.trim_end());
            }
        }
        Ok(())
    }

    fn print_at_cursor(
        &self,
        parser: &mut ScriptParser,
        cursor: usize,
    ) -> Result<(), Box<dyn Error>> {
        let Some(index) = parser.command_index_at_cursor_pos(cursor)? else {
            warn!("no statement at offset {cursor}");
            return Ok(());
        };
        let Some(command) = parser.command_definition(index)?.cloned() else {
            return Ok(());
        };
        let sql = parser.command(index, true)?.unwrap_or_default().to_string();
        if self.cli.json {
            let command = CommandDefinition {
                sql: Some(sql),
                ..command
            };
            println!("{}", serde_json::to_string_pretty(&command)?);
        } else {
            println!("{sql}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(args: &[&str]) -> App {
        app_with_config(SplitterConfig::new(), args)
    }

    fn app_with_config(config: SplitterConfig, args: &[&str]) -> App {
        let cli = Cli::parse_from(std::iter::once("sql_splitter").chain(args.iter().copied()));
        App { config, cli }
    }

    #[test]
    fn flags_override_configuration() {
        let settings = app(&["script.sql", "--delimiter", "//", "--no-escaped-quotes"])
            .settings()
            .unwrap();
        assert_eq!(settings.delimiter.text(), "//");
        assert!(!settings.options.check_escaped_quotes);
        assert_eq!(settings.alternate_delimiter, None);
    }

    #[test]
    fn dialect_flag_is_applied_before_other_flags() {
        let settings = app(&["script.sql", "--dialect", "sqlserver", "--alternate", "$$"])
            .settings()
            .unwrap();
        let alternate = settings.alternate_delimiter.unwrap();
        assert_eq!(alternate.text(), "$$");
        assert!(alternate.is_single_line());
        assert!(!settings.options.check_escaped_quotes);
    }

    #[test]
    fn flags_override_configured_dialect() {
        let config = SplitterConfig {
            dialect: Some("sqlserver".to_string()),
            ..SplitterConfig::new()
        };
        let settings = app_with_config(
            config.clone(),
            &["script.sql", "--delimiter", "//", "--alternate", "$$"],
        )
        .settings()
        .unwrap();
        assert_eq!(settings.delimiter.text(), "//");
        assert_eq!(
            settings.alternate_delimiter.map(|d| d.text().to_string()),
            Some("$$".to_string())
        );
        assert!(!settings.options.check_escaped_quotes);

        let settings = app_with_config(config, &["script.sql"]).settings().unwrap();
        assert_eq!(settings.delimiter.text(), ";");
        assert_eq!(
            settings.alternate_delimiter.map(|d| d.text().to_string()),
            Some("GO".to_string())
        );
    }

    #[test]
    fn unknown_dialect_is_rejected() {
        let cli = Cli::try_parse_from(["sql_splitter", "script.sql", "--dialect", "cobol"]);
        assert!(cli.is_err());
    }
}
