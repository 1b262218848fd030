use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::{DelimiterDefinition, SplitOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Generic,
    Oracle,
    SqlServer,
    MySql,
    PostgreSql,
    H2,
    Derby,
    Informix,
}

/// How scripts for a database product are usually terminated and quoted.
#[derive(Debug, Clone, Copy)]
pub struct DialectProfile {
    pub dialect: Dialect,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub delimiter: &'static str,
    /// Alternate delimiter and whether it has to stand alone on its line.
    pub alternate_delimiter: Option<(&'static str, bool)>,
    pub backslash_escapes: bool,
    pub alternate_line_comment: Option<&'static str>,
    pub include_directive: bool,
}

const PROFILES: &[DialectProfile] = &[
    DialectProfile {
        dialect: Dialect::Generic,
        name: "generic",
        aliases: &["ansi", "default"],
        delimiter: ";",
        alternate_delimiter: None,
        backslash_escapes: true,
        alternate_line_comment: None,
        include_directive: false,
    },
    DialectProfile {
        dialect: Dialect::Oracle,
        name: "oracle",
        aliases: &["sqlplus", "plsql"],
        delimiter: ";",
        alternate_delimiter: Some(("/", true)),
        backslash_escapes: false,
        alternate_line_comment: None,
        include_directive: true,
    },
    DialectProfile {
        dialect: Dialect::SqlServer,
        name: "sqlserver",
        aliases: &["mssql", "tsql", "sybase"],
        delimiter: ";",
        alternate_delimiter: Some(("GO", true)),
        backslash_escapes: false,
        alternate_line_comment: None,
        include_directive: false,
    },
    DialectProfile {
        dialect: Dialect::MySql,
        name: "mysql",
        aliases: &["mariadb"],
        delimiter: ";",
        alternate_delimiter: Some(("//", false)),
        backslash_escapes: true,
        alternate_line_comment: Some("#"),
        include_directive: false,
    },
    DialectProfile {
        dialect: Dialect::PostgreSql,
        name: "postgresql",
        aliases: &["postgres", "pg"],
        delimiter: ";",
        alternate_delimiter: None,
        backslash_escapes: false,
        alternate_line_comment: None,
        include_directive: false,
    },
    DialectProfile {
        dialect: Dialect::H2,
        name: "h2",
        aliases: &[],
        delimiter: ";",
        alternate_delimiter: None,
        backslash_escapes: false,
        alternate_line_comment: Some("//"),
        include_directive: false,
    },
    DialectProfile {
        dialect: Dialect::Derby,
        name: "derby",
        aliases: &["javadb"],
        delimiter: ";",
        alternate_delimiter: None,
        backslash_escapes: false,
        alternate_line_comment: None,
        include_directive: false,
    },
    DialectProfile {
        dialect: Dialect::Informix,
        name: "informix",
        aliases: &[],
        delimiter: ";",
        alternate_delimiter: None,
        backslash_escapes: false,
        alternate_line_comment: None,
        include_directive: false,
    },
];

static BY_NAME: Lazy<HashMap<&'static str, Dialect>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for profile in PROFILES {
        map.insert(profile.name, profile.dialect);
        for alias in profile.aliases {
            map.insert(*alias, profile.dialect);
        }
    }
    map
});

impl Dialect {
    pub fn all() -> impl Iterator<Item = Dialect> {
        PROFILES.iter().map(|profile| profile.dialect)
    }

    pub fn from_name(name: &str) -> Option<Dialect> {
        BY_NAME.get(name.trim().to_lowercase().as_str()).copied()
    }

    pub fn profile(self) -> &'static DialectProfile {
        PROFILES
            .iter()
            .find(|profile| profile.dialect == self)
            .unwrap_or(&PROFILES[0])
    }

    pub fn name(self) -> &'static str {
        self.profile().name
    }
}

impl DialectProfile {
    pub fn delimiter(&self) -> DelimiterDefinition {
        DelimiterDefinition::new(self.delimiter, false).unwrap_or_default()
    }

    pub fn alternate_delimiter(&self) -> Option<DelimiterDefinition> {
        self.alternate_delimiter
            .and_then(|(text, single_line)| DelimiterDefinition::new(text, single_line).ok())
    }

    pub fn split_options(&self) -> SplitOptions {
        SplitOptions {
            check_escaped_quotes: self.backslash_escapes,
            support_include_directive: self.include_directive,
            alternate_line_comment: self.alternate_line_comment.map(str::to_string),
            ..SplitOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_dialect_has_a_profile() {
        for dialect in Dialect::all() {
            assert_eq!(dialect.profile().dialect, dialect);
            assert_eq!(Dialect::from_name(dialect.name()), Some(dialect));
        }
    }

    #[test]
    fn lookup_accepts_aliases_in_any_case() {
        assert_eq!(Dialect::from_name("MSSQL"), Some(Dialect::SqlServer));
        assert_eq!(Dialect::from_name(" Postgres "), Some(Dialect::PostgreSql));
        assert_eq!(Dialect::from_name("cobol"), None);
    }

    #[test]
    fn sql_server_uses_go_on_its_own_line() {
        let profile = Dialect::SqlServer.profile();
        assert_eq!(
            profile.alternate_delimiter(),
            Some(DelimiterDefinition::ms_sql_go())
        );
        assert!(!profile.split_options().check_escaped_quotes);
    }

    #[test]
    fn mysql_recognizes_hash_comments() {
        let options = Dialect::MySql.profile().split_options();
        assert_eq!(options.alternate_line_comment.as_deref(), Some("#"));
        assert!(options.check_escaped_quotes);
    }
}
