pub mod script;
pub mod utils;

pub use script::{
    split_script, CommandDefinition, DelimiterDefinition, Dialect, ParserSettings, ScriptError,
    ScriptParser, SplitOptions,
};
pub use utils::SplitterConfig;
