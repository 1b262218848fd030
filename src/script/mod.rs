mod delimiter;
mod dialect;
mod parser;
mod source;
mod splitter;
mod types;

pub use delimiter::*;
pub use dialect::*;
pub use parser::*;
pub use source::*;
pub use splitter::*;
pub use types::*;
