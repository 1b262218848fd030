pub mod config;

pub use config::*;

#[cfg(test)]
mod config_tests;
