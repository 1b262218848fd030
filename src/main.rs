mod app;

use app::{App, Cli};
use clap::Parser;
use log::error;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let app = App::new(Cli::parse());
    if let Err(err) = app.run() {
        error!("{err}");
        process::exit(1);
    }
}
