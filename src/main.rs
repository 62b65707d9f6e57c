#[macro_use]
extern crate async_trait;

mod configuration;
mod distribution;
mod generator;
mod report;
mod run;
mod workload;

use tracing_subscriber::EnvFilter;

use configuration::command_line::{self, Command};

// Every database call is awaited before the next one is issued, so one
// thread is enough.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = match command_line::parse_args(std::env::args()) {
        Ok(Command::Run(config)) => config,
        Ok(Command::Help(usage)) => {
            println!("{}", usage);
            return;
        }
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .init();

    if let Err(err) = run::run(config).await {
        tracing::error!("{:#}", err);
        std::process::exit(1);
    }
}
