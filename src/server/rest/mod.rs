//! Code supporting the `server rest` sub command.

use std::{path::PathBuf, time::Instant};

use actix_web::web::Data;
use clap::Parser;
use tracing::info;

use crate::{
    common::trace_rss_now,
    kb::KnowledgeBaseStore,
    pgx::{analyze::NarratorHandle, cli::NarratorArgs},
};

pub mod actix_server;

/// Data to keep in the web server.
#[derive(Debug)]
pub struct WebServerData {
    /// The current knowledge base edition.
    pub store: KnowledgeBaseStore,
    /// Narrator for explanations, if configured.
    pub narrator: Option<NarratorHandle>,
}

/// Command line arguments for `server rest` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Run REST API server", long_about = None)]
pub struct Args {
    /// Path to knowledge base TOML file, built-in edition if not given.
    ///
    /// Only a file given here can be reloaded at runtime.
    #[arg(long)]
    pub path_kb: Option<PathBuf>,
    /// IP to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    pub listen_host: String,
    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    pub listen_port: u16,
    #[command(flatten)]
    pub narrator: NarratorArgs,
}

/// Main entry point for `server rest` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    info!("args_common = {:?}", &args_common);
    info!("args = {:?}", &args);

    if let Some(level) = args_common.verbose.log_level() {
        match level {
            log::Level::Trace | log::Level::Debug => {
                std::env::set_var("RUST_LOG", "debug");
                env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
            }
            _ => (),
        }
    }

    info!("Loading knowledge base...");
    let before_loading = Instant::now();
    let store = KnowledgeBaseStore::open(args.path_kb.clone())?;
    info!(
        "...done loading knowledge base in {:?}",
        before_loading.elapsed()
    );

    let data = Data::new(WebServerData {
        store,
        narrator: args.narrator.handle()?,
    });

    trace_rss_now();

    info!(
        "Launching server on http://{}:{} ...",
        &args.listen_host, args.listen_port
    );
    actix_server::main(args, data)?;

    info!("All done. Have a nice day!");
    Ok(())
}
