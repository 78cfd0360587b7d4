// src/main.rs — cloudhand entry point

use clap::Parser;
use std::sync::Arc;

use cloudhand::api::gateway::ChatGateway;
use cloudhand::cli::{Cli, Commands};
use cloudhand::core::controller::Controller;
use cloudhand::infra::config::Config;
use cloudhand::infra::{logger, paths};
use cloudhand::planner::Planner;
use cloudhand::proposer::http::HttpProposer;
use cloudhand::proposer::retry::RetryProposer;
use cloudhand::remote::ssh::SshExecutor;
use cloudhand::session::store::SessionStore;

#[tokio::main]
async fn main() {
    // Respects RUST_LOG for overrides.
    logger::init_logging("info");

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    paths::ensure_dirs().await?;

    let gateway = build_gateway(&config)?;

    match cli.command {
        Some(Commands::Serve) => cloudhand::cli::serve::run_serve(&config, gateway).await,
        Some(Commands::Run { intent }) => {
            cloudhand::cli::run::run_intent(gateway, &intent.join(" ")).await
        }
        None if !cli.intent.is_empty() => {
            cloudhand::cli::run::run_intent(gateway, &cli.intent.join(" ")).await
        }
        None => {
            eprintln!("usage: cloudhand <intent> | cloudhand serve");
            std::process::exit(2);
        }
    }
}

fn build_gateway(config: &Config) -> anyhow::Result<Arc<ChatGateway>> {
    let proposer = Arc::new(RetryProposer::new(Arc::new(HttpProposer::new(
        &config.proposer,
    )?)));
    let executor = Arc::new(SshExecutor::new(config.remote.clone())?);
    let store = Arc::new(SessionStore::new(
        config.session.clone(),
        format!("/home/{}", config.remote.user),
    ));
    Arc::clone(&store).spawn_sweeper();

    let planner = Planner::new(proposer, config.turn.clone());
    let controller = Arc::new(Controller::new(planner, executor, store.clone(), config));

    Ok(Arc::new(ChatGateway::new(controller, store)))
}
