//! Trivia Duel Server
//!
//! Authoritative match server for head-to-head trivia duels.

use std::sync::Arc;
use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trivia_duel::{
    VERSION, MatchType,
    game::question::TriviaContent,
    network::{
        Arbiter, AuthConfig, GameServer, ServerConfig,
        results::{JsonLinesSink, LogSink, ResultSink},
    },
};

/// Seed for placing correct answers among the choices at load time.
const CONTENT_SEED: u64 = 0x5eed_7121_a000_0001;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "trivia_duel=info".into()),
        )
        .init();

    info!("Trivia Duel Server v{}", VERSION);

    let config = ServerConfig::from_env();
    let auth = AuthConfig::from_env();

    let content = match &config.questions_path {
        Some(path) => TriviaContent::load_path(path, CONTENT_SEED)
            .with_context(|| format!("loading questions from {}", path.display()))?,
        None => TriviaContent::bundled(CONTENT_SEED).context("loading bundled questions")?,
    };
    info!(
        "Loaded {} questions in {} categories",
        content.bank.len(),
        content.catalog.len()
    );
    for match_type in MatchType::ALL {
        let c = match_type.config();
        info!(
            "{}: {} rounds x {} questions, {}s per question",
            match_type.as_str(),
            c.total_rounds,
            c.round_size,
            c.question_time.as_secs()
        );
    }

    let results: Arc<dyn ResultSink> = match &config.results_path {
        Some(path) => {
            let sink = JsonLinesSink::open(path).context("opening results file")?;
            info!("Recording results to {}", sink.path().display());
            Arc::new(sink)
        }
        None => Arc::new(LogSink),
    };

    let arbiter = Arbiter::new(content, results, config.arbiter.clone());
    let server = Arc::new(GameServer::new(config, auth, arbiter));

    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_server.shutdown(),
            Err(e) => warn!("Cannot listen for shutdown signal: {}", e),
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}
