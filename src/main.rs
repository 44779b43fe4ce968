mod cli;
mod ui;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use inkloop::anthropic::{AnthropicClient, ModelTier};
use inkloop::config::InkloopConfig;
use inkloop::error::{RevisionError, RevisionResult};
use inkloop::export;
use inkloop::generation::{AnthropicGenerator, Evaluation, GenerationService, PriorFeedback};
use inkloop::orchestrator::WorkflowOrchestrator;
use inkloop::server::{self, HttpState};
use inkloop::state_machine::Article;
use inkloop::store::{JsonFileRepository, RevisionStore};
use ui::{Operation, WorkflowProgress};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = InkloopConfig::load(cli.config.as_deref())?;
    let repository = JsonFileRepository::open(&config.articles_dir).await?;
    let store = Arc::new(RevisionStore::open(Arc::new(repository)).await?);

    let service: Arc<dyn GenerationService> = if cli.command.needs_generator() {
        let tier = cli.model.map(ModelTier::from).unwrap_or(config.default_model_tier);
        build_generator(&config, tier)?
    } else {
        Arc::new(Offline)
    };
    let orchestrator = WorkflowOrchestrator::new(store, service, config.workflow_settings());

    match cli.command {
        Command::Generate {
            topic,
            max_iterations,
        } => {
            let max = max_iterations.unwrap_or(config.default_max_iterations);
            let progress = WorkflowProgress::start(&format!("Writing \"{topic}\""));
            let outcome = orchestrator.create_and_run(&topic, max).await;
            report(&progress, Operation::Generate, outcome)?;
        }
        Command::Show { id } => {
            let article = orchestrator.get(&id).await?;
            ui::print_article(&article);
        }
        Command::List => {
            ui::print_summaries(&orchestrator.list().await);
        }
        Command::Delete { id } => {
            orchestrator.delete(&id).await?;
            println!("Deleted {id}");
        }
        Command::Feedback {
            id,
            text,
            save_only,
        } => {
            let progress = WorkflowProgress::start("Revising with your feedback");
            let outcome = orchestrator.submit_feedback(&id, &text, !save_only).await;
            report(&progress, Operation::Feedback { id: &id }, outcome)?;
        }
        Command::Resume { id } => {
            let progress = WorkflowProgress::start("Resuming workflow");
            let outcome = orchestrator.resume(&id).await;
            report(&progress, Operation::Resume { id: &id }, outcome)?;
        }
        Command::Export { id, out } => {
            let article = orchestrator.get(&id).await?;
            let path = out.unwrap_or_else(|| PathBuf::from(export::file_name(&article)));
            let markdown = orchestrator.export_markdown(&id).await?;
            std::fs::write(&path, markdown)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Exported to {}", path.display());
        }
        Command::Serve { listen } => {
            let listen = listen.unwrap_or_else(|| config.listen_addr.clone());
            let addr: SocketAddr = listen
                .parse()
                .with_context(|| format!("invalid listen address {listen}"))?;
            let cors = server::cors_layer(&config.allowed_origins)
                .context("invalid entry in allowed_origins")?;
            let state = HttpState {
                orchestrator,
                default_max_iterations: config.default_max_iterations,
            };
            server::serve(addr, server::build_router(state, cors)).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "debug,hyper=info,reqwest=info"
    } else {
        "info,tower_http=info"
    };
    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .unwrap_or_else(|| default_filter.to_string());

    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    if subscriber.try_init().is_err() {
        tracing::warn!("tracing subscriber already initialised");
    }
}

fn build_generator(config: &InkloopConfig, tier: ModelTier) -> Result<Arc<dyn GenerationService>> {
    if config.api_key.is_empty() {
        bail!("no API key configured: set ANTHROPIC_API_KEY or api_key in inkloop.toml");
    }
    let client = AnthropicClient::new(config.api_key.clone(), config.step_timeout())
        .context("failed to build Anthropic client")?;
    Ok(Arc::new(AnthropicGenerator::new(client, tier)))
}

fn report(
    progress: &WorkflowProgress,
    operation: Operation<'_>,
    outcome: RevisionResult<Article>,
) -> Result<()> {
    match outcome {
        Ok(article) => {
            progress.complete(&article);
            println!("  id: {}", article.id);
            Ok(())
        }
        Err(err) => {
            progress.fail(&err, &operation);
            Err(err.into())
        }
    }
}

/// Stand-in for commands that only read or delete stored articles.
struct Offline;

#[async_trait::async_trait]
impl GenerationService for Offline {
    async fn generate(&self, _topic: &str, _prior: Option<&PriorFeedback>) -> RevisionResult<String> {
        Err(RevisionError::Generation(
            "generation is not available for this command".into(),
        ))
    }

    async fn evaluate(&self, _text: &str) -> RevisionResult<Evaluation> {
        Err(RevisionError::Evaluation(
            "evaluation is not available for this command".into(),
        ))
    }
}
