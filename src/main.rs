use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use docqa_core::App;
use docqa_core::bootstrap::health_check;
use docqa_core::config::{Config, resolve_config_path};
use docqa_gateway::{AppState, GatewayServer};
use docqa_index::SourceChunk;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Ask questions about an uploaded PDF using retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file (default: `DOCQA_CONFIG` or config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Command {
    /// Start the HTTP API (default)
    Serve,
    /// Replace the index with the contents of a local PDF or text file
    Ingest {
        file: PathBuf,
    },
    /// Ask a single question against the current index
    Ask {
        question: String,
        /// Also print the retrieved chunks
        #[arg(long)]
        sources: bool,
    },
    /// Interactive question loop; `exit` or `quit` to leave
    Chat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);
    let config = Config::load(&config_path)?;
    config.validate().context("invalid configuration")?;
    tracing::debug!(path = %config_path.display(), provider = %config.llm.provider, "config loaded");

    let app = App::build(config).await?;
    health_check(&app.provider).await;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(app).await,
        Command::Ingest { file } => ingest(&app, &file).await,
        Command::Ask { question, sources } => ask(&app, &question, sources).await,
        Command::Chat => chat(&app).await,
    }
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(app: App) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let server = &app.config.server;
    let gateway = GatewayServer::new(
        &server.bind,
        server.port,
        AppState::new(app.ingest, app.query),
        shutdown_rx,
    )
    .with_cors_origins(server.cors_origins.clone())
    .with_max_body_size(server.max_body_size);

    gateway.serve().await.context("gateway stopped with an error")
}

async fn ingest(app: &App, file: &Path) -> anyhow::Result<()> {
    let report = app
        .ingest
        .ingest_path(file)
        .await
        .with_context(|| format!("failed to ingest {}", file.display()))?;
    println!(
        "Indexed '{}': {} page(s), {} chunk(s) into collection '{}'.",
        report.source, report.pages, report.chunks, report.collection
    );
    Ok(())
}

async fn ask(app: &App, question: &str, show_sources: bool) -> anyhow::Result<()> {
    let answer = app.query.ask(question).await?;
    println!("{}", answer.text);
    if show_sources {
        print_sources(&answer.sources);
    }
    Ok(())
}

async fn chat(app: &App) -> anyhow::Result<()> {
    println!("Ask about the indexed document. Type 'exit' or 'quit' to leave.");
    loop {
        let line = tokio::task::spawn_blocking(|| {
            dialoguer::Input::<String>::new()
                .with_prompt("You")
                .allow_empty(true)
                .interact_text()
        })
        .await??;

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if is_exit(question) {
            break;
        }

        match app.query.ask(question).await {
            Ok(answer) => {
                println!("\n{}\n", answer.text);
                print_sources(&answer.sources);
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

fn is_exit(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn format_source(index: usize, chunk: &SourceChunk) -> String {
    let location = chunk
        .page
        .map_or_else(|| chunk.source.clone(), |p| format!("{}, page {p}", chunk.source));
    let preview: String = chunk.text.chars().take(120).collect();
    let preview = preview.replace('\n', " ");
    format!("[{}] {location} (score {:.3}): {preview}", index + 1, chunk.score)
}

fn print_sources(sources: &[SourceChunk]) {
    if sources.is_empty() {
        return;
    }
    println!("Sources:");
    for (i, chunk) in sources.iter().enumerate() {
        println!("  {}", format_source(i, chunk));
    }
}
