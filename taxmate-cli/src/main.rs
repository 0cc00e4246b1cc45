use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use taxmate_core::{PipelineEvent, TerminalEvent};
use taxmate_ingest::{partition, Document};
use taxmate_statement::{BlobStore, DocumentStore, GeminiClient, LocalStore, StatementAnalyser};

mod config;
mod server;
mod state;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "taxmate", version, about = "Extract credit transactions from bank statement PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a statement's page count and how it will be chunked
    Pages {
        #[arg(long)]
        file: PathBuf,
    },

    /// Analyse a statement, writing NDJSON events to stdout
    Analyse(AnalyseArgs),

    /// Serve the streaming analysis endpoint over HTTP
    Serve {
        /// Address to bind (host:port); overrides [server].bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Manage ~/.taxmate/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct AnalyseArgs {
    /// Local PDF; left in place afterwards
    #[arg(long)]
    file: Option<PathBuf>,

    /// Staged object URL; deleted from the store afterwards
    #[arg(long)]
    url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config if none exists
    Init,
    /// Print the effective config
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Pages { file } => {
            let cfg = config::load_config()?;
            pages(&file, cfg.extraction.chunk_size)?;
        }

        Command::Analyse(args) => {
            let cfg = config::load_config()?;
            analyse(&cfg, args).await?;
        }

        Command::Serve { bind } => {
            let cfg = config::load_config()?;
            server::serve(cfg, bind).await?;
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => {
                let cfg = config::load_config()?;
                println!("# {}", config::config_path()?.display());
                print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
            }
        },
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn pages(file: &Path, chunk_size: usize) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("read {}", file.display()))?;
    let doc = Document::from_bytes(bytes).with_context(|| format!("load {}", file.display()))?;
    let ranges = partition(doc.page_count(), chunk_size);

    println!(
        "{}: {} page(s) ({:?}), {} chunk(s) of up to {}",
        file.display(),
        doc.page_count(),
        doc.page_count_source(),
        ranges.len(),
        chunk_size.max(1)
    );
    for r in &ranges {
        println!("  #{} {}", r.index, r);
    }
    Ok(())
}

async fn analyse(cfg: &Config, args: AnalyseArgs) -> Result<()> {
    let max_bytes = cfg.server.max_upload_bytes;

    match (args.file, args.url) {
        (Some(file), _) => {
            let location = file.to_str().context("file path is not valid UTF-8")?.to_string();
            let client = provider_client(cfg)?;
            run_analysis(cfg, client, LocalStore::new().with_max_bytes(max_bytes), &location).await
        }
        (None, Some(url)) => {
            let store = BlobStore::new(config::store_token(), cfg.staging.delete_endpoint.clone())?
                .with_max_bytes(max_bytes);
            let client = match provider_client(cfg) {
                Ok(client) => client,
                Err(e) => {
                    // Staged objects are never left behind.
                    if let Err(release) = store.release(&url).await {
                        tracing::error!(error = %release, "failed to release staged document");
                    }
                    return Err(e);
                }
            };
            run_analysis(cfg, client, store, &url).await
        }
        (None, None) => bail!("pass --file <pdf> or --url <staged-url>"),
    }
}

fn provider_client(cfg: &Config) -> Result<GeminiClient> {
    let api_key = config::api_key()
        .with_context(|| format!("{} is not set", config::API_KEY_ENV))?;
    Ok(GeminiClient::new(cfg.gemini_config(api_key))?)
}

async fn run_analysis<S: DocumentStore>(
    cfg: &Config,
    client: GeminiClient,
    store: S,
    location: &str,
) -> Result<()> {
    let analyser = StatementAnalyser::new(client, store, cfg.analyser_settings());
    let sink = |current: usize, total: usize| emit(&PipelineEvent::progress(current, total));

    let terminal = analyser.analyse(location, &sink).await;
    let failed = matches!(terminal, TerminalEvent::Error(_));
    emit(&PipelineEvent::from(terminal));

    if failed {
        bail!("statement analysis failed");
    }
    Ok(())
}

fn emit(event: &PipelineEvent) {
    match event.to_ndjson() {
        Ok(line) => {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(line.as_bytes());
            let _ = out.flush();
        }
        Err(e) => tracing::error!(error = %e, "failed to encode event"),
    }
}
