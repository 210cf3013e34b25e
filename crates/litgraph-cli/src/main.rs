//! litgraph: Load a BioC XML corpus into a citation graph and export it
//! as flat text files.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use litgraph_common::GraphStats;
use litgraph_db::GraphStore;
use litgraph_ingestion::{export_to_files, ingest_file, IngestionProgress};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Debug, Parser)]
#[command(name = "litgraph")]
#[command(version, about = "Citation graph loader for BioC XML corpora", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE", env = "LITGRAPH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Connection arguments shared by every subcommand.
#[derive(Debug, Args)]
struct StoreArgs {
    /// Graph store URI (bolt://, neo4j://, postgres:// or memory://)
    #[arg(env = "LITGRAPH_STORE_URI")]
    uri: Option<String>,

    /// Store user
    #[arg(env = "LITGRAPH_STORE_USER")]
    user: Option<String>,

    /// Store password
    #[arg(env = "LITGRAPH_STORE_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load documents and their references into the graph
    Ingest {
        /// BioC XML file
        input: PathBuf,

        #[command(flatten)]
        store: StoreArgs,

        /// Records per store call
        #[arg(long, value_name = "N")]
        batch_size: Option<usize>,
    },

    /// Write the full-text and reference files
    Export {
        #[command(flatten)]
        store: StoreArgs,

        /// Output file for `<id>/<full_text>` lines
        #[arg(long, value_name = "FILE")]
        text_out: Option<PathBuf>,

        /// Output file for `<id>/<ref>/...` lines
        #[arg(long, value_name = "FILE")]
        references_out: Option<PathBuf>,

        /// Skip the statistics printed before exporting
        #[arg(long)]
        no_stats: bool,
    },

    /// Print graph statistics
    Stats {
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("litgraph=info,info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let t0 = Instant::now();

    match cli.command {
        Command::Ingest { input, store, batch_size } => {
            ingest(&config, &input, store, batch_size).await?;
        }
        Command::Export { store, text_out, references_out, no_stats } => {
            let graph = open_store(&config, store).await?;
            if !no_stats {
                print_stats(&graph.statistics().await?);
            }
            let job = config.export_job(text_out, references_out);
            let result = export_to_files(graph.as_ref(), &job).await?;
            println!(
                "{} written ({} lines), {} written ({} lines)",
                job.text_path.display(),
                result.full_text_lines,
                job.references_path.display(),
                result.reference_lines
            );
        }
        Command::Stats { store } => {
            let graph = open_store(&config, store).await?;
            print_stats(&graph.statistics().await?);
        }
    }

    println!("Total time: {}", format_elapsed(t0.elapsed()));
    Ok(())
}

async fn ingest(
    config: &Config,
    input: &Path,
    store: StoreArgs,
    batch_size: Option<usize>,
) -> anyhow::Result<()> {
    if !input.is_file() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    let job = config.ingestion_job(batch_size);
    job.validate()?;

    let graph = open_store(config, store).await?;

    let (tx, mut rx) = broadcast::channel::<IngestionProgress>(64);
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(progress) => println!("[{}] {}", progress.stage, progress.message),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = ingest_file(input, graph.as_ref(), &job, Some(tx)).await?;
    let _ = printer.await;

    println!(
        "{} documents loaded in {} batches, {} reference pairs from {} documents",
        result.records_extracted,
        result.node_batches,
        result.references_requested,
        result.reference_sources
    );
    if result.documents_without_id > 0 {
        println!("{} documents without identifier skipped", result.documents_without_id);
    }
    Ok(())
}

async fn open_store(
    config: &Config,
    args: StoreArgs,
) -> anyhow::Result<std::sync::Arc<dyn GraphStore>> {
    let store_config = config.store_config(args.uri, args.user, args.password);
    info!(uri = %store_config.uri, user = %store_config.user, "Connecting");
    litgraph_db::connect(&store_config)
        .await
        .with_context(|| format!("connecting to {}", store_config.uri))
}

fn print_stats(stats: &GraphStats) {
    println!("Total documents: {}", stats.total_documents);
    println!("Documents with abstract: {}", stats.documents_with_abstract);
    println!("Average references per document: {:.2}", stats.avg_references);
    println!("Maximum references: {}", stats.max_references);
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{} min {} sec", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0 min 0 sec");
        assert_eq!(format_elapsed(Duration::from_millis(125_900)), "2 min 5 sec");
    }

    #[test]
    fn test_ingest_positionals_in_order() {
        let cli = Cli::try_parse_from([
            "litgraph",
            "ingest",
            "corpus.xml",
            "bolt://db:7687",
            "reader",
            "pw",
            "--batch-size",
            "50",
        ])
        .unwrap();
        match cli.command {
            Command::Ingest { input, store, batch_size } => {
                assert_eq!(input, PathBuf::from("corpus.xml"));
                assert_eq!(store.uri.as_deref(), Some("bolt://db:7687"));
                assert_eq!(store.user.as_deref(), Some("reader"));
                assert_eq!(store.password.as_deref(), Some("pw"));
                assert_eq!(batch_size, Some(50));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_ingest_requires_input() {
        let err = Cli::try_parse_from(["litgraph", "ingest"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_export_flags() {
        let cli = Cli::try_parse_from([
            "litgraph", "export", "memory://", "--text-out", "a.txt", "--no-stats",
        ])
        .unwrap();
        match cli.command {
            Command::Export { store, text_out, references_out, no_stats } => {
                assert_eq!(store.uri.as_deref(), Some("memory://"));
                assert_eq!(text_out, Some(PathBuf::from("a.txt")));
                assert!(references_out.is_none());
                assert!(no_stats);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_input_fails_before_connecting() {
        let store = StoreArgs { uri: Some("nowhere://x".to_string()), user: None, password: None };
        let err = ingest(&Config::default(), Path::new("/nonexistent/corpus.xml"), store, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Input file not found"));
    }

    #[tokio::test]
    async fn test_ingest_into_memory_store_with_progress() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("corpus.xml");
        std::fs::write(
            &input,
            r#"<collection><document><passage><infon key="article-id_pmid">1</infon><infon key="section_type">TITLE</infon><text>A</text></passage><passage><infon key="section_type">REF</infon><infon key="pub-id_pmid">2</infon></passage></document></collection>"#,
        )
        .unwrap();
        let store = StoreArgs { uri: Some("memory://".to_string()), user: None, password: None };
        ingest(&Config::default(), &input, store, Some(1)).await.unwrap();
    }
}
