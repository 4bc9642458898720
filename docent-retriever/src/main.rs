use anyhow::Context;
use clap::{Parser, Subcommand};
use docent_embed::{Embedder, OpenAiEmbedder, OpenAiGenerator};
use docent_retriever::{
    DocentConfig,
    cache::CacheManifest,
    corpus::scan,
    retrieval::{
        AnswerRequest, AnswerService, ConversationFormatter, ConversationTurn, FALLBACK_ANSWER,
        RetrievalPipeline,
    },
    storage::{QdrantBackend, ScoredChunk, VectorBackend},
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Ask questions about a directory of documents.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Corpus root directory, overriding the configuration
    #[arg(short, long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the index now, or confirm the cached one is current
    Index {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Answer a question from the corpus
    Ask {
        /// The question
        question: String,
        /// JSON file holding prior turns: [{"role": "user", "content": "..."}]
        #[arg(long)]
        history: Option<PathBuf>,
        /// Print the chunks the answer was generated from
        #[arg(long)]
        sources: bool,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Check the cache and backend without building anything
    Status {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct AskOutput<'a> {
    answer: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sources: Option<&'a [ScoredChunk]>,
}

#[derive(Serialize)]
struct StatusOutput {
    corpus_root: PathBuf,
    files: usize,
    manifest_entries: usize,
    cache_valid: bool,
    backend: Option<String>,
    backend_reachable: Option<bool>,
    existing_points: Option<usize>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DocentConfig::load(path).await?,
        None => DocentConfig::default(),
    };
    if let Some(root) = args.root {
        config.corpus.root = root;
    }
    config.validate()?;

    match args.command {
        Commands::Index { format } => {
            let pipeline = build_pipeline(&config).await?;
            let result = pipeline.ensure_ready().await;
            let status = pipeline.status();

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
                OutputFormat::Summary => println!("{}", status.summary()),
            }
            result?;
            Ok(())
        }
        Commands::Ask {
            question,
            history,
            sources,
            format,
        } => {
            let conversation_history = match history {
                Some(path) => {
                    let text = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("reading history file {}", path.display()))?;
                    serde_json::from_str::<Vec<ConversationTurn>>(&text)
                        .with_context(|| format!("parsing history file {}", path.display()))?
                }
                None => Vec::new(),
            };
            let request = AnswerRequest::new(question).with_history(conversation_history);

            let pipeline = build_pipeline(&config).await?;
            let generator = OpenAiGenerator::new(config.provider.clone())?;
            let service = AnswerService::new(Arc::new(pipeline), Arc::new(generator))
                .with_formatter(ConversationFormatter::new(config.query_mode()))
                .with_top_k(config.retrieval.top_k);

            let (answer, hits) = if sources {
                match service.try_answer(&request).await {
                    Ok(answer) => (answer.text, Some(answer.sources)),
                    Err(e) => {
                        tracing::error!("Failed to answer question: {}", e);
                        (FALLBACK_ANSWER.to_string(), None)
                    }
                }
            } else {
                (service.answer(&request).await.answer, None)
            };

            match format {
                OutputFormat::Json => {
                    let output = AskOutput {
                        answer: &answer,
                        sources: hits.as_deref(),
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Summary => {
                    println!("{answer}");
                    if let Some(hits) = &hits {
                        println!("\nSources:");
                        for hit in hits {
                            println!(
                                "  {:.3} | {} | {} #{}",
                                hit.score,
                                hit.chunk.metadata.category,
                                hit.chunk.metadata.filename,
                                hit.chunk.metadata.chunk_index
                            );
                        }
                    }
                }
            }
            Ok(())
        }
        Commands::Status { format } => {
            let output = dry_run_status(&config).await?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
                OutputFormat::Summary => {
                    println!("Docent Status");
                    println!("=============");
                    println!("Corpus root: {}", output.corpus_root.display());
                    println!("Supported files: {}", output.files);
                    println!("Manifest entries: {}", output.manifest_entries);
                    println!(
                        "Cache: {}",
                        if output.cache_valid { "current" } else { "stale or missing" }
                    );
                    match (&output.backend, output.backend_reachable) {
                        (Some(url), Some(true)) => println!(
                            "Backend: {url} (reachable, {} points)",
                            output.existing_points.unwrap_or(0)
                        ),
                        (Some(url), _) => println!("Backend: {url} (unreachable; degraded mode)"),
                        (None, _) => println!("Backend: in-memory only"),
                    }
                }
            }
            Ok(())
        }
    }
}

async fn build_pipeline(config: &DocentConfig) -> anyhow::Result<RetrievalPipeline> {
    let embedder = build_embedder(config).await?;
    let backend = build_backend(config)?;
    Ok(RetrievalPipeline::new(config.pipeline_config(), embedder, backend)?)
}

async fn build_embedder(config: &DocentConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    if let Some(model) = &config.provider.local_model {
        #[cfg(feature = "local-embeddings")]
        {
            let provider =
                docent_embed::FastEmbedProvider::create(model, config.embedding.embed_batch_size).await?;
            return Ok(Arc::new(provider));
        }
        #[cfg(not(feature = "local-embeddings"))]
        anyhow::bail!(
            "local embedding model '{model}' requires building with the local-embeddings feature"
        );
    }
    Ok(Arc::new(OpenAiEmbedder::new(config.provider.clone())?))
}

fn build_backend(config: &DocentConfig) -> anyhow::Result<Option<Arc<dyn VectorBackend>>> {
    let Some(url) = &config.store.qdrant_url else {
        return Ok(None);
    };
    let backend = QdrantBackend::new(url.clone(), config.store.qdrant_api_key(), config.store.timeout())?;
    Ok(Some(Arc::new(backend)))
}

async fn dry_run_status(config: &DocentConfig) -> anyhow::Result<StatusOutput> {
    let root = config.corpus.root.clone();
    let files = tokio::task::spawn_blocking(move || scan(&root)).await??;
    let manifest = CacheManifest::load(&config.manifest_path())
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("{}; treating as cache miss", e);
            CacheManifest::new()
        });
    let cache_valid = manifest
        .is_valid_for(&files, config.cache.fingerprint, config.cache.detect_deletions)
        .await;

    let (backend_reachable, existing_points) = match build_backend(config)? {
        Some(backend) => match backend.attach(&config.store.collection).await {
            Ok(attachment) => (
                Some(attachment.store.is_available().await),
                Some(attachment.existing_points),
            ),
            Err(e) => {
                tracing::warn!("Backend check failed: {}", e);
                (Some(false), None)
            }
        },
        None => (None, None),
    };

    Ok(StatusOutput {
        corpus_root: config.corpus.root.clone(),
        files: files.len(),
        manifest_entries: manifest.len(),
        cache_valid,
        backend: config.store.qdrant_url.clone(),
        backend_reachable,
        existing_points,
    })
}
