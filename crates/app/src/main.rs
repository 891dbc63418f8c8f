use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use paper_rag_core::{
    cited_numbers, load_api_key, load_env_file, AnswerPipeline, ArtifactStore,
    CharacterNgramEmbedder, EmbeddingService, FallbackGenerator, IndexLifecycle, IndexOrigin,
    LlmTableAgent, OpenAiChatModel, OpenAiEmbeddings, RagConfig, RetrievedRecord, Table,
    TabularAgentService, VectorIndex,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "paper-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Args)]
struct Settings {
    /// Maximum characters per chunk.
    #[arg(long, global = true, env = "CHUNK_SIZE", default_value = "1000")]
    chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, global = true, env = "CHUNK_OVERLAP", default_value = "200")]
    chunk_overlap: usize,

    /// Number of chunks retrieved per question.
    #[arg(long, global = true, env = "RETRIEVAL_K", default_value = "4")]
    retrieval_k: usize,

    /// Embedding model; names starting with `local-ngram` run offline.
    #[arg(long, global = true, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-large")]
    embedding_model: String,

    /// Primary chat model.
    #[arg(long, global = true, env = "LLM_MODEL", default_value = "gpt-4o")]
    llm_model: String,

    /// Chat model tried when the primary fails.
    #[arg(long, global = true, env = "LLM_FALLBACK", default_value = "gpt-4o-mini")]
    llm_fallback: String,

    #[arg(long, global = true, env = "LLM_TEMPERATURE", default_value = "0.0")]
    temperature: f32,

    /// Folder of PDFs to index.
    #[arg(long, global = true, env = "PAPERS_DIR", default_value = "data/papers")]
    papers_dir: PathBuf,

    #[arg(long, global = true, env = "INDEX_DIR", default_value = "data/index")]
    index_dir: PathBuf,

    #[arg(long, global = true, env = "INDEX_NAME", default_value = "paper_index")]
    index_name: String,

    /// Where tables and figures are written.
    #[arg(long, global = true, env = "ARTIFACTS_DIR", default_value = "artifacts")]
    artifacts_dir: PathBuf,
}

impl Settings {
    fn into_config(self) -> RagConfig {
        RagConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            retrieval_k: self.retrieval_k,
            embedding_model: self.embedding_model,
            generation_model: self.llm_model,
            generation_fallback_model: self.llm_fallback,
            temperature: self.temperature,
            document_dir: self.papers_dir,
            index_dir: self.index_dir,
            index_name: self.index_name,
            artifacts_dir: self.artifacts_dir,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Load the persisted index, or build it from the papers folder.
    Index {
        /// Rebuild even when a matching index is on disk.
        #[arg(long, default_value_t = false)]
        rebuild: bool,
    },
    /// Answer a question from the indexed papers with numbered citations.
    Ask {
        #[arg(long)]
        question: String,
        /// Print every retrieved chunk, not only the cited ones.
        #[arg(long, default_value_t = false)]
        all_sources: bool,
    },
    /// Answer a question about a CSV table.
    AskTable {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        question: String,
        /// Rows of the table shown to the model.
        #[arg(long, default_value = "50")]
        preview_rows: usize,
    },
    /// Copy a CSV table, or its column summary, into the artifacts folder.
    ExportTable {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "summary_stats.csv")]
        filename: String,
        /// Write per-column statistics instead of the rows.
        #[arg(long, default_value_t = false)]
        describe: bool,
    },
    /// Plot one numeric column of a CSV table as an SVG line chart.
    Plot {
        #[arg(long)]
        csv: PathBuf,
        /// Column plotted on the y axis.
        #[arg(long)]
        y: String,
        /// Numeric column for the x axis; row position when omitted.
        #[arg(long)]
        x: Option<String>,
        #[arg(long, default_value = "figure.svg")]
        filename: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    load_env_file();
    let cli = Cli::parse();
    let config = cli.settings.into_config();
    config.validate()?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "paper-rag boot"
    );

    match cli.command {
        Command::Index { rebuild } => {
            config.ensure_directories()?;
            let embedder = embedder_for(&config)?;
            let mut lifecycle = IndexLifecycle::new(config, embedder)?;
            let index = if rebuild {
                lifecycle.rebuild().await?
            } else {
                lifecycle.get_or_build().await?
            };
            let (records, dimension) = (index.len(), index.dimension());
            let verb = match lifecycle.origin() {
                Some(IndexOrigin::Loaded) => "loaded",
                _ => "built",
            };
            println!("{verb} index with {records} chunks (dimension {dimension})");
        }
        Command::Ask {
            question,
            all_sources,
        } => {
            config.ensure_directories()?;
            let embedder = embedder_for(&config)?;
            let api_key = load_api_key()?;
            let generator = FallbackGenerator::from_models(
                &api_key,
                &config.generation_model,
                &config.generation_fallback_model,
                config.temperature,
            )?;
            let retrieval_k = config.retrieval_k;
            let index = ready_index(config, embedder.clone()).await?;

            let pipeline = AnswerPipeline::new(&index, embedder, Arc::new(generator), retrieval_k)?;
            let (answer, retrieved) = pipeline.answer_with_sources(&question).await?;

            println!("{answer}");
            print_sources(&answer, &retrieved, all_sources);
        }
        Command::AskTable {
            csv,
            question,
            preview_rows,
        } => {
            let table = read_table(&csv)?;
            let api_key = load_api_key()?;
            let model =
                OpenAiChatModel::new(&api_key, &config.generation_model, config.temperature)?;
            let agent = LlmTableAgent::new(Arc::new(model)).with_preview_rows(preview_rows);

            println!("{}", agent.ask(&table, &question).await?);
        }
        Command::ExportTable {
            csv,
            filename,
            describe,
        } => {
            let table = read_table(&csv)?;
            let table = if describe { summary_table(&table)? } else { table };
            let store = ArtifactStore::new(&config.artifacts_dir)?;
            let path = store.save_table(&table, &filename)?;
            println!("saved table to {}", path.display());
        }
        Command::Plot {
            csv,
            y,
            x,
            filename,
        } => {
            let table = read_table(&csv)?;
            let points = chart_points(&table, x.as_deref(), &y)?;
            let store = ArtifactStore::new(&config.artifacts_dir)?;
            let path = store.save_line_chart(&points, &filename)?;
            println!("saved figure to {}", path.display());
        }
    }

    Ok(())
}

fn embedder_for(config: &RagConfig) -> anyhow::Result<Arc<dyn EmbeddingService>> {
    if config.uses_local_embeddings() {
        let embedder = CharacterNgramEmbedder::from_model_name(&config.embedding_model)
            .ok_or_else(|| anyhow!("unknown local embedding model {}", config.embedding_model))?;
        return Ok(Arc::new(embedder));
    }
    let api_key = load_api_key()?;
    let embedder = OpenAiEmbeddings::new(api_key, config.embedding_model.clone())?;
    Ok(Arc::new(embedder))
}

async fn ready_index(
    config: RagConfig,
    embedder: Arc<dyn EmbeddingService>,
) -> anyhow::Result<VectorIndex> {
    let mut lifecycle = IndexLifecycle::new(config, embedder)?;
    lifecycle.get_or_build().await?;
    lifecycle
        .into_index()
        .ok_or_else(|| anyhow!("index lifecycle finished without an index"))
}

fn print_sources(answer: &str, retrieved: &[RetrievedRecord], all_sources: bool) {
    let cited = cited_numbers(answer);
    let shown: Vec<&RetrievedRecord> = retrieved
        .iter()
        .filter(|hit| all_sources || cited.contains(&hit.rank))
        .collect();
    if shown.is_empty() {
        return;
    }

    println!("\nSources:");
    for hit in shown {
        let source = hit.record.source_path.as_deref().unwrap_or("unknown");
        let page = hit
            .record
            .page_number
            .map(|page| page.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("  [{}] {source}, p.{page} (score={:.4})", hit.rank, hit.score);
    }
}

fn read_table(path: &std::path::Path) -> anyhow::Result<Table> {
    Table::from_csv_path(path).with_context(|| format!("reading table {}", path.display()))
}

fn summary_table(table: &Table) -> anyhow::Result<Table> {
    let rows = table
        .describe()
        .into_iter()
        .map(|column| {
            let (min, max, mean) = match column.numeric {
                Some(stats) => (
                    stats.min.to_string(),
                    stats.max.to_string(),
                    format!("{:.4}", stats.mean),
                ),
                None => (String::new(), String::new(), String::new()),
            };
            vec![column.name, column.non_empty.to_string(), min, max, mean]
        })
        .collect();
    let headers = ["column", "count", "min", "max", "mean"]
        .into_iter()
        .map(String::from)
        .collect();
    Ok(Table::new(headers, rows)?)
}

fn chart_points(table: &Table, x: Option<&str>, y: &str) -> anyhow::Result<Vec<(f64, f64)>> {
    let ys = table.numeric_column(y)?;
    let points: Vec<(f64, f64)> = match x {
        None => ys.into_iter().map(|(row, value)| (row as f64, value)).collect(),
        Some(x) => {
            let xs: std::collections::HashMap<usize, f64> =
                table.numeric_column(x)?.into_iter().collect();
            ys.into_iter()
                .filter_map(|(row, value)| xs.get(&row).map(|x| (*x, value)))
                .collect()
        }
    };
    if points.is_empty() {
        return Err(anyhow!("column {y} has no numeric values to plot"));
    }
    Ok(points)
}
