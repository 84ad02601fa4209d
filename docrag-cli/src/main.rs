use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use docrag::gemini::{GeminiClient, GeminiEmbeddingProvider, TaskType};
use docrag::openai::{OpenAIClient, OpenAIEmbeddingProvider};
use docrag::qdrant::QdrantVectorIndex;
use docrag::{
    EmbeddingProvider, InMemoryVectorIndex, LlmClient, RagConfig, RagPipeline, VectorIndex,
};
use tracing_subscriber::EnvFilter;

mod chat;
mod display;

#[derive(Parser)]
#[command(name = "docrag", version)]
#[command(about = "Ask questions about your PDF and text documents")]
struct Cli {
    /// Embedding and generation provider
    #[arg(long, value_enum, env = "DOCRAG_PROVIDER", default_value = "gemini")]
    provider: Provider,

    /// Vector index backend. `memory` lasts only for this process.
    #[arg(long, value_enum, env = "DOCRAG_STORE", default_value = "memory")]
    store: Store,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Qdrant gRPC endpoint
    #[arg(long, env = "QDRANT_URL", default_value = docrag::qdrant::DEFAULT_URL)]
    qdrant_url: String,

    /// Qdrant API key
    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true)]
    qdrant_api_key: Option<String>,

    /// Vector index name
    #[arg(long, env = "DOCRAG_INDEX", default_value = "vector_index")]
    index: String,

    /// Embedding dimensionality of the index
    #[arg(long, env = "DOCRAG_DIMENSIONS", default_value_t = 768)]
    dimensions: usize,

    /// Chunk size in characters
    #[arg(long, env = "DOCRAG_CHUNK_SIZE", default_value_t = 400)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, env = "DOCRAG_CHUNK_OVERLAP", default_value_t = 20)]
    chunk_overlap: usize,

    /// Number of chunks retrieved per question
    #[arg(long, env = "DOCRAG_TOP_K", default_value_t = 5)]
    top_k: usize,

    /// Minimum similarity score for a retrieved chunk
    #[arg(long, env = "DOCRAG_THRESHOLD", default_value_t = 0.0)]
    threshold: f32,

    /// Embedding model override
    #[arg(long, env = "DOCRAG_EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Generation model override
    #[arg(long, env = "DOCRAG_GENERATION_MODEL")]
    generation_model: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Provider {
    Gemini,
    Openai,
}

#[derive(Clone, Copy, ValueEnum)]
enum Store {
    Memory,
    Qdrant,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vector index, or check an existing one matches the settings
    InitIndex,
    /// Load, chunk and index documents
    Ingest {
        /// PDF, text or markdown files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Answer a single question
    Ask {
        /// The question
        question: String,
        /// Files to ingest first
        #[arg(long = "ingest")]
        ingest: Vec<PathBuf>,
    },
    /// Interactive question loop
    Chat {
        /// Files to ingest first
        #[arg(long = "ingest")]
        ingest: Vec<PathBuf>,
    },
    /// Remove records from the index
    Delete {
        /// Chunk ids to delete
        ids: Vec<String>,
        /// Delete every chunk of this document id instead
        #[arg(long, conflicts_with = "ids")]
        document: Option<String>,
    },
}

impl Cli {
    fn config(&self) -> Result<RagConfig> {
        RagConfig::builder()
            .index_name(self.index.clone())
            .embedding_dimensions(self.dimensions)
            .chunk_size(self.chunk_size)
            .chunk_overlap(self.chunk_overlap)
            .top_k(self.top_k)
            .similarity_threshold(self.threshold)
            .build()
            .context("invalid configuration")
    }

    fn gemini_embedder(&self, task_type: TaskType) -> Result<Arc<dyn EmbeddingProvider>> {
        let api_key = key(self.gemini_api_key.as_deref(), "GEMINI_API_KEY")?;
        let mut provider = GeminiEmbeddingProvider::new(api_key)?.with_task_type(task_type);
        if let Some(model) = &self.embedding_model {
            provider = provider.with_model(model);
        }
        if self.dimensions != provider.dimensions() {
            provider = provider.with_output_dimensionality(self.dimensions);
        }
        Ok(Arc::new(provider))
    }

    /// Document-side and query-side embedding providers.
    fn embedders(&self) -> Result<(Arc<dyn EmbeddingProvider>, Arc<dyn EmbeddingProvider>)> {
        match self.provider {
            Provider::Gemini => Ok((
                self.gemini_embedder(TaskType::RetrievalDocument)?,
                self.gemini_embedder(TaskType::RetrievalQuery)?,
            )),
            Provider::Openai => {
                let api_key = key(self.openai_api_key.as_deref(), "OPENAI_API_KEY")?;
                let mut provider =
                    OpenAIEmbeddingProvider::new(api_key)?.with_dimensions(self.dimensions);
                if let Some(model) = &self.embedding_model {
                    provider = provider.with_model(model);
                }
                let provider: Arc<dyn EmbeddingProvider> = Arc::new(provider);
                Ok((provider.clone(), provider))
            }
        }
    }

    fn llm(&self) -> Result<Arc<dyn LlmClient>> {
        Ok(match self.provider {
            Provider::Gemini => {
                let api_key = key(self.gemini_api_key.as_deref(), "GEMINI_API_KEY")?;
                let mut client = GeminiClient::new(api_key)?;
                if let Some(model) = &self.generation_model {
                    client = client.with_model(model);
                }
                Arc::new(client)
            }
            Provider::Openai => {
                let api_key = key(self.openai_api_key.as_deref(), "OPENAI_API_KEY")?;
                let mut client = OpenAIClient::new(api_key)?;
                if let Some(model) = &self.generation_model {
                    client = client.with_model(model);
                }
                Arc::new(client)
            }
        })
    }

    fn vector_index(&self) -> Result<Arc<dyn VectorIndex>> {
        Ok(match self.store {
            Store::Memory => Arc::new(InMemoryVectorIndex::new()),
            Store::Qdrant => {
                Arc::new(QdrantVectorIndex::new(&self.qdrant_url, self.qdrant_api_key.clone())?)
            }
        })
    }

    fn pipeline(&self) -> Result<RagPipeline> {
        let (documents, queries) = self.embedders()?;
        Ok(RagPipeline::builder()
            .config(self.config()?)
            .embedding_provider(documents)
            .query_embedding_provider(queries)
            .vector_index(self.vector_index()?)
            .llm(self.llm()?)
            .build()?)
    }
}

fn key(value: Option<&str>, var: &str) -> Result<String> {
    match value {
        Some(key) if !key.trim().is_empty() => Ok(key.to_string()),
        _ => bail!("{var} must be set (flag, environment or .env file)"),
    }
}

async fn ingest_all(pipeline: &RagPipeline, paths: &[PathBuf], json: bool) -> Result<()> {
    for path in paths {
        let report = pipeline
            .ingest_path(path)
            .await
            .with_context(|| format!("failed to ingest {}", path.display()))?;
        display::report(&report, json)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docrag=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let pipeline = cli.pipeline()?;

    match cli.command {
        Commands::InitIndex => {
            let info = pipeline.create_or_verify_index().await?;
            display::index_info(&info, cli.json)?;
        }
        Commands::Ingest { paths } => {
            pipeline.create_or_verify_index().await?;
            ingest_all(&pipeline, &paths, cli.json).await?;
        }
        Commands::Ask { question, ingest } => {
            pipeline.create_or_verify_index().await?;
            ingest_all(&pipeline, &ingest, cli.json).await?;
            let answer = pipeline.ask(&question).await?;
            display::answer(&answer, cli.json)?;
        }
        Commands::Chat { ingest } => {
            pipeline.create_or_verify_index().await?;
            ingest_all(&pipeline, &ingest, cli.json).await?;
            chat::run(&pipeline).await?;
        }
        Commands::Delete { ids, document } => match document {
            Some(document) => {
                let removed = pipeline.delete_document(&document).await?;
                println!("Deleted {removed} chunk(s) of '{document}'");
            }
            None if !ids.is_empty() => {
                let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
                pipeline.delete_records(&refs).await?;
                println!("Deleted {} record(s)", ids.len());
            }
            None => bail!("pass chunk ids or --document"),
        },
    }

    Ok(())
}
