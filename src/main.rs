//! RAG Evaluator CLI
//!
//! Ingest documents into a vector collection, answer questions over it and
//! score the answers with an LLM judge.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rag_evaluator::{
    catalog::{CUSTOM_MODEL_PROVIDERS, generate_collection_name},
    chunk::{ChunkConfig, TextSplitter},
    config::Config,
    document::{DocumentLoader, collect_files},
    embed::{create_embedder, probe_dimension},
    eval::{
        DataStatistics, EvaluationRunner, LlmJudge, SortBy, add_custom_metric,
        remove_custom_metric, runner::print_result, select_results,
    },
    llm::create_chat_model,
    ocr::OcrReader,
    persistence::{
        default_results_path, default_session_path, load_results, load_session, save_results,
        save_session,
    },
    rag::{Ingestor, RagPipeline},
    session::{CustomModel, ModelRole, Session},
    sheet,
    store::{MemoryStore, MilvusStore, SOURCE_SAMPLE_LIMIT, VectorStore, test_connection},
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// RAG Evaluator - score a retrieval-augmented generation pipeline with an LLM judge
#[derive(Parser)]
#[command(name = "rag-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Session state file (.json or .bin)
    #[arg(long, global = true)]
    session: Option<PathBuf>,

    /// Vector store: "milvus", or "memory:<file>" for a local JSON store
    #[arg(long, global = true, default_value = "milvus")]
    store: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select, show or clear custom models per role
    #[command(subcommand)]
    Models(ModelsCommand),

    /// Inspect the effective configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Test connectivity to a service
    Test {
        /// llm, judge, embedding, ocr or milvus
        target: String,
    },

    /// Manage vector collections
    #[command(subcommand)]
    Collection(CollectionCommand),

    /// Extract and print the text of documents without storing them
    Extract {
        files: Vec<PathBuf>,

        /// Use the OCR model for scanned PDFs
        #[arg(long)]
        ocr: bool,
    },

    /// Review or clear texts remembered from ingestion
    #[command(subcommand)]
    Texts(TextsCommand),

    /// Write a sample spreadsheet
    Template {
        /// "eval" or "questions"
        kind: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load an evaluation spreadsheet and show statistics
    Data { file: PathBuf },

    /// Manage evaluation metrics
    #[command(subcommand)]
    Metrics(MetricsCommand),

    /// Answer every question with RAG and score the answers
    Evaluate {
        /// Spreadsheet with Question, Ground truth and optional Chat history
        file: PathBuf,

        /// Number of questions to process
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Collection to query (defaults to the active one)
        #[arg(long)]
        collection: Option<String>,

        /// Also export the results to this spreadsheet
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Show or export the latest evaluation results
    #[command(subcommand)]
    Results(ResultsCommand),

    /// Generate answers for a spreadsheet of questions
    Generate {
        /// Spreadsheet with a Question column
        file: PathBuf,

        #[arg(short = 'n', long)]
        limit: Option<usize>,

        #[arg(long)]
        collection: Option<String>,

        /// Output spreadsheet (defaults to a timestamped name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// Select a custom model for a role
    Set(SetModelArgs),
    /// Show selected models
    Show,
    /// Clear the selection for a role
    Clear { role: String },
}

#[derive(Args)]
struct SetModelArgs {
    /// embedding, inference, evaluation or ocr
    role: String,

    /// Full model name as listed by the provider
    #[arg(long)]
    name: String,

    #[arg(long)]
    api_key: String,

    #[arg(long, default_value = "DeepInfra")]
    provider: String,

    #[arg(long, default_value_t = 0.1)]
    temperature: f32,

    /// The model only accepts temperature 1.0
    #[arg(long)]
    fixed_temperature: bool,

    /// Embedding dimension, when the provider should not choose
    #[arg(long)]
    dimensions: Option<usize>,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show settings with masked API keys
    Show,
}

#[derive(Subcommand)]
enum CollectionCommand {
    /// Generate a new collection name and make it active
    New {
        #[arg(long)]
        name: Option<String>,
    },
    /// Make an existing collection active
    Use { name: String },
    /// List collections
    List,
    /// List the files stored in a collection
    Files { name: Option<String> },
    /// Extract, split, embed and store documents
    Ingest {
        /// Files or directories
        paths: Vec<PathBuf>,

        #[arg(long)]
        collection: Option<String>,

        /// Use the OCR model for scanned PDFs
        #[arg(long)]
        ocr: bool,
    },
    /// Delete a collection
    Drop { name: String },
}

#[derive(Subcommand)]
enum TextsCommand {
    /// List remembered files
    List,
    /// Print the text of one file
    Show { file: String },
    /// Forget all texts
    Clear,
}

#[derive(Subcommand)]
enum MetricsCommand {
    /// List default and custom metrics
    List,
    /// Add a custom metric
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
    },
    /// Remove a custom metric by id or name
    Remove { metric: String },
}

#[derive(Subcommand)]
enum ResultsCommand {
    /// Print results
    Show {
        #[arg(long, default_value_t = 0.0)]
        min_score: f64,

        /// score, question or timestamp
        #[arg(long, default_value = "score")]
        sort: String,

        /// Print retrieved chunks
        #[arg(long)]
        chunks: bool,

        /// Print chat history
        #[arg(long)]
        history: bool,
    },
    /// Export results to a spreadsheet
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// The vector store selected with `--store`.
enum StoreHandle {
    Milvus(MilvusStore),
    Memory(MemoryStore, PathBuf),
}

impl StoreHandle {
    fn open(spec: &str, config: &Config) -> Result<Self> {
        match spec.strip_prefix("memory:") {
            Some(path) => {
                let path = PathBuf::from(path);
                let store = if path.is_file() {
                    MemoryStore::load(&path).context("Failed to load memory store")?
                } else {
                    MemoryStore::new()
                };
                Ok(StoreHandle::Memory(store, path))
            }
            None if spec == "milvus" => Ok(StoreHandle::Milvus(
                MilvusStore::new(config.milvus.clone()).context("Failed to create Milvus client")?,
            )),
            None => anyhow::bail!("Unknown store '{}'. Use 'milvus' or 'memory:<file>'", spec),
        }
    }

    fn as_store(&self) -> &dyn VectorStore {
        match self {
            StoreHandle::Milvus(store) => store,
            StoreHandle::Memory(store, _) => store,
        }
    }

    fn into_boxed(self) -> Box<dyn VectorStore> {
        match self {
            StoreHandle::Milvus(store) => Box::new(store),
            StoreHandle::Memory(store, _) => Box::new(store),
        }
    }

    /// Write a memory store back to its file.
    fn persist(&self) -> Result<()> {
        if let StoreHandle::Memory(store, path) = self {
            store.save(path).context("Failed to save memory store")?;
        }
        Ok(())
    }
}

/// Loaded state shared by all commands.
struct App {
    config: Config,
    session: Session,
    session_path: PathBuf,
    store_spec: String,
}

impl App {
    fn load(cli: &Cli) -> Result<Self> {
        let base = Config::load_with(cli.config.as_ref()).context("Failed to load configuration")?;
        let session_path = cli.session.clone().unwrap_or_else(default_session_path);
        let session = load_session(&session_path).context("Failed to load session")?;
        let config = session.resolve(&base);
        Ok(Self {
            config,
            session,
            session_path,
            store_spec: cli.store.clone(),
        })
    }

    fn save_session(&self) -> Result<()> {
        save_session(&self.session, &self.session_path).context("Failed to save session")
    }

    /// Re-apply selected models after the session changed.
    fn refresh_config(&mut self, cli: &Cli) -> Result<()> {
        let base = Config::load_with(cli.config.as_ref()).context("Failed to load configuration")?;
        self.config = self.session.resolve(&base);
        Ok(())
    }

    fn open_store(&self) -> Result<StoreHandle> {
        StoreHandle::open(&self.store_spec, &self.config)
    }

    fn loader(&self, ocr: bool) -> Result<DocumentLoader> {
        if !ocr {
            return Ok(DocumentLoader::new());
        }
        if !self.config.ocr.is_configured() {
            anyhow::bail!("OCR requested but no OCR model is configured. Select one with 'models set ocr'");
        }
        let reader = OcrReader::from_config(&self.config.ocr).context("Failed to create OCR model")?;
        Ok(DocumentLoader::with_ocr(reader))
    }

    async fn pipeline(&self, collection: Option<String>) -> Result<RagPipeline> {
        self.config.validate_llm()?;
        self.config.validate_embedding()?;
        let collection = collection.unwrap_or_else(|| self.session.active_collection.clone());
        let store = self.open_store()?;
        if !store.as_store().has_collection(&collection).await? {
            anyhow::bail!(
                "Collection '{}' does not exist. Ingest documents with 'collection ingest' first.",
                collection
            );
        }
        let llm = create_chat_model(&self.config.llm).context("Failed to create LLM")?;
        let embedder = create_embedder(&self.config.embedding)
            .await
            .context("Failed to create embeddings. Please check your configuration.")?;
        Ok(RagPipeline::new(
            llm,
            embedder,
            store.into_boxed(),
            collection,
            self.config.rag.num_chunks,
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rag_evaluator=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut app = App::load(&cli)?;

    match &cli.command {
        Commands::Models(cmd) => cmd_models(&mut app, cmd, &cli),
        Commands::Config(ConfigCommand::Show) => cmd_config(&app),
        Commands::Test { target } => cmd_test(&app, target).await,
        Commands::Collection(cmd) => cmd_collection(&mut app, cmd).await,
        Commands::Extract { files, ocr } => cmd_extract(&mut app, files, *ocr).await,
        Commands::Texts(cmd) => cmd_texts(&mut app, cmd),
        Commands::Template { kind, output } => cmd_template(kind, output.clone()),
        Commands::Data { file } => cmd_data(file),
        Commands::Metrics(cmd) => cmd_metrics(&mut app, cmd),
        Commands::Evaluate {
            file,
            limit,
            collection,
            export,
        } => cmd_evaluate(&app, file, *limit, collection.clone(), export.clone()).await,
        Commands::Results(cmd) => cmd_results(&app, cmd),
        Commands::Generate {
            file,
            limit,
            collection,
            output,
        } => cmd_generate(&app, file, *limit, collection.clone(), output.clone()).await,
    }
}

fn mask(key: &str) -> String {
    if key.is_empty() {
        return "(not set)".to_string();
    }
    let visible: String = key.chars().take(8).collect();
    format!("{}...", visible)
}

fn cmd_models(app: &mut App, cmd: &ModelsCommand, cli: &Cli) -> Result<()> {
    match cmd {
        ModelsCommand::Set(args) => {
            let role: ModelRole = args.role.parse()?;
            let mut model = CustomModel::new(&args.name, &args.api_key, &args.provider, &app.config)
                .with_context(|| {
                    format!("Supported providers: {}", CUSTOM_MODEL_PROVIDERS.join(", "))
                })?;
            model.temperature = args.temperature;
            model.fixed_temperature = args.fixed_temperature;
            model.dimensions = args.dimensions;
            println!("{} set to {} ({})", role.label(), model.name, model.base_url);
            app.session.selected_models.set(role, model);
            app.save_session()?;
            app.refresh_config(cli)
        }
        ModelsCommand::Show => {
            println!("Selected Models");
            println!("{}", "─".repeat(40));
            for role in ModelRole::ALL {
                match app.session.selected_models.get(role) {
                    Some(model) => {
                        println!("  {}: {}", role.label(), model.name);
                        println!("    Provider:    {}", model.provider);
                        println!("    Base URL:    {}", model.base_url);
                        println!("    API Key:     {}", model.masked_key());
                        if role != ModelRole::Embedding && role != ModelRole::Ocr {
                            println!("    Temperature: {}", model.temperature);
                            println!(
                                "    Fixed temperature: {}",
                                if model.fixed_temperature { "Yes" } else { "No" }
                            );
                        }
                        if let Some(dim) = model.dimensions {
                            println!("    Dimensions:  {}", dim);
                        }
                    }
                    None => println!("  {}: (configured default)", role.label()),
                }
            }
            Ok(())
        }
        ModelsCommand::Clear { role } => {
            let role: ModelRole = role.parse()?;
            match app.session.selected_models.clear(role) {
                Some(model) => println!("Cleared {} ({})", role.label(), model.name),
                None => println!("No {} was selected", role.label()),
            }
            app.save_session()
        }
    }
}

fn cmd_config(app: &App) -> Result<()> {
    let c = &app.config;
    println!("Configuration");
    println!("{}", "─".repeat(40));
    let database = if c.milvus.database.is_empty() {
        "default"
    } else {
        &c.milvus.database
    };
    println!("Milvus:     {}:{} (db: {})", c.milvus.host, c.milvus.port, database);
    println!("LLM:        {} ({})", c.llm.display_name(), c.llm.base_url());
    println!("  API Key:  {}", mask(&c.llm.api_key));
    let fixed = if c.llm.fixed_temperature { " (fixed)" } else { "" };
    let temperature = c
        .llm
        .temperature
        .map_or_else(|| "provider default".to_string(), |t| t.to_string());
    println!("  Temp:     {}{}", temperature, fixed);
    println!("Judge:      {} ({})", c.judge.display_name(), c.judge.base_url());
    println!("  API Key:  {}", mask(&c.judge.api_key));
    println!("Embedding:  {} - {}", c.embedding.provider, c.embedding.model);
    println!("  API Key:  {}", mask(&c.embedding.api_key));
    if c.ocr.is_configured() {
        println!("OCR:        {}", c.ocr.model);
    } else {
        println!("OCR:        (not configured)");
    }
    println!(
        "RAG:        {} chunks, size {}, overlap {}",
        c.rag.num_chunks, c.rag.chunk_size, c.rag.chunk_overlap
    );
    println!("{}", "─".repeat(40));
    println!("Active collection: {}", app.session.active_collection);
    println!("Session file:      {}", app.session_path.display());
    if let Some(path) = Config::config_file_path() {
        println!("Config file:       {}", path.display());
    }
    Ok(())
}

async fn cmd_test(app: &App, target: &str) -> Result<()> {
    let config = &app.config;
    match target {
        "llm" | "judge" => {
            let llm = if target == "llm" { &config.llm } else { &config.judge };
            println!("Testing {}...", llm.display_name());
            println!("  API Base: {}", llm.base_url());
            println!("  API Key:  {}", mask(&llm.api_key));
            if llm.api_key.is_empty() {
                println!("Configuration error: API key is not set");
                println!("Tip: {}", llm.provider.key_hint());
                return Ok(());
            }
            let model = create_chat_model(llm)?;
            match model.test_connection().await {
                Ok(()) => println!("Connection successful!"),
                Err(e) => {
                    println!("Connection failed: {}", e);
                    println!("Tip: {}", llm.provider.key_hint());
                }
            }
        }
        "embedding" => {
            config.validate_embedding()?;
            println!(
                "Testing {} - {}...",
                config.embedding.provider, config.embedding.model
            );
            let embedder = create_embedder(&config.embedding).await?;
            match probe_dimension(embedder.as_ref()).await {
                Ok(dim) => println!("Connection successful! Dimensions: {}", dim),
                Err(e) => println!("Connection failed: {}", e),
            }
        }
        "ocr" => {
            if !config.ocr.is_configured() {
                println!("No OCR model configured. Select one with 'models set ocr'.");
                return Ok(());
            }
            let model = create_chat_model(&config.ocr.to_llm_config())?;
            println!("Testing {}...", model.describe());
            match model.test_connection().await {
                Ok(()) => println!("Connection successful!"),
                Err(e) => println!("Connection failed: {}", e),
            }
        }
        "milvus" => {
            println!("Testing Milvus at {}:{}...", config.milvus.host, config.milvus.port);
            match test_connection(&config.milvus).await {
                Ok(message) => println!("{}", message),
                Err(e) => println!("{}", e),
            }
        }
        other => anyhow::bail!(
            "Unknown test target '{}'. Use llm, judge, embedding, ocr or milvus",
            other
        ),
    }
    Ok(())
}

async fn cmd_collection(app: &mut App, cmd: &CollectionCommand) -> Result<()> {
    match cmd {
        CollectionCommand::New { name } => {
            let name = name.clone().unwrap_or_else(generate_collection_name);
            app.session.active_collection = name.clone();
            app.save_session()?;
            println!("Active collection: {}", name);
            println!("Add documents with: rag-eval collection ingest <files>");
        }
        CollectionCommand::Use { name } => {
            let store = app.open_store()?;
            if !store.as_store().has_collection(name).await? {
                anyhow::bail!("Collection '{}' does not exist", name);
            }
            let files = store
                .as_store()
                .list_sources(name, SOURCE_SAMPLE_LIMIT)
                .await
                .context("Failed to list collection files")?;
            if !files.is_empty() {
                println!("Found {} files in the collection", files.len());
            }
            app.session
                .collection_files
                .insert(name.clone(), files);
            app.session.active_collection = name.clone();
            app.save_session()?;
            println!("Connected to collection: {}", name);
        }
        CollectionCommand::List => {
            let store = app.open_store()?;
            let names = store.as_store().list_collections().await?;
            if names.is_empty() {
                println!("No collections found.");
            }
            for name in names {
                let marker = if name == app.session.active_collection { "*" } else { " " };
                let count = store.as_store().count(&name).await.unwrap_or(0);
                println!("{} {} ({} chunks)", marker, name, count);
            }
        }
        CollectionCommand::Files { name } => {
            let name = name.clone().unwrap_or_else(|| app.session.active_collection.clone());
            let files = match app.session.collection_files.get(&name) {
                Some(files) if !files.is_empty() => files.clone(),
                _ => {
                    let store = app.open_store()?;
                    store.as_store().list_sources(&name, SOURCE_SAMPLE_LIMIT).await?
                }
            };
            println!("Files in collection '{}':", name);
            for file in &files {
                println!("  - {}", file);
            }
            if files.is_empty() {
                println!("  (none)");
            }
        }
        CollectionCommand::Ingest {
            paths,
            collection,
            ocr,
        } => {
            app.config.validate_embedding()?;
            app.config.validate_rag()?;
            let collection = collection
                .clone()
                .unwrap_or_else(|| app.session.active_collection.clone());
            let files = collect_files(paths)?;
            if files.is_empty() {
                anyhow::bail!("No supported files found (pdf, docx, txt, md)");
            }

            let loader = app.loader(*ocr)?;
            let splitter = TextSplitter::new(ChunkConfig::new(
                app.config.rag.chunk_size,
                app.config.rag.chunk_overlap,
            )?);
            let embedder = create_embedder(&app.config.embedding)
                .await
                .context("Failed to create embeddings. Please check your configuration.")?;
            let store = app.open_store()?;

            println!("Processing {} files into '{}'...", files.len(), collection);
            let start = Instant::now();
            let report = Ingestor {
                loader: &loader,
                splitter: &splitter,
                embedder: embedder.as_ref(),
                store: store.as_store(),
            }
            .ingest(&files, &collection)
            .await
            .context("Ingestion failed")?;
            store.persist()?;

            for file in &report.files {
                println!("  Processed: {}", file);
            }
            for (file, reason) in &report.skipped {
                println!("  Skipped:   {} ({})", file, reason);
            }
            println!(
                "\nCreated collection '{}' with {} chunks from {} documents in {:.2?}",
                collection,
                report.chunks,
                report.documents.len(),
                start.elapsed()
            );

            app.session.record_ingest(&collection, &report.documents);
            app.save_session()?;
        }
        CollectionCommand::Drop { name } => {
            let store = app.open_store()?;
            store.as_store().drop_collection(name).await?;
            store.persist()?;
            app.session.forget_collection(name);
            app.save_session()?;
            println!("Dropped collection '{}'", name);
        }
    }
    Ok(())
}

async fn cmd_extract(app: &mut App, paths: &[PathBuf], ocr: bool) -> Result<()> {
    let loader = app.loader(ocr)?;
    for path in collect_files(paths)? {
        match loader.load(&path).await {
            Ok(doc) => {
                println!("===== {} ({} chars) =====", doc.source, doc.text.chars().count());
                println!("{}", doc.text);
                app.session.extracted_texts.insert(doc.source, doc.text);
            }
            Err(e) => eprintln!("Error reading {}: {}", path.display(), e),
        }
    }
    app.save_session()
}

fn cmd_texts(app: &mut App, cmd: &TextsCommand) -> Result<()> {
    match cmd {
        TextsCommand::List => {
            if app.session.extracted_texts.is_empty() {
                println!("No extracted texts.");
            }
            for (file, text) in &app.session.extracted_texts {
                println!("{} ({} chars)", file, text.chars().count());
            }
        }
        TextsCommand::Show { file } => match app.session.extracted_texts.get(file) {
            Some(text) => println!("{}", text),
            None => anyhow::bail!("No extracted text for '{}'", file),
        },
        TextsCommand::Clear => {
            app.session.extracted_texts.clear();
            app.save_session()?;
            println!("Cleared all extracted texts");
        }
    }
    Ok(())
}

fn cmd_template(kind: &str, output: Option<PathBuf>) -> Result<()> {
    let path = match kind {
        "eval" | "evaluation" => {
            let path = output.unwrap_or_else(|| PathBuf::from("evaluation_template.xlsx"));
            sheet::write_eval_template(&path)?;
            path
        }
        "questions" => {
            let path = output.unwrap_or_else(|| PathBuf::from("rag_generation_template.xlsx"));
            sheet::write_questions_template(&path)?;
            path
        }
        other => anyhow::bail!("Unknown template '{}'. Use eval or questions", other),
    };
    println!("Template written to {}", path.display());
    Ok(())
}

fn cmd_data(file: &Path) -> Result<()> {
    let rows = sheet::read_eval_rows(file).context("Failed to read evaluation data")?;
    println!("Evaluation file loaded successfully!\n");
    for (i, row) in rows.iter().take(10).enumerate() {
        println!("{:>3}. {}", i + 1, row.question);
    }
    if rows.len() > 10 {
        println!("     ... {} more", rows.len() - 10);
    }
    println!("\nEvaluation Data Statistics");
    println!("{}", "─".repeat(40));
    DataStatistics::from_rows(&rows).print();
    Ok(())
}

fn cmd_metrics(app: &mut App, cmd: &MetricsCommand) -> Result<()> {
    match cmd {
        MetricsCommand::List => {
            println!("Default Metrics");
            for metric in app.session.metric_set().iter() {
                if app.session.custom_metrics.iter().any(|m| m.id == metric.id) {
                    continue;
                }
                println!("  {} ({})\n    {}", metric.name, metric.id, metric.description);
            }
            if !app.session.custom_metrics.is_empty() {
                println!("\nCustom Metrics");
                for metric in &app.session.custom_metrics {
                    println!("  {} ({})\n    {}", metric.name, metric.id, metric.description);
                }
            }
        }
        MetricsCommand::Add { name, description } => {
            let metric = add_custom_metric(&mut app.session.custom_metrics, name, description)?;
            app.save_session()?;
            println!("Added custom metric: {} ({})", metric.name, metric.id);
        }
        MetricsCommand::Remove { metric } => {
            let removed = remove_custom_metric(&mut app.session.custom_metrics, metric)?;
            app.save_session()?;
            println!("Removed custom metric: {}", removed.name);
        }
    }
    Ok(())
}

async fn cmd_evaluate(
    app: &App,
    file: &Path,
    limit: Option<usize>,
    collection: Option<String>,
    export: Option<PathBuf>,
) -> Result<()> {
    let rows = sheet::read_eval_rows(file).context("Failed to read evaluation data")?;
    app.config
        .validate_judge()
        .with_context(|| format!("Tip: {}", app.config.judge.provider.key_hint()))?;

    let pipeline = app.pipeline(collection).await?;
    let judge = LlmJudge::from_config(&app.config.judge).context("Failed to create judge")?;
    let runner = EvaluationRunner::new(pipeline, judge, app.session.metric_set());

    println!("LLM:        {}", app.config.llm.display_name());
    println!("Judge:      {}", app.config.judge.display_name());
    println!("Embedding:  {} - {}", app.config.embedding.provider, app.config.embedding.model);

    let report = runner.run(&rows, limit).await?;
    report.print_summary(runner.metrics());

    let results_path = default_results_path();
    save_results(&report.results, &results_path).context("Failed to save results")?;
    println!("Results saved to {}", results_path.display());

    if let Some(path) = export {
        sheet::export_results(&report.results, runner.metrics(), &path)?;
        println!("Exported to {}", path.display());
    }
    Ok(())
}

fn cmd_results(app: &App, cmd: &ResultsCommand) -> Result<()> {
    let results = load_results(&default_results_path()).context("Failed to load results")?;
    if results.is_empty() {
        println!("No evaluation results available. Please run evaluation first.");
        return Ok(());
    }
    let metrics = app.session.metric_set();

    match cmd {
        ResultsCommand::Show {
            min_score,
            sort,
            chunks,
            history,
        } => {
            let sort: SortBy = sort.parse()?;
            let selected = select_results(&results, *min_score, sort);
            for (i, result) in selected.iter().enumerate() {
                print_result(i + 1, result, &metrics, *chunks, *history);
            }
            println!("\nShowing {} of {} results", selected.len(), results.len());
        }
        ResultsCommand::Export { output } => {
            let path = output.clone().unwrap_or_else(sheet::default_results_filename);
            sheet::export_results(&results, &metrics, &path)?;
            println!("Exported {} results to {}", results.len(), path.display());
        }
    }
    Ok(())
}

async fn cmd_generate(
    app: &App,
    file: &Path,
    limit: Option<usize>,
    collection: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let questions = sheet::read_questions(file).context("Failed to read questions")?;
    if questions.is_empty() {
        anyhow::bail!("No questions found in {}", file.display());
    }
    println!("Found {} questions.", questions.len());
    if questions.iter().any(|q| !q.chat_history.is_empty()) {
        println!("Found 'Chat history' column - used as context for the answers.");
    }

    let pipeline = app.pipeline(collection).await?;
    println!("Connected to collection: {}", pipeline.collection());

    let report = pipeline.generate_answers(&questions, limit).await;
    report.print_summary();

    let path = output.unwrap_or_else(sheet::default_answers_filename);
    sheet::export_answers(&report, &path)?;
    println!("Answers written to {}", path.display());
    Ok(())
}
