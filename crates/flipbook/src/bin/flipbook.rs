//! Operator CLI over the conversion pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use flipbook::config::{self, Config};
use flipbook::db::{self, Database, DocumentStore, SqliteDocumentStore};
use flipbook::document::{Document, DocumentId, DocumentStatus};
use flipbook::logging::{self, LogFormat};
use flipbook::pipeline::{Pipeline, PipelineConfig, ProcessingOutcome};
use flipbook::storage::{FileStorage, LocalFileStorage};

#[derive(Parser, Debug)]
#[command(name = "flipbook", version, about = "Convert PDF documents into flipbook page images")]
struct Cli {
    /// Config file (JSON or YAML)
    #[arg(short, long, env = "FLIPBOOK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a PDF and create a pending document
    Add {
        pdf: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
        /// Process immediately after adding
        #[arg(long)]
        process: bool,
    },
    /// Process a document
    Process { id: i64 },
    /// Discard generated pages and convert again
    Reprocess { id: i64 },
    /// Delete generated pages and reset the document to pending
    DeleteImages { id: i64 },
    /// Delete a document and its generated pages
    Delete { id: i64 },
    /// Show a document
    Show {
        id: i64,
        /// Print the full document as JSON
        #[arg(long)]
        json: bool,
    },
    /// List documents
    List {
        #[arg(long)]
        status: Option<DocumentStatus>,
    },
    /// Print document statistics
    Stats,
    /// Process all pending documents in parallel
    ProcessPending {
        /// Defaults to the configured worker count
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Mark documents stuck in processing as failed
    Recover {
        /// Defaults to processing.stale_after_secs
        #[arg(long)]
        max_age_secs: Option<u64>,
    },
}

struct App {
    config: Config,
    store: Arc<dyn DocumentStore>,
    storage: Arc<dyn FileStorage>,
    pipeline: Arc<Pipeline>,
}

impl App {
    fn open(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => config::load_config(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default(),
        };

        let db_path = match &config.database_path {
            Some(path) => path.clone(),
            None => db::default_database_path().context("cannot determine home directory")?,
        };
        let database = Database::open(&db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;

        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(database));
        let storage: Arc<dyn FileStorage> = Arc::new(LocalFileStorage::new(
            &config.storage.root,
            config.storage.public_base_url.clone(),
        ));
        let pipeline_config = Arc::new(PipelineConfig::from_config(&config));
        let pipeline = Arc::new(Pipeline::from_config(
            pipeline_config,
            Arc::clone(&store),
            Arc::clone(&storage),
        ));

        Ok(Self {
            config,
            store,
            storage,
            pipeline,
        })
    }

    fn load(&self, id: i64) -> Result<Document> {
        self.store
            .find_by_id(DocumentId(id))?
            .with_context(|| format!("document {} not found", id))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Human
    };
    logging::init_logging(format, filter)?;

    let app = App::open(cli.config.as_deref())?;

    match cli.command {
        Command::Add {
            pdf,
            title,
            description,
            process,
        } => cmd_add(&app, &pdf, title, description, process),
        Command::Process { id } => {
            let mut doc = app.load(id)?;
            let outcome = app.pipeline.process_document(&mut doc);
            report_outcome(&doc, outcome)
        }
        Command::Reprocess { id } => {
            let mut doc = app.load(id)?;
            let outcome = app.pipeline.reprocess_document(&mut doc);
            report_outcome(&doc, outcome)
        }
        Command::DeleteImages { id } => {
            let mut doc = app.load(id)?;
            let report = app.pipeline.delete_processed_images(&mut doc)?;
            println!(
                "Document {}: {} files deleted, {} shared kept, {} already missing, {} failed",
                id, report.deleted, report.shared, report.missing, report.failed
            );
            Ok(())
        }
        Command::Delete { id } => {
            let mut doc = app.load(id)?;
            let report = app.pipeline.delete_document(&mut doc)?;
            println!("Deleted document {} ({} files removed)", id, report.deleted);
            Ok(())
        }
        Command::Show { id, json } => {
            let doc = app.load(id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print_document(&doc);
            }
            Ok(())
        }
        Command::List { status } => {
            let docs = match status {
                Some(status) => app.store.find_by_status(status)?,
                None => app.store.find_all()?,
            };
            for doc in &docs {
                println!(
                    "{:>6}  {:<10}  {:>4} pages  {}",
                    doc.id.map(|id| id.to_string()).unwrap_or_default(),
                    doc.status,
                    doc.total_pages,
                    doc.title
                );
            }
            Ok(())
        }
        Command::Stats => {
            let stats = app.store.statistics()?;
            println!("Documents:      {}", stats.total);
            for status in DocumentStatus::ALL {
                println!("  {:<12}  {}", status.as_str(), stats.count(status));
            }
            println!("Total size:     {} bytes", stats.total_file_size);
            match stats.average_processing_time_ms {
                Some(avg) => println!("Avg processing: {:.0} ms", avg),
                None => println!("Avg processing: n/a"),
            }
            Ok(())
        }
        Command::ProcessPending { workers } => {
            let workers = workers.unwrap_or(app.config.worker_count);
            let report = app.pipeline.process_pending(workers)?;
            println!(
                "{} submitted, {} succeeded, {} failed",
                report.submitted, report.succeeded, report.failed
            );
            if report.failed > 0 {
                bail!("{} documents failed", report.failed);
            }
            Ok(())
        }
        Command::Recover { max_age_secs } => {
            let recovered = app
                .pipeline
                .recover_stale(max_age_secs.map(Duration::from_secs))?;
            println!("Recovered {} stale documents", recovered.len());
            for id in recovered {
                println!("  {}", id);
            }
            Ok(())
        }
    }
}

fn cmd_add(
    app: &App,
    pdf: &Path,
    title: Option<String>,
    description: String,
    process: bool,
) -> Result<()> {
    let filename = pdf
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("invalid file name: {}", pdf.display()))?;
    let title = title.unwrap_or_else(|| {
        pdf.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string())
    });

    let stored = app
        .storage
        .store(pdf, &app.config.storage.sources_folder, filename)
        .with_context(|| format!("uploading {}", pdf.display()))?;

    let mut doc = Document::new(title, Some(stored.identifier)).with_description(description);
    let id = app.store.save(&mut doc)?;
    println!("Added document {} ({})", id, stored.public_url);

    if process {
        let outcome = app.pipeline.process_document(&mut doc);
        return report_outcome(&doc, outcome);
    }
    Ok(())
}

fn report_outcome(
    doc: &Document,
    outcome: std::result::Result<ProcessingOutcome, flipbook::pipeline::PipelineError>,
) -> Result<()> {
    match outcome {
        Ok(ProcessingOutcome::Converted {
            backend,
            pages,
            elapsed_ms,
        }) => {
            println!("Converted {} pages with {} in {} ms", pages, backend, elapsed_ms);
            Ok(())
        }
        Ok(ProcessingOutcome::Deduplicated { source, pages, .. }) => {
            println!("Reused {} pages from document {}", pages, source);
            Ok(())
        }
        Err(e) => {
            eprint!("{}", doc.processing_log.to_text());
            Err(e.into())
        }
    }
}

fn print_document(doc: &Document) {
    println!(
        "Document {}",
        doc.id.map(|id| id.to_string()).unwrap_or_default()
    );
    println!("  Title:        {}", doc.title);
    if !doc.description.is_empty() {
        println!("  Description:  {}", doc.description);
    }
    println!("  Status:       {}", doc.status);
    println!(
        "  Source:       {}",
        doc.source_file.as_deref().unwrap_or("-")
    );
    println!("  Hash:         {}", doc.content_hash.as_deref().unwrap_or("-"));
    println!("  Size:         {} bytes", doc.file_size);
    println!("  Pages:        {}", doc.total_pages);
    if doc.processing_time_ms > 0 {
        println!("  Processed in: {} ms", doc.processing_time_ms);
    }
    for page in &doc.pages {
        println!(
            "    {:>4}  {}x{}  {}",
            page.page, page.width, page.height, page.public_url
        );
    }
    if !doc.processing_log.is_empty() {
        println!("  Log:");
        for entry in doc.processing_log.entries() {
            println!("    {}", entry);
        }
    }
}
