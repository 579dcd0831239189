use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use philodb_analysis::{build_bundle, run_thematic, ThematicContext};
use philodb_core::config::{Config, Settings};
use philodb_core::data_processor::DataProcessor;
use philodb_core::traits::Embedder;
use philodb_core::types::Corpus;
use philodb_embed::embedder_from_config;
use philodb_vector::{
    load_corpus, merge_parts_dir, persist_corpus, persist_index, require_all_completed, run_worker, run_workers,
    FlatIpIndex, IngestContext, RetrievalEngine, SchoolSelection, SearchParams, WorkerOutcome,
};

mod display;

const VALIDATION_SAMPLE: usize = 32;

#[derive(Parser, Debug)]
#[command(name = "philodb", version, about = "Embed, index and search philosophical and religious passages")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Embed passages into per-worker parts, then merge them
    Embed(EmbedArgs),
    /// Merge existing parts into the corpus
    Merge {
        /// Reject parts produced for a different worker count
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Build and persist the similarity index from the merged corpus
    BuildIndex,
    /// Embed, merge and build the index in one run
    Ingest(EmbedArgs),
    /// Search the index and print passages grouped by school
    Query(QueryArgs),
    /// School similarity, clustering and the thematic batch
    Analyze {
        #[arg(long)]
        workers: Option<usize>,
        /// Only run the first N topics
        #[arg(long)]
        topics: Option<usize>,
    },
}

#[derive(Args, Debug, Clone)]
struct EmbedArgs {
    /// Passage file (JSON Lines); defaults to data.input
    #[arg(long)]
    input: Option<PathBuf>,
    /// Pool size W; defaults to workers.count
    #[arg(long)]
    workers: Option<usize>,
    /// Run only this worker ordinal (one process per worker)
    #[arg(long, requires = "workers")]
    worker: Option<usize>,
    /// Only ingest the first N passages
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args, Debug, Clone)]
struct QueryArgs {
    text: String,
    /// Restrict to these schools (repeatable); all schools when omitted
    #[arg(long = "school")]
    schools: Vec<String>,
    #[arg(long)]
    cap: Option<usize>,
    #[arg(long)]
    floor: Option<f32>,
    #[arg(long)]
    k: Option<usize>,
    /// Use exactly k candidates
    #[arg(long)]
    no_widen: bool,
    /// Print cards as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::from(embedder_from_config(&settings.embedding)?))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;

    match cli.command {
        Command::Embed(args) => {
            embed(&settings, &args)?;
        }
        Command::Merge { workers } => {
            merge(&settings, workers)?;
        }
        Command::BuildIndex => build_index(&settings)?,
        Command::Ingest(args) => {
            if args.worker.is_some() {
                bail!("ingest runs every worker; use `embed --worker` for a single worker");
            }
            embed(&settings, &args)?;
            build_index(&settings)?;
        }
        Command::Query(args) => query(&settings, &args)?,
        Command::Analyze { workers, topics } => analyze(&settings, workers, topics)?,
    }
    Ok(())
}

fn load_passages(settings: &Settings, args: &EmbedArgs) -> Result<Vec<philodb_core::types::Passage>> {
    let input = args.input.clone().unwrap_or_else(|| settings.data.input_path());
    let processor = match args.limit {
        Some(n) => DataProcessor::with_limit(n),
        None => DataProcessor::new(),
    };
    let passages = processor.process_file(&input).with_context(|| format!("loading {}", input.display()))?;
    Ok(passages)
}

fn embed(settings: &Settings, args: &EmbedArgs) -> Result<()> {
    let n_workers = args.workers.unwrap_or(settings.workers.count);
    let parts_dir = settings.data.parts_path();
    let passages = load_passages(settings, args)?;
    let ctx = Arc::new(IngestContext::new(passages, n_workers, settings.workers.batch_size, embedder(settings)?));

    if let Some(ordinal) = args.worker {
        std::fs::create_dir_all(&parts_dir)?;
        return match run_worker(&ctx, &parts_dir, ordinal) {
            WorkerOutcome::Completed(part) => {
                println!("✅ Worker {} wrote {} passages to {}", part.ordinal, part.rows, part.path.display());
                Ok(())
            }
            WorkerOutcome::Failed { ordinal, error } => Err(error).with_context(|| format!("worker {ordinal} failed")),
        };
    }

    let outcomes = run_workers(ctx, &parts_dir)?;
    let parts = require_all_completed(outcomes)?;
    println!("✅ {} workers wrote {} passages", parts.len(), parts.iter().map(|p| p.rows).sum::<usize>());
    merge(settings, Some(n_workers))
}

fn merge(settings: &Settings, workers: Option<usize>) -> Result<()> {
    let parts_dir = settings.data.parts_path();
    let corpus_dir = settings.data.corpus_path();
    let rt = runtime()?;
    let corpus = rt.block_on(merge_parts_dir(&parts_dir, workers))?;
    let n_workers = match workers {
        Some(w) => w,
        None => philodb_vector::merge::discover_parts(&parts_dir)?.len(),
    };
    rt.block_on(persist_corpus(&corpus_dir, &corpus, n_workers))?;
    println!("✅ Merged corpus: {} passages, dim {} -> {}", corpus.len(), corpus.dim(), corpus_dir.display());
    Ok(())
}

fn build_index(settings: &Settings) -> Result<()> {
    let rt = runtime()?;
    let corpus = rt.block_on(load_corpus(&settings.data.corpus_path()))?;
    let index = FlatIpIndex::build(&corpus);
    let checked = index.validate(VALIDATION_SAMPLE)?;
    info!(checked, "index self-query validation passed");
    let index_dir = settings.data.index_path();
    rt.block_on(persist_index(&index_dir, &index))?;
    println!("✅ Index built: {} vectors -> {}", index.len(), index_dir.display());
    Ok(())
}

fn query(settings: &Settings, args: &QueryArgs) -> Result<()> {
    let mut params = SearchParams::from(&settings.search);
    if let Some(cap) = args.cap { params.per_school_cap = cap; }
    if let Some(floor) = args.floor { params.similarity_floor = floor; }
    if let Some(k) = args.k { params.candidate_k = k; }
    if args.no_widen { params.widen_candidates = false; }
    let selection = if args.schools.is_empty() {
        SchoolSelection::All
    } else {
        SchoolSelection::only(args.schools.iter().cloned())
    };

    let rt = runtime()?;
    let engine = rt.block_on(RetrievalEngine::open(
        &settings.data.corpus_path(),
        &settings.data.index_path(),
        embedder(settings)?,
        params,
    ))?;
    if let SchoolSelection::Only(names) = &selection {
        let known: Vec<&str> = engine.schools().collect();
        for name in names.iter().filter(|n| !known.contains(&n.as_str())) {
            eprintln!("⚠️  Unknown school '{}' (known: {})", name, known.join(", "));
        }
    }
    let cards = engine.search(&args.text, &selection)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&cards)?);
    } else {
        print!("{}", display::render_cards(&cards));
    }
    Ok(())
}

async fn load_named(name: &str, dir: &Path) -> Result<(String, Arc<Corpus>)> {
    let corpus = load_corpus(dir).await.with_context(|| format!("loading corpus '{name}'"))?;
    Ok((name.to_string(), Arc::new(corpus)))
}

fn analyze(settings: &Settings, workers: Option<usize>, topic_limit: Option<usize>) -> Result<()> {
    let analysis = &settings.analysis;
    let rt = runtime()?;
    let mut corpora = Vec::with_capacity(analysis.corpora.len());
    for c in &analysis.corpora {
        corpora.push(rt.block_on(load_named(&c.name, &c.path()))?);
    }
    let unified = match &analysis.unified {
        Some(u) => Some(rt.block_on(load_named(&u.name, &u.path()))?),
        None => None,
    };
    let mut topics = analysis.topics.clone();
    if let Some(n) = topic_limit { topics.truncate(n); }

    let n_workers = workers.unwrap_or(settings.workers.count);
    let ctx = Arc::new(ThematicContext::new(corpora.clone(), embedder(settings)?, analysis.top_n)?);
    let thematic = run_thematic(ctx, &topics, n_workers)?;
    let bundle = build_bundle(&corpora, unified, topics, thematic);
    let path = settings.data.bundle_file();
    bundle.save(&path)?;
    println!("✅ Analysis bundle: {} corpora, {} topics -> {}", bundle.corpora.len(), bundle.topics.len(), path.display());
    Ok(())
}
