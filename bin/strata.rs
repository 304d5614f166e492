use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use strata::config::CacheConfig;
use strata::{
    new_ordinal_cache, spawn_worker, CacheKind, CategoryPath, FlushProfile, PagedStore,
    PartitionReader, StrataConfig, StrataMetrics, TaxonomyReader, TaxonomyWriter, WorkItem,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Segment-oriented in-memory storage toolkit", long_about = None)]
struct Args {
    /// JSON file with flat configuration options
    #[arg(long, env = "STRATA_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Flush profile (low-latency, balanced, bulk)
    #[arg(long, env = "STRATA_PROFILE", global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply JSON-lines work items to a partition
    Ingest {
        /// One work item per line, e.g. {"op":"add","doc":{...}}
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value = "default")]
        partition: String,

        /// Print prometheus metrics after the run
        #[arg(long)]
        metrics: bool,
    },
    /// Write bytes through a paged store and read them back
    Store {
        #[arg(long, default_value = "1024")]
        buffer_size: usize,

        #[arg(long, default_value = "100000")]
        bytes: usize,
    },
    /// Assign ordinals to category paths
    Taxonomy {
        /// Slash-separated paths, comma-separated
        #[arg(long, value_delimiter = ',')]
        paths: Vec<String>,

        /// Ordinal cache capacity (0 for unbounded)
        #[arg(long, default_value = "4096")]
        capacity: usize,
    },
}

fn load_config(args: &Args) -> Result<StrataConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            StrataConfig::from_json_str(&json)?
        }
        None => StrataConfig::default(),
    };
    if let Some(profile) = &args.profile {
        let profile: FlushProfile = profile.parse()?;
        config = config.with_profile(profile);
    }
    config.validate()?;
    Ok(config)
}

fn ingest(config: StrataConfig, input: PathBuf, partition: String, show_metrics: bool) -> Result<()> {
    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("reading {}", input.display()))?;
    let mut items = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let item: WorkItem = serde_json::from_str(line)
            .with_context(|| format!("{}:{}", input.display(), line_no + 1))?;
        items.push(item);
    }
    info!("Loaded {} work items from {}", items.len(), input.display());

    let metrics = Arc::new(StrataMetrics::new()?);
    let worker = spawn_worker(config, Some(metrics.clone()))?;
    let report = worker.run(partition.as_str(), items)?;

    info!(
        "Applied {} items, {} failed, generation {}, optimized: {}, {} ms",
        report.applied,
        report.failures.len(),
        report.generation,
        report.optimized,
        report.duration_ms
    );
    for failure in &report.failures {
        warn!("  item {} ({}): {}", failure.index, failure.kind, failure.error);
    }
    if let Some(error) = &report.optimize_error {
        warn!("Optimize failed: {}", error);
    }

    if let Some(store) = worker.store(&partition) {
        let reader = PartitionReader::open(&store)?;
        println!(
            "partition '{}': {} live documents in {} segments",
            partition,
            reader.doc_count(),
            reader.segment_count()
        );
        for (field, kind) in reader.fields() {
            let values = reader.field_values(field)?;
            println!(
                "  {:<20} {:<8} {} distinct values, {} bytes",
                field,
                format!("{:?}", kind).to_lowercase(),
                values.term_count(),
                values.ram_bytes_used()
            );
        }
    }
    worker.shutdown()?;

    if show_metrics {
        print!("{}", metrics.render()?);
    }
    Ok(())
}

fn store_roundtrip(buffer_size: usize, bytes: usize) -> Result<()> {
    let store = PagedStore::new(buffer_size)?;
    let data: Vec<u8> = (0..bytes).map(|i| (i % 251) as u8).collect();
    store.write_file("roundtrip.bin", &data)?;
    let read = store.read_file("roundtrip.bin")?;
    if read != data {
        bail!("round trip mismatch with buffer size {}", buffer_size);
    }
    println!(
        "{} bytes round-tripped through {}-byte buffers ({} bytes of buffers in use)",
        bytes,
        buffer_size,
        store.ram_bytes_used()
    );
    Ok(())
}

fn taxonomy(config: StrataConfig, paths: Vec<String>, capacity: usize) -> Result<()> {
    let cache_config = if capacity == 0 {
        CacheConfig {
            kind: CacheKind::Unbounded,
            ..config.cache.clone()
        }
    } else {
        CacheConfig {
            kind: CacheKind::Lru,
            ordinal_capacity: capacity,
        }
    };
    let store = PagedStore::new(config.store.buffer_size)?;
    let cache = new_ordinal_cache(&cache_config)?;
    let mut writer = TaxonomyWriter::open(store.clone(), cache, config.writer.lock_timeout_ms)?;
    for path in &paths {
        let category = CategoryPath::parse(path, '/')?;
        let ordinal = writer.add_category(&category)?;
        println!("{:<30} -> {}", category, ordinal);
    }
    if !writer.is_cache_complete() {
        warn!("Ordinal cache evicted entries; lookups fell back to the log");
    }
    writer.close()?;

    let reader = TaxonomyReader::open(&store)?;
    println!("{} categories committed", reader.size());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Starting strata v{}", strata::VERSION);
    let config = load_config(&args)?;

    match args.command {
        Command::Ingest {
            input,
            partition,
            metrics,
        } => ingest(config, input, partition, metrics),
        Command::Store { buffer_size, bytes } => store_roundtrip(buffer_size, bytes),
        Command::Taxonomy { paths, capacity } => taxonomy(config, paths, capacity),
    }
}
