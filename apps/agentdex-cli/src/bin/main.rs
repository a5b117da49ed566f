use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agentdex_catalog::import::import_json;
use agentdex_catalog::{CatalogStore, Enricher, NewsApiClient, PriceMonitor};
use agentdex_core::config::{expand_path, Config, Settings};
use agentdex_providers::{get_default_embedder, get_default_generator};
use agentdex_search::SearchAndJustify;
use agentdex_vector::{IndexBuilder, IndexSnapshot, SnapshotLayout};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: agentdex <command> [args...]

Commands:
  import <file.json> [--dedup]   append agents from a JSON array
  dedup                          keep the earliest row per name
  enrich                         densify un-enriched agents
  build-index                    rebuild the vector index snapshot
  search <query...> [--top-k N]  ranked, justified candidates
  monitor-prices                 flag agents with price-change news
  status                         catalog and index summary";

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    let cmd = args.remove(0);
    (cmd, args)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn open_catalog(settings: &Settings) -> anyhow::Result<CatalogStore> {
    let path = expand_path(&settings.catalog.db_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(CatalogStore::open(&path)?)
}

fn index_dir(settings: &Settings) -> PathBuf {
    expand_path(&settings.index.dir)
}

/// Stage-level limit per provider call; the client retries inside it.
fn call_timeout(settings: &Settings) -> Duration {
    settings.provider.call_budget()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let settings = config.settings()?;
    let (cmd, args) = parse_args();

    match cmd.as_str() {
        "import" => {
            let Some(file) = args.iter().find(|a| !a.starts_with("--")) else {
                eprintln!("Usage: agentdex import <file.json> [--dedup]");
                std::process::exit(1);
            };
            let store = open_catalog(&settings)?;
            let batch = import_json(Path::new(file))?;
            let inserted = store.insert_many(&batch.records)?;
            println!("📥 Imported {} agents ({} skipped) from {}", inserted, batch.skipped, file);
            if args.iter().any(|a| a == "--dedup") {
                let deleted = store.dedup()?;
                println!("🧹 Removed {} duplicate rows", deleted);
            }
        }
        "dedup" => {
            let store = open_catalog(&settings)?;
            let deleted = store.dedup()?;
            println!("🧹 Removed {} duplicate rows; {} agents remain", deleted, store.count()?);
        }
        "enrich" => {
            let store = open_catalog(&settings)?;
            let generator = get_default_generator(&settings.provider)?;
            let report = Enricher::new(&store, generator.as_ref())
                .with_concurrency(settings.enrich.concurrency)
                .with_call_timeout(call_timeout(&settings))
                .run()
                .await?;
            println!(
                "✅ Enrichment: {} candidates, {} enriched, {} failed (retried next run)",
                report.candidates, report.enriched, report.failed
            );
        }
        "build-index" => {
            let store = open_catalog(&settings)?;
            let embedder = get_default_embedder(&settings.provider)?;
            let report = IndexBuilder::new(&store, embedder.as_ref(), SnapshotLayout::new(index_dir(&settings)))
                .with_concurrency(settings.index.concurrency)
                .with_call_timeout(call_timeout(&settings))
                .build()
                .await?;
            println!(
                "✅ Index {}: {} of {} agents indexed, {} skipped (dim {})",
                report.snapshot_id,
                report.indexed,
                report.scanned,
                report.skipped,
                report.dim.map_or_else(|| "-".to_string(), |d| d.to_string())
            );
        }
        "search" => {
            let mut top_k = settings.search.top_k;
            let mut words = Vec::new();
            let mut it = args.iter();
            while let Some(arg) = it.next() {
                if arg == "--top-k" {
                    top_k = it.next().and_then(|v| v.parse::<usize>().ok()).filter(|&n| n > 0).unwrap_or_else(|| {
                        eprintln!("--top-k expects a positive integer");
                        std::process::exit(1)
                    });
                } else {
                    words.push(arg.as_str());
                }
            }
            if words.is_empty() {
                eprintln!("Usage: agentdex search \"<query>\" [--top-k N]");
                std::process::exit(1);
            }
            let query = words.join(" ");

            let store = open_catalog(&settings)?;
            let snapshot = IndexSnapshot::open_current(&index_dir(&settings)).await?;
            let embedder = get_default_embedder(&settings.provider)?;
            let generator = get_default_generator(&settings.provider)?;
            let results = SearchAndJustify::new(&store, &snapshot, embedder.as_ref(), generator.as_ref())
                .with_concurrency(settings.search.concurrency)
                .with_call_timeout(call_timeout(&settings))
                .search(&query, top_k)
                .await?;
            println!("🔎 '{}' -> {} candidates", query, results.len());
            for (rank, r) in results.iter().enumerate() {
                println!("\n{}. {} [{}] (distance {:.4})", rank + 1, r.record.name, r.record.category, r.distance);
                println!("   {}", r.record.use_case);
                if r.justification.is_empty() {
                    println!("   (no justification available)");
                } else {
                    println!("   💡 {}", r.justification);
                }
            }
        }
        "monitor-prices" => {
            let store = open_catalog(&settings)?;
            let news = NewsApiClient::from_settings(&settings.monitor, Duration::from_secs(settings.provider.timeout_secs))?;
            let report = PriceMonitor::new(&store, &news).run().await?;
            println!(
                "📰 Price monitor: {} checked, {} flagged, {} failed",
                report.checked, report.flagged, report.failed
            );
        }
        "status" => {
            let store = open_catalog(&settings)?;
            let total = store.count()?;
            let pending = store.scan_unenriched()?.len();
            println!("📚 Catalog: {} agents ({} awaiting enrichment)", total, pending);
            match SnapshotLayout::new(index_dir(&settings)).current_manifest()? {
                Some(m) => println!(
                    "📦 Index {}: {} vectors, dim {}, embedder {}, built {}",
                    m.snapshot_id,
                    m.count,
                    m.dim.map_or_else(|| "-".to_string(), |d| d.to_string()),
                    m.embedder_id,
                    m.built_at
                ),
                None => println!("📦 No index built yet (run `agentdex build-index`)"),
            }
        }
        _ => {
            eprintln!("Unknown command: {}\n\n{USAGE}", cmd);
            std::process::exit(1);
        }
    }
    Ok(())
}
