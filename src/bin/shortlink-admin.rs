use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shortlink::analytics::VisitEvent;
use shortlink::models::ShortenedUrl;
use shortlink::redirect::is_reserved_slug;
use shortlink::storage::FileStorage;
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "shortlink-admin")]
#[command(about = "Shortlink maintenance CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a URL file before deploying it
    Check {
        /// Path to the slug to URL JSON file
        #[arg(default_value = "urls.json")]
        path: PathBuf,
    },
    /// Summarise a visits log
    Stats {
        /// Path to the JSON lines visits log
        #[arg(default_value = "visits.jsonl")]
        path: PathBuf,
        /// Number of rows to show per breakdown
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { path } => check(path),
        Commands::Stats { path, top } => stats(path, top),
    }
}

fn check(path: PathBuf) -> Result<()> {
    let storage = FileStorage::load(&path)?;

    let mut unsafe_urls: Vec<_> = storage.entries().filter(|u| !u.has_safe_scheme()).collect();
    unsafe_urls.sort_by(|a, b| a.short_code.cmp(&b.short_code));

    let mut shadowed: Vec<_> = storage
        .entries()
        .filter(|u| is_reserved_slug(&u.short_code))
        .collect();
    shadowed.sort_by(|a, b| a.short_code.cmp(&b.short_code));

    println!("✓ Loaded {} URLs from {}", storage.len(), path.display());

    if unsafe_urls.is_empty() && shadowed.is_empty() {
        return Ok(());
    }

    if !unsafe_urls.is_empty() {
        println!("⚠ {} URLs will be refused at redirect time:", unsafe_urls.len());
        print_urls(&unsafe_urls);
    }

    if !shadowed.is_empty() {
        println!("⚠ {} slugs are taken by built-in routes and never redirect:", shadowed.len());
        print_urls(&shadowed);
    }

    anyhow::bail!(
        "{} URLs use a scheme other than http or https, {} slugs are reserved",
        unsafe_urls.len(),
        shadowed.len()
    )
}

fn print_urls(urls: &[ShortenedUrl]) {
    println!("{:<30} {}", "Slug", "URL");
    println!("{}", "-".repeat(80));
    for url in urls {
        println!("{:<30} {}", url.short_code, url.original_url);
    }
}

#[derive(Default)]
struct VisitSummary {
    total: u64,
    malformed: u64,
    bots: u64,
    by_slug: HashMap<String, u64>,
    by_country: HashMap<String, u64>,
    by_device: HashMap<String, u64>,
}

impl VisitSummary {
    fn add(&mut self, event: VisitEvent) {
        self.total += 1;
        if event.client.is_bot {
            self.bots += 1;
        }
        *self.by_slug.entry(event.slug).or_insert(0) += 1;
        *self.by_country.entry(or_unknown(event.geo.country_code)).or_insert(0) += 1;
        *self.by_device.entry(or_unknown(event.client.device_type)).or_insert(0) += 1;
    }
}

fn or_unknown(value: String) -> String {
    if value.is_empty() {
        "Unknown".to_string()
    } else {
        value
    }
}

fn stats(path: PathBuf, top: usize) -> Result<()> {
    let file = std::fs::File::open(&path)
        .with_context(|| format!("Failed to open visits log {}", path.display()))?;

    let mut summary = VisitSummary::default();
    for line in BufReader::new(file).lines() {
        let line = line.context("Failed to read visits log")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<VisitEvent>(&line) {
            Ok(event) => summary.add(event),
            Err(_) => summary.malformed += 1,
        }
    }

    println!("Visits: {} ({} bots)", summary.total, summary.bots);
    if summary.malformed > 0 {
        println!("Skipped {} malformed lines", summary.malformed);
    }

    print_breakdown("Slug", &summary.by_slug, top);
    print_breakdown("Country", &summary.by_country, top);
    print_breakdown("Device", &summary.by_device, top);

    Ok(())
}

fn print_breakdown(label: &str, counts: &HashMap<String, u64>, top: usize) {
    if counts.is_empty() {
        return;
    }

    // Highest count first, ties alphabetical
    let mut rows: Vec<(&String, &u64)> = counts.iter().collect();
    rows.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    println!();
    println!("{:<40} {}", label, "Visits");
    println!("{}", "-".repeat(50));
    for (key, count) in rows.into_iter().take(top) {
        println!("{:<40} {}", key, count);
    }
}
