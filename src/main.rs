use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zonepost::{OfflineDirectory, SyncConfig};

#[derive(Parser, Debug)]
#[command(name = "zonepost")]
#[command(about = "Offline-first postal zone directory", long_about = None)]
struct Args {
    /// Data directory path
    #[arg(long, default_value = "./data")]
    data_dir: String,

    /// Base URL of the directory API (overrides ZONEPOST_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Skip the network entirely and serve from the local cache
    #[arg(long)]
    offline: bool,

    /// One-shot free-text search
    #[arg(short, long)]
    query: Option<String>,

    /// One-shot proximity search as lat,lon[,radius_m]
    #[arg(long)]
    near: Option<String>,

    /// Maximum results per search
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zonepost=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = SyncConfig::from_env();
    if let Some(url) = args.api_url {
        config.api_url = url;
    }

    let directory = OfflineDirectory::init(&args.data_dir, config, !args.offline)?;

    if !args.offline {
        if let Err(e) = directory.sync_if_needed().await {
            tracing::warn!("Sync did not complete, serving cached data: {}", e);
        }
    }

    if let Some(query) = &args.query {
        let results = directory.search(query, args.limit).await?;
        print_results(&results);
    }

    if let Some(near) = &args.near {
        let (lat, lon, radius) = parse_near(near)?;
        let results = directory.search_nearby(lat, lon, radius).await?;
        print_results(&results);
    }

    if args.query.is_none() && args.near.is_none() {
        let state = directory.sync_state()?;
        println!("{}", serde_json::to_string_pretty(&state)?);
    }

    Ok(())
}

fn parse_near(raw: &str) -> anyhow::Result<(f64, f64, f64)> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() < 2 || parts.len() > 3 {
        anyhow::bail!("--near expects lat,lon[,radius_m]");
    }
    let lat: f64 = parts[0].parse()?;
    let lon: f64 = parts[1].parse()?;
    let radius: f64 = if parts.len() == 3 { parts[2].parse()? } else { 2000.0 };
    Ok((lat, lon, radius))
}

fn print_results(results: &[zonepost::SearchResult]) {
    if results.is_empty() {
        println!("No matching zones");
        return;
    }
    for result in results {
        let distance = result
            .distance_m
            .map(|d| format!(" ({:.0} m)", d))
            .unwrap_or_default();
        println!(
            "{}  {}  [{}]  relevance {:.2}{}",
            result.code, result.name, result.district_name, result.relevance, distance
        );
    }
}
