// Dump recent samples of one metric as JSON.
//
// Usage: cargo run --example dump_history -- [METRIC] [DB_PATH] [LIMIT]
//   METRIC   cpu | memory | gpu | disk | network, default: cpu
//   DB_PATH  default: ./data/pulse.db
//   LIMIT    default: 20

use pulse::history_repo::HistoryRepo;
use pulse::models::MetricKind;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let metric: MetricKind = args.get(1).map(String::as_str).unwrap_or("cpu").parse()?;
    let path = args.get(2).map(String::as_str).unwrap_or("./data/pulse.db");
    let limit: u32 = args
        .get(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or(20);

    let repo = HistoryRepo::connect(path).await?;
    let records = repo.get_recent(metric, limit).await?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
