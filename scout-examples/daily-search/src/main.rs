use anyhow::Result;
use scout_queue::observability::{init_tracing, LogFormat};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env());

    let agent_ids = daily_search::agent_ids_from_env();
    let queue = daily_search::build(&agent_ids);

    info!(agents = agent_ids.len(), "Starting daily search cycle");
    let report = queue.run_cycle(&agent_ids).await?;

    let removed = queue.clear_expired().await?;
    let metrics = queue.observability().metrics().snapshot();
    info!(
        removed,
        success_rate = metrics.success_rate(),
        retry_rate = metrics.retry_rate(),
        "Daily search cycle finished"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
