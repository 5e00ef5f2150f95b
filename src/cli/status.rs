use crate::cli::commands::StatusArgs;
use crate::errors::GuardError;
use serde_json::Value;

pub async fn handle_status(args: StatusArgs) -> Result<(), GuardError> {
    let url = format!("{}/api/agents", args.url.trim_end_matches('/'));
    let resp = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .map_err(|e| GuardError::Network(format!("Failed to reach {}: {}", url, e)))?;
    if !resp.status().is_success() {
        return Err(GuardError::ServiceUnavailable(format!("{} returned {}", url, resp.status())));
    }
    let status: Value = resp
        .json()
        .await
        .map_err(|e| GuardError::InvalidResponse(format!("Invalid response: {}", e)))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!(
        "{} ({})",
        status["name"].as_str().unwrap_or("indexguard"),
        if status["running"].as_bool().unwrap_or(false) { "running" } else { "stopped" }
    );
    for agent in status["agents"].as_array().into_iter().flatten() {
        println!(
            "  {:<10} {:<8} {:<7} runs={} ok={:.1}%",
            agent["name"].as_str().unwrap_or("?"),
            agent["priority"].as_str().unwrap_or("?"),
            agent["state"].as_str().unwrap_or("?"),
            agent["metrics"]["total_runs"].as_u64().unwrap_or(0),
            agent["success_rate"].as_f64().unwrap_or(0.0)
        );
    }
    Ok(())
}
