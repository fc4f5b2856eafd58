//! Client-side CLI commands: thin `reqwest` wrappers over the Control API
//! (§4.5, §6), styled after `llm::client::OllamaModelClient`'s HTTP call
//! shape and the teacher's `console`-styled command output.

use std::path::PathBuf;

use console::style;
use serde_json::{json, Value};

fn read_json_file(path: &PathBuf) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn build_request_body(
    dataset: PathBuf,
    knowledge: Option<PathBuf>,
    guidance: Option<PathBuf>,
    save_reports: bool,
    task_id: Option<String>,
) -> anyhow::Result<Value> {
    let dataset = read_json_file(&dataset)?;
    let knowledge_base = knowledge.as_ref().map(read_json_file).transpose()?;
    let optimization_guidance = guidance.as_ref().map(read_json_file).transpose()?;

    Ok(json!({
        "dataset": dataset,
        "knowledge_base": knowledge_base,
        "optimization_guidance": optimization_guidance,
        "save_reports": save_reports,
        "task_id": task_id,
    }))
}

fn print_json(label: &str, value: &Value) {
    println!("{} {}", style(label).cyan(), serde_json::to_string_pretty(value).unwrap_or_default());
}

async fn check_status(resp: reqwest::Response) -> anyhow::Result<Value> {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        anyhow::bail!("request failed with HTTP {status}: {body}");
    }
    Ok(body)
}

pub async fn cmd_submit(
    url: &str,
    dataset: PathBuf,
    knowledge: Option<PathBuf>,
    guidance: Option<PathBuf>,
    save_reports: bool,
    task_id: Option<String>,
) -> anyhow::Result<()> {
    let body = build_request_body(dataset, knowledge, guidance, save_reports, task_id)?;
    let resp = reqwest::Client::new().post(format!("{url}/optimize")).json(&body).send().await?;
    print_json("submitted:", &check_status(resp).await?);
    Ok(())
}

pub async fn cmd_submit_sync(
    url: &str,
    dataset: PathBuf,
    knowledge: Option<PathBuf>,
    guidance: Option<PathBuf>,
    task_id: Option<String>,
) -> anyhow::Result<()> {
    let body = build_request_body(dataset, knowledge, guidance, false, task_id)?;
    let resp = reqwest::Client::new().post(format!("{url}/optimize/sync")).json(&body).send().await?;
    print_json("completed:", &check_status(resp).await?);
    Ok(())
}

pub async fn cmd_get(url: &str, task_id: &str) -> anyhow::Result<()> {
    let resp = reqwest::Client::new().get(format!("{url}/optimize/{task_id}")).send().await?;
    print_json("task:", &check_status(resp).await?);
    Ok(())
}

pub async fn cmd_list(url: &str, status: Option<String>, limit: usize) -> anyhow::Result<()> {
    let mut req = reqwest::Client::new().get(format!("{url}/tasks")).query(&[("limit", limit.to_string())]);
    if let Some(status) = status {
        req = req.query(&[("status", status)]);
    }
    let resp = req.send().await?;
    print_json("tasks:", &check_status(resp).await?);
    Ok(())
}

pub async fn cmd_delete(url: &str, task_id: &str) -> anyhow::Result<()> {
    let resp = reqwest::Client::new().delete(format!("{url}/tasks/{task_id}")).send().await?;
    print_json("deleted:", &check_status(resp).await?);
    Ok(())
}

pub async fn cmd_resume(url: &str, task_id: &str) -> anyhow::Result<()> {
    let resp = reqwest::Client::new().post(format!("{url}/tasks/{task_id}/resume")).send().await?;
    print_json("resumed:", &check_status(resp).await?);
    Ok(())
}

pub async fn cmd_stats(url: &str) -> anyhow::Result<()> {
    let resp = reqwest::Client::new().get(format!("{url}/stats")).send().await?;
    print_json("stats:", &check_status(resp).await?);
    Ok(())
}

pub async fn cmd_health(url: &str) -> anyhow::Result<()> {
    let resp = reqwest::Client::new().get(format!("{url}/health")).send().await?;
    print_json("health:", &check_status(resp).await?);
    Ok(())
}
