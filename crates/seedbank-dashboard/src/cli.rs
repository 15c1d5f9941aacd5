use crate::config::{Command, Config};
use anyhow::{bail, Context, Result};
use seedbank_client::StoreClient;
use seedbank_core::Metadata;
use serde::Serialize;
use serde_json::{json, Value};
use std::io::Write;

pub async fn run(command: Command, config: &Config, client: &StoreClient) -> Result<()> {
    let output = execute(command, config, client).await?;
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &output)?;
    writeln!(stdout)?;
    if output.get("healthy") == Some(&Value::Bool(false)) {
        bail!("store at {} is not healthy", client.base());
    }
    Ok(())
}

async fn execute(command: Command, config: &Config, client: &StoreClient) -> Result<Value> {
    match command {
        Command::Health => Ok(json!({ "healthy": client.fetch_health().await })),
        Command::Stats => to_json(client.fetch_stats().await.context("fetching stats")?),
        Command::Search {
            query,
            limit,
            threshold,
        } => to_json(
            client
                .search(
                    &query,
                    limit.unwrap_or(config.search_limit),
                    threshold.unwrap_or(config.search_threshold),
                )
                .await
                .with_context(|| format!("searching for {query:?}"))?,
        ),
        Command::Query {
            query,
            limit,
            threshold,
        } => to_json(client.query_compat(&query, limit, threshold).await?),
        Command::Get { id } => to_json(
            client
                .fetch_record(id)
                .await
                .with_context(|| format!("fetching seed #{id}"))?,
        ),
        Command::Store {
            content,
            source,
            tag,
        } => {
            if content.trim().is_empty() {
                bail!("refusing to store empty content");
            }
            let metadata = store_metadata(source, tag);
            to_json(client.create_record(&content, Some(&metadata)).await?)
        }
        Command::Contexts { agent, memory_type } => {
            to_json(client.fetch_contexts(agent.as_deref(), memory_type).await?)
        }
    }
}

fn store_metadata(source: Option<String>, tag: Option<String>) -> Metadata {
    let mut metadata = Metadata::new();
    for (key, value) in [("source", source), ("tag", tag)] {
        if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
            metadata.insert(key.to_string(), Value::String(value));
        }
    }
    metadata
}

fn to_json<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_metadata_skips_blank_values() {
        let metadata = store_metadata(Some("cli".to_string()), Some("  ".to_string()));
        assert_eq!(Value::Object(metadata), json!({"source": "cli"}));
        assert!(store_metadata(None, None).is_empty());
    }
}
