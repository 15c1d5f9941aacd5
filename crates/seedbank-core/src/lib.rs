pub mod format;
pub mod overlay;
pub mod view;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub type Metadata = Map<String, Value>;

/// A stored text item with metadata and a relevance score, as returned by
/// `GET /search` and `GET /seeds/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    pub id: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "deserialize_metadata")]
    pub metadata: Metadata,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub score: f64,
}

impl Seed {
    /// String value of a metadata key, or `""` when absent or not a string.
    pub fn meta_str(&self, key: &str) -> &str {
        meta_str(&self.metadata, key)
    }

    /// The conventional `tags` list. Non-string entries are skipped.
    pub fn meta_tags(&self) -> Vec<String> {
        match self.metadata.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Metadata entries worth showing in a detail view: non-null, non-empty,
    /// excluding the keys that already have dedicated fields.
    pub fn extra_metadata(&self) -> Vec<(&str, &Value)> {
        self.metadata
            .iter()
            .filter(|(key, _)| key.as_str() != "source" && key.as_str() != "tag")
            .filter(|(_, value)| match value {
                Value::Null => false,
                Value::String(s) => !s.is_empty(),
                _ => true,
            })
            .map(|(key, value)| (key.as_str(), value))
            .collect()
    }
}

pub fn meta_str<'a>(metadata: &'a Metadata, key: &str) -> &'a str {
    metadata.get(key).and_then(Value::as_str).unwrap_or("")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    #[serde(default)]
    pub seeds_count: u64,
    #[serde(default)]
    pub agent_contexts_count: u64,
}

/// Reduced result shape of `POST /seeds/query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedQueryResult {
    #[serde(deserialize_with = "deserialize_id")]
    pub seed_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSeedResponse {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Created(i64),
    /// The store deduplicated the content; no new row exists.
    Skipped(i64),
}

impl StoreSeedResponse {
    pub fn outcome(&self) -> StoreOutcome {
        if self.skipped.is_some() {
            StoreOutcome::Skipped(self.id)
        } else {
            StoreOutcome::Created(self.id)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Episodic,
    Semantic,
    Procedural,
    Working,
}

impl MemoryType {
    pub const ALL: [MemoryType; 4] = [
        MemoryType::Episodic,
        MemoryType::Semantic,
        MemoryType::Procedural,
        MemoryType::Working,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
            MemoryType::Procedural => "procedural",
            MemoryType::Working => "working",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MemoryType::Episodic => "EPISODIC",
            MemoryType::Semantic => "SEMANTIC",
            MemoryType::Procedural => "PROCEDURAL",
            MemoryType::Working => "WORKING",
        }
    }

    /// Cycles `None` (all) → episodic → … → working → `None`.
    pub fn cycle(current: Option<MemoryType>) -> Option<MemoryType> {
        match current {
            None => Some(MemoryType::Episodic),
            Some(MemoryType::Episodic) => Some(MemoryType::Semantic),
            Some(MemoryType::Semantic) => Some(MemoryType::Procedural),
            Some(MemoryType::Procedural) => Some(MemoryType::Working),
            Some(MemoryType::Working) => None,
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "episodic" => Ok(MemoryType::Episodic),
            "semantic" => Ok(MemoryType::Semantic),
            "procedural" => Ok(MemoryType::Procedural),
            "working" => Ok(MemoryType::Working),
            other => Err(format!("Unknown memory type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentContext {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub agent_id: String,
    pub memory_type: MemoryType,
    #[serde(default, deserialize_with = "deserialize_metadata")]
    pub payload: Metadata,
    #[serde(default)]
    pub created_at: String,
}

/// Accepts an object or `null` (treated as empty).
fn deserialize_metadata<'de, D>(deserializer: D) -> Result<Metadata, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Map<String, Value>> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

/// Deserialize an ID that can be either a string or a number into a String
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Value::deserialize(deserializer)?;
    match val {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected string or number for id")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seed_decodes_null_metadata_as_empty() {
        let seed: Seed = serde_json::from_value(json!({
            "id": 3,
            "content": "hello",
            "metadata": null,
            "created_at": "2026-01-02T10:00:00Z",
            "score": 0.5
        }))
        .unwrap();
        assert!(seed.metadata.is_empty());
        assert_eq!(seed.meta_str("source"), "");
    }

    #[test]
    fn metadata_accessors_degrade_on_type_mismatch() {
        let seed: Seed = serde_json::from_value(json!({
            "id": 1,
            "content": "x",
            "metadata": {"source": 42, "tag": "Title", "tags": ["a", 7, "b"]},
            "created_at": "",
            "score": 0.1
        }))
        .unwrap();
        assert_eq!(seed.meta_str("source"), "");
        assert_eq!(seed.meta_str("tag"), "Title");
        assert_eq!(seed.meta_tags(), vec!["a".to_string(), "b".to_string()]);

        let tags_not_list: Seed = serde_json::from_value(json!({
            "id": 2, "metadata": {"tags": "a,b"}
        }))
        .unwrap();
        assert!(tags_not_list.meta_tags().is_empty());
    }

    #[test]
    fn extra_metadata_skips_empty_and_dedicated_keys() {
        let seed: Seed = serde_json::from_value(json!({
            "id": 1,
            "metadata": {"source": "telegram", "tag": "t", "lang": "de", "empty": "", "gone": null, "n": 2}
        }))
        .unwrap();
        let keys: Vec<&str> = seed.extra_metadata().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["lang", "n"]);
    }

    #[test]
    fn skipped_store_response_means_no_new_row() {
        let skipped: StoreSeedResponse =
            serde_json::from_value(json!({"id": 7, "skipped": 1})).unwrap();
        let created: StoreSeedResponse = serde_json::from_value(json!({"id": 7})).unwrap();

        assert_eq!(skipped.outcome(), StoreOutcome::Skipped(7));
        assert_eq!(created.outcome(), StoreOutcome::Created(7));
    }

    #[test]
    fn agent_context_accepts_numeric_id() {
        let ctx: AgentContext = serde_json::from_value(json!({
            "id": 12,
            "agentId": "agent-a",
            "memoryType": "procedural",
            "payload": {"text": "ran tests"},
            "createdAt": "2026-02-01T08:00:00Z"
        }))
        .unwrap();
        assert_eq!(ctx.id, "12");
        assert_eq!(ctx.memory_type, MemoryType::Procedural);
    }

    #[test]
    fn memory_type_cycle_visits_every_variant() {
        let mut current = None;
        let mut seen = Vec::new();
        for _ in 0..5 {
            current = MemoryType::cycle(current);
            seen.push(current);
        }
        assert_eq!(
            seen,
            vec![
                Some(MemoryType::Episodic),
                Some(MemoryType::Semantic),
                Some(MemoryType::Procedural),
                Some(MemoryType::Working),
                None
            ]
        );
        assert_eq!("Working".parse::<MemoryType>(), Ok(MemoryType::Working));
    }

    #[test]
    fn stats_use_camel_case_on_the_wire() {
        let stats: Stats =
            serde_json::from_value(json!({"seedsCount": 10, "agentContextsCount": 4})).unwrap();
        assert_eq!(stats.seeds_count, 10);
        assert_eq!(stats.agent_contexts_count, 4);
    }
}
