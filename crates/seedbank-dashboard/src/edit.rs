//! Edit and create forms, and the writes they turn into.

use seedbank_client::{ClientError, StoreClient};
use seedbank_core::{Metadata, Seed, StoreOutcome};
use serde_json::Value;

pub const FIELD_LABELS: [&str; 4] = ["Content", "Source", "Tag", "Tags (comma separated)"];
const CONTENT: usize = 0;
const SOURCE: usize = 1;
const TAG: usize = 2;
const TAGS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum FormTarget {
    Existing(Seed),
    New,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditForm {
    pub target: FormTarget,
    pub fields: [String; 4],
    pub focus: usize,
    pub saving: bool,
    pub error: Option<String>,
}

impl EditForm {
    pub fn for_seed(seed: &Seed) -> Self {
        Self {
            fields: [
                seed.content.clone(),
                seed.meta_str("source").to_string(),
                seed.meta_str("tag").to_string(),
                seed.meta_tags().join(", "),
            ],
            target: FormTarget::Existing(seed.clone()),
            focus: CONTENT,
            saving: false,
            error: None,
        }
    }

    pub fn blank() -> Self {
        Self {
            target: FormTarget::New,
            fields: Default::default(),
            focus: CONTENT,
            saving: false,
            error: None,
        }
    }

    pub fn title(&self) -> String {
        match &self.target {
            FormTarget::Existing(seed) => format!(" Edit seed #{} ", seed.id),
            FormTarget::New => " New seed ".to_string(),
        }
    }

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % self.fields.len();
    }

    pub fn focus_prev(&mut self) {
        self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
    }

    pub fn push_char(&mut self, ch: char) {
        self.fields[self.focus].push(ch);
        self.error = None;
    }

    pub fn pop_char(&mut self) {
        self.fields[self.focus].pop();
        self.error = None;
    }

    pub fn clear_field(&mut self) {
        self.fields[self.focus].clear();
    }

    fn tags(&self) -> Vec<String> {
        parse_tags(&self.fields[TAGS])
    }

    /// Turns the form into the writes that persist it, in order.
    pub fn plan(&self) -> Result<Vec<WriteStep>, String> {
        let content = self.fields[CONTENT].trim();
        if content.is_empty() {
            return Err("content must not be empty".to_string());
        }
        let source = self.fields[SOURCE].trim();
        let tag = self.fields[TAG].trim();
        let tags = self.tags();

        match &self.target {
            FormTarget::New => {
                let mut metadata = Metadata::new();
                insert_non_empty(&mut metadata, "source", source);
                insert_non_empty(&mut metadata, "tag", tag);
                if !tags.is_empty() {
                    metadata.insert("tags".to_string(), Value::from(tags));
                }
                Ok(vec![WriteStep::Create {
                    content: content.to_string(),
                    metadata,
                }])
            }
            FormTarget::Existing(seed) => {
                let mut steps = Vec::new();
                if content != seed.content.trim() {
                    let mut metadata = seed.metadata.clone();
                    insert_non_empty(&mut metadata, "source", source);
                    insert_non_empty(&mut metadata, "tag", tag);
                    steps.push(WriteStep::Replace {
                        id: seed.id,
                        content: content.to_string(),
                        metadata,
                    });
                } else {
                    let mut patch = Metadata::new();
                    if !source.is_empty() && source != seed.meta_str("source") {
                        patch.insert("source".to_string(), Value::from(source));
                    }
                    if !tag.is_empty() && tag != seed.meta_str("tag") {
                        patch.insert("tag".to_string(), Value::from(tag));
                    }
                    if !patch.is_empty() {
                        steps.push(WriteStep::Merge { id: seed.id, patch });
                    }
                }
                if !tags.is_empty() {
                    steps.push(WriteStep::SetTags { id: seed.id, tags });
                }
                Ok(steps)
            }
        }
    }
}

fn insert_non_empty(metadata: &mut Metadata, key: &str, value: &str) {
    if !value.is_empty() {
        metadata.insert(key.to_string(), Value::from(value));
    }
}

pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteStep {
    Create { content: String, metadata: Metadata },
    Replace { id: i64, content: String, metadata: Metadata },
    Merge { id: i64, patch: Metadata },
    SetTags { id: i64, tags: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Saved { id: i64 },
    Created { id: i64 },
    Deduplicated { id: i64 },
    Unchanged,
}

impl WriteOutcome {
    pub fn needs_refresh(&self) -> bool {
        matches!(self, WriteOutcome::Saved { .. } | WriteOutcome::Created { .. })
    }

    pub fn note(&self) -> String {
        match self {
            WriteOutcome::Saved { id } => format!("Saved seed #{id}"),
            WriteOutcome::Created { id } => format!("Created seed #{id}"),
            WriteOutcome::Deduplicated { id } => {
                format!("Already stored as #{id}; nothing new was created")
            }
            WriteOutcome::Unchanged => "No changes to save".to_string(),
        }
    }
}

/// Runs the steps in order and stops at the first failure.
pub async fn execute(client: &StoreClient, steps: &[WriteStep]) -> Result<WriteOutcome, ClientError> {
    let mut outcome = WriteOutcome::Unchanged;
    for step in steps {
        outcome = match step {
            WriteStep::Create { content, metadata } => {
                match client.create_record(content, Some(metadata)).await?.outcome() {
                    StoreOutcome::Created(id) => WriteOutcome::Created { id },
                    StoreOutcome::Skipped(id) => WriteOutcome::Deduplicated { id },
                }
            }
            WriteStep::Replace { id, content, metadata } => {
                client.replace_record(*id, content, metadata).await?;
                WriteOutcome::Saved { id: *id }
            }
            WriteStep::Merge { id, patch } => {
                client.merge_metadata(*id, patch).await?;
                WriteOutcome::Saved { id: *id }
            }
            WriteStep::SetTags { id, tags } => {
                client.set_tags(*id, tags).await?;
                WriteOutcome::Saved { id: *id }
            }
        };
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed() -> Seed {
        serde_json::from_value(json!({
            "id": 4,
            "content": "Der Hund",
            "metadata": {"source": "telegram", "tag": "Tier", "lang": "de"},
            "created_at": "2026-01-01T10:00:00Z",
            "score": 0.5
        }))
        .unwrap()
    }

    #[test]
    fn empty_content_is_refused() {
        let mut form = EditForm::for_seed(&seed());
        form.fields[CONTENT] = "   ".to_string();
        assert!(form.plan().is_err());
        assert!(EditForm::blank().plan().is_err());
    }

    #[test]
    fn changed_content_replaces_with_merged_metadata() {
        let mut form = EditForm::for_seed(&seed());
        form.fields[CONTENT] = "Der Hund bellt".to_string();
        form.fields[TAG] = "Haustier".to_string();
        form.fields[SOURCE].clear();

        let steps = form.plan().unwrap();
        assert_eq!(
            steps,
            vec![WriteStep::Replace {
                id: 4,
                content: "Der Hund bellt".to_string(),
                metadata: json!({"source": "telegram", "tag": "Haustier", "lang": "de"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            }]
        );
    }

    #[test]
    fn unchanged_content_merges_only_changed_keys() {
        let mut form = EditForm::for_seed(&seed());
        form.fields[SOURCE] = "web".to_string();
        form.fields[TAGS] = " a, ,b ".to_string();

        let steps = form.plan().unwrap();
        assert_eq!(
            steps,
            vec![
                WriteStep::Merge {
                    id: 4,
                    patch: json!({"source": "web"}).as_object().cloned().unwrap(),
                },
                WriteStep::SetTags {
                    id: 4,
                    tags: vec!["a".to_string(), "b".to_string()],
                },
            ]
        );
    }

    #[test]
    fn untouched_form_plans_nothing() {
        assert!(EditForm::for_seed(&seed()).plan().unwrap().is_empty());
    }

    #[test]
    fn new_form_creates_with_given_metadata() {
        let mut form = EditForm::blank();
        form.fields[CONTENT] = " fresh ".to_string();
        form.fields[TAGS] = "x".to_string();
        assert_eq!(
            form.plan().unwrap(),
            vec![WriteStep::Create {
                content: "fresh".to_string(),
                metadata: json!({"tags": ["x"]}).as_object().cloned().unwrap(),
            }]
        );
    }

    #[test]
    fn dedup_outcome_skips_refresh() {
        assert!(!WriteOutcome::Deduplicated { id: 7 }.needs_refresh());
        assert!(WriteOutcome::Created { id: 8 }.needs_refresh());
        assert!(!WriteOutcome::Unchanged.needs_refresh());
    }

    #[test]
    fn focus_wraps_both_ways() {
        let mut form = EditForm::blank();
        form.focus_prev();
        assert_eq!(form.focus, TAGS);
        form.focus_next();
        assert_eq!(form.focus, CONTENT);
    }
}
