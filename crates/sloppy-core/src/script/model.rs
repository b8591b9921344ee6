use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ScriptState;

/// One generation-through-upload pipeline run.
///
/// `id` doubles as the identifier of the task that created the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub id: String,
    pub user_prompt: String,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default = "zero_cost")]
    pub script_cost: Option<f64>,
    #[serde(default)]
    pub tiktok_url: Option<String>,
    #[serde(default)]
    pub audio_file: Option<String>,
    #[serde(default)]
    pub video_file: Option<String>,
    #[serde(default = "zero_cost")]
    pub video_cost: Option<f64>,
    #[serde(default = "initial_state")]
    pub state: ScriptState,
    #[serde(default)]
    pub active_task_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn zero_cost() -> Option<f64> {
    Some(0.0)
}

fn initial_state() -> ScriptState {
    ScriptState::Generating
}

impl Script {
    /// A fresh record in [`ScriptState::Generating`].
    pub fn new(id: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_prompt: user_prompt.into(),
            script: None,
            script_cost: zero_cost(),
            tiktok_url: None,
            audio_file: None,
            video_file: None,
            video_cost: zero_cost(),
            state: initial_state(),
            active_task_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_active_task(mut self, task_id: impl Into<String>) -> Self {
        self.active_task_id = Some(task_id.into());
        self
    }

    /// Whether the record carries dialogue text that production can render.
    pub fn has_script_text(&self) -> bool {
        self.script.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// Encode as a store document: the key lives under `_id` and the state
    /// is written as its ordinal.
    pub fn to_document(&self) -> Value {
        let mut doc = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if let Some(id) = doc.remove("id") {
            doc.insert("_id".to_owned(), id);
        }
        Value::Object(doc)
    }

    /// Inverse of [`Script::to_document`].
    pub fn from_document(doc: Value) -> Result<Self, serde_json::Error> {
        let mut doc = doc;
        if let Value::Object(map) = &mut doc {
            if let Some(id) = map.remove("_id") {
                map.insert("id".to_owned(), id);
            }
        }
        serde_json::from_value(doc)
    }
}

/// A partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptPatch {
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default, alias = "cost")]
    pub script_cost: Option<f64>,
    #[serde(default)]
    pub tiktok_url: Option<String>,
    #[serde(default)]
    pub audio_file: Option<String>,
    #[serde(default)]
    pub video_file: Option<String>,
    #[serde(default)]
    pub video_cost: Option<f64>,
    #[serde(default)]
    pub state: Option<ScriptState>,
}

impl ScriptPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn generated(script: impl Into<String>, cost: f64) -> Self {
        Self {
            script: Some(script.into()),
            script_cost: Some(cost),
            ..Self::default()
        }
    }

    pub fn produced(audio_file: impl Into<String>, video_file: impl Into<String>, cost: f64) -> Self {
        Self {
            audio_file: Some(audio_file.into()),
            video_file: Some(video_file.into()),
            video_cost: Some(cost),
            ..Self::default()
        }
    }

    pub fn uploaded(tiktok_url: Option<String>) -> Self {
        Self {
            tiktok_url,
            ..Self::default()
        }
    }
}
