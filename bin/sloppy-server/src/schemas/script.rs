use serde::{Deserialize, Serialize};
use serde_json::Value;
use sloppy_core::{Script, ScriptPatch, ScriptState};
use utoipa::ToSchema;

use crate::error::ServerError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ScriptResponse {
    pub id: String,
    pub user_prompt: String,
    pub script: Option<String>,
    pub script_cost: Option<f64>,
    pub tiktok_url: Option<String>,
    pub audio_file: Option<String>,
    pub video_file: Option<String>,
    pub video_cost: Option<f64>,
    /// Ordinal, 1 (`GENERATING`) through 6 (`UPLOADED`).
    pub state: i64,
    pub state_name: String,
    pub active_task_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Script> for ScriptResponse {
    fn from(s: Script) -> Self {
        Self {
            state: s.state.ordinal(),
            state_name: s.state.to_string(),
            created_at: s.created_at.to_rfc3339(),
            updated_at: s.updated_at.to_rfc3339(),
            id: s.id,
            user_prompt: s.user_prompt,
            script: s.script,
            script_cost: s.script_cost,
            tiktok_url: s.tiktok_url,
            audio_file: s.audio_file,
            video_file: s.video_file,
            video_cost: s.video_cost,
            active_task_id: s.active_task_id,
        }
    }
}

/// Full record for `POST /scripts`. Missing costs default to zero and a
/// missing state to `GENERATING`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateScriptRequest {
    pub id: String,
    pub user_prompt: String,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
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
    #[schema(value_type = Option<Object>)]
    pub state: Option<Value>,
    #[serde(default)]
    pub active_task_id: Option<String>,
}

impl TryFrom<CreateScriptRequest> for Script {
    type Error = ServerError;

    fn try_from(req: CreateScriptRequest) -> Result<Self, Self::Error> {
        if req.id.trim().is_empty() || req.user_prompt.trim().is_empty() {
            return Err(ServerError::BadRequest(
                "id and user_prompt are required".into(),
            ));
        }
        let mut script = Script::new(req.id, req.user_prompt);
        script.script = req.script;
        script.script_cost = req.script_cost.or(script.script_cost);
        script.tiktok_url = req.tiktok_url;
        script.audio_file = req.audio_file;
        script.video_file = req.video_file;
        script.video_cost = req.video_cost.or(script.video_cost);
        if let Some(state) = req.state {
            script.state = parse_state_value(&state)?;
        }
        script.active_task_id = req.active_task_id;
        Ok(script)
    }
}

/// Partial update body. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateScriptRequest {
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
    /// Ordinal or name.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub state: Option<Value>,
}

impl TryFrom<UpdateScriptRequest> for ScriptPatch {
    type Error = ServerError;

    fn try_from(req: UpdateScriptRequest) -> Result<Self, Self::Error> {
        let state = req.state.as_ref().map(parse_state_value).transpose()?;
        Ok(ScriptPatch {
            script: req.script,
            script_cost: req.script_cost,
            tiktok_url: req.tiktok_url,
            audio_file: req.audio_file,
            video_file: req.video_file,
            video_cost: req.video_cost,
            state,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedResponse {
    pub id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdatedResponse {
    /// Whether any field actually changed.
    pub updated: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeletedResponse {
    pub deleted: bool,
}

pub fn parse_state(raw: &str) -> Result<ScriptState, ServerError> {
    ScriptState::parse_lenient(raw)
        .ok_or_else(|| ServerError::BadRequest(format!("unknown script state '{raw}'")))
}

fn parse_state_value(value: &Value) -> Result<ScriptState, ServerError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|n| ScriptState::try_from(n).ok())
            .ok_or_else(|| ServerError::BadRequest(format!("unknown script state {n}"))),
        Value::String(s) => parse_state(s),
        other => Err(ServerError::BadRequest(format!(
            "state must be an ordinal or a name, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_accepts_ordinal_or_name_state() {
        for raw in [json!(4), json!("produced"), json!("PRODUCED")] {
            let req: UpdateScriptRequest = serde_json::from_value(json!({ "state": raw })).unwrap();
            let patch = ScriptPatch::try_from(req).unwrap();
            assert_eq!(patch.state, Some(ScriptState::Produced));
        }
        let req: UpdateScriptRequest = serde_json::from_value(json!({ "state": 42 })).unwrap();
        assert!(ScriptPatch::try_from(req).is_err());
    }

    #[test]
    fn empty_update_body_yields_empty_patch() {
        let req: UpdateScriptRequest = serde_json::from_value(json!({})).unwrap();
        assert!(ScriptPatch::try_from(req).unwrap().is_empty());
    }

    #[test]
    fn create_defaults_match_a_fresh_script() {
        let req: CreateScriptRequest =
            serde_json::from_value(json!({ "id": "T1", "user_prompt": "tides" })).unwrap();
        let script = Script::try_from(req).unwrap();
        assert_eq!(script.state, ScriptState::Generating);
        assert_eq!(script.script_cost, Some(0.0));
    }
}
