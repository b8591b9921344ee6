//! SQLite implementation of [`ScriptStore`].
//!
//! Migrations under `./migrations` are embedded at compile time and run by
//! [`SqliteScriptStore::connect`]. The runtime-checked `sqlx::query` form is
//! used so no `DATABASE_URL` is needed to build.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::warn;

use super::{ScriptStore, StoreError};
use crate::script::{InvalidTransition, Script, ScriptPatch, ScriptState, Transition};

const COLUMNS: &str = "id, user_prompt, script, script_cost, tiktok_url, audio_file, video_file, \
                       video_cost, state, active_task_id, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct SqliteScriptStore {
    pool: SqlitePool,
}

impl SqliteScriptStore {
    /// Open (or create) the database at `url` and run pending migrations.
    ///
    /// `url` is a sqlx SQLite URL such as `"sqlite://sloppy.db"`. An in-memory
    /// URL is routed to [`SqliteScriptStore::in_memory`] since every pooled
    /// connection would otherwise see its own empty database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        if url.contains(":memory:") {
            return Self::in_memory().await;
        }
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    /// A private database living as long as the returned store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, StoreError> {
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    async fn fetch_where(&self, clause: &str, state: Option<ScriptState>) -> Result<Vec<Script>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM scripts {clause} ORDER BY created_at DESC");
        let mut query = sqlx::query_as::<_, ScriptRow>(&sql);
        if let Some(state) = state {
            query = query.bind(state.ordinal());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Script::try_from).collect()
    }

    /// Explain why a conditional update touched no row.
    /// Explain why a guarded update for `transition` touched no row.
    async fn diagnose(&self, id: &str, transition: Transition) -> StoreError {
        match self.get(id).await {
            Ok(None) => StoreError::NotFound(id.to_owned()),
            Ok(Some(current)) => match current.state.apply(transition) {
                Err(InvalidTransition { actual, .. }) => StoreError::InvalidState {
                    id: id.to_owned(),
                    expected: transition.predecessor(),
                    actual,
                },
                Ok(_) => StoreError::Busy {
                    id: id.to_owned(),
                    active_task_id: current.active_task_id.unwrap_or_default(),
                },
            },
            Err(e) => e,
        }
    }

    async fn require(&self, id: &str) -> Result<Script, StoreError> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }
}

// ── Row mapping ───────────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct ScriptRow {
    id: String,
    user_prompt: String,
    script: Option<String>,
    script_cost: Option<f64>,
    tiktok_url: Option<String>,
    audio_file: Option<String>,
    video_file: Option<String>,
    video_cost: Option<f64>,
    state: i64,
    active_task_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ScriptRow> for Script {
    type Error = StoreError;

    fn try_from(row: ScriptRow) -> Result<Self, Self::Error> {
        let state = ScriptState::try_from(row.state).map_err(|e| StoreError::Corrupt {
            id: row.id.clone(),
            message: e.to_string(),
        })?;
        Ok(Script {
            created_at: parse_timestamp(&row.created_at, "created_at"),
            updated_at: parse_timestamp(&row.updated_at, "updated_at"),
            id: row.id,
            user_prompt: row.user_prompt,
            script: row.script,
            script_cost: row.script_cost,
            tiktok_url: row.tiktok_url,
            audio_file: row.audio_file,
            video_file: row.video_file,
            video_cost: row.video_cost,
            state,
            active_task_id: row.active_task_id,
        })
    }
}

fn parse_timestamp(raw: &str, column: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        warn!(raw = %raw, column, error = %e, "failed to parse script timestamp; using now");
        Utc::now()
    })
}

// ── Partial updates ───────────────────────────────────────────────────────────

enum FieldValue {
    Text(String),
    Real(f64),
    Int(i64),
}

fn assignments(patch: &ScriptPatch, include_state: bool) -> Vec<(&'static str, FieldValue)> {
    let mut fields = Vec::new();
    if let Some(v) = &patch.script {
        fields.push(("script", FieldValue::Text(v.clone())));
    }
    if let Some(v) = patch.script_cost {
        fields.push(("script_cost", FieldValue::Real(v)));
    }
    if let Some(v) = &patch.tiktok_url {
        fields.push(("tiktok_url", FieldValue::Text(v.clone())));
    }
    if let Some(v) = &patch.audio_file {
        fields.push(("audio_file", FieldValue::Text(v.clone())));
    }
    if let Some(v) = &patch.video_file {
        fields.push(("video_file", FieldValue::Text(v.clone())));
    }
    if let Some(v) = patch.video_cost {
        fields.push(("video_cost", FieldValue::Real(v)));
    }
    if include_state {
        if let Some(v) = patch.state {
            fields.push(("state", FieldValue::Int(v.ordinal())));
        }
    }
    fields
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &FieldValue) {
    match value {
        FieldValue::Text(v) => qb.push_bind(v.clone()),
        FieldValue::Real(v) => qb.push_bind(*v),
        FieldValue::Int(v) => qb.push_bind(*v),
    };
}

fn push_assignments(qb: &mut QueryBuilder<'_, Sqlite>, fields: &[(&'static str, FieldValue)]) {
    for (column, value) in fields {
        qb.push(column).push(" = ");
        push_value(qb, value);
        qb.push(", ");
    }
    qb.push("updated_at = ").push_bind(Utc::now().to_rfc3339());
}

/// `UPDATE scripts SET <patch> WHERE id = ? [AND state = ?] AND (<any field differs>)`
fn patch_query(id: &str, patch: &ScriptPatch, expected: Option<ScriptState>) -> Option<QueryBuilder<'static, Sqlite>> {
    let fields = assignments(patch, true);
    if fields.is_empty() {
        return None;
    }
    let mut qb = QueryBuilder::new("UPDATE scripts SET ");
    push_assignments(&mut qb, &fields);
    qb.push(" WHERE id = ").push_bind(id.to_owned());
    if let Some(state) = expected {
        qb.push(" AND state = ").push_bind(state.ordinal());
    }
    qb.push(" AND (");
    for (i, (column, value)) in fields.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(column).push(" IS NOT ");
        push_value(&mut qb, value);
    }
    qb.push(")");
    Some(qb)
}

// ── ScriptStore ───────────────────────────────────────────────────────────────

impl ScriptStore for SqliteScriptStore {
    async fn create(&self, script: Script) -> Result<String, StoreError> {
        let result = sqlx::query(
            "INSERT INTO scripts (id, user_prompt, script, script_cost, tiktok_url, audio_file, \
             video_file, video_cost, state, active_task_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&script.id)
        .bind(&script.user_prompt)
        .bind(&script.script)
        .bind(script.script_cost)
        .bind(&script.tiktok_url)
        .bind(&script.audio_file)
        .bind(&script.video_file)
        .bind(script.video_cost)
        .bind(script.state.ordinal())
        .bind(&script.active_task_id)
        .bind(script.created_at.to_rfc3339())
        .bind(script.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(script.id),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateKey(script.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Script>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM scripts WHERE id = ?1");
        let row: Option<ScriptRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Script::try_from).transpose()
    }

    async fn update(&self, id: &str, patch: &ScriptPatch) -> Result<bool, StoreError> {
        let Some(mut qb) = patch_query(id, patch, None) else {
            return Ok(false);
        };
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_in_state(
        &self,
        id: &str,
        expected: ScriptState,
        patch: &ScriptPatch,
    ) -> Result<bool, StoreError> {
        let Some(mut qb) = patch_query(id, patch, Some(expected)) else {
            return Ok(false);
        };
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM scripts WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_state(&self, state: ScriptState) -> Result<Vec<Script>, StoreError> {
        self.fetch_where("WHERE state = ?1", Some(state)).await
    }

    async fn list_not_in_state(&self, state: ScriptState) -> Result<Vec<Script>, StoreError> {
        self.fetch_where("WHERE state != ?1", Some(state)).await
    }

    async fn list_all(&self) -> Result<Vec<Script>, StoreError> {
        self.fetch_where("", None).await
    }

    async fn clear_active_task(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE scripts SET active_task_id = NULL, updated_at = ?1 \
             WHERE id = ?2 AND active_task_id IS NOT NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn begin_task(
        &self,
        id: &str,
        transition: Transition,
        task_id: &str,
    ) -> Result<Script, StoreError> {
        let result = sqlx::query(
            "UPDATE scripts SET state = ?1, active_task_id = ?2, updated_at = ?3 \
             WHERE id = ?4 AND state = ?5 AND active_task_id IS NULL",
        )
        .bind(transition.successor().ordinal())
        .bind(task_id)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .bind(transition.predecessor().ordinal())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.diagnose(id, transition).await);
        }
        self.require(id).await
    }

    async fn finish_task(
        &self,
        id: &str,
        transition: Transition,
        patch: &ScriptPatch,
        release: bool,
    ) -> Result<Script, StoreError> {
        let mut fields = assignments(patch, false);
        fields.push(("state", FieldValue::Int(transition.successor().ordinal())));

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE scripts SET ");
        if release {
            qb.push("active_task_id = NULL, ");
        }
        push_assignments(&mut qb, &fields);
        qb.push(" WHERE id = ").push_bind(id.to_owned());
        qb.push(" AND state = ").push_bind(transition.predecessor().ordinal());

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(self.diagnose(id, transition).await);
        }
        self.require(id).await
    }

    async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "script store health check failed");
                false
            }
        }
    }
}
