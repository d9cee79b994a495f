use super::{DecisionStore, RecordOutcome, SettingsStore, StoreError, StoreResult};
use crate::models::{
    Candidate, CandidateSet, Decision, DecisionStats, Event, EventType, ExploreFlags, Feedback,
    Outcome, OutcomePatch, RecommendationSetting, Scenario, SettingMode, WeightsSnapshot,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// PostgreSQL foreign key violation
const FK_VIOLATION: &str = "23503";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    fn decision_from_row(row: &PgRow) -> StoreResult<Decision> {
        let scenario: String = row.try_get("scenario")?;
        let mode: String = row.try_get("mode")?;
        let Json(weights_snapshot): Json<WeightsSnapshot> = row.try_get("weights_snapshot")?;
        let Json(explore_flags): Json<ExploreFlags> = row.try_get("explore_flags")?;

        Ok(Decision {
            id: row.try_get("id")?,
            candidate_set_id: row.try_get("candidate_set_id")?,
            scenario: scenario.parse().map_err(StoreError::Serialization)?,
            subject_ref: row.try_get("subject_ref")?,
            chosen_target_id: row.try_get("chosen_target_id")?,
            mode: serde_json::from_value(serde_json::Value::String(mode))?,
            weights_snapshot,
            explore_flags,
            request_id: row.try_get("request_id")?,
            segment: row.try_get("segment")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn outcome_from_row(row: &PgRow) -> StoreResult<Outcome> {
        let latency_ms: Option<i64> = row.try_get("latency_ms")?;
        Ok(Outcome {
            decision_id: row.try_get("decision_id")?,
            latency_ms: latency_ms.map(|v| v.max(0) as u64),
            cost_actual: row.try_get("cost_actual")?,
            quality_score: row.try_get("quality_score")?,
            conversion: row.try_get("conversion")?,
            rejected: row.try_get("rejected")?,
            edit_distance: row.try_get("edit_distance")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn setting_from_row(row: &PgRow) -> StoreResult<RecommendationSetting> {
        let scenario: String = row.try_get("scenario")?;
        let mode: String = row.try_get("mode")?;
        let m_coarse: i32 = row.try_get("m_coarse")?;
        let k_fine: i32 = row.try_get("k_fine")?;
        let latency_soft_ms: i64 = row.try_get("latency_soft_ms")?;
        let latency_hard_ms: i64 = row.try_get("latency_hard_ms")?;

        Ok(RecommendationSetting {
            scenario: scenario.parse().map_err(StoreError::Serialization)?,
            mode: match mode.as_str() {
                "ml" => SettingMode::Ml,
                _ => SettingMode::Rule,
            },
            m_coarse: m_coarse.max(0) as usize,
            k_fine: k_fine.max(0) as usize,
            epsilon: row.try_get("epsilon")?,
            min_explore: row.try_get("min_explore")?,
            diversity: row.try_get("diversity")?,
            quality_floor_rej: row.try_get("quality_floor_rej")?,
            quality_floor_str: row.try_get("quality_floor_str")?,
            cost_overrun_mul: row.try_get("cost_overrun_mul")?,
            latency_soft_ms: latency_soft_ms.max(0) as u64,
            latency_hard_ms: latency_hard_ms.max(0) as u64,
            segment_template: row.try_get("segment_template")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait::async_trait]
impl DecisionStore for PgStore {
    async fn record_decision(
        &self,
        set: &CandidateSet,
        decision: &Decision,
    ) -> StoreResult<RecordOutcome> {
        let mut tx = self.pool.begin().await?;

        // ids are derived from the request, so a retried write hits ON CONFLICT
        sqlx::query(
            r#"
            INSERT INTO candidate_sets (id, scenario, subject_snapshot, context_snapshot, candidates, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(set.id)
        .bind(set.scenario.as_str())
        .bind(&set.subject_snapshot)
        .bind(&set.context_snapshot)
        .bind(Json(&set.candidates))
        .bind(set.created_at)
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO decisions (
                id, candidate_set_id, scenario, subject_ref, chosen_target_id, mode,
                weights_snapshot, explore_flags, fallback_used, request_id, segment, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(decision.id)
        .bind(decision.candidate_set_id)
        .bind(decision.scenario.as_str())
        .bind(&decision.subject_ref)
        .bind(&decision.chosen_target_id)
        .bind(decision.mode.as_str())
        .bind(Json(&decision.weights_snapshot))
        .bind(Json(&decision.explore_flags))
        .bind(decision.fallback_used())
        .bind(&decision.request_id)
        .bind(&decision.segment)
        .bind(decision.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !inserted {
            tx.rollback().await?;
            debug!(decision_id = %decision.id, "Decision already recorded");
            return match self.get_decision(decision.id).await? {
                Some(existing) => Ok(RecordOutcome::AlreadyRecorded(Box::new(existing))),
                None => Err(StoreError::Conflict(format!(
                    "decision {} reported as duplicate but not readable",
                    decision.id
                ))),
            };
        }

        tx.commit().await?;
        Ok(RecordOutcome::Inserted)
    }

    async fn get_decision(&self, id: Uuid) -> StoreResult<Option<Decision>> {
        let row = sqlx::query("SELECT * FROM decisions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decision_from_row).transpose()
    }

    async fn get_candidate_set(&self, id: Uuid) -> StoreResult<Option<CandidateSet>> {
        let row = sqlx::query("SELECT * FROM candidate_sets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let scenario: String = row.try_get("scenario")?;
        let Json(candidates): Json<Vec<Candidate>> = row.try_get("candidates")?;

        Ok(Some(CandidateSet {
            id: row.try_get("id")?,
            scenario: scenario.parse::<Scenario>().map_err(StoreError::Serialization)?,
            subject_snapshot: row.try_get("subject_snapshot")?,
            context_snapshot: row.try_get("context_snapshot")?,
            candidates,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn upsert_outcome(
        &self,
        decision_id: Uuid,
        patch: &OutcomePatch,
    ) -> StoreResult<Outcome> {
        // COALESCE keeps stored values for fields the patch omits
        let result = sqlx::query(
            r#"
            INSERT INTO outcomes (
                decision_id, latency_ms, cost_actual, quality_score, conversion,
                rejected, edit_distance, notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            ON CONFLICT (decision_id) DO UPDATE SET
                latency_ms = COALESCE(EXCLUDED.latency_ms, outcomes.latency_ms),
                cost_actual = COALESCE(EXCLUDED.cost_actual, outcomes.cost_actual),
                quality_score = COALESCE(EXCLUDED.quality_score, outcomes.quality_score),
                conversion = COALESCE(EXCLUDED.conversion, outcomes.conversion),
                rejected = COALESCE(EXCLUDED.rejected, outcomes.rejected),
                edit_distance = COALESCE(EXCLUDED.edit_distance, outcomes.edit_distance),
                notes = COALESCE(EXCLUDED.notes, outcomes.notes),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(decision_id)
        .bind(patch.latency_ms.map(|v| v as i64))
        .bind(patch.cost_actual)
        .bind(patch.quality_score)
        .bind(patch.conversion)
        .bind(patch.rejected)
        .bind(patch.edit_distance)
        .bind(&patch.notes)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Self::outcome_from_row(&row),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(FK_VIOLATION) => {
                Err(StoreError::NotFound(format!("decision {}", decision_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_outcome(&self, decision_id: Uuid) -> StoreResult<Option<Outcome>> {
        let row = sqlx::query("SELECT * FROM outcomes WHERE decision_id = $1")
            .bind(decision_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::outcome_from_row).transpose()
    }

    async fn append_event(&self, event: &Event) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO decision_events (id, decision_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.id)
        .bind(event.decision_id)
        .bind(event.event_type.as_str())
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_events(&self, decision_id: Uuid) -> StoreResult<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT * FROM decision_events WHERE decision_id = $1 ORDER BY created_at, id",
        )
        .bind(decision_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let event_type: String = row.try_get("event_type")?;
                Ok(Event {
                    id: row.try_get("id")?,
                    decision_id: row.try_get("decision_id")?,
                    event_type: event_type
                        .parse::<EventType>()
                        .map_err(StoreError::Serialization)?,
                    payload: row.try_get("payload")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO decision_feedback (id, decision_id, feedback_type, chosen_candidate_id, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(feedback.id)
        .bind(feedback.decision_id)
        .bind(&feedback.feedback_type)
        .bind(&feedback.chosen_candidate_id)
        .bind(&feedback.reason)
        .bind(feedback.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn decision_stats(&self, since: DateTime<Utc>) -> StoreResult<DecisionStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE mode = 'explore') AS explore_count,
                COUNT(*) FILTER (WHERE fallback_used) AS fallback_count
            FROM decisions
            WHERE created_at >= $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.try_get("total")?;
        let explore: i64 = row.try_get("explore_count")?;
        let fallback: i64 = row.try_get("fallback_count")?;
        Ok(DecisionStats::from_counts(
            since,
            total.max(0) as u64,
            explore.max(0) as u64,
            fallback.max(0) as u64,
        ))
    }
}

#[async_trait::async_trait]
impl SettingsStore for PgStore {
    async fn get_setting(&self, scenario: Scenario) -> StoreResult<Option<RecommendationSetting>> {
        let row = sqlx::query("SELECT * FROM recommendation_settings WHERE scenario = $1")
            .bind(scenario.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::setting_from_row).transpose()
    }

    async fn upsert_setting(
        &self,
        setting: &RecommendationSetting,
    ) -> StoreResult<RecommendationSetting> {
        let row = sqlx::query(
            r#"
            INSERT INTO recommendation_settings (
                scenario, mode, m_coarse, k_fine, epsilon, min_explore, diversity,
                quality_floor_rej, quality_floor_str, cost_overrun_mul,
                latency_soft_ms, latency_hard_ms, segment_template, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
            ON CONFLICT (scenario) DO UPDATE SET
                mode = EXCLUDED.mode,
                m_coarse = EXCLUDED.m_coarse,
                k_fine = EXCLUDED.k_fine,
                epsilon = EXCLUDED.epsilon,
                min_explore = EXCLUDED.min_explore,
                diversity = EXCLUDED.diversity,
                quality_floor_rej = EXCLUDED.quality_floor_rej,
                quality_floor_str = EXCLUDED.quality_floor_str,
                cost_overrun_mul = EXCLUDED.cost_overrun_mul,
                latency_soft_ms = EXCLUDED.latency_soft_ms,
                latency_hard_ms = EXCLUDED.latency_hard_ms,
                segment_template = EXCLUDED.segment_template,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(setting.scenario.as_str())
        .bind(setting.mode.as_str())
        .bind(setting.m_coarse as i32)
        .bind(setting.k_fine as i32)
        .bind(setting.epsilon)
        .bind(setting.min_explore)
        .bind(setting.diversity)
        .bind(setting.quality_floor_rej)
        .bind(setting.quality_floor_str)
        .bind(setting.cost_overrun_mul)
        .bind(setting.latency_soft_ms as i64)
        .bind(setting.latency_hard_ms as i64)
        .bind(&setting.segment_template)
        .fetch_one(&self.pool)
        .await?;

        Self::setting_from_row(&row)
    }
}
