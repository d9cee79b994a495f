//! Per-scenario recommendation settings with documented defaults

use crate::error::{AppError, Result};
use crate::models::{RecommendationSetting, Scenario, SettingUpdate};
use crate::store::SettingsStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn SettingsStore>,
}

impl SettingsService {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Stored row, or the defaults when the scenario was never configured
    pub async fn get(&self, scenario: Scenario) -> Result<RecommendationSetting> {
        Ok(self
            .store
            .get_setting(scenario)
            .await?
            .unwrap_or_else(|| RecommendationSetting::defaults(scenario)))
    }

    /// Merge the update over the current value, validate, persist
    pub async fn upsert(&self, scenario: Scenario, update: SettingUpdate) -> Result<RecommendationSetting> {
        let mut setting = self.get(scenario).await?;
        setting.apply(update);
        setting.validate().map_err(AppError::Validation)?;
        setting.updated_at = Some(Utc::now());

        let saved = self.store.upsert_setting(&setting).await?;
        info!(
            %scenario,
            epsilon = saved.epsilon,
            min_explore = saved.min_explore,
            m_coarse = saved.m_coarse,
            k_fine = saved.k_fine,
            "Recommendation setting updated"
        );
        Ok(saved)
    }
}
