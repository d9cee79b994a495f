// ============================================
// Weight Inheritance
// ============================================
//
// Factor weights resolve through global → category → product → template.
// Each level may override individual factors; the last level wins.

use crate::models::TaskSpec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::warn;

const SUM_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Error, PartialEq)]
pub enum WeightError {
    #[error("weight for {factor} must be finite and non-negative, got {value}")]
    Negative { factor: String, value: f64 },

    #[error("all factor weights are zero")]
    AllZero,
}

/// A fixed set of named factor weights
pub trait FactorWeights: Clone + Default + Send + Sync {
    const FACTORS: &'static [&'static str];

    fn get(&self, factor: &str) -> Option<f64>;

    /// Returns false for unknown factors
    fn set(&mut self, factor: &str, value: f64) -> bool;

    fn sum(&self) -> f64 {
        Self::FACTORS.iter().filter_map(|f| self.get(f)).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoarseWeights {
    pub relevance: f64,
    pub quality: f64,
    pub diversity: f64,
    pub recency: f64,
}

impl Default for CoarseWeights {
    fn default() -> Self {
        Self {
            relevance: 0.40,
            quality: 0.30,
            diversity: 0.15,
            recency: 0.15,
        }
    }
}

impl FactorWeights for CoarseWeights {
    const FACTORS: &'static [&'static str] = &["relevance", "quality", "diversity", "recency"];

    fn get(&self, factor: &str) -> Option<f64> {
        match factor {
            "relevance" => Some(self.relevance),
            "quality" => Some(self.quality),
            "diversity" => Some(self.diversity),
            "recency" => Some(self.recency),
            _ => None,
        }
    }

    fn set(&mut self, factor: &str, value: f64) -> bool {
        match factor {
            "relevance" => self.relevance = value,
            "quality" => self.quality = value,
            "diversity" => self.diversity = value,
            "recency" => self.recency = value,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FineWeights {
    pub user_preference: f64,
    pub business_value: f64,
    pub technical_quality: f64,
    pub market_trend: f64,
}

impl Default for FineWeights {
    fn default() -> Self {
        Self {
            user_preference: 0.35,
            business_value: 0.25,
            technical_quality: 0.25,
            market_trend: 0.15,
        }
    }
}

impl FactorWeights for FineWeights {
    const FACTORS: &'static [&'static str] =
        &["userPreference", "businessValue", "technicalQuality", "marketTrend"];

    fn get(&self, factor: &str) -> Option<f64> {
        match factor {
            "userPreference" => Some(self.user_preference),
            "businessValue" => Some(self.business_value),
            "technicalQuality" => Some(self.technical_quality),
            "marketTrend" => Some(self.market_trend),
            _ => None,
        }
    }

    fn set(&mut self, factor: &str, value: f64) -> bool {
        match factor {
            "userPreference" => self.user_preference = value,
            "businessValue" => self.business_value = value,
            "technicalQuality" => self.technical_quality = value,
            "marketTrend" => self.market_trend = value,
            _ => return false,
        }
        true
    }
}

/// Per-factor overrides for one level of the chain
pub type WeightOverrides = BTreeMap<String, f64>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightChain<W> {
    pub global: W,
    pub category: HashMap<String, WeightOverrides>,
    pub product: HashMap<String, WeightOverrides>,
    pub template: HashMap<String, WeightOverrides>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWeights<W> {
    pub weights: W,
    /// Levels that contributed, e.g. `["global", "category:ads"]`
    pub levels: Vec<String>,
}

impl<W: FactorWeights> WeightChain<W> {
    pub fn new(global: W) -> Self {
        Self {
            global,
            category: HashMap::new(),
            product: HashMap::new(),
            template: HashMap::new(),
        }
    }

    pub fn with_category(mut self, name: impl Into<String>, overrides: WeightOverrides) -> Self {
        self.category.insert(name.into(), overrides);
        self
    }

    pub fn with_product(mut self, name: impl Into<String>, overrides: WeightOverrides) -> Self {
        self.product.insert(name.into(), overrides);
        self
    }

    pub fn with_template(mut self, name: impl Into<String>, overrides: WeightOverrides) -> Self {
        self.template.insert(name.into(), overrides);
        self
    }

    /// Resolve the weights for a task and normalise them to sum to 1.0
    pub fn resolve(&self, task: Option<&TaskSpec>) -> Result<ResolvedWeights<W>, WeightError> {
        let mut weights = self.global.clone();
        let mut levels = vec!["global".to_string()];

        let chain = [
            ("category", &self.category, task.and_then(|t| t.category.as_deref())),
            ("product", &self.product, task.and_then(|t| t.product.as_deref())),
            ("template", &self.template, task.and_then(|t| t.template.as_deref())),
        ];

        for (level, overrides_by_name, name) in chain {
            let Some(name) = name else { continue };
            let Some(overrides) = overrides_by_name.get(name) else {
                continue;
            };
            for (factor, value) in overrides {
                if !weights.set(factor, *value) {
                    warn!(chain_level = level, name, factor = %factor, "Ignoring override for unknown factor");
                }
            }
            levels.push(format!("{}:{}", level, name));
        }

        for factor in W::FACTORS {
            let value = weights.get(factor).unwrap_or(0.0);
            if !value.is_finite() || value < 0.0 {
                return Err(WeightError::Negative {
                    factor: factor.to_string(),
                    value,
                });
            }
        }

        let sum = weights.sum();
        if sum <= 0.0 {
            return Err(WeightError::AllZero);
        }
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            warn!(sum, levels = ?levels, "Resolved weights do not sum to 1.0, renormalising");
            for factor in W::FACTORS {
                let value = weights.get(factor).unwrap_or(0.0);
                weights.set(factor, value / sum);
            }
        }

        Ok(ResolvedWeights { weights, levels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(pairs: &[(&str, f64)]) -> WeightOverrides {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn task(category: Option<&str>, product: Option<&str>, template: Option<&str>) -> TaskSpec {
        TaskSpec {
            subject_ref: "job-1".to_string(),
            category: category.map(str::to_string),
            product: product.map(str::to_string),
            template: template.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_sum_to_one() {
        assert!((CoarseWeights::default().sum() - 1.0).abs() < 1e-9);
        assert!((FineWeights::default().sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_later_levels_override_earlier() {
        let chain = WeightChain::new(CoarseWeights::default())
            .with_category("ads", overrides(&[("relevance", 0.5), ("quality", 0.2)]))
            .with_template("flash-sale", overrides(&[("relevance", 0.3), ("recency", 0.35)]));

        let resolved = chain
            .resolve(Some(&task(Some("ads"), Some("shoes"), Some("flash-sale"))))
            .unwrap();

        assert_eq!(resolved.levels, vec!["global", "category:ads", "template:flash-sale"]);
        assert!((resolved.weights.relevance - 0.3).abs() < 1e-9);
        assert!((resolved.weights.quality - 0.2).abs() < 1e-9);
        assert!((resolved.weights.recency - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_renormalises_when_sum_is_off() {
        let chain = WeightChain::new(CoarseWeights::default())
            .with_product("shoes", overrides(&[("relevance", 1.4)]));

        let resolved = chain.resolve(Some(&task(None, Some("shoes"), None))).unwrap();

        assert!((resolved.weights.sum() - 1.0).abs() < 1e-9);
        assert!((resolved.weights.relevance - 1.4 / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let zero = WeightChain::new(FineWeights {
            user_preference: 0.0,
            business_value: 0.0,
            technical_quality: 0.0,
            market_trend: 0.0,
        });
        assert_eq!(zero.resolve(None), Err(WeightError::AllZero));

        let negative = WeightChain::new(FineWeights::default())
            .with_category("ads", overrides(&[("marketTrend", -0.1)]));
        assert!(matches!(
            negative.resolve(Some(&task(Some("ads"), None, None))),
            Err(WeightError::Negative { .. })
        ));
    }
}
