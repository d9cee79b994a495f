pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
pub use services::{
    CandidatePoolCache, CoarseRankingLayer, ConstraintGate, DecisionEngine, DecisionRecorder,
    EngineParts, ExplorationPolicy, FeedbackIngestor, FineRankingLayer, MetricsAggregator,
    SettingsService,
};
