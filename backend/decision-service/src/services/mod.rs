pub mod candidate_pool;
pub mod coarse_ranking;
pub mod constraint_gate;
pub mod decision_engine;
pub mod decision_recorder;
pub mod exploration;
pub mod feedback;
pub mod fine_ranking;
pub mod metrics;
pub mod settings;
pub mod weights;

pub use candidate_pool::CandidatePoolCache;
pub use coarse_ranking::CoarseRankingLayer;
pub use constraint_gate::ConstraintGate;
pub use decision_engine::{DecisionEngine, EngineParts};
pub use decision_recorder::DecisionRecorder;
pub use exploration::ExplorationPolicy;
pub use feedback::FeedbackIngestor;
pub use fine_ranking::FineRankingLayer;
pub use metrics::MetricsAggregator;
pub use settings::SettingsService;
