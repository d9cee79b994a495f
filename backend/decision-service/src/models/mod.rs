mod candidate;
mod decision;
mod feedback;
mod request;
mod setting;

pub use candidate::{
    by_score_then_id, Bucket, Candidate, CandidateProfile, CandidateReason, Capabilities,
    FactorContribution, Penalty, PenaltyKind, RawCandidate, Scenario, ScoredCandidate,
    ScoringSignals,
};
pub use decision::{
    CandidateSet, Decision, DecisionMode, DecisionStats, ExploreFlags, ExploreSource,
    GateRemoval, RemovalReason, WeightsSnapshot,
};
pub use feedback::{Event, EventType, Feedback, Outcome, OutcomePatch, SignalKind};
pub use request::{
    Alternatives, BudgetTier, CandidateView, Constraints, ContextSpec, FeedbackRequest,
    FeedbackResponse, RankOptions, RankRequest, RankResponse, TaskSpec,
};
pub use setting::{RecommendationSetting, SettingMode, SettingUpdate, DEFAULT_SEGMENT_TEMPLATE};
