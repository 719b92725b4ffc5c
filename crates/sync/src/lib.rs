pub mod dedup;
pub mod provider;
pub mod reconciler;
pub mod rules;
pub mod suggest;

pub use dedup::DuplicateMatch;
pub use provider::{
    DeltaBatch, HttpProvider, ProviderError, ProviderRecord, RemovedRecord, ScriptedProvider,
    TransactionProvider,
};
pub use reconciler::{SyncError, SyncGate, SyncOutcome, SyncReconciler};
pub use rules::{apply_rules, compile_pattern, RuleEngine, RuleMatchDetail, RuleRunSummary};
pub use suggest::suggest_category;
