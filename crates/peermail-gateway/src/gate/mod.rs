//! Ingress gating (ordered accept/reject rules + sender whitelist).
//!
//! Both stores persist through the same `Repository` seam so the engine can
//! be backed by a JSON file in production and by memory in tests. CRUD is
//! serialized through one in-process mutex; files are replaced atomically.

pub mod matcher;
pub mod rules;
pub mod store;
pub mod whitelist;

pub use rules::{
    evaluate_rules, GateAction, GateConditions, GateDecision, GateEngine, GateEntry, GateRule,
    HeaderMatch,
};
pub use store::{JsonFileStore, MemoryStore, Repository};
pub use whitelist::Whitelist;
