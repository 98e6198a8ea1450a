pub mod engine;
pub mod mapping;
pub mod models;

pub use engine::{match_rules, RouteDecision};
pub use models::{FieldMapping, MatcherType, PgRuleSource, Rule, RuleSource};
