//! Routing rule model.
//!
//! Rules are owned by the tenant-configuration service; this pipeline
//! only reads the active set for a project, ordered by priority.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "matcher_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MatcherType {
    Prefix,
    Keyword,
    Contains,
    Regex,
}

/// How a matched message maps onto destination page properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Property that receives the message text as the page title.
    #[serde(default = "default_title_property")]
    pub title_property: String,
    /// Property stamped with the capture date, if any.
    #[serde(default)]
    pub date_property: Option<String>,
    /// Multi-select property receiving `tags`, if any.
    #[serde(default)]
    pub tag_property: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Fixed rich-text fields written verbatim on every match.
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
}

fn default_title_property() -> String {
    "Name".to_string()
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            title_property: default_title_property(),
            date_property: None,
            tag_property: None,
            tags: Vec::new(),
            custom_fields: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Ascending order of evaluation; lower wins.
    pub priority: i32,
    pub matcher_type: MatcherType,
    pub pattern: String,
    pub case_sensitive: bool,
    pub destination_id: String,
    pub field_mapping: FieldMapping,
    /// Strip the matched text from the message before mapping.
    pub remove_pattern: bool,
    pub active: bool,
}

impl Rule {
    /// Minimal active rule, for tests and fixtures.
    pub fn simple(
        project_id: Uuid,
        priority: i32,
        matcher_type: MatcherType,
        pattern: impl Into<String>,
        destination_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            priority,
            matcher_type,
            pattern: pattern.into(),
            case_sensitive: false,
            destination_id: destination_id.into(),
            field_mapping: FieldMapping::default(),
            remove_pattern: false,
            active: true,
        }
    }
}

#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Active rules for the project, ordered by ascending priority.
    async fn active_rules(&self, project_id: Uuid) -> Result<Vec<Rule>>;
}

pub struct PgRuleSource {
    pool: PgPool,
}

impl PgRuleSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: Uuid,
    project_id: Uuid,
    priority: i32,
    matcher_type: MatcherType,
    pattern: String,
    case_sensitive: bool,
    destination_id: String,
    field_mapping: serde_json::Value,
    remove_pattern: bool,
    active: bool,
}

#[async_trait]
impl RuleSource for PgRuleSource {
    async fn active_rules(&self, project_id: Uuid) -> Result<Vec<Rule>> {
        let rows = sqlx::query_as::<_, RuleRow>(
            r#"
            SELECT id, project_id, priority, matcher_type, pattern, case_sensitive,
                   destination_id, field_mapping, remove_pattern, active
            FROM rules
            WHERE project_id = $1 AND active
            ORDER BY priority ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                // A rule with an unreadable mapping falls back to the
                // default mapping rather than poisoning the whole set.
                let field_mapping =
                    serde_json::from_value(row.field_mapping).unwrap_or_default();
                Ok(Rule {
                    id: row.id,
                    project_id: row.project_id,
                    priority: row.priority,
                    matcher_type: row.matcher_type,
                    pattern: row.pattern,
                    case_sensitive: row.case_sensitive,
                    destination_id: row.destination_id,
                    field_mapping,
                    remove_pattern: row.remove_pattern,
                    active: row.active,
                })
            })
            .collect()
    }
}
