use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CacheRecord;

pub const ACTION_INSIGHT_TAKE_ACTION: &str = "insight:take_action";
pub const ACTION_INSIGHT_DISMISS: &str = "insight:dismiss";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    AutomationOpportunity,
    TaskFailureDiagnosis,
    SkillSuggestion,
    OptimizationRecommendation,
    ScriptingAppSuggestion,
    DevWorkflowSuggestion,
    NovelCombinationSuggestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    #[default]
    Pending,
    Actioned,
    Dismissed,
}

/// A follow-up the user can trigger from an insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightAction {
    pub label: String,
    /// Action identifier, e.g. `forge_ability`, `navigate`.
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightDetails {
    pub suggestion: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub actions: Vec<InsightAction>,
}

/// A system-generated suggestion awaiting the user's review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: String,
    pub owner_id: String,
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub details: InsightDetails,
    #[serde(default)]
    pub status: InsightStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Insight {
    pub fn is_pending(&self) -> bool {
        self.status == InsightStatus::Pending
    }

    pub fn with_status(&self, status: InsightStatus) -> Self {
        Self {
            status,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

impl CacheRecord for Insight {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
