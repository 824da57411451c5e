use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    #[serde(rename = "affectedComponents")]
    pub affected_components: Vec<String>,
    #[serde(rename = "riskLevel")]
    pub risk_level: String,
    #[serde(rename = "breakingChanges")]
    pub breaking_changes: bool,
    #[serde(rename = "requiredUpdates")]
    pub required_updates: Vec<String>,
    pub complexity: String,
}

impl ImpactAnalysis {
    pub fn is_high_risk(&self) -> bool {
        self.risk_level.eq_ignore_ascii_case("high")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStructure {
    #[serde(rename = "projectId")]
    pub project_id: String,
    pub structure: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResult {
    pub status: String,
    #[serde(default)]
    pub details: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationScope {
    Full,
    Modified,
}

impl std::fmt::Display for ValidationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationScope::Full => write!(f, "full"),
            ValidationScope::Modified => write!(f, "modified"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: String,
    #[serde(default)]
    pub issues: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub status: String,
    #[serde(default)]
    pub details: Value,
}
