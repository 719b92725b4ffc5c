use serde::{Deserialize, Serialize};

/// Owner-scoped auto-categorization rule. `pattern` is a regular expression
/// matched case-insensitively against transaction text; it is validated as
/// compilable when the rule is created or updated. Higher `priority` rules
/// are evaluated first; ties fall back to creation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoCategorizeRule {
    pub id: Option<i64>,
    pub owner_id: String,
    pub name: String,
    pub pattern: String,
    pub category_id: i64,
    pub enabled: bool,
    pub priority: i32,
}

impl AutoCategorizeRule {
    pub fn new(owner_id: &str, name: &str, pattern: &str, category_id: i64) -> Self {
        AutoCategorizeRule {
            id: None,
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            pattern: pattern.to_string(),
            category_id,
            enabled: true,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
