use serde::{Deserialize, Serialize};

/// A classification bucket. Default categories are owner-less, seeded at
/// startup, and immutable; custom categories belong to one owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Option<i64>,
    pub owner_id: Option<String>,
    pub name: String,
    pub is_default: bool,
    /// IRS Schedule C line this category rolls up to, where one applies.
    pub schedule_c_line: Option<String>,
}

impl Category {
    pub fn custom(owner_id: &str, name: &str) -> Self {
        Category {
            id: None,
            owner_id: Some(owner_id.to_string()),
            name: name.to_string(),
            is_default: false,
            schedule_c_line: None,
        }
    }
}

/// Seeded once per database. Expense buckets carry their Schedule C line.
pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Advertising & Marketing", "line_8"),
    ("Bank Fees", "line_17"),
    ("Business Meals (50% deductible)", "line_24b"),
    ("Education & Training", "line_27"),
    ("Equipment", "line_15"),
    ("Home Office", "line_30"),
    ("Insurance", "line_14"),
    ("Internet & Phone", "line_18"),
    ("Legal & Professional", "line_17"),
    ("Mileage", "line_24a"),
    ("Office Supplies", "line_18"),
    ("Rent & Lease", "line_20b"),
    ("Software & Subscriptions", "line_18"),
    ("Travel", "line_24a"),
    ("Utilities", "line_18"),
    ("Vehicle Expenses", "line_24a"),
    ("Miscellaneous", "line_27"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_category_is_owned_and_mutable() {
        let c = Category::custom("u1", "Podcast Gear");
        assert_eq!(c.owner_id.as_deref(), Some("u1"));
        assert!(!c.is_default);
    }

    #[test]
    fn default_names_are_unique() {
        let mut names: Vec<&str> = DEFAULT_CATEGORIES.iter().map(|(n, _)| *n).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), DEFAULT_CATEGORIES.len());
    }
}
