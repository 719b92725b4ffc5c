use writeoff_core::Category;

/// Match a free-text category name (e.g. out of a scanned receipt) against
/// known categories. Strategies in order, first hit wins:
/// case-insensitive exact match, then substring-contains in either
/// direction. Returns `None` when nothing fits — no suggestion is fine.
pub fn suggest_category<'a>(input: &str, categories: &'a [Category]) -> Option<&'a Category> {
    let needle = input.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    if let Some(exact) = categories
        .iter()
        .find(|c| c.name.to_lowercase() == needle)
    {
        return Some(exact);
    }

    categories.iter().find(|c| {
        let name = c.name.to_lowercase();
        name.contains(&needle) || needle.contains(&name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cats(names: &[&str]) -> Vec<Category> {
        names.iter().map(|n| Category::custom("u1", n)).collect()
    }

    #[test]
    fn exact_match_ignores_case() {
        let categories = cats(&["Office Supplies", "Software"]);
        let hit = suggest_category("office supplies", &categories).unwrap();
        assert_eq!(hit.name, "Office Supplies");
    }

    #[test]
    fn falls_back_to_contains() {
        let categories = cats(&["Office Supplies", "Software"]);
        let hit = suggest_category("office", &categories).unwrap();
        assert_eq!(hit.name, "Office Supplies");
    }

    #[test]
    fn falls_back_to_reverse_contains() {
        let categories = cats(&["Office Supplies", "Software"]);
        let hit = suggest_category("Software & Subscriptions", &categories).unwrap();
        assert_eq!(hit.name, "Software");
    }

    #[test]
    fn exact_beats_contains() {
        let categories = cats(&["Travel & Meals", "Travel"]);
        let hit = suggest_category("travel", &categories).unwrap();
        assert_eq!(hit.name, "Travel");
    }

    #[test]
    fn no_fit_is_none() {
        let categories = cats(&["Office Supplies"]);
        assert!(suggest_category("Groceries", &categories).is_none());
    }

    #[test]
    fn blank_input_is_none() {
        let categories = cats(&["Office Supplies"]);
        assert!(suggest_category("   ", &categories).is_none());
        assert!(suggest_category("", &categories).is_none());
    }
}
