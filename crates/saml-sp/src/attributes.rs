use std::collections::HashMap;

/// Walks the ordered candidate names for one identity field and returns the
/// value of the first name present in the raw attribute set.
pub fn find_attribute<'a>(
    candidates: &[String],
    raw: &'a HashMap<String, String>,
) -> Option<&'a str> {
    candidates
        .iter()
        .find_map(|name| raw.get(name).map(String::as_str))
}

/// Resolves every configured identity field against the raw assertion
/// attributes. Fields with no matching candidate resolve to `None` so the
/// application sees the full configured shape either way.
pub fn resolve_attributes(
    statements: &HashMap<String, Vec<String>>,
    raw: &HashMap<String, String>,
) -> HashMap<String, Option<String>> {
    statements
        .iter()
        .map(|(field, candidates)| {
            let value = find_attribute(candidates, raw).map(str::to_owned);
            (field.clone(), value)
        })
        .collect()
}
