use std::cmp::Ordering;

/// Numeric components of `v1`, `2`, `v1.10.3`; `None` for anything else.
fn numeric_parts(version: &str) -> Option<Vec<u64>> {
    let body = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);
    if body.is_empty() {
        return None;
    }
    body.split('.').map(|p| p.parse::<u64>().ok()).collect()
}

/// Total order used to pick the newest version of a model.
///
/// Numeric versions compare component-wise and sort after free-form ones,
/// which compare lexicographically.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (numeric_parts(a), numeric_parts(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}
