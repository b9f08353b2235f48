use std::cmp::Ordering;

/// Compares two dot-separated version strings component by component.
///
/// Components that are missing or not a plain unsigned number count as `0`,
/// so `"1.2.0"` equals `"1.2"` and `"1.x"` equals `"1.0"`. Empty components
/// (`"1..2"`) are skipped. Never fails.
pub fn compare_versions(lhs: &str, rhs: &str) -> Ordering {
    let a: Vec<u64> = components(lhs).collect();
    let b: Vec<u64> = components(rhs).collect();

    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Returns true when `current` is strictly below `minimum`.
pub fn is_below(current: &str, minimum: &str) -> bool {
    compare_versions(current, minimum) == Ordering::Less
}

fn components(version: &str) -> impl Iterator<Item = u64> + '_ {
    version
        .split('.')
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u64>().unwrap_or(0))
}
