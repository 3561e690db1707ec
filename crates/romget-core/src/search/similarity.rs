//! Partial-ratio style similarity between two strings.

/// Scores how well the shorter string fits somewhere inside the longer one.
///
/// The shorter string is slid across every offset of the longer one; at each
/// offset, position-aligned equal characters are counted and scored as
/// `matches * 100 / len(shorter)`. The best offset wins. Either input empty
/// scores 0. Inputs are compared as given, so callers fold case first.
pub fn calculate_similarity(a: &str, b: &str) -> u32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (shorter, longer) = if a.len() < b.len() { (&a, &b) } else { (&b, &a) };

    let mut best = 0;
    for window in longer.windows(shorter.len()) {
        let common = shorter.iter().zip(window).filter(|(x, y)| x == y).count();
        let score = (common * 100 / shorter.len()) as u32;
        best = best.max(score);
        if best == 100 {
            break;
        }
    }
    best
}
