//! Fuzzy field-name matching for error suggestions.
//!
//! When a caller names a field that does not exist on an app, the error
//! carries the closest real field names so typos are self-diagnosing.

/// Minimum similarity for a candidate to be suggested.
const SIMILARITY_CUTOFF: f64 = 0.6;

/// Maximum number of suggestions carried in an unknown-field error.
const MAX_SUGGESTIONS: usize = 3;

/// Return up to three candidates most similar to `target`, best first.
/// Comparison is case-insensitive; candidates below the cutoff are dropped.
pub(crate) fn close_matches<'a, I>(target: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let target_lower = target.to_lowercase();
    let mut scored: Vec<(f64, &str)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let score = similarity(&target_lower, &candidate.to_lowercase());
            (score >= SIMILARITY_CUTOFF).then_some((score, candidate))
        })
        .collect();

    // Highest score first; ties break alphabetically for stable output
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Normalized similarity in `[0, 1]` derived from edit distance.
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_scores_first() {
        let matches = close_matches("Severity", ["Severity", "Severity Score", "Source"]);
        assert_eq!(matches[0], "Severity");
    }

    #[test]
    fn test_typo_finds_intended_field() {
        let matches = close_matches("Severty", ["Severity", "Status", "Summary"]);
        assert_eq!(matches, vec!["Severity"]);
    }

    #[test]
    fn test_unrelated_names_give_no_suggestions() {
        let matches = close_matches("Severity", ["Queue", "Owner"]);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_at_most_three_suggestions() {
        let matches = close_matches(
            "Field",
            ["Field 1", "Field 2", "Field 3", "Field 4", "Field 5"],
        );
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn test_case_insensitive() {
        let matches = close_matches("severity", ["Severity"]);
        assert_eq!(matches, vec!["Severity"]);
    }

    #[test]
    fn test_levenshtein_basics() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(levenshtein(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(levenshtein(&chars(""), &chars("abc")), 3);
        assert_eq!(levenshtein(&chars("abc"), &chars("abc")), 0);
    }
}
