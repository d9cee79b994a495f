// Scoring helpers shared by the rankers and the diversity penalty

use std::collections::HashSet;

/// Compute exponential decay for time-based scoring
pub fn exponential_decay(age_hours: f64, half_life_hours: f64) -> f64 {
    (-age_hours / half_life_hours * std::f64::consts::LN_2).exp()
}

/// Jaccard similarity of two tag lists, case-insensitive. Empty inputs give 0.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let left: HashSet<String> = a.iter().map(|s| s.to_ascii_lowercase()).collect();
    let right: HashSet<String> = b.iter().map(|s| s.to_ascii_lowercase()).collect();

    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();

    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}
