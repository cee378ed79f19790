// Utility functions for recommendation-service

/// Normalize a salary to [0, 1] against a fixed cap.
/// Values above the cap saturate at 1.0; a non-positive cap yields 0.0.
pub fn normalize_salary(salary: f32, cap: f32) -> f32 {
    if cap <= 0.0 {
        0.0
    } else {
        (salary / cap).clamp(0.0, 1.0)
    }
}

/// Round a score to 2 decimal places for the caller-facing record.
pub fn round_score(score: f32) -> f32 {
    (score * 100.0).round() / 100.0
}

/// Normalize a free-text name (skill, city) for case-insensitive lookup.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_salary() {
        assert!((normalize_salary(100_000.0, 200_000.0) - 0.5).abs() < 0.001);
        assert!((normalize_salary(300_000.0, 200_000.0) - 1.0).abs() < 0.001);
        assert!((normalize_salary(0.0, 200_000.0)).abs() < 0.001);
        assert_eq!(normalize_salary(50_000.0, 0.0), 0.0);
    }

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(0.654), 0.65);
        assert_eq!(round_score(0.655), 0.66);
        assert_eq!(round_score(1.0), 1.0);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Boston "), "boston");
        assert_eq!(normalize_name("SQL"), "sql");
    }
}
