use std::sync::OnceLock;

use regex::Regex;

use crate::models::Cell;

/// Everything that cannot be part of a plain decimal literal.
fn numeric_noise() -> &'static Regex {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    NOISE.get_or_init(|| Regex::new(r"[^0-9.\-]").expect("regex is valid"))
}

// ── CellNormalizer ────────────────────────────────────────────────────────────

/// Turns raw parser cells into clean numbers and labels.
///
/// Neither operation can fail: numeric ambiguity collapses to `0.0` so a bad
/// cell contributes nothing to a sum instead of aborting the fold.
pub struct CellNormalizer;

impl CellNormalizer {
    /// Numeric value of `cell`.
    ///
    /// * `Number` → the value itself (`0.0` if NaN or infinite).
    /// * `Text`   → currency symbols, separators and whitespace stripped,
    ///   remainder parsed as a decimal; `0.0` if nothing parseable remains.
    /// * `Empty`  → `0.0`.
    pub fn number(cell: &Cell) -> f64 {
        match cell {
            Cell::Number(n) if n.is_finite() => *n,
            Cell::Number(_) | Cell::Empty => 0.0,
            Cell::Text(s) => Self::number_from_str(s),
        }
    }

    /// Text variant of [`CellNormalizer::number`].
    ///
    /// ```
    /// use options_core::normalize::CellNormalizer;
    ///
    /// assert_eq!(CellNormalizer::number_from_str("₹ 1,234.50"), 1234.50);
    /// assert_eq!(CellNormalizer::number_from_str(" -42 "), -42.0);
    /// assert_eq!(CellNormalizer::number_from_str("abc"), 0.0);
    /// ```
    pub fn number_from_str(s: &str) -> f64 {
        let core = numeric_noise().replace_all(s, "");
        match core.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => 0.0,
        }
    }

    /// Trimmed, upper-cased text of `cell`; empty for [`Cell::Empty`].
    pub fn label(cell: &Cell) -> String {
        match cell {
            Cell::Text(s) => Self::label_from_str(s),
            Cell::Number(n) => n.to_string(),
            Cell::Empty => String::new(),
        }
    }

    pub fn label_from_str(s: &str) -> String {
        s.trim().to_uppercase()
    }
}
