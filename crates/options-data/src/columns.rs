//! Locates semantic columns in a header row.
//!
//! Header text in trade exports is not stable: case, surrounding whitespace
//! and even the exact wording vary between brokers and revisions. Every
//! header cell and every accepted spelling goes through
//! [`CellNormalizer::label`] before comparison, so the spelling table only has
//! to list genuinely different words.

use options_core::models::{Cell, ColumnIndexMap, ColumnRole};
use options_core::normalize::CellNormalizer;
use options_core::settings::HeaderSpellings;
use tracing::debug;

// ── ColumnResolver ────────────────────────────────────────────────────────────

/// Stateless helper mapping [`ColumnRole`]s to header positions.
pub struct ColumnResolver;

impl ColumnResolver {
    /// Resolve every role against `header`.
    ///
    /// An absent or empty header yields a map with every role unresolved.
    /// Unresolved roles are not an error; callers treat them as contributing
    /// zero.
    pub fn resolve(header: Option<&[Cell]>, spellings: &HeaderSpellings) -> ColumnIndexMap {
        let header = header.unwrap_or(&[]);
        let labels: Vec<String> = header.iter().map(CellNormalizer::label).collect();

        let map = ColumnRole::ALL
            .into_iter()
            .fold(ColumnIndexMap::unresolved_all(), |map, role| {
                map.with(role, Self::find(&labels, spellings.spellings(role)))
            });

        let unresolved = map.unresolved();
        if !header.is_empty() && !unresolved.is_empty() {
            debug!(?unresolved, "header is missing expected columns");
        }
        map
    }

    /// Resolve a single role. The leftmost matching header cell wins.
    pub fn resolve_role(
        header: Option<&[Cell]>,
        spellings: &HeaderSpellings,
        role: ColumnRole,
    ) -> Option<usize> {
        let labels: Vec<String> = header
            .unwrap_or(&[])
            .iter()
            .map(CellNormalizer::label)
            .collect();
        Self::find(&labels, spellings.spellings(role))
    }

    fn find(labels: &[String], accepted: &[String]) -> Option<usize> {
        let accepted: Vec<String> = accepted
            .iter()
            .map(|s| CellNormalizer::label_from_str(s))
            .filter(|s| !s.is_empty())
            .collect();

        labels
            .iter()
            .position(|label| accepted.iter().any(|a| a == label))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
