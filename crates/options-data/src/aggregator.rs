//! Folds trade rows into [`SummaryMetrics`].

use std::collections::BTreeMap;

use options_core::models::{
    row_cell, Category, Cell, ColumnIndexMap, ColumnRole, RawTable, SummaryMetrics,
};
use options_core::normalize::CellNormalizer;

// ── TradeAggregator ───────────────────────────────────────────────────────────

/// Stateless helper that folds data rows into summary metrics.
pub struct TradeAggregator;

impl TradeAggregator {
    /// Aggregate every data row of `table` (the header row is skipped).
    ///
    /// * `trade_count` counts rows even when nothing in them is readable.
    /// * An unresolved `Margin` column makes `total_investment` zero.
    /// * PnL is bucketed by category only when both `PnL` and
    ///   `InstrumentType` resolved; rows that are neither `PE` nor `CE` still
    ///   feed `overall_pnl`.
    ///
    /// Sums run left to right in row order, so identical input always gives
    /// bit-identical output.
    pub fn aggregate(table: &RawTable, columns: &ColumnIndexMap) -> SummaryMetrics {
        Self::aggregate_rows(table.data_rows(), columns)
    }

    /// Same as [`TradeAggregator::aggregate`] over bare data rows.
    pub fn aggregate_rows(rows: &[Vec<Cell>], columns: &ColumnIndexMap) -> SummaryMetrics {
        let margin_col = columns.get(ColumnRole::Margin);
        let pnl_col = columns.get(ColumnRole::Pnl);
        let type_col = columns.get(ColumnRole::InstrumentType);

        let mut total_investment = 0.0;
        let mut overall_pnl = 0.0;
        let mut pnl_by_category: BTreeMap<Category, f64> =
            Category::ALL.into_iter().map(|c| (c, 0.0)).collect();

        for row in rows {
            if let Some(col) = margin_col {
                total_investment += CellNormalizer::number(row_cell(row, col));
            }

            let Some(pnl_col) = pnl_col else { continue };
            let pnl = CellNormalizer::number(row_cell(row, pnl_col));
            overall_pnl += pnl;

            if let Some(type_col) = type_col {
                let label = CellNormalizer::label(row_cell(row, type_col));
                if let Some(bucket) = Category::from_label(&label)
                    .and_then(|category| pnl_by_category.get_mut(&category))
                {
                    *bucket += pnl;
                }
            }
        }

        SummaryMetrics {
            trade_count: rows.len(),
            total_investment,
            pnl_by_category,
            overall_pnl,
        }
    }

    /// Normalized PnL of one data row, or `None` when the PnL column is
    /// unresolved. Lets the presentation layer colour a row by sign.
    pub fn row_pnl(row: &[Cell], columns: &ColumnIndexMap) -> Option<f64> {
        columns
            .pnl_column()
            .map(|col| CellNormalizer::number(row_cell(row, col)))
    }

    /// Category of one data row, if the instrument column resolved and holds
    /// `PE` or `CE`.
    pub fn row_category(row: &[Cell], columns: &ColumnIndexMap) -> Option<Category> {
        let col = columns.get(ColumnRole::InstrumentType)?;
        Category::from_label(&CellNormalizer::label(row_cell(row, col)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
