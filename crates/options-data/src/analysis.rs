//! Parse → resolve → aggregate pipeline.
//!
//! The output, [`TableAnalysis`], is what the presentation layer consumes: the
//! table itself, where each role lives in it, and the summary figures.

use options_core::models::{
    Category, Cell, ColumnIndexMap, ColumnRole, RawTable, SummaryMetrics,
};
use options_core::settings::HeaderSpellings;
use serde::Serialize;
use tracing::debug;

use crate::aggregator::TradeAggregator;
use crate::columns::ColumnResolver;
use crate::reader::TableParser;

// ── Public types ──────────────────────────────────────────────────────────────

/// Everything derived from one version of the trade log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableAnalysis {
    pub table: RawTable,
    pub columns: ColumnIndexMap,
    pub metrics: SummaryMetrics,
}

impl TableAnalysis {
    /// State before anything has been loaded: no rows, nothing resolved,
    /// all metrics zero.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Roles the header did not provide, so the UI can warn about them.
    pub fn missing_columns(&self) -> Vec<ColumnRole> {
        if self.table.is_empty() {
            return Vec::new();
        }
        self.columns.unresolved()
    }

    /// Per-row view for rendering: the cells, the row's PnL (if known) and
    /// its category (if known).
    pub fn rows(&self) -> impl Iterator<Item = RowView<'_>> + '_ {
        self.table.data_rows().iter().map(move |cells| RowView {
            cells,
            pnl: TradeAggregator::row_pnl(cells, &self.columns),
            category: TradeAggregator::row_category(cells, &self.columns),
        })
    }
}

/// One data row plus the decorations the presentation layer needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowView<'a> {
    pub cells: &'a [Cell],
    pub pnl: Option<f64>,
    pub category: Option<Category>,
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Resolve columns in `table`'s header and aggregate its data rows.
pub fn analyze_table(table: RawTable, spellings: &HeaderSpellings) -> TableAnalysis {
    let columns = ColumnResolver::resolve(table.header(), spellings);
    let metrics = TradeAggregator::aggregate(&table, &columns);

    debug!(
        trades = metrics.trade_count,
        total_investment = metrics.total_investment,
        overall_pnl = metrics.overall_pnl,
        "table aggregated"
    );

    TableAnalysis {
        table,
        columns,
        metrics,
    }
}

/// Parse raw `content` with `parser`, then run [`analyze_table`].
pub fn analyze_content<P: TableParser + ?Sized>(
    parser: &P,
    content: &str,
    spellings: &HeaderSpellings,
) -> TableAnalysis {
    analyze_table(parser.parse(content), spellings)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::CsvTableParser;

    const SAMPLE: &str = "Symbol,MARGIN,PNL_BUYPRICE_CLOSEPRICE,OptionType\n\
                          NIFTY,100,50,PE\n\
                          BANKNIFTY,200,-30,CE\n";

    #[test]
    fn test_analyze_content_end_to_end() {
        let analysis =
            analyze_content(&CsvTableParser::new(), SAMPLE, &HeaderSpellings::default());

        assert_eq!(analysis.columns.get(ColumnRole::Margin), Some(1));
        assert_eq!(analysis.metrics.trade_count, 2);
        assert_eq!(analysis.metrics.total_investment, 300.0);
        assert_eq!(analysis.metrics.overall_pnl, 20.0);
        assert!(analysis.missing_columns().is_empty());
    }

    #[test]
    fn test_empty_analysis() {
        let analysis = TableAnalysis::empty();
        assert!(analysis.table.is_empty());
        assert_eq!(analysis.metrics, SummaryMetrics::default());
        assert!(analysis.missing_columns().is_empty());
        assert_eq!(analysis.rows().count(), 0);
    }

    #[test]
    fn test_missing_columns_reported() {
        let analysis = analyze_content(
            &CsvTableParser::new(),
            "Symbol,PNL_BUYPRICE_CLOSEPRICE\nX,5\n",
            &HeaderSpellings::default(),
        );
        assert_eq!(
            analysis.missing_columns(),
            vec![ColumnRole::Margin, ColumnRole::InstrumentType]
        );
        assert_eq!(analysis.metrics.overall_pnl, 5.0);
    }

    #[test]
    fn test_row_views_carry_decorations() {
        let analysis =
            analyze_content(&CsvTableParser::new(), SAMPLE, &HeaderSpellings::default());
        let rows: Vec<RowView<'_>> = analysis.rows().collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pnl, Some(50.0));
        assert_eq!(rows[0].category, Some(Category::Pe));
        assert_eq!(rows[1].pnl, Some(-30.0));
        assert_eq!(rows[1].category, Some(Category::Ce));
        assert!(analysis.columns.is_pnl_column(2));
    }
}
