use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Cell ──────────────────────────────────────────────────────────────────────

/// A single value produced by the table parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Numeric value the parser recognised as a number.
    Number(f64),
    /// Any other non-empty text.
    Text(String),
    /// Empty field, or a field past the end of a short row.
    Empty,
}

/// Shared value returned for out-of-range lookups.
static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

// ── RawTable ──────────────────────────────────────────────────────────────────

/// Rows × columns as handed over by the parser.
///
/// Row 0 is the header row when the table is non-empty. Data rows may be
/// shorter or longer than the header; missing cells read as [`Cell::Empty`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Build a table from string literals; handy for fixtures.
    pub fn from_strings<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|c| Cell::from(c.as_ref())).collect())
            .collect();
        Self { rows }
    }

    /// All rows, header included.
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The header row, or `None` for an empty table.
    pub fn header(&self) -> Option<&[Cell]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Rows `1..N`.
    pub fn data_rows(&self) -> &[Vec<Cell>] {
        self.rows.get(1..).unwrap_or(&[])
    }

    /// Number of data rows (the header does not count as a trade).
    pub fn trade_count(&self) -> usize {
        self.data_rows().len()
    }

    /// Cell at `(row, col)`; anything out of range is [`Cell::Empty`].
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }
}

/// Cell `col` of `row`, or [`Cell::Empty`] past the end.
pub fn row_cell(row: &[Cell], col: usize) -> &Cell {
    row.get(col).unwrap_or(&EMPTY_CELL)
}

// ── ColumnRole ────────────────────────────────────────────────────────────────

/// Semantic column meaning, independent of how the header spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Capital committed per trade.
    Margin,
    /// Realised profit/loss per trade.
    Pnl,
    /// `PE` / `CE` option kind.
    InstrumentType,
}

impl ColumnRole {
    pub const ALL: [ColumnRole; 3] = [
        ColumnRole::Margin,
        ColumnRole::Pnl,
        ColumnRole::InstrumentType,
    ];

    fn slot(self) -> usize {
        match self {
            ColumnRole::Margin => 0,
            ColumnRole::Pnl => 1,
            ColumnRole::InstrumentType => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnRole::Margin => "margin",
            ColumnRole::Pnl => "pnl",
            ColumnRole::InstrumentType => "instrument_type",
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ColumnIndexMap ────────────────────────────────────────────────────────────

/// Zero-based column index per role, or `None` when no accepted spelling
/// matched the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnIndexMap {
    indices: [Option<usize>; 3],
}

impl ColumnIndexMap {
    /// A map with every role unresolved.
    pub fn unresolved_all() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: ColumnRole, index: Option<usize>) -> Self {
        self.indices[role.slot()] = index;
        self
    }

    pub fn get(&self, role: ColumnRole) -> Option<usize> {
        self.indices[role.slot()]
    }

    pub fn is_resolved(&self, role: ColumnRole) -> bool {
        self.get(role).is_some()
    }

    /// Roles that could not be located, in [`ColumnRole::ALL`] order.
    pub fn unresolved(&self) -> Vec<ColumnRole> {
        ColumnRole::ALL
            .into_iter()
            .filter(|role| !self.is_resolved(*role))
            .collect()
    }

    /// Index of the PnL column, for per-cell conditional colouring.
    pub fn pnl_column(&self) -> Option<usize> {
        self.get(ColumnRole::Pnl)
    }

    pub fn is_pnl_column(&self, col: usize) -> bool {
        self.pnl_column() == Some(col)
    }
}

// ── Category ──────────────────────────────────────────────────────────────────

/// Option kind used to bucket PnL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "PE")]
    Pe,
    #[serde(rename = "CE")]
    Ce,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Pe, Category::Ce];

    /// Match an already-normalized (trimmed, upper-cased) label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "PE" => Some(Category::Pe),
            "CE" => Some(Category::Ce),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Pe => "PE",
            Category::Ce => "CE",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── SummaryMetrics ────────────────────────────────────────────────────────────

/// Aggregate figures derived from one [`RawTable`].
///
/// Always rebuilt wholesale; never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    /// Number of data rows.
    pub trade_count: usize,
    /// Sum of the margin column.
    pub total_investment: f64,
    /// PnL per option kind. Both keys are always present.
    pub pnl_by_category: BTreeMap<Category, f64>,
    /// PnL over every data row, whatever its category.
    pub overall_pnl: f64,
}

impl SummaryMetrics {
    pub fn category_pnl(&self, category: Category) -> f64 {
        self.pnl_by_category.get(&category).copied().unwrap_or(0.0)
    }
}

impl Default for SummaryMetrics {
    fn default() -> Self {
        Self {
            trade_count: 0,
            total_investment: 0.0,
            pnl_by_category: Category::ALL.into_iter().map(|c| (c, 0.0)).collect(),
            overall_pnl: 0.0,
        }
    }
}
