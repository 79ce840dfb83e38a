use std::{
    fs, io,
    path::{Path, PathBuf},
};

use derive_more::{Display, Error, From};
use rust_xlsxwriter::{ColNum, Format, RowNum, Workbook, XlsxError};
use store::{ActivityBucket, ChangeEntry, Changes, NodeRecord, OffsetDateTime};
use tracing::info;

use crate::report;

/// Worksheet name.
const SHEET_NAME: &str = "Monitor Report";

/// Column headers, in order.
const COLUMNS: [&str; 13] = [
    "Name",
    "ID",
    "API name",
    "Hardware",
    "Address",
    "Online",
    "Wins",
    "Wins change",
    "Rewards",
    "Rewards change",
    "Last TX (min)",
    "Status",
    "Updated",
];

/// Maximum column width, in characters.
const MAX_COLUMN_WIDTH: usize = 50;

/// Spreadsheet export errors.
#[derive(Debug, Display, Error, From)]
pub enum ExportError {
    /// IO-related error.
    Io(io::Error),

    /// Workbook writer error.
    Xlsx(XlsxError),
}

/// A single worksheet cell.
enum Cell {
    Text(String),
    Number(i64),
    Empty,
}

impl Cell {
    fn width(&self) -> usize {
        match self {
            Cell::Text(text) => text.chars().count(),
            Cell::Number(number) => number.to_string().len(),
            Cell::Empty => 0,
        }
    }
}

/// Activity status text of a spreadsheet row.
pub fn status_text(age_minutes: Option<u64>) -> &'static str {
    match ActivityBucket::from_age(age_minutes) {
        ActivityBucket::Unknown => "No data",
        ActivityBucket::VeryActive => "Very active",
        ActivityBucket::Active => "Active",
        ActivityBucket::Warning => "⚠️ Warning",
        ActivityBucket::Problem => "🔴 PROBLEM",
    }
}

/// Export file name for a cycle started at the provided time.
pub fn file_name(now: OffsetDateTime) -> String {
    format!(
        "monitor_{}{:02}{:02}_{:02}{:02}.xlsx",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute()
    )
}

fn row(record: &NodeRecord, change: ChangeEntry, updated: &str) -> [Cell; 13] {
    let text = |value: &str| Cell::Text(value.to_owned());

    [
        text(&record.custom_name),
        text(&record.id),
        text(&record.api_name),
        text(record.hardware_class.as_str()),
        record
            .address
            .map_or(Cell::Empty, |address| Cell::Text(address.to_string())),
        text(if record.online { "✓" } else { "✗" }),
        Cell::Number(record.win_count),
        Cell::Number(change.win_delta),
        Cell::Number(record.reward_score),
        Cell::Number(change.reward_delta),
        record.last_tx_age_minutes.map_or(Cell::Empty, |age| {
            Cell::Number(i64::try_from(age).unwrap_or(i64::MAX))
        }),
        text(status_text(record.last_tx_age_minutes)),
        text(updated),
    ]
}

/// Write a workbook with one row per record into the provided directory.
///
/// Column widths follow the longest value, capped at 50 characters.
/// Returns the path of the written file.
pub fn export(
    dir: &Path,
    records: &[NodeRecord],
    changes: &Changes,
    now: OffsetDateTime,
) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir)?;

    let path = dir.join(file_name(now));
    let updated = report::date_time(now);

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet().set_name(SHEET_NAME)?;
    let header = Format::new().set_bold();

    let mut widths = COLUMNS.map(|column| column.chars().count());

    for (col, column) in (0..).zip(COLUMNS) {
        sheet.write_string_with_format(0, col, column, &header)?;
    }

    for (row_num, record) in (1..).zip(records) {
        let change = changes.get(&record.id).copied().unwrap_or_default();

        for ((col, cell), width) in (0..).zip(row(record, change, &updated)).zip(&mut widths) {
            *width = (*width).max(cell.width());
            write_cell(sheet, row_num, col, cell)?;
        }
    }

    for (col, width) in (0..).zip(widths) {
        sheet.set_column_width(col, ((width + 2).min(MAX_COLUMN_WIDTH)) as f64)?;
    }

    workbook.save(&path)?;

    info!(path = %path.display(), rows = records.len(), "spreadsheet exported");

    Ok(path)
}

fn write_cell(
    sheet: &mut rust_xlsxwriter::Worksheet,
    row: RowNum,
    col: ColNum,
    cell: Cell,
) -> Result<(), XlsxError> {
    match cell {
        Cell::Text(text) => sheet.write_string(row, col, text)?,
        Cell::Number(number) => sheet.write_number(row, col, number as f64)?,
        Cell::Empty => return Ok(()),
    };

    Ok(())
}
