use std::{collections::HashSet, io, path::Path};

use calamine::{open_workbook_auto, Reader};
use derive_more::{Display, Error, From};
use itertools::Itertools;
use store::{HardwareClass, NodeDescriptor};
use tracing::{info, warn};

/// Display name column.
const NAME_COLUMN: &str = "Name";

/// Node identifier column.
const ID_COLUMN: &str = "ID";

/// Hardware class column.
const TYPE_COLUMN: &str = "Type";

/// File extensions read as spreadsheet workbooks.
const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Roster loading errors.
#[derive(Debug, Display, Error, From)]
pub enum RosterError {
    /// Unable to read or parse the CSV file.
    Csv(csv::Error),

    /// Unable to read the spreadsheet workbook.
    Workbook(calamine::Error),

    /// Workbook contains no worksheets.
    #[display(fmt = "workbook contains no worksheets")]
    NoWorksheets,

    /// Required columns are missing from the header row.
    #[display(fmt = "missing roster columns: {}", _0)]
    #[from(ignore)]
    MissingColumns(#[error(not(source))] String),

    /// Roster contains no nodes with an identifier.
    #[display(fmt = "roster contains no nodes")]
    Empty,
}

/// Load the node roster from a CSV file or a spreadsheet workbook.
///
/// The format is chosen by the file extension. Workbooks are read from their
/// first worksheet. Either way the header row must contain `Name`, `ID` and
/// `Type` columns.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<NodeDescriptor>, RosterError> {
    let path = path.as_ref();

    let is_workbook = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map_or(false, |extension| {
            WORKBOOK_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
        });

    if is_workbook {
        return load_workbook(path);
    }

    let reader = csv_reader().from_path(path)?;

    read_csv(reader)
}

/// Load the node roster from an arbitrary CSV source.
pub fn read<R: io::Read>(source: R) -> Result<Vec<NodeDescriptor>, RosterError> {
    read_csv(csv_reader().from_reader(source))
}

fn csv_reader() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.trim(csv::Trim::All).flexible(true);
    builder
}

fn read_csv<R: io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<NodeDescriptor>, RosterError> {
    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();

    let rows = reader
        .records()
        .map(|row| -> Result<_, RosterError> { Ok(row?.iter().map(String::from).collect()) });

    parse(&headers, rows)
}

fn load_workbook(path: &Path) -> Result<Vec<NodeDescriptor>, RosterError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(RosterError::NoWorksheets)??;

    let mut rows = range.rows().map(|row| {
        row.iter()
            .map(|cell| cell.to_string().trim().to_owned())
            .collect::<Vec<_>>()
    });

    let headers = rows.next().unwrap_or_default();

    parse(&headers, rows.map(Ok))
}

fn parse<I>(headers: &[String], rows: I) -> Result<Vec<NodeDescriptor>, RosterError>
where
    I: IntoIterator<Item = Result<Vec<String>, RosterError>>,
{
    let column = |name: &str| headers.iter().position(|header| header == name);

    let (Some(name), Some(id), Some(kind)) =
        (column(NAME_COLUMN), column(ID_COLUMN), column(TYPE_COLUMN))
    else {
        let missing = [NAME_COLUMN, ID_COLUMN, TYPE_COLUMN]
            .into_iter()
            .filter(|name| column(*name).is_none())
            .join(", ");

        return Err(RosterError::MissingColumns(missing));
    };

    let mut seen = HashSet::new();
    let mut nodes = Vec::new();

    for row in rows {
        let row = row?;
        let cell = |index: usize| row.get(index).map_or("", String::as_str);
        let node_id = cell(id);

        if node_id.is_empty() {
            continue;
        }

        if !seen.insert(node_id.to_owned()) {
            warn!(%node_id, "duplicate node identifier in roster, skipping");
            continue;
        }

        nodes.push(NodeDescriptor {
            custom_name: cell(name).to_owned(),
            node_id: node_id.to_owned(),
            hardware_class: HardwareClass::from(cell(kind)),
        });
    }

    if nodes.is_empty() {
        return Err(RosterError::Empty);
    }

    let distribution = nodes
        .iter()
        .map(|node| node.hardware_class.as_str())
        .counts();

    info!(nodes = nodes.len(), ?distribution, "roster loaded");

    Ok(nodes)
}
