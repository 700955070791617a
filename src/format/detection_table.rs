//! CSV codec for the detection table.
//!
//! The table comes from the detector with its own metadata columns. Only the
//! tile, `x`, `y`, `class` and `verification` columns are interpreted; every
//! other column is carried through untouched so a reviewed table can go straight
//! back into the downstream pipeline. Rows that fail to parse are kept verbatim
//! at their original position, so rewriting the table never drops detector output.

use std::io::{Read, Write};
use std::path::Path;

use crate::format::error::{FormatError, MalformedRecordError};
use crate::model::{Detection, Point, Verification};
use crate::store::DetectionStore;

/// Accepted names for the tile column, in priority order.
pub const TILE_COLUMNS: &[&str] = &["tileId", "chipName"];
pub const X_COLUMN: &str = "x";
pub const Y_COLUMN: &str = "y";
pub const CLASS_COLUMN: &str = "class";
pub const VERIFICATION_COLUMN: &str = "verification";

/// Column layout of a detection table, kept so writes reproduce the input shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    headers: Vec<String>,
    tile: usize,
    x: usize,
    y: usize,
    class: usize,
    verification: usize,
    /// Non-core columns in header order.
    extra: Vec<usize>,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            headers: [TILE_COLUMNS[0], X_COLUMN, Y_COLUMN, CLASS_COLUMN, VERIFICATION_COLUMN]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            tile: 0,
            x: 1,
            y: 2,
            class: 3,
            verification: 4,
            extra: Vec::new(),
        }
    }
}

impl TableLayout {
    /// Resolve core columns from a header row. A missing verification column is added at the end.
    pub fn from_headers(headers: &csv::StringRecord) -> Result<Self, FormatError> {
        let mut headers: Vec<String> = headers.iter().map(String::from).collect();
        let find = |name: &str| -> Option<usize> {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };

        let tile = TILE_COLUMNS
            .iter()
            .find_map(|name| find(*name))
            .ok_or_else(|| FormatError::missing_column(TILE_COLUMNS.join(" or ")))?;
        let x = find(X_COLUMN).ok_or_else(|| FormatError::missing_column(X_COLUMN))?;
        let y = find(Y_COLUMN).ok_or_else(|| FormatError::missing_column(Y_COLUMN))?;
        let class = find(CLASS_COLUMN).ok_or_else(|| FormatError::missing_column(CLASS_COLUMN))?;
        let verification = match find(VERIFICATION_COLUMN) {
            Some(col) => col,
            None => {
                headers.push(VERIFICATION_COLUMN.to_string());
                headers.len() - 1
            }
        };
        let core = [tile, x, y, class, verification];
        let extra = (0..headers.len()).filter(|i| !core.contains(i)).collect();

        Ok(Self {
            headers,
            tile,
            x,
            y,
            class,
            verification,
            extra,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Names of the carried-through columns.
    pub fn extra_headers(&self) -> Vec<&str> {
        self.extra.iter().map(|i| self.headers[*i].as_str()).collect()
    }

    fn parse_row(&self, record: &csv::StringRecord, row: usize) -> Result<Detection, MalformedRecordError> {
        let cell = |col: usize| record.get(col).unwrap_or("").trim();
        let malformed = |reason: String| MalformedRecordError { row, reason };

        let tile_id = cell(self.tile);
        if tile_id.is_empty() {
            return Err(malformed("missing tile id".to_string()));
        }
        let class = cell(self.class);
        if class.is_empty() {
            return Err(malformed("missing class".to_string()));
        }
        let x = parse_coordinate(cell(self.x)).map_err(|e| malformed(format!("x: {e}")))?;
        let y = parse_coordinate(cell(self.y)).map_err(|e| malformed(format!("y: {e}")))?;
        let position = match (x, y) {
            (Some(x), Some(y)) => Some(Point::new(x, y)),
            (None, None) => None,
            _ => return Err(malformed("only one of x/y present".to_string())),
        };
        let verification: Verification = cell(self.verification)
            .parse()
            .map_err(|e| malformed(format!("{e}")))?;

        Ok(Detection {
            tile_id: tile_id.to_string(),
            position,
            class: class.to_string(),
            verification,
            extra: self
                .extra
                .iter()
                .map(|col| record.get(*col).unwrap_or("").to_string())
                .collect(),
        })
    }

    fn encode_row(&self, detection: &Detection) -> Vec<String> {
        let mut cells = vec![String::new(); self.headers.len()];
        cells[self.tile] = detection.tile_id.clone();
        if let Some(p) = detection.position {
            cells[self.x] = p.x.to_string();
            cells[self.y] = p.y.to_string();
        }
        cells[self.class] = detection.class.clone();
        cells[self.verification] = detection.verification.as_tag().to_string();
        for (col, value) in self.extra.iter().zip(&detection.extra) {
            cells[*col] = value.clone();
        }
        cells
    }

    /// Raw cells of a rejected row, padded to the header width.
    fn pad_row(&self, record: &csv::StringRecord) -> Vec<String> {
        let mut cells: Vec<String> = record.iter().map(String::from).collect();
        if cells.len() < self.headers.len() {
            cells.resize(self.headers.len(), String::new());
        }
        cells
    }
}

/// A row that could not be parsed, carried through writes unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    pub error: MalformedRecordError,
    /// Number of loaded detections preceding this row in the file
    pub position: usize,
    record: csv::StringRecord,
}

impl RejectedRow {
    /// The row's cells as read.
    pub fn cells(&self) -> impl Iterator<Item = &str> {
        self.record.iter()
    }
}

/// Outcome of loading a detection table.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Rows accepted into the store
    pub loaded: usize,
    /// Rows rejected, in file order
    pub rejected: Vec<RejectedRow>,
}

/// Parse a coordinate cell. Empty and NaN cells mean "no coordinate".
fn parse_coordinate(cell: &str) -> Result<Option<f64>, String> {
    if cell.is_empty() {
        return Ok(None);
    }
    let value: f64 = cell
        .parse()
        .map_err(|_| format!("'{cell}' is not a number"))?;
    Ok((!value.is_nan()).then_some(value))
}

/// Read a detection table. Malformed rows are logged and set aside in the report.
pub fn read_table<R: Read>(reader: R) -> Result<(DetectionStore, TableLayout, LoadReport), FormatError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let layout = TableLayout::from_headers(csv_reader.headers()?)?;

    let mut report = LoadReport::default();
    let mut detections = Vec::new();
    for (i, record) in csv_reader.records().enumerate() {
        let record = record?;
        match layout.parse_row(&record, i + 1) {
            Ok(detection) => detections.push(detection),
            Err(error) => {
                log::warn!("{}", error);
                report.rejected.push(RejectedRow {
                    error,
                    position: detections.len(),
                    record,
                });
            }
        }
    }
    report.loaded = detections.len();

    Ok((DetectionStore::from_detections(detections), layout, report))
}

/// Load a detection table from disk.
pub fn load_table(path: &Path) -> Result<(DetectionStore, TableLayout, LoadReport), FormatError> {
    let file = std::fs::File::open(path)?;
    let loaded = read_table(std::io::BufReader::new(file))?;
    log::info!(
        "Loaded {} detections from {:?} ({} rejected)",
        loaded.2.loaded,
        path,
        loaded.2.rejected.len()
    );
    Ok(loaded)
}

/// Write the full table in store order, with rejected rows back at their positions.
///
/// Rejected rows sitting after the last loaded detection go before any appended ones.
pub fn write_table<W: Write>(
    writer: W,
    store: &DetectionStore,
    layout: &TableLayout,
    rejected: &[RejectedRow],
) -> Result<(), FormatError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(writer);
    csv_writer.write_record(&layout.headers)?;

    let mut rejected = rejected.iter().peekable();
    for (written, (_, detection)) in store.iter().enumerate() {
        while let Some(row) = rejected.next_if(|row| row.position <= written) {
            csv_writer.write_record(layout.pad_row(&row.record))?;
        }
        csv_writer.write_record(layout.encode_row(detection))?;
    }
    for row in rejected {
        csv_writer.write_record(layout.pad_row(&row.record))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Encode the table into an in-memory buffer.
pub fn table_to_bytes(
    store: &DetectionStore,
    layout: &TableLayout,
    rejected: &[RejectedRow],
) -> Result<Vec<u8>, FormatError> {
    let mut bytes = Vec::new();
    write_table(&mut bytes, store, layout, rejected)?;
    Ok(bytes)
}
