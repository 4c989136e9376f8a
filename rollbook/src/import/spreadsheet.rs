//! Reading student rows out of uploaded CSV files and workbooks.

use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};

use crate::errors::Error;

use super::StudentRow;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    /// xlsx, xlsm, xlsb, xls or ods; calamine works out which
    Workbook,
}

impl SheetFormat {
    /// Pick a format from the file extension, falling back to the leading bytes.
    pub fn detect(filename: &str, data: &[u8]) -> Self {
        let extension = filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("csv") => SheetFormat::Csv,
            Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => SheetFormat::Workbook,
            _ if data.starts_with(ZIP_MAGIC) || data.starts_with(OLE_MAGIC) => SheetFormat::Workbook,
            _ => SheetFormat::Csv,
        }
    }
}

/// Column positions of the fields we read, resolved from the header row
#[derive(Debug, Default)]
struct Columns {
    name: Option<usize>,
    email: Option<usize>,
    phone: Option<usize>,
    password: Option<usize>,
}

impl Columns {
    fn from_header<S: AsRef<str>>(header: &[S]) -> Self {
        let mut columns = Columns::default();
        for (index, cell) in header.iter().enumerate() {
            let slot = match cell.as_ref().trim().trim_start_matches('\u{feff}').to_ascii_lowercase().as_str() {
                "name" => &mut columns.name,
                "email" => &mut columns.email,
                "phone" => &mut columns.phone,
                "password" => &mut columns.password,
                _ => continue,
            };
            // First matching column wins
            slot.get_or_insert(index);
        }
        columns
    }

    fn row<S: AsRef<str>>(&self, cells: &[S]) -> StudentRow {
        let get = |index: Option<usize>| {
            index
                .and_then(|i| cells.get(i))
                .map(|cell| cell.as_ref().trim().to_string())
                .unwrap_or_default()
        };
        StudentRow {
            name: get(self.name),
            email: get(self.email),
            phone: get(self.phone),
            password: get(self.password),
        }
    }
}

/// Parse the first sheet of `data` into rows, paired with the row number they sit on in the sheet.
///
/// The first non-empty row is the header. Fully blank rows are dropped.
pub fn read_rows(filename: &str, data: &[u8]) -> Result<Vec<(usize, StudentRow)>, Error> {
    let table = match SheetFormat::detect(filename, data) {
        SheetFormat::Csv => read_csv(data)?,
        SheetFormat::Workbook => read_workbook(data)?,
    };

    let mut lines = table.into_iter();
    let Some((_, header)) = lines.next() else {
        return Ok(Vec::new());
    };
    let columns = Columns::from_header(&header);

    Ok(lines
        .filter(|(_, cells)| cells.iter().any(|cell| !cell.trim().is_empty()))
        .map(|(row_number, cells)| (row_number, columns.row(&cells)))
        .collect())
}

/// Non-empty records, each with the 1-based line it starts on
fn read_csv(data: &[u8]) -> Result<Vec<(usize, Vec<String>)>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    reader
        .records()
        .map(|record| {
            record
                .map(|r| {
                    let line = r.position().map_or(0, |pos| pos.line() as usize);
                    (line, r.iter().map(str::to_string).collect::<Vec<_>>())
                })
                .map_err(|e| Error::BadRequest {
                    message: format!("Could not read CSV file: {e}"),
                })
        })
        .collect()
}

/// Rows of the first worksheet, each with its 1-based row number in the sheet
fn read_workbook(data: &[u8]) -> Result<Vec<(usize, Vec<String>)>, Error> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data)).map_err(|e| Error::BadRequest {
        message: format!("Could not read spreadsheet: {e}"),
    })?;

    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| Error::BadRequest {
            message: format!("Could not read first worksheet: {e}"),
        })?,
        None => return Ok(Vec::new()),
    };

    // The range begins at the first used cell, not at A1
    let first_row = range.start().map_or(0, |(row, _)| row as usize);

    Ok(range
        .rows()
        .enumerate()
        .map(|(index, row)| (first_row + index + 1, row.iter().map(cell_text).collect()))
        .collect())
}

/// Render a cell the way it reads in the sheet. Whole floats drop the `.0` so phone numbers
/// typed as numbers come through intact.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}
