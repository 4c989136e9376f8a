//! Sample spreadsheet for trying out bulk import.

use std::path::Path;

use rust_xlsxwriter::{Workbook, XlsxError};

use super::StudentRow;

pub const SAMPLE_HEADER: [&str; 4] = ["name", "email", "phone", "password"];

/// Five sample students: `Student1`..`Student5` with matching emails and passwords
pub fn sample_rows() -> Vec<StudentRow> {
    (1..=5)
        .map(|i| StudentRow {
            name: format!("Student{i}"),
            email: format!("student{i}@example.com"),
            phone: format!("98765432{i:02}"),
            password: format!("pass{i}123"),
        })
        .collect()
}

fn sample_workbook() -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, title) in SAMPLE_HEADER.iter().enumerate() {
        sheet.write_string(0, col as u16, *title)?;
    }
    for (index, row) in sample_rows().iter().enumerate() {
        let line = index as u32 + 1;
        sheet.write_string(line, 0, &row.name)?;
        sheet.write_string(line, 1, &row.email)?;
        sheet.write_string(line, 2, &row.phone)?;
        sheet.write_string(line, 3, &row.password)?;
    }

    Ok(workbook)
}

/// The sample workbook as `.xlsx` bytes
pub fn sample_workbook_bytes() -> Result<Vec<u8>, XlsxError> {
    sample_workbook()?.save_to_buffer()
}

/// Write the sample workbook to `path`
pub fn write_sample_workbook(path: &Path) -> Result<(), XlsxError> {
    sample_workbook()?.save(path)
}
