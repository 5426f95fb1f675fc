use rust_xlsxwriter::Workbook;

use super::{ExportError, ExportRecord};

pub const SHEET_NAME: &str = "Achievements";

/// Width of each column: the longest value (header included) plus two.
fn column_widths(records: &[ExportRecord]) -> [usize; 8] {
    let mut widths = ExportRecord::COLUMNS.map(|header| header.chars().count());
    for record in records {
        for (width, cell) in widths.iter_mut().zip(record.cells()) {
            *width = (*width).max(cell.chars().count());
        }
    }
    widths.map(|w| w + 2)
}

/// render_xlsx
///
/// A single `Achievements` sheet: the header row, then one row per record.
pub fn render_xlsx(records: &[ExportRecord]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, header) in ExportRecord::COLUMNS.iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }
    for (row, record) in records.iter().enumerate() {
        for (col, cell) in record.cells().iter().enumerate() {
            sheet.write_string(row as u32 + 1, col as u16, *cell)?;
        }
    }
    for (col, width) in column_widths(records).iter().enumerate() {
        sheet.set_column_width(col as u16, *width as f64)?;
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
    use std::io::Cursor;

    fn record(name: &str, roll_no: &str) -> ExportRecord {
        ExportRecord {
            name: name.to_string(),
            roll_no: roll_no.to_string(),
            achievement_type: "Hackathon".to_string(),
            title: "Smart India Hackathon winner".to_string(),
            description: "First place".to_string(),
            academic_year: "2024-2025".to_string(),
            certificate_issued_date: "2024-09-01".to_string(),
            submitted_by: "student".to_string(),
        }
    }

    #[test]
    fn test_workbook_layout() {
        let records = vec![record("Asha", "21A91A0501"), record("Dr. Rao", "")];
        let bytes = render_xlsx(&records).unwrap();

        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        assert_eq!(workbook.sheet_names(), vec![SHEET_NAME.to_string()]);

        let range = workbook.worksheet_range(SHEET_NAME).unwrap();
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|r| {
                r.iter()
                    .map(|c| match c {
                        Data::Empty => String::new(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], ExportRecord::COLUMNS.map(String::from).to_vec());
        assert_eq!(rows[1][0], "Asha");
        assert_eq!(rows[2][1], "");
    }

    #[test]
    fn test_column_widths_fit_longest_cell() {
        let widths = column_widths(&[record("A", "")]);
        // "Name" header is longer than "A".
        assert_eq!(widths[0], "Name".len() + 2);
        assert_eq!(widths[3], "Smart India Hackathon winner".len() + 2);
        assert_eq!(widths[6], "CertificateIssuedDate".len() + 2);
    }

    #[test]
    fn test_empty_export_has_header_only() {
        let bytes = render_xlsx(&[]).unwrap();
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        let range = workbook.worksheet_range(SHEET_NAME).unwrap();
        assert_eq!(range.height(), 1);
    }
}
