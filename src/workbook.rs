#![cfg(feature = "web")]

use rust_xlsxwriter::{Color, Format, Workbook, Worksheet};
use std::error::Error;

use crate::projects::{HEADERS, Project};

/// Render the contract registry as an Excel workbook
///
/// Reproduces the office's sheet layout: two orange banner rows, the
/// header row on row three, then one row per contract in [`HEADERS`]
/// column order.
///
/// # Arguments
/// * `projects` - The base records to export
///
/// # Returns
/// * `Result<Vec<u8>, Box<dyn Error>>` - XLSX file content as bytes or an error
pub fn to_xlsx(projects: &[Project]) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Projects")?;

    let banner = Format::new()
        .set_background_color(Color::RGB(0xFFA500))
        .set_font_color(Color::RGB(0xFFFFFF))
        .set_bold();
    let header = Format::new()
        .set_background_color(Color::RGB(0xE8F4F8))
        .set_font_color(Color::RGB(0x000000))
        .set_bold();

    for col in 0..HEADERS.len() as u16 {
        worksheet.write_string_with_format(0, col, "", &banner)?;
        worksheet.write_string_with_format(1, col, "", &banner)?;
        worksheet.set_column_width(col, 15)?;
    }
    worksheet.set_row_height(0, 25)?;
    worksheet.set_row_height(1, 25)?;
    worksheet.set_row_height(2, 30)?;

    for (col, title) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(2, col as u16, *title, &header)?;
    }

    for (row, project) in projects.iter().enumerate() {
        for (col, value) in project.header_values().iter().enumerate() {
            worksheet.write_string((row + 3) as u32, col as u16, *value)?;
        }
    }

    workbook.push_worksheet(worksheet);

    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_produces_a_workbook() {
        let projects = vec![Project {
            contract_id: "AB-1".into(),
            description: "Road widening".into(),
            ..Project::default()
        }];
        let bytes = to_xlsx(&projects).unwrap();
        // XLSX files are zip archives
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn export_of_empty_registry_still_has_headers() {
        let bytes = to_xlsx(&[]).unwrap();
        assert!(!bytes.is_empty());
    }
}
