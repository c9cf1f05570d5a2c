//! Spreadsheet export: a report sheet and a filterable references sheet.

use std::fmt::Write as _;

use crate::error::ExportError;
use crate::report::blocks::{parse_blocks, plain, Block};
use crate::report::theme::{self, hex};
use crate::report::{write_package, xml_text, ExportFormat, Exporter, ReportInput};
use crate::sanitize::truncate_chars;

const MAX_CELL_CHARS: usize = 32_767;
const SUMMARY_CHARS: usize = 500;

// Indexes into `cellXfs` below.
const XF_TITLE: u8 = 1;
const XF_NOTE: u8 = 2;
const XF_HEADING: u8 = 3;
const XF_HEADER: u8 = 4;
const XF_WRAP: u8 = 5;
const XF_WRAP_ALT: u8 = 6;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

fn styles() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="5"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="16"/><color rgb="FF{navy}"/><name val="Calibri"/></font><font><i/><sz val="10"/><color rgb="FF{muted}"/><name val="Calibri"/></font><font><b/><sz val="13"/><color rgb="FF{navy}"/><name val="Calibri"/></font><font><b/><sz val="11"/><color rgb="FFFFFFFF"/><name val="Calibri"/></font></fonts><fills count="4"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill><fill><patternFill patternType="solid"><fgColor rgb="FF{navy}"/><bgColor indexed="64"/></patternFill></fill><fill><patternFill patternType="solid"><fgColor rgb="FF{alt}"/><bgColor indexed="64"/></patternFill></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="7"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/><xf numFmtId="0" fontId="2" fillId="0" borderId="0" xfId="0" applyFont="1"/><xf numFmtId="0" fontId="3" fillId="0" borderId="0" xfId="0" applyFont="1"/><xf numFmtId="0" fontId="4" fillId="2" borderId="0" xfId="0" applyFont="1" applyFill="1"/><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0" applyAlignment="1"><alignment vertical="top" wrapText="1"/></xf><xf numFmtId="0" fontId="0" fillId="3" borderId="0" xfId="0" applyFill="1" applyAlignment="1"><alignment vertical="top" wrapText="1"/></xf></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#,
        navy = hex(theme::NAVY),
        muted = hex(theme::MUTED),
        alt = hex(theme::ROW_ALT),
    )
}

/// `A`, `B`, ..., `Z`, `AA`, ... for a zero-based column.
pub fn column_name(index: usize) -> String {
    let mut n = index + 1;
    let mut name = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        name.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    name.reverse();
    String::from_utf8(name).unwrap_or_default()
}

enum Cell {
    Text(String),
    Number(f64),
}

/// Rows of one worksheet, 1-based like the sheet itself.
#[derive(Default)]
struct Sheet {
    rows: Vec<Vec<(Cell, u8)>>,
}

impl Sheet {
    fn push(&mut self, cells: Vec<(Cell, u8)>) {
        self.rows.push(cells);
    }

    fn text(&mut self, text: impl Into<String>, style: u8) {
        self.push(vec![(Cell::Text(text.into()), style)]);
    }

    fn blank(&mut self) {
        self.rows.push(Vec::new());
    }

    fn xml(&self) -> String {
        let mut out = String::from("<sheetData>");
        for (r, cells) in self.rows.iter().enumerate() {
            let row = r + 1;
            if cells.is_empty() {
                continue;
            }
            let _ = write!(out, r#"<row r="{}">"#, row);
            for (c, (cell, style)) in cells.iter().enumerate() {
                let reference = format!("{}{}", column_name(c), row);
                let style = if *style == 0 {
                    String::new()
                } else {
                    format!(r#" s="{}""#, style)
                };
                match cell {
                    Cell::Number(value) => {
                        let _ = write!(out, r#"<c r="{}"{}><v>{}</v></c>"#, reference, style, value);
                    }
                    Cell::Text(text) => {
                        let _ = write!(
                            out,
                            r#"<c r="{}"{} t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                            reference,
                            style,
                            xml_text(truncate_chars(text, MAX_CELL_CHARS))
                        );
                    }
                }
            }
            out.push_str("</row>");
        }
        out.push_str("</sheetData>");
        out
    }
}

fn worksheet(widths: &[f32], data: &str, tail: &str) -> String {
    let mut cols = String::from("<cols>");
    for (i, width) in widths.iter().enumerate() {
        let _ = write!(
            cols,
            r#"<col min="{n}" max="{n}" width="{w}" customWidth="1"/>"#,
            n = i + 1,
            w = width
        );
    }
    cols.push_str("</cols>");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">{}{}{}</worksheet>"#,
        cols, data, tail
    )
}

fn table_cell(text: &str, style: u8) -> (Cell, u8) {
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => (Cell::Number(value), style),
        _ => (Cell::Text(text.to_string()), style),
    }
}

fn report_sheet(input: &ReportInput) -> String {
    let labels = input.labels();
    let mut sheet = Sheet::default();
    sheet.text(&input.title, XF_TITLE);
    sheet.text(
        format!(
            "{} {} {}",
            labels.generated_by,
            input.brand,
            input.generated_at.format("%d/%m/%Y %H:%M")
        ),
        XF_NOTE,
    );
    sheet.blank();

    let mut skipped_title = false;
    for block in parse_blocks(&input.markdown) {
        match block {
            Block::Heading { level, text } => {
                if level == 1 && !skipped_title && text == input.title {
                    skipped_title = true;
                    continue;
                }
                sheet.blank();
                sheet.text(text, XF_HEADING);
            }
            Block::Paragraph(spans) => sheet.text(plain(&spans), XF_WRAP),
            Block::ListItem {
                ordinal,
                depth,
                spans,
            } => {
                let marker = match ordinal {
                    Some(n) => format!("{}.", n),
                    None => "•".to_string(),
                };
                sheet.text(
                    format!("{}{} {}", "  ".repeat(depth), marker, plain(&spans)),
                    XF_WRAP,
                );
            }
            Block::Quote(spans) => sheet.text(plain(&spans), XF_NOTE),
            Block::Code(code) => {
                for line in code.lines() {
                    sheet.text(line, 0);
                }
            }
            Block::Table { header, rows } => {
                if !header.is_empty() {
                    sheet.push(
                        header
                            .into_iter()
                            .map(|h| (Cell::Text(h), XF_HEADER))
                            .collect(),
                    );
                }
                for (i, row) in rows.iter().enumerate() {
                    let style = if i % 2 == 1 { XF_WRAP_ALT } else { XF_WRAP };
                    sheet.push(row.iter().map(|c| table_cell(c, style)).collect());
                }
                sheet.blank();
            }
            Block::Rule => sheet.blank(),
        }
    }

    sheet.blank();
    sheet.text(labels.disclaimer(&input.brand), XF_NOTE);

    worksheet(
        &[70.0, 22.0, 22.0, 22.0, 22.0, 22.0],
        &sheet.xml(),
        r#"<mergeCells count="1"><mergeCell ref="A1:D1"/></mergeCells>"#,
    )
}

fn references_sheet(input: &ReportInput) -> (String, String) {
    let labels = input.labels();
    let mut sheet = Sheet::default();
    sheet.push(
        ["#", labels.col_title, labels.col_url, labels.col_summary]
            .into_iter()
            .map(|h| (Cell::Text(h.to_string()), XF_HEADER))
            .collect(),
    );
    for (i, reference) in input.references.iter().enumerate() {
        let style = if i % 2 == 1 { XF_WRAP_ALT } else { XF_WRAP };
        sheet.push(vec![
            (Cell::Number((i + 1) as f64), style),
            (Cell::Text(reference.title.clone()), style),
            (Cell::Text(reference.url.clone()), style),
            (
                Cell::Text(truncate_chars(reference.snippet.trim(), SUMMARY_CHARS).to_string()),
                style,
            ),
        ]);
    }
    let range = format!("A1:D{}", input.references.len() + 1);
    let xml = worksheet(
        &[5.0, 40.0, 55.0, 70.0],
        &sheet.xml(),
        &format!(r#"<autoFilter ref="{}"/>"#, range),
    );
    (xml, range)
}

fn workbook(input: &ReportInput, filter_range: &str) -> String {
    let labels = input.labels();
    let (first, last) = filter_range.split_once(':').unwrap_or(("A1", "D1"));
    let absolute = |cell: &str| {
        let split = cell.find(|c: char| c.is_ascii_digit()).unwrap_or(cell.len());
        format!("${}${}", &cell[..split], &cell[split..])
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{summary}" sheetId="1" r:id="rId1"/><sheet name="{refs}" sheetId="2" r:id="rId2"/></sheets><definedNames><definedName name="_xlnm._FilterDatabase" localSheetId="1" hidden="1">'{refs}'!{first}:{last}</definedName></definedNames></workbook>"#,
        summary = xml_text(labels.summary_sheet),
        refs = xml_text(labels.references_sheet),
        first = absolute(first),
        last = absolute(last),
    )
}

pub fn render_xlsx(input: &ReportInput) -> Result<Vec<u8>, ExportError> {
    let (references, range) = references_sheet(input);
    write_package(&[
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("xl/workbook.xml", workbook(input, &range)),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
        ("xl/styles.xml", styles()),
        ("xl/worksheets/sheet1.xml", report_sheet(input)),
        ("xl/worksheets/sheet2.xml", references),
    ])
}

pub struct XlsxExporter;

impl Exporter for XlsxExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Xlsx
    }

    fn export(&self, input: &ReportInput) -> Result<Vec<u8>, ExportError> {
        render_xlsx(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Reference;
    use crate::extraction::{ooxml, CancelToken};
    use crate::report::test_support::input;

    #[test]
    fn test_column_names() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
    }

    #[test]
    fn test_report_sheet_layout() {
        let xml = report_sheet(&input());
        assert!(xml.contains("Gerado por Dossier 14/03/2026 09:30"));
        assert!(xml.contains(r#"<mergeCell ref="A1:D1"/>"#));
        // Numeric table cells are stored as numbers.
        assert!(xml.contains("<v>12.5</v>"));
        assert!(xml.contains("• Residential: 40%"));
    }

    #[test]
    fn test_references_sheet() {
        let mut report = input();
        report.references.push(Reference {
            title: "Long".to_string(),
            url: "https://long.example".to_string(),
            snippet: "x".repeat(800),
        });
        let (xml, range) = references_sheet(&report);
        assert_eq!(range, "A1:D3");
        assert!(xml.contains(r#"<autoFilter ref="A1:D3"/>"#));
        assert!(xml.contains(r#"<col min="3" max="3" width="55" customWidth="1"/>"#));
        assert!(xml.contains(&"x".repeat(500)));
        assert!(!xml.contains(&"x".repeat(501)));

        let workbook = workbook(&report, &range);
        assert!(workbook.contains("'Referências'!$A$1:$D$3"));
    }

    #[test]
    fn test_header_fill_is_navy() {
        assert!(styles().contains(r#"<fgColor rgb="FF1E3A5F"/>"#));
    }

    #[test]
    fn test_xlsx_readable() {
        let bytes = render_xlsx(&input()).unwrap();
        let text = ooxml::xlsx_text(&bytes, &CancelToken::new()).unwrap();
        assert!(text.contains("Solar Market Review"));
        assert!(text.contains("IEA Solar"));
    }
}
