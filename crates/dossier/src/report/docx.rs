//! Word processor export (WordprocessingML).

use std::fmt::Write as _;

use crate::error::ExportError;
use crate::report::blocks::{parse_blocks, Block, Span};
use crate::report::labels::{domain_name, style_name};
use crate::report::theme::{self, hex};
use crate::report::{write_package, xml_text, ExportFormat, Exporter, ReportInput};
use crate::sanitize::truncate_chars;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/><Override PartName="/word/numbering.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering" Target="numbering.xml"/></Relationships>"#;

const NUMBERING: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:abstractNum w:abstractNumId="0"><w:multiLevelType w:val="hybridMultilevel"/><w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="bullet"/><w:lvlText w:val="•"/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="720" w:hanging="360"/></w:pPr></w:lvl><w:lvl w:ilvl="1"><w:start w:val="1"/><w:numFmt w:val="bullet"/><w:lvlText w:val="◦"/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="1440" w:hanging="360"/></w:pPr></w:lvl><w:lvl w:ilvl="2"><w:start w:val="1"/><w:numFmt w:val="bullet"/><w:lvlText w:val="▪"/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="2160" w:hanging="360"/></w:pPr></w:lvl></w:abstractNum><w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num></w:numbering>"#;

const MAX_LIST_LEVEL: usize = 2;

fn styles() -> String {
    let navy = hex(theme::NAVY);
    let muted = hex(theme::MUTED);
    let heading = |id: &str, name: &str, size: u32, level: u32| {
        format!(
            r#"<w:style w:type="paragraph" w:styleId="{id}"><w:name w:val="{name}"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="120"/><w:outlineLvl w:val="{level}"/></w:pPr><w:rPr><w:b/><w:color w:val="{navy}"/><w:sz w:val="{size}"/></w:rPr></w:style>"#
        )
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri" w:cs="Calibri"/><w:sz w:val="22"/></w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:after="120" w:line="276" w:lineRule="auto"/></w:pPr></w:pPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style><w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/><w:qFormat/><w:pPr><w:spacing w:after="240"/></w:pPr><w:rPr><w:b/><w:color w:val="{navy}"/><w:sz w:val="48"/></w:rPr></w:style>{h1}{h2}{h3}<w:style w:type="paragraph" w:styleId="Subtitle"><w:name w:val="Subtitle"/><w:basedOn w:val="Normal"/><w:rPr><w:color w:val="{muted}"/><w:sz w:val="20"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Quote"><w:name w:val="Quote"/><w:basedOn w:val="Normal"/><w:pPr><w:ind w:left="720"/></w:pPr><w:rPr><w:i/><w:color w:val="{muted}"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Code"><w:name w:val="Code"/><w:basedOn w:val="Normal"/><w:pPr><w:spacing w:after="0"/><w:shd w:val="clear" w:color="auto" w:fill="{code}"/></w:pPr><w:rPr><w:rFonts w:ascii="Courier New" w:hAnsi="Courier New"/><w:sz w:val="18"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="ListParagraph"><w:name w:val="List Paragraph"/><w:basedOn w:val="Normal"/><w:pPr><w:spacing w:after="60"/></w:pPr></w:style><w:style w:type="table" w:styleId="TableGrid"><w:name w:val="Table Grid"/><w:tblPr><w:tblBorders><w:top w:val="single" w:sz="4" w:color="{border}"/><w:left w:val="single" w:sz="4" w:color="{border}"/><w:bottom w:val="single" w:sz="4" w:color="{border}"/><w:right w:val="single" w:sz="4" w:color="{border}"/><w:insideH w:val="single" w:sz="4" w:color="{border}"/><w:insideV w:val="single" w:sz="4" w:color="{border}"/></w:tblBorders></w:tblPr></w:style></w:styles>"#,
        h1 = heading("Heading1", "heading 1", 32, 0),
        h2 = heading("Heading2", "heading 2", 28, 1),
        h3 = heading("Heading3", "heading 3", 24, 2),
        code = hex(theme::CODE_BG),
        border = hex(theme::BORDER),
    )
}

fn core_properties(input: &ReportInput) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>{}</dc:title><dc:creator>{}</dc:creator><dcterms:created xsi:type="dcterms:W3CDTF">{}</dcterms:created></cp:coreProperties>"#,
        xml_text(&input.title),
        xml_text(&input.brand),
        input.generated_at.format("%Y-%m-%dT%H:%M:%SZ")
    )
}

fn run(text: &str, bold: bool, italic: bool, code: bool, color: Option<&str>) -> String {
    let mut props = String::new();
    if code {
        props.push_str(r#"<w:rFonts w:ascii="Courier New" w:hAnsi="Courier New"/>"#);
    }
    if bold {
        props.push_str("<w:b/>");
    }
    if italic {
        props.push_str("<w:i/>");
    }
    if let Some(color) = color {
        let _ = write!(props, r#"<w:color w:val="{}"/>"#, color);
    }
    let props = if props.is_empty() {
        String::new()
    } else {
        format!("<w:rPr>{}</w:rPr>", props)
    };
    format!(
        r#"<w:r>{}<w:t xml:space="preserve">{}</w:t></w:r>"#,
        props,
        xml_text(text)
    )
}

fn span_runs(spans: &[Span]) -> String {
    let link = hex(theme::BLUE);
    spans
        .iter()
        .map(|s| {
            let color = s.link.as_ref().map(|_| link.as_str());
            run(&s.text, s.bold, s.italic, s.code, color)
        })
        .collect()
}

fn paragraph(style: Option<&str>, extra_props: &str, runs: &str) -> String {
    let style = style
        .map(|s| format!(r#"<w:pStyle w:val="{}"/>"#, s))
        .unwrap_or_default();
    let props = format!("{}{}", style, extra_props);
    if props.is_empty() {
        format!("<w:p>{}</w:p>", runs)
    } else {
        format!("<w:p><w:pPr>{}</w:pPr>{}</w:p>", props, runs)
    }
}

fn table(header: &[String], rows: &[Vec<String>]) -> String {
    let columns = rows
        .iter()
        .map(|r| r.len())
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0);
    if columns == 0 {
        return String::new();
    }
    // Usable width of an A4 page with 2 cm margins, in twentieths of a point.
    let col_w = 9638 / columns;
    let mut out = String::from(
        r#"<w:tbl><w:tblPr><w:tblStyle w:val="TableGrid"/><w:tblW w:w="5000" w:type="pct"/></w:tblPr><w:tblGrid>"#,
    );
    for _ in 0..columns {
        let _ = write!(out, r#"<w:gridCol w:w="{}"/>"#, col_w);
    }
    out.push_str("</w:tblGrid>");

    let white = hex(theme::WHITE);
    let navy = hex(theme::NAVY);
    let alt = hex(theme::ROW_ALT);
    let mut write_row = |cells: &[String], header_row: bool, index: usize| {
        out.push_str("<w:tr>");
        if header_row {
            out.push_str("<w:trPr><w:tblHeader/></w:trPr>");
        }
        for c in 0..columns {
            let text = cells.get(c).map(String::as_str).unwrap_or("");
            let fill = if header_row {
                Some(navy.as_str())
            } else if index % 2 == 1 {
                Some(alt.as_str())
            } else {
                None
            };
            out.push_str("<w:tc><w:tcPr>");
            let _ = write!(out, r#"<w:tcW w:w="{}" w:type="dxa"/>"#, col_w);
            if let Some(fill) = fill {
                let _ = write!(out, r#"<w:shd w:val="clear" w:color="auto" w:fill="{}"/>"#, fill);
            }
            out.push_str("</w:tcPr>");
            let color = header_row.then_some(white.as_str());
            out.push_str(&paragraph(None, "", &run(text, header_row, false, false, color)));
            out.push_str("</w:tc>");
        }
        out.push_str("</w:tr>");
    };

    if !header.is_empty() {
        write_row(header, true, 0);
    }
    for (i, row) in rows.iter().enumerate() {
        write_row(row, false, i);
    }
    out.push_str("</w:tbl>");
    // Word needs a paragraph between adjacent tables.
    out.push_str("<w:p/>");
    out
}

fn body(input: &ReportInput) -> String {
    let labels = input.labels();
    let locale = input.config.locale;
    let mut out = String::new();

    out.push_str(&paragraph(Some("Title"), "", &run(&input.title, false, false, false, None)));
    let subtitle = format!(
        "{}: {}  |  {}: {}  |  {}: {}",
        labels.domain,
        domain_name(input.config.domain, locale),
        labels.style,
        style_name(input.config.report_style, locale),
        labels.date,
        input.generated_at.format("%d/%m/%Y")
    );
    out.push_str(&paragraph(Some("Subtitle"), "", &run(&subtitle, false, false, false, None)));

    let mut skipped_title = false;
    for block in parse_blocks(&input.markdown) {
        match block {
            Block::Heading { level, text } => {
                if level == 1 && !skipped_title && text == input.title {
                    skipped_title = true;
                    continue;
                }
                let style = format!("Heading{}", level.clamp(1, 3));
                out.push_str(&paragraph(Some(&style), "", &run(&text, false, false, false, None)));
            }
            Block::Paragraph(spans) => out.push_str(&paragraph(None, "", &span_runs(&spans))),
            Block::ListItem {
                ordinal: None,
                depth,
                spans,
            } => {
                let numbering = format!(
                    r#"<w:numPr><w:ilvl w:val="{}"/><w:numId w:val="1"/></w:numPr>"#,
                    depth.min(MAX_LIST_LEVEL)
                );
                out.push_str(&paragraph(Some("ListParagraph"), &numbering, &span_runs(&spans)));
            }
            Block::ListItem {
                ordinal: Some(n),
                depth,
                spans,
            } => {
                let indent = format!(
                    r#"<w:ind w:left="{}" w:hanging="360"/>"#,
                    720 * (depth + 1)
                );
                let runs = format!("{}{}", run(&format!("{}. ", n), true, false, false, None), span_runs(&spans));
                out.push_str(&paragraph(Some("ListParagraph"), &indent, &runs));
            }
            Block::Quote(spans) => out.push_str(&paragraph(Some("Quote"), "", &span_runs(&spans))),
            Block::Code(code) => {
                for line in code.lines() {
                    out.push_str(&paragraph(Some("Code"), "", &run(line, false, false, false, None)));
                }
            }
            Block::Table { header, rows } => out.push_str(&table(&header, &rows)),
            Block::Rule => {
                let border = format!(
                    r#"<w:pBdr><w:bottom w:val="single" w:sz="6" w:space="1" w:color="{}"/></w:pBdr>"#,
                    hex(theme::BORDER)
                );
                out.push_str(&paragraph(None, &border, ""));
            }
        }
    }

    if !input.references.is_empty() {
        out.push_str(&paragraph(Some("Heading1"), "", &run(labels.references, false, false, false, None)));
        let link = hex(theme::BLUE);
        let muted = hex(theme::MUTED);
        for (i, reference) in input.references.iter().enumerate() {
            let title = if reference.title.trim().is_empty() {
                &reference.url
            } else {
                &reference.title
            };
            let mut runs = run(&format!("{}. {}", i + 1, title), true, false, false, None);
            runs.push_str("<w:r><w:br/></w:r>");
            runs.push_str(&run(&reference.url, false, false, false, Some(&link)));
            if !reference.snippet.trim().is_empty() {
                runs.push_str("<w:r><w:br/></w:r>");
                runs.push_str(&run(
                    truncate_chars(reference.snippet.trim(), 300),
                    false,
                    true,
                    false,
                    Some(&muted),
                ));
            }
            out.push_str(&paragraph(None, "", &runs));
        }
    }

    let border = format!(
        r#"<w:pBdr><w:top w:val="single" w:sz="6" w:space="4" w:color="{}"/></w:pBdr>"#,
        hex(theme::BORDER)
    );
    let disclaimer = labels.disclaimer(&input.brand);
    out.push_str(&paragraph(
        None,
        &border,
        &run(&disclaimer, false, true, false, Some(&hex(theme::MUTED))),
    ));
    out
}

pub fn render_docx(input: &ReportInput) -> Result<Vec<u8>, ExportError> {
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><w:body>{}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1134" w:right="1134" w:bottom="1134" w:left="1134" w:header="709" w:footer="709" w:gutter="0"/></w:sectPr></w:body></w:document>"#,
        body(input)
    );

    write_package(&[
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS.to_string()),
        ("word/document.xml", document),
        ("word/styles.xml", styles()),
        ("word/numbering.xml", NUMBERING.to_string()),
        ("docProps/core.xml", core_properties(input)),
    ])
}

pub struct DocxExporter;

impl Exporter for DocxExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Docx
    }

    fn export(&self, input: &ReportInput) -> Result<Vec<u8>, ExportError> {
        render_docx(input)
    }
}
