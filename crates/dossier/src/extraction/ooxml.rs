//! Text readers for Office Open XML packages (docx, pptx, xlsx).

use std::io::{Cursor, Read, Seek};

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, BytesText, Event};
use quick_xml::Reader;

use crate::error::ExtractionError;
use crate::extraction::CancelToken;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open(bytes: &[u8]) -> Result<Archive<'_>, ExtractionError> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractionError::OfficeProcessing(format!("Failed to open package: {}", e)))
}

fn read_part<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<String, ExtractionError> {
    let mut part = archive.by_name(name).map_err(|e| {
        ExtractionError::OfficeProcessing(format!("Failed to find {}: {}", name, e))
    })?;
    let mut xml = String::new();
    part.read_to_string(&mut xml).map_err(|e| {
        ExtractionError::OfficeProcessing(format!("Failed to read {}: {}", name, e))
    })?;
    Ok(xml)
}

/// Part names matching `<prefix><n>.xml`, sorted by `n`.
fn numbered_parts<R: Read + Seek>(archive: &zip::ZipArchive<R>, prefix: &str) -> Vec<String> {
    let mut parts: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let n = name.strip_prefix(prefix)?.strip_suffix(".xml")?;
            n.parse::<u32>().ok().map(|n| (n, name.to_string()))
        })
        .collect();
    parts.sort();
    parts.into_iter().map(|(_, name)| name).collect()
}

pub fn docx_text(bytes: &[u8], cancel: &CancelToken) -> Result<String, ExtractionError> {
    let mut archive = open(bytes)?;
    cancel.check()?;
    let xml = read_part(&mut archive, "word/document.xml")?;
    paragraph_text(&xml)
}

pub fn pptx_text(bytes: &[u8], cancel: &CancelToken) -> Result<String, ExtractionError> {
    let mut archive = open(bytes)?;
    let slides = numbered_parts(&archive, "ppt/slides/slide");
    if slides.is_empty() {
        return Err(ExtractionError::OfficeProcessing(
            "Presentation has no slides".to_string(),
        ));
    }

    let mut text = String::new();
    for (index, slide) in slides.iter().enumerate() {
        cancel.check()?;
        let xml = read_part(&mut archive, slide)?;
        text.push_str(&format!("--- Slide {} ---\n", index + 1));
        text.push_str(&paragraph_text(&xml)?);
        text.push('\n');
    }
    Ok(text)
}

pub fn xlsx_text(bytes: &[u8], cancel: &CancelToken) -> Result<String, ExtractionError> {
    let mut archive = open(bytes)?;
    let shared = match read_part(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => shared_strings(&xml)?,
        Err(_) => Vec::new(),
    };

    let sheets = numbered_parts(&archive, "xl/worksheets/sheet");
    if sheets.is_empty() {
        return Err(ExtractionError::OfficeProcessing(
            "Workbook has no sheets".to_string(),
        ));
    }

    let mut text = String::new();
    for (index, sheet) in sheets.iter().enumerate() {
        cancel.check()?;
        let xml = read_part(&mut archive, sheet)?;
        text.push_str(&format!("--- Sheet {} ---\n", index + 1));
        text.push_str(&sheet_text(&xml, &shared)?);
    }
    Ok(text)
}

fn push_text(out: &mut String, e: &BytesText<'_>) -> Result<(), ExtractionError> {
    let decoded = e
        .decode()
        .map_err(|e| ExtractionError::OfficeProcessing(format!("Undecodable text: {}", e)))?;
    out.push_str(&decoded);
    Ok(())
}

/// Entity and character references arrive as their own events; unknown
/// entities are kept verbatim.
fn push_reference(out: &mut String, e: &BytesRef<'_>) -> Result<(), ExtractionError> {
    let invalid = |e: &dyn std::fmt::Display| {
        ExtractionError::OfficeProcessing(format!("Invalid reference: {}", e))
    };
    if let Some(ch) = e.resolve_char_ref().map_err(|e| invalid(&e))? {
        out.push(ch);
        return Ok(());
    }
    let name = e.decode().map_err(|e| invalid(&e))?;
    match resolve_predefined_entity(&name) {
        Some(value) => out.push_str(value),
        None => {
            out.push('&');
            out.push_str(&name);
            out.push(';');
        }
    }
    Ok(())
}

/// Collects `<*:t>` runs, one line per `<*:p>` paragraph. Works for both
/// WordprocessingML and DrawingML.
pub fn paragraph_text(xml: &str) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);

    let mut text = String::new();
    let mut in_text_element = false;
    let mut in_paragraph = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = true,
                b"p" => in_paragraph = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" if in_paragraph => text.push('\t'),
                b"br" if in_paragraph => text.push('\n'),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" => {
                    if in_paragraph {
                        text.push('\n');
                        in_paragraph = false;
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_text_element => push_text(&mut text, &e)?,
            Ok(Event::GeneralRef(e)) if in_text_element => push_reference(&mut text, &e)?,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::OfficeProcessing(format!(
                    "XML parsing error: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(text)
}

fn shared_strings(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);

    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_item = false;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_item = true;
                    current.clear();
                }
                b"t" => in_text = in_item,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    strings.push(std::mem::take(&mut current));
                    in_item = false;
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => push_text(&mut current, &e)?,
            Ok(Event::GeneralRef(e)) if in_text => push_reference(&mut current, &e)?,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::OfficeProcessing(format!(
                    "Shared strings parsing error: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(strings)
}

#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    Shared,
    Inline,
    Value,
}

/// One line per row, cells separated by tabs.
fn sheet_text(xml: &str, shared: &[String]) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);

    let mut text = String::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut kind = CellKind::Value;
    let mut capture = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    cell.clear();
                    kind = CellKind::Value;
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"t" {
                            kind = match attr.value.as_ref() {
                                b"s" => CellKind::Shared,
                                b"inlineStr" => CellKind::Inline,
                                _ => CellKind::Value,
                            };
                        }
                    }
                }
                b"v" => capture = kind != CellKind::Inline,
                b"t" => capture = kind == CellKind::Inline,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    let value = match kind {
                        CellKind::Shared => cell
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared.get(i).cloned())
                            .unwrap_or_default(),
                        _ => std::mem::take(&mut cell),
                    };
                    row.push(value);
                }
                b"row" => {
                    if row.iter().any(|cell| !cell.is_empty()) {
                        text.push_str(&row.join("\t"));
                        text.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if capture => push_text(&mut cell, &e)?,
            Ok(Event::GeneralRef(e)) if capture => push_reference(&mut cell, &e)?,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::OfficeProcessing(format!(
                    "Worksheet parsing error: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(text)
}
