//! Plain-text export, 72 columns, box-drawing characters for structure.

use crate::error::ExportError;
use crate::report::blocks::{parse_blocks, plain, Block};
use crate::report::labels::{domain_name, style_name};
use crate::report::{ExportFormat, Exporter, ReportInput};
use crate::sanitize::truncate_chars;

pub const WIDTH: usize = 72;
const MAX_TABLE_COLUMN: usize = 24;

fn width_of(text: &str) -> usize {
    text.chars().count()
}

fn center(text: &str, width: usize) -> String {
    let text = truncate_chars(text, width);
    let pad = width - width_of(text);
    let left = pad / 2;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(pad - left))
}

fn boxed(text: &str) -> Vec<String> {
    let inner = WIDTH - 2;
    let mut out = vec![format!("╔{}╗", "═".repeat(inner))];
    for line in wrap(text, inner - 4) {
        out.push(format!("║{}║", center(&line, inner)));
    }
    out.push(format!("╚{}╝", "═".repeat(inner)));
    out
}

/// Greedy word wrap on character counts. Words longer than `width` are cut.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while width_of(&word) > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(width).collect();
            word = word.chars().skip(width).collect();
            lines.push(head);
        }
        if current.is_empty() {
            current = word;
        } else if width_of(&current) + 1 + width_of(&word) <= width {
            current.push(' ');
            current.push_str(&word);
        } else {
            lines.push(std::mem::replace(&mut current, word));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Wraps `text` with `first` before the first line and `rest` before the others.
fn hanging(out: &mut Vec<String>, text: &str, first: &str, rest: &str) {
    let width = WIDTH.saturating_sub(width_of(first).max(width_of(rest)));
    for (i, line) in wrap(text, width).into_iter().enumerate() {
        let prefix = if i == 0 { first } else { rest };
        out.push(format!("{}{}", prefix, line));
    }
}

fn table(out: &mut Vec<String>, header: &[String], rows: &[Vec<String>]) {
    let columns = rows
        .iter()
        .map(|r| r.len())
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0);
    if columns == 0 {
        return;
    }
    let mut widths = vec![1usize; columns];
    for row in std::iter::once(header).chain(rows.iter().map(|r| r.as_slice())) {
        for (c, cell) in row.iter().enumerate() {
            widths[c] = widths[c].max(width_of(cell.trim()).min(MAX_TABLE_COLUMN));
        }
    }
    let separator = format!(
        "  +{}+",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );
    let line = |cells: &[String]| {
        let body = widths
            .iter()
            .enumerate()
            .map(|(c, w)| {
                let cell = cells.get(c).map(|s| s.trim()).unwrap_or("");
                let cell = if width_of(cell) > *w {
                    format!("{}…", truncate_chars(cell, w - 1))
                } else {
                    cell.to_string()
                };
                format!(" {}{} ", cell, " ".repeat(w - width_of(&cell)))
            })
            .collect::<Vec<_>>()
            .join("|");
        format!("  |{}|", body)
    };

    out.push(separator.clone());
    if !header.is_empty() {
        out.push(line(header));
        out.push(separator.clone());
    }
    for row in rows {
        out.push(line(row));
    }
    out.push(separator);
}

pub fn render_txt(input: &ReportInput) -> String {
    let labels = input.labels();
    let locale = input.config.locale;
    let mut out = boxed(&input.title.to_uppercase());
    out.push(String::new());
    out.push(format!("  {} {}", labels.generated_by, input.brand));
    out.push(format!(
        "  {}: {}  |  {}: {}",
        labels.domain,
        domain_name(input.config.domain, locale),
        labels.style,
        style_name(input.config.report_style, locale)
    ));
    out.push(format!(
        "  {}: {}",
        labels.date,
        input.generated_at.format("%d/%m/%Y %H:%M")
    ));
    out.push(String::new());
    out.push("─".repeat(WIDTH));

    let mut skipped_title = false;
    for block in parse_blocks(&input.markdown) {
        match block {
            Block::Heading { level: 1, text } => {
                if !skipped_title && text == input.title {
                    skipped_title = true;
                    continue;
                }
                let text = truncate_chars(&text.to_uppercase(), WIDTH - 6).to_string();
                out.push(String::new());
                out.push(format!("┌{}┐", "─".repeat(width_of(&text) + 4)));
                out.push(format!("│  {}  │", text));
                out.push(format!("└{}┘", "─".repeat(width_of(&text) + 4)));
            }
            Block::Heading { level: 2, text } => {
                let rule = "━".repeat((width_of(&text) + 4).min(WIDTH));
                out.push(String::new());
                out.push(rule.clone());
                hanging(&mut out, &text, "  ", "  ");
                out.push(rule);
            }
            Block::Heading { level: 3, text } => {
                out.push(String::new());
                hanging(&mut out, &text, "  ▸ ", "    ");
                out.push(format!("  {}", "─".repeat((width_of(&text) + 2).min(WIDTH - 2))));
            }
            Block::Heading { text, .. } => {
                out.push(String::new());
                hanging(&mut out, &text, "  ", "  ");
            }
            Block::Paragraph(spans) => {
                out.push(String::new());
                hanging(&mut out, &plain(&spans), "  ", "  ");
            }
            Block::ListItem {
                ordinal,
                depth,
                spans,
            } => {
                let indent = "    ".to_string() + &"  ".repeat(depth);
                let marker = match ordinal {
                    Some(n) => format!("{}. ", n),
                    None => "•  ".to_string(),
                };
                let first = format!("{}{}", indent, marker);
                let rest = " ".repeat(width_of(&first));
                hanging(&mut out, &plain(&spans), &first, &rest);
            }
            Block::Quote(spans) => {
                out.push(String::new());
                hanging(&mut out, &plain(&spans), "    │ ", "    │ ");
            }
            Block::Code(code) => {
                out.push(String::new());
                for line in code.lines() {
                    out.push(format!("      {}", line));
                }
            }
            Block::Table { header, rows } => {
                out.push(String::new());
                table(&mut out, &header, &rows);
            }
            Block::Rule => out.push("─".repeat(WIDTH)),
        }
    }

    if !input.references.is_empty() {
        let title = labels.references.to_uppercase();
        let rule = "━".repeat(width_of(&title) + 4);
        out.push(String::new());
        out.push(rule.clone());
        out.push(format!("  {}", title));
        out.push(rule);
        for (i, reference) in input.references.iter().enumerate() {
            out.push(String::new());
            let marker = format!("  [{}] ", i + 1);
            let rest = " ".repeat(width_of(&marker));
            hanging(&mut out, &reference.title, &marker, &rest);
            out.push(format!("{}{}", rest, reference.url));
            if !reference.snippet.trim().is_empty() {
                hanging(
                    &mut out,
                    truncate_chars(reference.snippet.trim(), 300),
                    &rest,
                    &rest,
                );
            }
        }
    }

    out.push(String::new());
    out.push("─".repeat(WIDTH));
    out.push(String::new());
    hanging(&mut out, &labels.disclaimer(&input.brand), "  ", "  ");
    out.push(String::new());
    out.extend(boxed(&input.brand));

    let mut text = out.join("\n");
    text.push('\n');
    text
}

pub struct TxtExporter;

impl Exporter for TxtExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Txt
    }

    fn export(&self, input: &ReportInput) -> Result<Vec<u8>, ExportError> {
        Ok(render_txt(input).into_bytes())
    }
}
