//! Print-ready PDF: cover, contents, paginated body, references.
//!
//! Pages are laid out with the 14 standard Type1 fonts in WinAnsi encoding,
//! so no font files are embedded. Widths are approximated per glyph class.

use std::fmt::Write as _;

use lopdf::{dictionary, Dictionary, Document, Object, Stream};

use crate::error::ExportError;
use crate::report::blocks::{parse_blocks, Block, Span};
use crate::report::labels::{domain_name, style_name};
use crate::report::theme::{self, Rgb};
use crate::report::{is_closing_heading, ExportFormat, Exporter, Figure, ReportInput};
use crate::sanitize::truncate_chars;

const PAGE_W: f32 = 595.28;
const PAGE_H: f32 = 841.89;
const MARGIN: f32 = 56.0;
const CONTENT_W: f32 = PAGE_W - 2.0 * MARGIN;
const BODY_TOP: f32 = PAGE_H - 72.0;
const BODY_BOTTOM: f32 = 64.0;
const BODY_SIZE: f32 = 10.5;
const BODY_LEADING: f32 = 15.0;
const MAX_FIGURE_H: f32 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Italic,
    Mono,
}

impl Font {
    const ALL: [Font; 4] = [Font::Regular, Font::Bold, Font::Italic, Font::Mono];

    fn resource(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Italic => "F3",
            Font::Mono => "F4",
        }
    }

    fn base_font(&self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
            Font::Italic => "Helvetica-Oblique",
            Font::Mono => "Courier",
        }
    }

    fn for_span(span: &Span) -> Self {
        if span.code {
            Font::Mono
        } else if span.bold {
            Font::Bold
        } else if span.italic {
            Font::Italic
        } else {
            Font::Regular
        }
    }
}

/// Maps text to WinAnsiEncoding bytes; unmapped characters become `?`.
pub fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' | '\n' | '\r' => b' ',
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‰' => 0x89,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            'Œ' => 0x8C,
            'œ' => 0x9C,
            _ => b'?',
        })
        .collect()
}

fn char_em(c: char, font: Font) -> f32 {
    if font == Font::Mono {
        return 0.6;
    }
    let em = match c {
        ' ' => 0.278,
        'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '|' | '!' | 'I' | 'f' | 't' | 'r' => 0.3,
        'm' | 'w' | 'M' | 'W' => 0.85,
        '0'..='9' => 0.556,
        c if c.is_uppercase() => 0.68,
        _ => 0.53,
    };
    if font == Font::Bold {
        em * 1.06
    } else {
        em
    }
}

fn text_width(text: &str, font: Font, size: f32) -> f32 {
    text.chars().map(|c| char_em(c, font)).sum::<f32>() * size
}

fn hex_string(text: &str) -> String {
    let mut out = String::from("<");
    for b in win_ansi(text) {
        let _ = write!(out, "{:02X}", b);
    }
    out.push('>');
    out
}

fn fill_rect(ops: &mut String, color: Rgb, x: f32, y: f32, w: f32, h: f32) {
    let [r, g, b] = theme::fractions(color);
    let _ = writeln!(
        ops,
        "{:.3} {:.3} {:.3} rg {:.2} {:.2} {:.2} {:.2} re f",
        r, g, b, x, y, w, h
    );
}

fn stroke_line(ops: &mut String, color: Rgb, width: f32, from: (f32, f32), to: (f32, f32)) {
    let [r, g, b] = theme::fractions(color);
    let _ = writeln!(
        ops,
        "{:.2} w {:.3} {:.3} {:.3} RG {:.2} {:.2} m {:.2} {:.2} l S",
        width, r, g, b, from.0, from.1, to.0, to.1
    );
}

fn draw_text(ops: &mut String, font: Font, size: f32, color: Rgb, x: f32, y: f32, text: &str) {
    let [r, g, b] = theme::fractions(color);
    let _ = writeln!(
        ops,
        "BT /{} {:.1} Tf {:.3} {:.3} {:.3} rg {:.2} {:.2} Td {} Tj ET",
        font.resource(),
        size,
        r,
        g,
        b,
        x,
        y,
        hex_string(text)
    );
}

#[derive(Debug, Clone)]
struct Word {
    text: String,
    font: Font,
    space_before: bool,
}

type Line = Vec<(String, Font)>;

fn words(spans: &[(String, Font)]) -> Vec<Word> {
    let mut out = Vec::new();
    let mut pending_space = false;
    for (text, font) in spans {
        let mut current = String::new();
        for c in text.chars() {
            if c.is_whitespace() {
                if !current.is_empty() {
                    out.push(Word {
                        text: std::mem::take(&mut current),
                        font: *font,
                        space_before: pending_space,
                    });
                }
                pending_space = true;
            } else {
                current.push(c);
            }
        }
        if !current.is_empty() {
            out.push(Word {
                text: current,
                font: *font,
                space_before: pending_space,
            });
            pending_space = false;
        }
    }
    out
}

/// Splits a word that is wider than the line on its own.
fn split_long(word: Word, size: f32, max_width: f32) -> Vec<Word> {
    if text_width(&word.text, word.font, size) <= max_width {
        return vec![word];
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    for c in word.text.chars() {
        let next = text_width(&current, word.font, size) + char_em(c, word.font) * size;
        if !current.is_empty() && next > max_width {
            pieces.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    pieces.push(current);
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| Word {
            text,
            font: word.font,
            space_before: i == 0 && word.space_before,
        })
        .collect()
}

/// Greedy line breaking; runs with the same font are merged per line.
fn wrap(spans: &[(String, Font)], size: f32, max_width: f32) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    let mut line: Line = Vec::new();
    let mut width = 0.0f32;

    for word in words(spans)
        .into_iter()
        .flat_map(|w| split_long(w, size, max_width))
    {
        let space = if word.space_before && !line.is_empty() {
            char_em(' ', word.font) * size
        } else {
            0.0
        };
        let w = text_width(&word.text, word.font, size);
        if !line.is_empty() && width + space + w > max_width {
            lines.push(std::mem::take(&mut line));
            width = 0.0;
        }
        let glue = if word.space_before && !line.is_empty() {
            " "
        } else {
            ""
        };
        width += if glue.is_empty() { w } else { space + w };
        match line.last_mut() {
            Some((text, font)) if *font == word.font => {
                text.push_str(glue);
                text.push_str(&word.text);
            }
            _ => line.push((format!("{}{}", glue, word.text), word.font)),
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

fn line_width(line: &Line, size: f32) -> f32 {
    line.iter().map(|(t, f)| text_width(t, *f, size)).sum()
}

struct TocEntry {
    level: u8,
    text: String,
    page: usize,
}

struct Layout<'a> {
    input: &'a ReportInput,
    pages: Vec<String>,
    y: f32,
    toc: Vec<TocEntry>,
    figures: Vec<&'a Figure>,
}

impl<'a> Layout<'a> {
    fn new(input: &'a ReportInput) -> Self {
        Self {
            input,
            pages: vec![String::new()],
            y: BODY_TOP,
            toc: Vec::new(),
            figures: Vec::new(),
        }
    }

    fn ops(&mut self) -> &mut String {
        if self.pages.is_empty() {
            self.pages.push(String::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn new_page(&mut self) {
        self.pages.push(String::new());
        self.y = BODY_TOP;
    }

    fn ensure(&mut self, height: f32) {
        if self.y - height < BODY_BOTTOM && self.y < BODY_TOP {
            self.new_page();
        }
    }

    fn write_lines(&mut self, lines: &[Line], size: f32, leading: f32, x: f32, color: Rgb) {
        for line in lines {
            self.ensure(leading);
            self.y -= leading;
            let baseline = self.y + (leading - size) * 0.5;
            let mut cursor = x;
            for (text, font) in line {
                draw_text(self.ops(), *font, size, color, cursor, baseline, text);
                cursor += text_width(text, *font, size);
            }
        }
    }

    fn heading(&mut self, level: u8, text: &str) {
        let (size, gap_before, color) = match level {
            1 => (18.0, 18.0, theme::NAVY),
            2 => (15.0, 16.0, theme::NAVY),
            3 => (12.5, 12.0, theme::NAVY),
            _ => (11.0, 10.0, theme::TEXT),
        };
        self.ensure(gap_before + size * 3.0);
        self.y -= gap_before;
        if level <= 3 {
            self.toc.push(TocEntry {
                level,
                text: text.to_string(),
                page: self.pages.len(),
            });
        }
        let lines = wrap(&[(text.to_string(), Font::Bold)], size, CONTENT_W);
        self.write_lines(&lines, size, size * 1.35, MARGIN, color);
        if level == 2 {
            self.y -= 3.0;
            let y = self.y;
            stroke_line(self.ops(), theme::BORDER, 0.8, (MARGIN, y), (PAGE_W - MARGIN, y));
        }
        self.y -= 4.0;
    }

    fn spans(&mut self, spans: &[Span], indent: f32, color: Rgb, force: Option<Font>) {
        let runs: Vec<(String, Font)> = spans
            .iter()
            .map(|s| (s.text.clone(), force.unwrap_or_else(|| Font::for_span(s))))
            .collect();
        let lines = wrap(&runs, BODY_SIZE, CONTENT_W - indent);
        self.write_lines(&lines, BODY_SIZE, BODY_LEADING, MARGIN + indent, color);
    }

    fn paragraph(&mut self, spans: &[Span]) {
        self.spans(spans, 0.0, theme::TEXT, None);
        self.y -= 6.0;
    }

    fn list_item(&mut self, ordinal: Option<u64>, depth: usize, spans: &[Span]) {
        let indent = 14.0 + depth as f32 * 14.0;
        let marker = match ordinal {
            Some(n) => format!("{}.", n),
            None => "•".to_string(),
        };
        self.ensure(BODY_LEADING);
        let y = self.y - BODY_LEADING + (BODY_LEADING - BODY_SIZE) * 0.5;
        draw_text(self.ops(), Font::Bold, BODY_SIZE, theme::BLUE, MARGIN + indent, y, &marker);
        self.spans(spans, indent + 16.0, theme::TEXT, None);
        self.y -= 2.0;
    }

    fn quote(&mut self, spans: &[Span]) {
        let top = self.y;
        let page = self.pages.len();
        self.spans(spans, 16.0, theme::MUTED, Some(Font::Italic));
        if self.pages.len() == page {
            let bottom = self.y;
            fill_rect(self.ops(), theme::BLUE, MARGIN + 4.0, bottom, 3.0, top - bottom);
        }
        self.y -= 8.0;
    }

    fn code(&mut self, code: &str) {
        let size = 9.0;
        let leading = 12.0;
        for raw in code.lines() {
            let lines = wrap(&[(raw.to_string(), Font::Mono)], size, CONTENT_W - 16.0);
            let lines = if lines.is_empty() { vec![Vec::new()] } else { lines };
            for line in lines {
                self.ensure(leading);
                let y = self.y - leading;
                fill_rect(self.ops(), theme::CODE_BG, MARGIN, y, CONTENT_W, leading);
                self.write_lines(&[line], size, leading, MARGIN + 8.0, theme::TEXT);
            }
        }
        self.y -= 8.0;
    }

    fn table(&mut self, header: &[String], rows: &[Vec<String>]) {
        let columns = rows
            .iter()
            .map(|r| r.len())
            .chain(std::iter::once(header.len()))
            .max()
            .unwrap_or(0);
        if columns == 0 {
            return;
        }
        let size = 9.0;
        let leading = 11.5;
        let col_w = CONTENT_W / columns as f32;

        let draw_row = |layout: &mut Self, cells: &[String], is_header: bool, index: usize| {
            let font = if is_header { Font::Bold } else { Font::Regular };
            let wrapped: Vec<Vec<Line>> = (0..columns)
                .map(|c| {
                    let text = cells.get(c).cloned().unwrap_or_default();
                    wrap(&[(text, font)], size, col_w - 8.0)
                })
                .collect();
            let line_count = wrapped.iter().map(|l| l.len()).max().unwrap_or(1).max(1);
            let height = line_count as f32 * leading + 8.0;
            layout.ensure(height);
            let top = layout.y;
            let fill = if is_header {
                Some(theme::NAVY)
            } else if index % 2 == 1 {
                Some(theme::ROW_ALT)
            } else {
                None
            };
            if let Some(color) = fill {
                fill_rect(layout.ops(), color, MARGIN, top - height, CONTENT_W, height);
            }
            let color = if is_header { theme::WHITE } else { theme::TEXT };
            for (c, lines) in wrapped.iter().enumerate() {
                let x = MARGIN + c as f32 * col_w + 4.0;
                for (i, line) in lines.iter().enumerate() {
                    let baseline = top - 4.0 - (i as f32 + 1.0) * leading + (leading - size) * 0.5;
                    let mut cursor = x;
                    for (text, font) in line {
                        draw_text(layout.ops(), *font, size, color, cursor, baseline, text);
                        cursor += text_width(text, *font, size);
                    }
                }
            }
            layout.y = top - height;
            let y = layout.y;
            stroke_line(layout.ops(), theme::BORDER, 0.5, (MARGIN, y), (PAGE_W - MARGIN, y));
        };

        if !header.is_empty() {
            draw_row(self, header, true, 0);
        }
        for (i, row) in rows.iter().enumerate() {
            draw_row(self, row, false, i);
        }
        self.y -= 10.0;
    }

    fn rule(&mut self) {
        self.ensure(14.0);
        self.y -= 7.0;
        let y = self.y;
        stroke_line(self.ops(), theme::BORDER, 0.8, (MARGIN, y), (PAGE_W - MARGIN, y));
        self.y -= 7.0;
    }

    fn figure(&mut self, figure: &'a Figure) {
        if figure.width == 0 || figure.height == 0 {
            return;
        }
        let scale = (CONTENT_W / figure.width as f32).min(MAX_FIGURE_H / figure.height as f32);
        let (w, h) = (figure.width as f32 * scale, figure.height as f32 * scale);
        self.ensure(h + 30.0);
        self.y -= 6.0;
        let x = MARGIN + (CONTENT_W - w) / 2.0;
        let y = self.y - h;
        self.figures.push(figure);
        let name = format!("Im{}", self.figures.len());
        let _ = writeln!(
            self.ops(),
            "q {:.2} 0 0 {:.2} {:.2} {:.2} cm /{} Do Q",
            w,
            h,
            x,
            y,
            name
        );
        self.y = y;

        let size = 9.0;
        let lines = wrap(&[(figure.caption.clone(), Font::Italic)], size, CONTENT_W);
        for line in lines {
            let offset = (CONTENT_W - line_width(&line, size)) / 2.0;
            self.write_lines(&[line], size, 12.0, MARGIN + offset.max(0.0), theme::MUTED);
        }
        self.y -= 10.0;
    }

    fn figures_section(&mut self, figures: &[&'a Figure]) {
        self.heading(2, self.input.labels().visualizations);
        for figure in figures {
            self.figure(figure);
        }
    }

    fn references(&mut self) {
        if self.input.references.is_empty() {
            return;
        }
        let input = self.input;
        self.heading(2, input.labels().references);
        for (i, reference) in input.references.iter().enumerate() {
            let title = if reference.title.trim().is_empty() {
                reference.url.clone()
            } else {
                reference.title.clone()
            };
            let marker = Span {
                text: format!("{}. ", i + 1),
                bold: true,
                ..Span::default()
            };
            let title = Span {
                text: title,
                bold: true,
                ..Span::default()
            };
            self.spans(&[marker, title], 0.0, theme::TEXT, None);
            let lines = wrap(&[(reference.url.clone(), Font::Regular)], 8.5, CONTENT_W - 14.0);
            self.write_lines(&lines, 8.5, 11.0, MARGIN + 14.0, theme::BLUE);
            if !reference.snippet.trim().is_empty() {
                let snippet = truncate_chars(reference.snippet.trim(), 300).to_string();
                let lines = wrap(&[(snippet, Font::Regular)], 8.5, CONTENT_W - 14.0);
                self.write_lines(&lines, 8.5, 11.0, MARGIN + 14.0, theme::MUTED);
            }
            self.y -= 6.0;
        }
    }

    fn disclaimer(&mut self) {
        self.rule();
        let text = self.input.labels().disclaimer(&self.input.brand);
        let lines = wrap(&[(text, Font::Italic)], 8.5, CONTENT_W);
        self.write_lines(&lines, 8.5, 11.5, MARGIN, theme::MUTED);
    }

    fn body(&mut self) {
        let input = self.input;
        let blocks = parse_blocks(&input.markdown);
        let mut loose = input.section_figures();
        let mut pending: Option<(u8, Vec<&'a Figure>)> = None;
        let mut skipped_title = false;

        for block in &blocks {
            match block {
                Block::Heading { level, text } => {
                    if *level == 1 && !skipped_title && text == &input.title {
                        skipped_title = true;
                        continue;
                    }
                    if let Some((section_level, figures)) = pending.take() {
                        if *level <= section_level {
                            for figure in figures {
                                self.figure(figure);
                            }
                        } else {
                            pending = Some((section_level, figures));
                        }
                    }
                    if !loose.is_empty() && (2..=3).contains(level) && is_closing_heading(text) {
                        let figures = std::mem::take(&mut loose);
                        self.figures_section(&figures);
                    }
                    self.heading(*level, text);
                    let placed: Vec<&'a Figure> = input.figures_after(text).collect();
                    if !placed.is_empty() && pending.is_none() {
                        pending = Some((*level, placed));
                    }
                }
                Block::Paragraph(spans) => self.paragraph(spans),
                Block::ListItem {
                    ordinal,
                    depth,
                    spans,
                } => self.list_item(*ordinal, *depth, spans),
                Block::Quote(spans) => self.quote(spans),
                Block::Code(code) => self.code(code),
                Block::Table { header, rows } => self.table(header, rows),
                Block::Rule => self.rule(),
            }
        }
        if let Some((_, figures)) = pending {
            for figure in figures {
                self.figure(figure);
            }
        }
        if !loose.is_empty() {
            self.figures_section(&loose);
        }
        self.references();
        self.disclaimer();
    }
}

fn cover(input: &ReportInput) -> String {
    let mut ops = String::new();
    let band_h = 320.0;
    let band_y = PAGE_H - band_h;
    let strips = 48;
    let stops = [theme::NAVY, theme::BLUE, theme::PURPLE];
    for i in 0..strips {
        let t = i as f32 / (strips - 1) as f32;
        let (a, b, local) = if t < 0.5 {
            (stops[0], stops[1], t * 2.0)
        } else {
            (stops[1], stops[2], (t - 0.5) * 2.0)
        };
        let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * local).round() as u8;
        let color = [mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])];
        let w = PAGE_W / strips as f32;
        fill_rect(&mut ops, color, i as f32 * w, band_y, w + 0.5, band_h);
    }

    let labels = input.labels();
    draw_text(&mut ops, Font::Bold, 11.0, theme::WHITE, MARGIN, PAGE_H - 80.0, &labels.report.to_uppercase());

    let mut lines = wrap(&[(input.title.clone(), Font::Bold)], 26.0, CONTENT_W);
    if lines.len() > 3 {
        lines.truncate(3);
        if let Some((text, _)) = lines[2].last_mut() {
            text.push_str("...");
        }
    }
    let mut y = PAGE_H - 140.0;
    for line in &lines {
        let mut x = MARGIN;
        for (text, font) in line {
            draw_text(&mut ops, *font, 26.0, theme::WHITE, x, y, text);
            x += text_width(text, *font, 26.0);
        }
        y -= 34.0;
    }

    let locale = input.config.locale;
    let details = [
        (labels.domain, domain_name(input.config.domain, locale).to_string()),
        (labels.style, style_name(input.config.report_style, locale).to_string()),
        (labels.date, input.generated_at.format("%d/%m/%Y").to_string()),
    ];
    let mut y = band_y - 60.0;
    for (label, value) in details {
        draw_text(&mut ops, Font::Bold, 12.0, theme::NAVY, MARGIN, y, &format!("{}:", label));
        draw_text(&mut ops, Font::Regular, 12.0, theme::TEXT, MARGIN + 90.0, y, &value);
        y -= 22.0;
    }
    if !input.config.domain_detail.trim().is_empty() {
        draw_text(&mut ops, Font::Italic, 11.0, theme::MUTED, MARGIN, y, input.config.domain_detail.trim());
    }

    stroke_line(&mut ops, theme::BORDER, 0.8, (MARGIN, 80.0), (PAGE_W - MARGIN, 80.0));
    draw_text(
        &mut ops,
        Font::Regular,
        10.0,
        theme::MUTED,
        MARGIN,
        60.0,
        &format!("{} {}", labels.generated_by, input.brand),
    );
    ops
}

fn contents(input: &ReportInput, toc: &[TocEntry]) -> Vec<String> {
    if toc.is_empty() {
        return Vec::new();
    }
    let mut pages = vec![String::new()];
    let mut y = PAGE_H - 90.0;
    if let Some(ops) = pages.last_mut() {
        draw_text(ops, Font::Bold, 20.0, theme::NAVY, MARGIN, y, input.labels().contents);
    }
    y -= 36.0;

    for entry in toc.iter().filter(|e| e.level >= 2) {
        if y < BODY_BOTTOM {
            pages.push(String::new());
            y = PAGE_H - 72.0;
        }
        let (indent, font, size) = if entry.level == 2 {
            (0.0, Font::Bold, 11.0)
        } else {
            (16.0, Font::Regular, 10.0)
        };
        let page = entry.page.to_string();
        let page_w = text_width(&page, Font::Regular, size);
        let max_text = CONTENT_W - indent - page_w - 20.0;
        let mut text = entry.text.clone();
        while text_width(&text, font, size) > max_text && text.chars().count() > 4 {
            let keep = text.chars().count() - 4;
            text = format!("{}...", text.chars().take(keep).collect::<String>());
        }
        if let Some(ops) = pages.last_mut() {
            draw_text(ops, font, size, theme::TEXT, MARGIN + indent, y, &text);
            draw_text(ops, Font::Regular, size, theme::MUTED, PAGE_W - MARGIN - page_w, y, &page);
        }
        y -= if entry.level == 2 { 20.0 } else { 16.0 };
    }
    pages
}

fn frame(ops: &mut String, input: &ReportInput, page: usize) {
    let title = truncate_chars(&input.title, 90);
    draw_text(ops, Font::Italic, 8.5, theme::MUTED, MARGIN, PAGE_H - 40.0, title);
    stroke_line(ops, theme::BORDER, 0.5, (MARGIN, PAGE_H - 48.0), (PAGE_W - MARGIN, PAGE_H - 48.0));
    stroke_line(ops, theme::BORDER, 0.5, (MARGIN, 46.0), (PAGE_W - MARGIN, 46.0));
    let footer = format!("{} {}", input.labels().page, page);
    let w = text_width(&footer, Font::Regular, 8.5);
    draw_text(ops, Font::Regular, 8.5, theme::MUTED, (PAGE_W - w) / 2.0, 30.0, &footer);
}

pub fn render_pdf(input: &ReportInput) -> Result<Vec<u8>, ExportError> {
    let mut layout = Layout::new(input);
    layout.body();

    let mut page_streams = vec![cover(input)];
    page_streams.extend(contents(input, &layout.toc));
    for (i, mut ops) in layout.pages.into_iter().enumerate() {
        frame(&mut ops, input, i + 1);
        page_streams.push(ops);
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut fonts = Dictionary::new();
    for font in Font::ALL {
        let id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(font.resource(), id);
    }

    let mut xobjects = Dictionary::new();
    for (i, figure) in layout.figures.iter().enumerate() {
        let id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => figure.width as i64,
                "Height" => figure.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            figure.jpeg.clone(),
        ));
        xobjects.set(format!("Im{}", i + 1), id);
    }

    let resources_id = doc.add_object(dictionary! {
        "Font" => fonts,
        "XObject" => xobjects,
    });

    let mut kids: Vec<Object> = Vec::with_capacity(page_streams.len());
    for ops in page_streams {
        let content_id = doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_W.into(), PAGE_H.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ExportError::Pdf(e.to_string()))?;
    Ok(buffer)
}

pub struct PdfExporter;

impl Exporter for PdfExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    fn export(&self, input: &ReportInput) -> Result<Vec<u8>, ExportError> {
        render_pdf(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::Placement;
    use crate::report::test_support::input;

    #[test]
    fn test_win_ansi_mapping() {
        assert_eq!(win_ansi("Ação"), vec![b'A', 0xE7, 0xE3, b'o']);
        assert_eq!(win_ansi("• – €"), vec![0x95, b' ', 0x96, b' ', 0x80]);
        assert_eq!(win_ansi("漢"), vec![b'?']);
    }

    #[test]
    fn test_wrap_respects_width() {
        let text = "word ".repeat(60);
        let lines = wrap(&[(text, Font::Regular)], 10.0, 200.0);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| line_width(l, 10.0) <= 200.0));
    }

    #[test]
    fn test_wrap_keeps_style_runs() {
        let spans = vec![
            ("Some ".to_string(), Font::Regular),
            ("bold".to_string(), Font::Bold),
            (" text".to_string(), Font::Regular),
        ];
        let lines = wrap(&spans, 10.0, 500.0);
        assert_eq!(
            lines,
            vec![vec![
                ("Some".to_string(), Font::Regular),
                (" bold".to_string(), Font::Bold),
                (" text".to_string(), Font::Regular),
            ]]
        );
    }

    #[test]
    fn test_long_words_are_split() {
        let url = format!("https://example.com/{}", "a".repeat(200));
        let lines = wrap(&[(url, Font::Regular)], 10.0, 150.0);
        assert!(lines.len() > 2);
    }

    #[test]
    fn test_pdf_structure() {
        let bytes = render_pdf(&input()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        // Cover, contents and at least one body page.
        assert!(doc.get_pages().len() >= 3);
    }

    #[test]
    fn test_figures_become_jpeg_xobjects() {
        let mut report = input();
        let (jpeg, width, height) = crate::images::LocalRenderer::default()
            .render(&crate::images::ImageRequest {
                topic: "solar".to_string(),
                domain: crate::worker::Domain::Technology,
                kind: "professional illustration",
                caption: "Solar".to_string(),
                placement: Placement::Figures,
            })
            .unwrap();
        report.figures.push(Figure {
            caption: "Solar".to_string(),
            jpeg,
            width,
            height,
            placement: Placement::Figures,
        });

        let mut layout = Layout::new(&report);
        layout.body();
        assert_eq!(layout.figures.len(), 1);
        assert!(layout.pages.iter().any(|p| p.contains("/Im1 Do")));

        let bytes = render_pdf(&report).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() >= 3);
    }

    #[test]
    fn test_contents_lists_sections_with_pages() {
        let report = input();
        let mut layout = Layout::new(&report);
        layout.body();
        let titles: Vec<&str> = layout.toc.iter().map(|e| e.text.as_str()).collect();
        assert!(titles.contains(&"Market Overview"));
        assert!(titles.contains(&"Conclusions"));
        assert!(layout.toc.iter().all(|e| e.page >= 1));
    }
}
