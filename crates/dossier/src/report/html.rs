//! Sanitized HTML preview.

use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use pulldown_cmark::{html, CowStr, Event, Parser, Tag, TagEnd};
use regex::Regex;

use crate::report::blocks::markdown_options;
use crate::report::{Figure, ReportInput};

static RE_CLOSING_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<h[23][^>]*>[^<]*?(conclus|recomenda|recommend|consider)").unwrap()
});

const TABLE_OPEN: &str = r#"<div class="table-wrapper"><table class="report-table">"#;
const TABLE_CLOSE: &str = "</table></div>";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `http`, `https`, `mailto` and scheme-less (relative or anchor) URLs.
pub fn is_safe_url(url: &str) -> bool {
    let url = url.trim();
    let end = url.find(['/', '?', '#']).unwrap_or(url.len());
    match url[..end].find(':') {
        None => true,
        Some(colon) => {
            let scheme = url[..colon].to_ascii_lowercase();
            matches!(scheme.as_str(), "http" | "https" | "mailto")
        }
    }
}

fn figure_html(figure: &Figure) -> String {
    format!(
        "<figure class=\"report-figure\"><img src=\"data:image/jpeg;base64,{}\" alt=\"{}\" \
         width=\"{}\" height=\"{}\"><figcaption>{}</figcaption></figure>",
        STANDARD.encode(&figure.jpeg),
        escape_html(&figure.caption),
        figure.width,
        figure.height,
        escape_html(&figure.caption)
    )
}

fn figures_section(title: &str, figures: &[&Figure]) -> String {
    let mut out = format!(
        "<div class=\"charts-section\"><h2 class=\"charts-header\">{}</h2>",
        escape_html(title)
    );
    for figure in figures {
        out.push_str(&figure_html(figure));
    }
    out.push_str("</div>");
    out
}

/// Markdown to HTML with raw HTML removed, unsafe links unwrapped, unsafe
/// images dropped, and the report's figures placed.
pub fn render_html(input: &ReportInput) -> String {
    let mut events: Vec<Event<'_>> = Vec::new();
    let mut unsafe_links: Vec<bool> = Vec::new();
    let mut skipped_images = 0usize;
    let mut heading: Option<(u8, String)> = None;
    let mut pending: Option<(u8, String)> = None;

    for event in Parser::new_ext(&input.markdown, markdown_options()) {
        if skipped_images > 0 {
            match event {
                Event::Start(Tag::Image { .. }) => skipped_images += 1,
                Event::End(TagEnd::Image) => skipped_images -= 1,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Html(_) | Event::InlineHtml(_) => continue,
            Event::Start(Tag::Link { ref dest_url, .. }) => {
                let safe = is_safe_url(dest_url);
                unsafe_links.push(!safe);
                if !safe {
                    continue;
                }
            }
            Event::End(TagEnd::Link) => {
                if unsafe_links.pop().unwrap_or(false) {
                    continue;
                }
            }
            Event::Start(Tag::Image { ref dest_url, .. }) if !is_safe_url(dest_url) => {
                skipped_images = 1;
                continue;
            }
            Event::Start(Tag::Heading { level, .. }) => {
                let level = level as u8;
                if let Some((section_level, html)) = pending.take() {
                    if level <= section_level {
                        events.push(Event::Html(CowStr::from(html)));
                    } else {
                        pending = Some((section_level, html));
                    }
                }
                heading = Some((level, String::new()));
            }
            Event::Text(ref text) | Event::Code(ref text) => {
                if let Some((_, buffer)) = heading.as_mut() {
                    buffer.push_str(text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, text)) = heading.take() {
                    let placed: String = input.figures_after(&text).map(figure_html).collect();
                    if !placed.is_empty() && pending.is_none() {
                        pending = Some((level, placed));
                    }
                }
            }
            _ => {}
        }
        events.push(event);
    }
    if let Some((_, html)) = pending {
        events.push(Event::Html(CowStr::from(html)));
    }

    let mut out = String::with_capacity(input.markdown.len() * 2);
    html::push_html(&mut out, events.into_iter());
    let mut out = out.replace("<table>", TABLE_OPEN).replace("</table>", TABLE_CLOSE);

    let figures = input.section_figures();
    if !figures.is_empty() {
        let section = figures_section(input.labels().visualizations, &figures);
        match RE_CLOSING_HEADING.find(&out) {
            Some(m) => out.insert_str(m.start(), &section),
            None => out.push_str(&section),
        }
    }
    out
}
