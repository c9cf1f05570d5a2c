//! Flattens markdown into the block list the binary exporters walk.
//!
//! Raw HTML and images are dropped; everything else keeps just enough
//! structure (heading level, list depth, bold runs, table cells) to be laid
//! out again.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

/// A run of inline text with uniform styling.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
    pub link: Option<String>,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading {
        level: u8,
        text: String,
    },
    Paragraph(Vec<Span>),
    ListItem {
        /// Number for ordered lists, `None` for bullets.
        ordinal: Option<u64>,
        depth: usize,
        spans: Vec<Span>,
    },
    Quote(Vec<Span>),
    Code(String),
    Table {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Rule,
}

pub fn markdown_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH
}

/// Concatenated text of `spans`.
pub fn plain(spans: &[Span]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

/// Text of the first level-1 heading.
pub fn first_title(markdown: &str) -> Option<String> {
    parse_blocks(markdown).into_iter().find_map(|b| match b {
        Block::Heading { level: 1, text } if !text.is_empty() => Some(text),
        _ => None,
    })
}

#[derive(Default)]
struct TableState {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
}

#[derive(Default)]
struct Builder {
    blocks: Vec<Block>,
    spans: Vec<Span>,
    bold: usize,
    italic: usize,
    links: Vec<String>,
    heading: Option<u8>,
    quote_depth: usize,
    lists: Vec<Option<u64>>,
    items: Vec<Option<u64>>,
    code: Option<String>,
    table: Option<TableState>,
    image_depth: usize,
}

impl Builder {
    fn push_text(&mut self, text: &str, code: bool) {
        if self.image_depth > 0 || text.is_empty() {
            return;
        }
        let span = Span {
            text: text.to_string(),
            bold: self.bold > 0,
            italic: self.italic > 0,
            code,
            link: self.links.last().cloned(),
        };
        match self.spans.last_mut() {
            Some(last)
                if last.bold == span.bold
                    && last.italic == span.italic
                    && last.code == span.code
                    && last.link == span.link =>
            {
                last.text.push_str(&span.text)
            }
            _ => self.spans.push(span),
        }
    }

    fn take_spans(&mut self) -> Vec<Span> {
        let mut spans = std::mem::take(&mut self.spans);
        if let Some(first) = spans.first_mut() {
            first.text = first.text.trim_start().to_string();
        }
        if let Some(last) = spans.last_mut() {
            last.text = last.text.trim_end().to_string();
        }
        spans.retain(|s| !s.text.is_empty());
        spans
    }

    fn flush_item(&mut self) {
        let spans = self.take_spans();
        if spans.is_empty() {
            return;
        }
        self.blocks.push(Block::ListItem {
            ordinal: self.items.last().copied().flatten(),
            depth: self.lists.len().saturating_sub(1),
            spans,
        });
    }

    fn flush_paragraph(&mut self) {
        if !self.items.is_empty() {
            // Loose list items wrap their text in paragraphs.
            self.spans.push(Span::plain(" "));
            return;
        }
        let spans = self.take_spans();
        if spans.is_empty() {
            return;
        }
        if self.quote_depth > 0 {
            self.blocks.push(Block::Quote(spans));
        } else {
            self.blocks.push(Block::Paragraph(spans));
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                self.spans.clear();
                self.heading = Some(level as u8);
            }
            Event::End(TagEnd::Heading(_)) => {
                let text = plain(&self.take_spans()).trim().to_string();
                let level = self.heading.take().unwrap_or(1);
                self.blocks.push(Block::Heading { level, text });
            }
            Event::End(TagEnd::Paragraph) => self.flush_paragraph(),
            Event::Start(Tag::BlockQuote(_)) => self.quote_depth += 1,
            Event::End(TagEnd::BlockQuote(_)) => {
                self.quote_depth = self.quote_depth.saturating_sub(1)
            }
            Event::Start(Tag::List(first)) => {
                self.flush_item();
                self.lists.push(first);
            }
            Event::End(TagEnd::List(_)) => {
                self.lists.pop();
            }
            Event::Start(Tag::Item) => {
                let ordinal = match self.lists.last_mut() {
                    Some(Some(next)) => {
                        let current = *next;
                        *next += 1;
                        Some(current)
                    }
                    _ => None,
                };
                self.items.push(ordinal);
            }
            Event::End(TagEnd::Item) => {
                self.flush_item();
                self.items.pop();
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                if let CodeBlockKind::Fenced(_) | CodeBlockKind::Indented = kind {
                    self.code = Some(String::new());
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(code) = self.code.take() {
                    self.blocks
                        .push(Block::Code(code.trim_end_matches('\n').to_string()));
                }
            }
            Event::Start(Tag::Table(_)) => self.table = Some(TableState::default()),
            Event::End(TagEnd::TableHead) => {
                if let Some(table) = self.table.as_mut() {
                    table.header = std::mem::take(&mut table.row);
                }
            }
            Event::End(TagEnd::TableRow) => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                }
            }
            Event::Start(Tag::TableCell) => self.spans.clear(),
            Event::End(TagEnd::TableCell) => {
                let cell = plain(&self.take_spans());
                if let Some(table) = self.table.as_mut() {
                    table.row.push(cell);
                }
            }
            Event::End(TagEnd::Table) => {
                if let Some(table) = self.table.take() {
                    self.blocks.push(Block::Table {
                        header: table.header,
                        rows: table.rows,
                    });
                }
            }
            Event::Start(Tag::Strong) => self.bold += 1,
            Event::End(TagEnd::Strong) => self.bold = self.bold.saturating_sub(1),
            Event::Start(Tag::Emphasis) => self.italic += 1,
            Event::End(TagEnd::Emphasis) => self.italic = self.italic.saturating_sub(1),
            Event::Start(Tag::Link { dest_url, .. }) => self.links.push(dest_url.to_string()),
            Event::End(TagEnd::Link) => {
                self.links.pop();
            }
            Event::Start(Tag::Image { .. }) => self.image_depth += 1,
            Event::End(TagEnd::Image) => self.image_depth = self.image_depth.saturating_sub(1),
            Event::Text(text) => match self.code.as_mut() {
                Some(code) => code.push_str(&text),
                None => self.push_text(&text, false),
            },
            Event::Code(text) => self.push_text(&text, true),
            Event::SoftBreak | Event::HardBreak => self.push_text(" ", false),
            Event::Rule => self.blocks.push(Block::Rule),
            _ => {}
        }
    }
}

pub fn parse_blocks(markdown: &str) -> Vec<Block> {
    let mut builder = Builder::default();
    for event in Parser::new_ext(markdown, markdown_options()) {
        builder.event(event);
    }
    builder.blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headings_and_paragraphs() {
        let blocks = parse_blocks("# Title\n\nSome **bold** text.\n\n## Section\n");
        assert_eq!(
            blocks[0],
            Block::Heading {
                level: 1,
                text: "Title".to_string()
            }
        );
        match &blocks[1] {
            Block::Paragraph(spans) => {
                assert_eq!(plain(spans), "Some bold text.");
                assert!(spans[1].bold);
                assert!(!spans[0].bold);
            }
            other => panic!("Expected paragraph, got {:?}", other),
        }
        assert!(matches!(&blocks[2], Block::Heading { level: 2, .. }));
    }

    #[test]
    fn test_lists_keep_depth_and_numbers() {
        let blocks = parse_blocks("1. First\n2. Second\n   - Nested\n");
        let items: Vec<_> = blocks
            .iter()
            .map(|b| match b {
                Block::ListItem {
                    ordinal,
                    depth,
                    spans,
                } => (*ordinal, *depth, plain(spans)),
                other => panic!("Expected list item, got {:?}", other),
            })
            .collect();
        assert_eq!(
            items,
            vec![
                (Some(1), 0, "First".to_string()),
                (Some(2), 0, "Second".to_string()),
                (None, 1, "Nested".to_string()),
            ]
        );
    }

    #[test]
    fn test_table_cells() {
        let blocks = parse_blocks("| A | B |\n|---|---|\n| 1 | **2** |\n");
        assert_eq!(
            blocks,
            vec![Block::Table {
                header: vec!["A".to_string(), "B".to_string()],
                rows: vec![vec!["1".to_string(), "2".to_string()]],
            }]
        );
    }

    #[test]
    fn test_html_and_images_are_dropped() {
        let blocks = parse_blocks("<div>raw</div>\n\nText ![alt](x.png) end <b>x</b>\n");
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            Block::Paragraph(spans) => assert_eq!(plain(spans), "Text  end x"),
            other => panic!("Expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn test_quote_code_rule_and_links() {
        let md = "> quoted\n\n```\nlet x = 1;\n```\n\n---\n\nSee [site](https://a.com).\n";
        let blocks = parse_blocks(md);
        assert!(matches!(&blocks[0], Block::Quote(_)));
        assert_eq!(blocks[1], Block::Code("let x = 1;".to_string()));
        assert_eq!(blocks[2], Block::Rule);
        match &blocks[3] {
            Block::Paragraph(spans) => {
                assert_eq!(spans[1].link.as_deref(), Some("https://a.com"));
            }
            other => panic!("Expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn test_first_title() {
        assert_eq!(first_title("intro\n\n# Real Title\n"), Some("Real Title".to_string()));
        assert_eq!(first_title("## Only H2\n"), None);
    }
}
