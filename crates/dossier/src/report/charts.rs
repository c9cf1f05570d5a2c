//! Bar charts drawn from numeric tables and lists in the report.

use std::sync::LazyLock;

use image::{DynamicImage, Rgb, RgbImage};
use regex::Regex;

use crate::images::{encode_jpeg, Placement};
use crate::report::blocks::{parse_blocks, Block};
use crate::report::labels::labels;
use crate::report::theme;
use crate::report::Figure;
use crate::sanitize::truncate_chars;
use crate::worker::Locale;

static RE_LIST_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-*]\s+(.+?):\s*[R$]*\s*(-?[\d.,]+)\s*(%)?").unwrap()
});
static RE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d[\d.,]*").unwrap());
static RE_HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{1,6}\s+(.+)$").unwrap());

pub const MAX_CHARTS: usize = 4;
const MIN_POINTS: usize = 2;
const MAX_POINTS: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    pub title: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub percent: bool,
}

/// Reads `1.234,56`, `1,234.56`, `12,5` and `40` alike.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim().trim_end_matches(['.', ',']);
    if s.is_empty() {
        return None;
    }
    let normalized = match (s.rfind('.'), s.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (None, Some(comma)) => {
            let decimals = s.len() - comma - 1;
            if s.matches(',').count() == 1 && decimals != 3 {
                s.replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
        (Some(_), None) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s.to_string(),
    };
    normalized.parse().ok()
}

fn cell_number(cell: &str) -> Option<f64> {
    RE_NUMBER.find(cell).and_then(|m| parse_number(m.as_str()))
}

fn from_tables(markdown: &str) -> Vec<ChartData> {
    parse_blocks(markdown)
        .into_iter()
        .filter_map(|block| match block {
            Block::Table { header, rows } if header.len() >= 2 => {
                let points: Vec<(String, f64)> = rows
                    .iter()
                    .filter(|row| row.len() >= 2)
                    .filter_map(|row| Some((row[0].trim().to_string(), cell_number(&row[1])?)))
                    .filter(|(label, _)| !label.is_empty())
                    .take(MAX_POINTS)
                    .collect();
                if points.len() < MIN_POINTS {
                    return None;
                }
                let percent = header[1].contains('%') || rows.iter().any(|r| r[1].contains('%'));
                let (labels, values) = points.into_iter().unzip();
                Some(ChartData {
                    title: header[1].trim().to_string(),
                    labels,
                    values,
                    percent,
                })
            }
            _ => None,
        })
        .collect()
}

fn from_lists(markdown: &str) -> Vec<ChartData> {
    let mut charts = Vec::new();
    let mut heading = String::new();
    let mut run: Vec<(String, f64, bool)> = Vec::new();

    let mut close_run = |run: &mut Vec<(String, f64, bool)>, heading: &str| {
        if run.len() >= MIN_POINTS {
            let percent = run.iter().all(|(_, _, p)| *p);
            let (labels, values) = run
                .drain(..)
                .take(MAX_POINTS)
                .map(|(label, value, _)| (label, value))
                .unzip();
            charts.push(ChartData {
                title: heading.to_string(),
                labels,
                values,
                percent,
            });
        }
        run.clear();
    };

    for line in markdown.lines() {
        if let Some(captures) = RE_LIST_VALUE.captures(line) {
            if let Some(value) = parse_number(&captures[2]) {
                let label = captures[1].replace("**", "").trim().to_string();
                run.push((label, value, captures.get(3).is_some()));
                continue;
            }
        }
        close_run(&mut run, &heading);
        if let Some(captures) = RE_HEADING.captures(line) {
            heading = captures[1].replace("**", "").trim().to_string();
        }
    }
    close_run(&mut run, &heading);
    charts
}

/// Numeric datasets in the markdown: tables first, then lists.
pub fn find_datasets(markdown: &str) -> Vec<ChartData> {
    let mut datasets = from_tables(markdown);
    datasets.extend(from_lists(markdown));
    datasets.truncate(MAX_CHARTS);
    datasets
}

fn format_value(value: f64, percent: bool) -> String {
    let text = if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.1}", value)
    };
    if percent {
        format!("{}%", text)
    } else {
        text
    }
}

pub fn caption(chart: &ChartData, locale: Locale) -> String {
    let title = if chart.title.is_empty() {
        let l = labels(locale);
        if chart.percent {
            l.chart_distribution
        } else {
            l.chart_comparison
        }
    } else {
        chart.title.as_str()
    };
    let values = chart
        .labels
        .iter()
        .zip(&chart.values)
        .map(|(label, value)| {
            format!("{} {}", truncate_chars(label, 40), format_value(*value, chart.percent))
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{}: {}", title, values)
}

/// Horizontal bars, the largest value in navy.
pub fn render_bars(chart: &ChartData) -> RgbImage {
    const WIDTH: u32 = 1000;
    const PAD: u32 = 40;
    const BAR: u32 = 36;
    const GAP: u32 = 16;

    let n = chart.values.len() as u32;
    let height = PAD * 2 + n * (BAR + GAP);
    let mut img = RgbImage::from_pixel(WIDTH, height, Rgb(theme::WHITE));

    let max = chart.values.iter().cloned().fold(0.0f64, f64::max);
    let span = (WIDTH - PAD * 2) as f64;
    let max_index = chart
        .values
        .iter()
        .enumerate()
        .fold(0, |best, (i, v)| if *v > chart.values[best] { i } else { best });

    for y in PAD / 2..height - PAD / 2 {
        img.put_pixel(PAD - 2, y, Rgb(theme::BORDER));
        img.put_pixel(PAD - 1, y, Rgb(theme::BORDER));
    }

    for (i, value) in chart.values.iter().enumerate() {
        let length = if max > 0.0 {
            ((value.max(0.0) / max) * span).round() as u32
        } else {
            0
        };
        let color = if i == max_index {
            theme::NAVY
        } else {
            theme::BAR
        };
        let top = PAD + i as u32 * (BAR + GAP);
        for y in top..top + BAR {
            for x in PAD..PAD + length.max(2) {
                img.put_pixel(x, y, Rgb(color));
            }
        }
    }
    img
}

/// Chart figures for the report, at most [`MAX_CHARTS`].
pub fn detect_charts(markdown: &str, locale: Locale) -> Vec<Figure> {
    find_datasets(markdown)
        .into_iter()
        .filter_map(|chart| {
            let img = DynamicImage::ImageRgb8(render_bars(&chart));
            match encode_jpeg(&img) {
                Ok((jpeg, width, height)) => Some(Figure {
                    caption: caption(&chart, locale),
                    jpeg,
                    width,
                    height,
                    placement: Placement::Figures,
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "Chart rendering failed");
                    None
                }
            }
        })
        .collect()
}
