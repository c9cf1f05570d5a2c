//! Instruction sets for the analysis engine.

use crate::engine::planner::ResearchPlan;
use crate::sanitize::truncate_chars;
use crate::worker::{AnalysisMode, JobConfig, Locale, ReportStyle};

pub const DOCUMENT_PROMPT_CHARS: usize = 8_000;
pub const ENHANCEMENT_PROMPT_CHARS: usize = 10_000;
pub const TRUNCATION_MARKER: &str = "[... truncated ...]";

/// Sources requested per search round.
pub const MAX_SOURCES_PER_ROUND: u32 = 5;

fn locale_instruction(locale: Locale) -> &'static str {
    match locale {
        Locale::PtBr => {
            "Write the ENTIRE report in Brazilian Portuguese, using Brazilian professional terminology."
        }
        Locale::En => "Write the ENTIRE report in English, using professional business terminology.",
        Locale::Es => "Write the ENTIRE report in Spanish, using professional terminology.",
    }
}

fn style_section(style: ReportStyle) -> &'static str {
    match style {
        ReportStyle::Analytical => {
            "## REPORT TYPE: ANALYTICAL\n\n\
             ### 1. Executive summary\n\
             ### 2. Detailed analysis (patterns, strengths, weaknesses, quantitative data)\n\
             ### 3. Market references (benchmarks and current trends, with links)\n\
             ### 4. Conclusions and recommendations\n\
             ### 5. References"
        }
        ReportStyle::Comparative => {
            "## REPORT TYPE: COMPARATIVE\n\n\
             ### 1. Executive summary (context and main differences)\n\
             ### 2. Document analysis\n\
             ### 3. Market benchmarking (comparison table, gaps against best practice)\n\
             ### 4. SWOT analysis\n\
             ### 5. Recommendations\n\
             ### 6. References"
        }
        ReportStyle::ExecutiveSummary => {
            "## REPORT TYPE: EXECUTIVE SUMMARY\n\n\
             ### 1. Overview (at most 3 paragraphs)\n\
             ### 2. Key points (5 to 10 bullets)\n\
             ### 3. Implications\n\
             ### 4. Recommended actions (3 to 5)\n\
             ### 5. References"
        }
        ReportStyle::Technical => {
            "## REPORT TYPE: TECHNICAL\n\n\
             ### 1. Introduction (scope and method)\n\
             ### 2. Detailed technical analysis (specifications, parameters, standards)\n\
             ### 3. Data and metrics (tables where available)\n\
             ### 4. Technical assessment\n\
             ### 5. Technical recommendations\n\
             ### 6. References and standards"
        }
        ReportStyle::Opinion => {
            "## REPORT TYPE: PROFESSIONAL OPINION\n\n\
             ### 1. Identification (subject and purpose)\n\
             ### 2. Grounds (legal, technical or regulatory basis)\n\
             ### 3. Analysis\n\
             ### 4. Opinion\n\
             ### 5. Recommendations\n\
             ### 6. References"
        }
    }
}

fn mode_section(mode: AnalysisMode) -> &'static str {
    match mode {
        AnalysisMode::Document => "",
        AnalysisMode::MultiDocument => {
            "## MODE: MULTI-DOCUMENT\n\
             You will receive several documents separated by `=== DOCUMENT n: name ===` markers.\n\
             - Analyse all documents together\n\
             - Identify connections and divergences between them\n\
             - Compare figures across documents and synthesize conclusions for the whole set"
        }
        AnalysisMode::Enhancement => {
            "## MODE: ENHANCEMENT\n\
             The user wants an IMPROVED version of the attached document.\n\
             - Keep its purpose and essence\n\
             - Rewrite and improve all of the content\n\
             - Enrich it with researched data, tables and missing sections"
        }
        AnalysisMode::FreeForm => {
            "## MODE: FREE RESEARCH (NO DOCUMENT)\n\
             There is no user document. Research the topic, gather data from several \
             reliable sources and produce a complete report with cited links."
        }
    }
}

/// System prompt for one job. `search_granted` decides whether the
/// research section is included.
pub fn system_prompt(
    mode: AnalysisMode,
    config: &JobConfig,
    search_granted: bool,
    brand: &str,
) -> String {
    let mut sections = vec![
        format!(
            "# {} analysis agent\n\nYou are a professional analyst producing a structured report in Markdown.",
            brand
        ),
        format!("## LANGUAGE\n{}", locale_instruction(config.locale)),
        format!("## DOMAIN: {}", domain_label(config)),
    ];

    let mode_text = mode_section(mode);
    if !mode_text.is_empty() {
        sections.push(mode_text.to_string());
    }
    sections.push(style_section(config.report_style).to_string());

    if search_granted {
        let region = if config.geography.trim().is_empty() {
            "- Prefer global references".to_string()
        } else {
            format!("- Focus on references from: {}", config.geography.trim())
        };
        sections.push(format!(
            "## RESEARCH\n\
             A `web_search` tool is available. Use it to find current market references, \
             industry benchmarks and recent data.\n{}\n\n\
             **Target: at least {} distinct sources.** Each reference needs a title, a URL \
             and a short summary of why it matters.",
            region, config.source_count
        ));
    }

    if config.include_images {
        sections.push(
            "## IMAGES\n\
             Illustrations will be added automatically. Use clear `##` section headings \
             so they can be placed next to the right content."
                .to_string(),
        );
    }

    sections.push(
        "## FORMAT\n\
         Use Markdown headings (##, ###), **bold**, numbered lists, links [title](URL) and \
         separators (---).\n\
         Include tables with numeric data where possible (| Indicator | Value | Change |) and \
         quantified bullets such as `- Net revenue: 12.3%`; they are turned into charts."
            .to_string(),
    );
    sections.push(format!(
        "## QUALITY\n\
         - Be precise and factual; never invent data\n\
         - Cite sources as [title](URL)\n\
         - If the document was truncated, say so\n\
         - **Source target: {} distinct references**",
        config.source_count
    ));

    sections.join("\n\n")
}

fn domain_label(config: &JobConfig) -> String {
    if config.domain_detail.trim().is_empty() {
        config.domain.as_str().to_string()
    } else {
        config.domain_detail.trim().to_string()
    }
}

/// Cuts document text for the prompt, appending the truncation marker when
/// anything was dropped.
pub fn truncate_document(text: &str, max_chars: usize) -> String {
    let kept = truncate_chars(text, max_chars);
    if kept.len() < text.len() {
        format!("{}\n{}", kept, TRUNCATION_MARKER)
    } else {
        kept.to_string()
    }
}

/// User prompt carrying the document, the job parameters and the plan.
pub fn user_prompt(
    mode: AnalysisMode,
    config: &JobConfig,
    document_text: &str,
    plan: Option<&ResearchPlan>,
) -> String {
    let per_round = config.source_count.min(MAX_SOURCES_PER_ROUND);
    let region = if config.geography.trim().is_empty() {
        "Global"
    } else {
        config.geography.trim()
    };

    let mut prompt = String::new();
    match mode {
        AnalysisMode::FreeForm => {
            prompt.push_str("## FREE RESEARCH\n\n");
            prompt.push_str(&format!("**Objective:** {}\n\n", config.objective));
        }
        AnalysisMode::Enhancement => {
            prompt.push_str("## DOCUMENT TO ENHANCE\n\n");
            prompt.push_str(&truncate_document(document_text, ENHANCEMENT_PROMPT_CHARS));
            prompt.push_str("\n\n---\n\n");
            prompt.push_str(&format!("**Instructions:** {}\n", config.objective));
        }
        AnalysisMode::Document | AnalysisMode::MultiDocument => {
            prompt.push_str(if mode == AnalysisMode::MultiDocument {
                "## DOCUMENTS\n\n"
            } else {
                "## DOCUMENT\n\n"
            });
            prompt.push_str(&truncate_document(document_text, DOCUMENT_PROMPT_CHARS));
            prompt.push_str("\n\n---\n\n");
            prompt.push_str(&format!("**Objective:** {}\n", config.objective));
        }
    }

    prompt.push_str(&format!("**Domain:** {}\n", domain_label(config)));
    prompt.push_str(&format!("**Report style:** {}\n", config.report_style));
    prompt.push_str(&format!("**Region:** {}\n", region));
    prompt.push_str(&format!(
        "**Sources:** {} per search round, {} overall\n\n",
        per_round, config.source_count
    ));

    if !config.search_scope.trim().is_empty() {
        prompt.push_str(&format!("**Scope:** {}\n\n", config.search_scope.trim()));
    }

    if let Some(plan) = plan {
        if !plan.action_plan.is_empty() {
            prompt.push_str(&format!("---\n\n{}\n\n---\n\n", plan.action_plan));
        }
    }

    prompt.push_str(match mode {
        AnalysisMode::FreeForm => {
            "There is no document. Execute the plan quickly: run 3 or 4 focused searches and write the complete report."
        }
        AnalysisMode::Enhancement => {
            "Enhance the document: run 2 or 3 focused searches to enrich it, improve its structure and deliver a premium version."
        }
        AnalysisMode::MultiDocument => {
            "Several documents: produce an integrated cross-analysis and the complete report."
        }
        AnalysisMode::Document => {
            "Analyse the document and write the complete report. Prefer quality over the number of searches."
        }
    });

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::Domain;

    fn config() -> JobConfig {
        JobConfig {
            objective: "Assess the supplier contract".to_string(),
            domain: Domain::Legal,
            source_count: 8,
            ..JobConfig::default()
        }
    }

    #[test]
    fn test_truncate_document_marker() {
        let long = "a".repeat(DOCUMENT_PROMPT_CHARS + 10);
        let cut = truncate_document(&long, DOCUMENT_PROMPT_CHARS);
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(truncate_document("short", DOCUMENT_PROMPT_CHARS), "short");
    }

    #[test]
    fn test_enhancement_keeps_more_text() {
        let text = "b".repeat(9_000);
        let prompt = user_prompt(AnalysisMode::Enhancement, &config(), &text, None);
        assert!(!prompt.contains(TRUNCATION_MARKER));

        let prompt = user_prompt(AnalysisMode::Document, &config(), &text, None);
        assert!(prompt.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn test_source_counts_in_prompt() {
        let prompt = user_prompt(AnalysisMode::Document, &config(), "body", None);
        assert!(prompt.contains("5 per search round, 8 overall"));
    }

    #[test]
    fn test_research_section_only_when_granted() {
        let with = system_prompt(AnalysisMode::Document, &config(), true, "Dossier");
        let without = system_prompt(AnalysisMode::Document, &config(), false, "Dossier");
        assert!(with.contains("web_search"));
        assert!(!without.contains("web_search"));
    }

    #[test]
    fn test_locale_and_style_sections() {
        let mut cfg = config();
        cfg.locale = Locale::Es;
        cfg.report_style = ReportStyle::Opinion;
        cfg.include_images = true;
        let prompt = system_prompt(AnalysisMode::MultiDocument, &cfg, false, "Dossier");
        assert!(prompt.contains("Spanish"));
        assert!(prompt.contains("PROFESSIONAL OPINION"));
        assert!(prompt.contains("MULTI-DOCUMENT"));
        assert!(prompt.contains("## IMAGES"));
    }

    #[test]
    fn test_free_form_has_no_document_section() {
        let mut cfg = config();
        cfg.search_scope = "residential only".to_string();
        let prompt = user_prompt(AnalysisMode::FreeForm, &cfg, "", None);
        assert!(prompt.starts_with("## FREE RESEARCH"));
        assert!(!prompt.contains("## DOCUMENT"));
        assert!(prompt.contains("**Scope:** residential only"));
    }
}
