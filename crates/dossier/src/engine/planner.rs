//! Local research planner.
//!
//! Turns the objective and document into focus topics, picks research
//! angles from keyword triggers and the domain, and renders an action plan
//! that is injected into the engine prompt. Deterministic, no model calls.

use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use serde::Serialize;

use crate::sanitize::truncate_chars;
use crate::worker::{AnalysisMode, Domain, JobConfig};

const MAX_TOPICS: usize = 5;
const MAX_KEY_PHRASES: usize = 5;
const OBJECTIVE_TOPIC_CHARS: usize = 150;
const SCAN_CHARS: usize = 3000;

static RE_KEY_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b[A-ZÁÀÂÃÉÈÊÍÏÓÔÕÚÜÇ][a-záàâãéèêíïóôõúüç]+(?:\s+[A-ZÁÀÂÃÉÈÊÍÏÓÔÕÚÜÇ][a-záàâãéèêíïóôõúüç]+){1,4}\b",
    )
    .unwrap()
});
static RE_US_TICKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$([A-Z]{2,5})\b").unwrap());
static RE_BR_TICKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{4}[0-9]{1,2})\b").unwrap());

const FINANCE_TRIGGERS: &[&str] = &[
    "custo", "investimento", "roi", "receita", "lucro", "ações", "bolsa", "faturamento",
    "preço", "cotação", "capital", "dividendo", "balanço", "valuation", "budget", "orçamento",
    "margem", "ebitda", "fluxo de caixa", "câmbio", "dólar", "selic", "inflação", "juros",
    "rentabilidade", "payback", "cdi", "ipca", "pib", "nasdaq", "ibovespa", "ticker",
    "revenue", "profit", "stock", "dividend", "cash flow", "interest rate", "inflation",
    "investment", "market cap",
];

const MEDICAL_TRIGGERS: &[&str] = &[
    "estudo clínico", "protocolo clínico", "tratamento", "paciente", "eficácia",
    "efeito colateral", "terapia", "diagnóstico", "suplemento", "colágeno", "botox", "laser",
    "microagulhamento", "dermato", "biomedicina", "fisiologia", "pele", "peeling",
    "bioestimulador", "preenchimento", "cicatrização", "vitamina", "hormônio", "metabolismo",
    "inflamação", "oncologia", "cardiologia", "clinical trial", "treatment", "patient",
    "therapy", "diagnosis", "side effect", "dermatology",
];

const ACADEMIC_TRIGGERS: &[&str] = &[
    "artigo", "paper", "pesquisa", "tese", "metodologia", "algoritmo", "machine learning",
    "inteligência artificial", "framework", "benchmark", "revisão bibliográfica",
    "estado da arte", "rede neural", "deep learning", "nlp", "computer vision", "blockchain",
    "robótica", "simulação", "otimização", "research", "algorithm", "neural network",
    "artificial intelligence", "state of the art",
];

/// A direction of research the engine is pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchAngle {
    Web,
    ClinicalLiterature,
    AcademicPapers,
    MarketData,
}

impl ResearchAngle {
    fn label(&self) -> &'static str {
        match self {
            ResearchAngle::Web => "Web search",
            ResearchAngle::ClinicalLiterature => "Clinical literature",
            ResearchAngle::AcademicPapers => "Academic papers",
            ResearchAngle::MarketData => "Market data",
        }
    }

    fn rationale(&self) -> &'static str {
        match self {
            ResearchAngle::Web => "Current data, market references and trends",
            ResearchAngle::ClinicalLiterature => "Peer-reviewed studies for clinical grounding",
            ResearchAngle::AcademicPapers => "Academic papers for technical grounding",
            ResearchAngle::MarketData => "Quotes, filings and financial indicators",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Strategy {
    pub angle: ResearchAngle,
    pub priority: u32,
    pub queries: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResearchPlan {
    pub focus_topics: Vec<String>,
    pub strategies: Vec<Strategy>,
    /// Markdown section for the user prompt; empty when there is nothing to plan.
    pub action_plan: String,
    /// Lines for the job's processing log.
    pub log_lines: Vec<String>,
}

fn domain_context(domain: Domain) -> &'static str {
    match domain {
        Domain::Finance => "financial markets investment",
        Domain::Legal => "law regulation compliance",
        Domain::Health => "healthcare medicine clinical protocols",
        Domain::Aesthetics => "aesthetics cosmetic dermatology",
        Domain::Education => "education learning pedagogy",
        Domain::Technology => "technology software systems",
        Domain::Training => "fitness training performance",
        Domain::Protocol => "clinical protocol procedure",
        Domain::Marketing => "digital marketing sales",
        Domain::Engineering => "engineering design construction",
        Domain::Other => "",
    }
}

fn detect<'a>(text: &str, triggers: &[&'a str]) -> Vec<&'a str> {
    let lower = text.to_lowercase();
    let mut hits: Vec<&str> = triggers
        .iter()
        .copied()
        .filter(|t| lower.contains(t))
        .collect();
    hits.sort_by_key(|t| std::cmp::Reverse(t.len()));
    hits
}

/// Capitalized multi-word phrases (names, techniques, brands).
pub fn key_phrases(text: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for m in RE_KEY_PHRASE.find_iter(truncate_chars(text, SCAN_CHARS)) {
        let phrase = m.as_str();
        if phrase.chars().count() > 5 && seen.insert(phrase.to_lowercase()) {
            phrases.push(phrase.to_string());
            if phrases.len() >= MAX_KEY_PHRASES {
                break;
            }
        }
    }
    phrases
}

pub fn focus_topics(objective: &str, text: &str, domain: Domain) -> Vec<String> {
    let objective = objective.trim();
    let mut topics = Vec::new();
    if !objective.is_empty() {
        topics.push(truncate_chars(objective, OBJECTIVE_TOPIC_CHARS).to_string());
    }

    let objective_lower = objective.to_lowercase();
    for phrase in key_phrases(text) {
        if topics.len() >= 4 {
            break;
        }
        if !objective_lower.contains(&phrase.to_lowercase()) {
            topics.push(phrase);
        }
    }

    let context = domain_context(domain);
    if topics.len() < 2 && !context.is_empty() {
        topics.push(
            format!("{} {}", truncate_chars(objective, 60), context)
                .trim()
                .to_string(),
        );
    }

    topics.truncate(MAX_TOPICS);
    topics
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn web_queries(topics: &[String], domain: Domain, geography: &str) -> Vec<String> {
    let context = domain_context(domain);
    let geography = if geography.trim().is_empty() {
        "global"
    } else {
        geography.trim()
    };
    let year = chrono::Utc::now().year();

    let mut queries = Vec::new();
    for topic in topics.iter().take(3) {
        let contextual = collapse_spaces(&format!("{} {} {}", topic, context, year));
        queries.push(truncate_chars(&contextual, 200).to_string());
        let regional = format!("{} {} trends current data", topic, geography);
        queries.push(truncate_chars(&regional, 200).to_string());
    }
    queries.truncate(6);
    queries
}

fn literature_queries(topics: &[String], domain: Domain, suffix: &str) -> Vec<String> {
    let context = domain_context(domain);
    topics
        .iter()
        .take(2)
        .map(|topic| {
            let q = collapse_spaces(&format!("{} {} {}", topic, context, suffix));
            truncate_chars(&q, 150).to_string()
        })
        .collect()
}

fn market_queries(topics: &[String], text: &str) -> Vec<String> {
    let haystack = format!("{} {}", topics.join(" "), truncate_chars(text, 2000));
    let mut queries: Vec<String> = RE_US_TICKER
        .captures_iter(&haystack)
        .chain(RE_BR_TICKER.captures_iter(&haystack))
        .map(|c| c[1].to_string())
        .collect();
    queries.dedup();

    if queries.is_empty() {
        queries = topics
            .iter()
            .take(2)
            .map(|t| format!("{} stock market", t))
            .collect();
    }
    queries.truncate(5);
    queries
}

/// Builds the research plan for one job.
pub fn plan_research(
    mode: AnalysisMode,
    config: &JobConfig,
    document_text: &str,
    search_granted: bool,
) -> ResearchPlan {
    let mut plan = ResearchPlan {
        focus_topics: focus_topics(&config.objective, document_text, config.domain),
        ..ResearchPlan::default()
    };
    let preview: Vec<&str> = plan
        .focus_topics
        .iter()
        .map(|t| truncate_chars(t, 60))
        .collect();
    plan.log_lines
        .push(format!("[Planner] Topics: {}", preview.join(" | ")));

    let scan = format!(
        "{} {}",
        config.objective,
        truncate_chars(document_text, SCAN_CHARS)
    );
    let finance = detect(&scan, FINANCE_TRIGGERS);
    let medical = detect(&scan, MEDICAL_TRIGGERS);
    let academic = detect(&scan, ACADEMIC_TRIGGERS);

    for (hits, angle) in [
        (&finance, ResearchAngle::MarketData),
        (&medical, ResearchAngle::ClinicalLiterature),
        (&academic, ResearchAngle::AcademicPapers),
    ] {
        if !hits.is_empty() {
            let shown: Vec<&str> = hits.iter().take(3).copied().collect();
            plan.log_lines.push(format!(
                "[Planner] {} triggered by: {}",
                angle.label(),
                shown.join(", ")
            ));
        }
    }

    let wants_market = !finance.is_empty() || config.domain == Domain::Finance;
    let wants_clinical = !medical.is_empty()
        || matches!(
            config.domain,
            Domain::Health | Domain::Aesthetics | Domain::Training | Domain::Protocol
        );
    let wants_academic = !academic.is_empty()
        || matches!(
            config.domain,
            Domain::Technology | Domain::Engineering | Domain::Education
        );

    let mut priority = 1;
    let mut push = |plan: &mut ResearchPlan, angle, queries| {
        plan.strategies.push(Strategy {
            angle,
            priority,
            queries,
        });
        priority += 1;
    };

    // Every angle is researched through the search capability, so nothing
    // is planned without it.
    if search_granted || mode == AnalysisMode::FreeForm {
        let web = web_queries(&plan.focus_topics, config.domain, &config.geography);
        push(&mut plan, ResearchAngle::Web, web);
        if wants_clinical {
            let q = literature_queries(&plan.focus_topics, config.domain, "clinical study");
            push(&mut plan, ResearchAngle::ClinicalLiterature, q);
        }
        if wants_academic {
            let q = literature_queries(&plan.focus_topics, config.domain, "research");
            push(&mut plan, ResearchAngle::AcademicPapers, q);
        }
        if wants_market {
            let q = market_queries(&plan.focus_topics, document_text);
            push(&mut plan, ResearchAngle::MarketData, q);
        }
    }

    plan.action_plan = render_action_plan(&plan, config.source_count);
    tracing::info!(
        strategies = plan.strategies.len(),
        topics = plan.focus_topics.len(),
        "Research plan ready"
    );
    plan
}

fn render_action_plan(plan: &ResearchPlan, source_count: u32) -> String {
    if plan.strategies.is_empty() {
        return String::new();
    }

    let topics: Vec<&str> = plan
        .focus_topics
        .iter()
        .take(3)
        .map(|t| truncate_chars(t, 60))
        .collect();

    let mut lines = vec![
        "## ACTION PLAN".to_string(),
        String::new(),
        format!("**Target:** {} distinct sources", source_count),
        format!("**Focus topics:** {}", topics.join(", ")),
        String::new(),
    ];

    for strategy in &plan.strategies {
        lines.push(format!(
            "### PRIORITY {}: {}",
            strategy.priority,
            strategy.angle.label()
        ));
        lines.push(format!("*{}*", strategy.angle.rationale()));
        if !strategy.queries.is_empty() {
            lines.push("**Suggested queries:**".to_string());
            for (i, q) in strategy.queries.iter().enumerate() {
                lines.push(format!("{}. \"{}\"", i + 1, truncate_chars(q, 120)));
            }
        }
        lines.push(String::new());
    }

    lines.push(
        "**Execution:**\n\
         - Search in priority order\n\
         - Use the suggested queries as a starting point and refine them\n\
         - Stop searching once the source target is reached"
            .to_string(),
    );
    lines.join("\n")
}
