//! Fixed report wording per locale.

use crate::worker::{Domain, Locale, ReportStyle};

pub struct Labels {
    pub report: &'static str,
    pub contents: &'static str,
    pub page: &'static str,
    pub references: &'static str,
    pub visualizations: &'static str,
    pub domain: &'static str,
    pub style: &'static str,
    pub date: &'static str,
    pub generated_by: &'static str,
    pub summary_sheet: &'static str,
    pub references_sheet: &'static str,
    pub col_title: &'static str,
    pub col_url: &'static str,
    pub col_summary: &'static str,
    pub chart_comparison: &'static str,
    pub chart_distribution: &'static str,
    disclaimer: &'static str,
}

impl Labels {
    /// Closing notice, with `{brand}` filled in.
    pub fn disclaimer(&self, brand: &str) -> String {
        self.disclaimer.replace("{brand}", brand)
    }
}

static PT_BR: Labels = Labels {
    report: "Relatório de Análise",
    contents: "Sumário",
    page: "Página",
    references: "Referências",
    visualizations: "Visualizações",
    domain: "Área",
    style: "Estilo",
    date: "Data",
    generated_by: "Gerado por",
    summary_sheet: "Relatório",
    references_sheet: "Referências",
    col_title: "Título",
    col_url: "URL",
    col_summary: "Resumo",
    chart_comparison: "Comparativo",
    chart_distribution: "Distribuição",
    disclaimer: "Este relatório foi gerado automaticamente por {brand} com apoio de \
                 inteligência artificial. As informações devem ser verificadas por um \
                 profissional antes de qualquer decisão.",
};

static EN: Labels = Labels {
    report: "Analysis Report",
    contents: "Contents",
    page: "Page",
    references: "References",
    visualizations: "Visualizations",
    domain: "Domain",
    style: "Style",
    date: "Date",
    generated_by: "Generated by",
    summary_sheet: "Report",
    references_sheet: "References",
    col_title: "Title",
    col_url: "URL",
    col_summary: "Summary",
    chart_comparison: "Comparison",
    chart_distribution: "Distribution",
    disclaimer: "This report was generated automatically by {brand} with the help of \
                 artificial intelligence. Verify the information with a qualified \
                 professional before making any decision.",
};

static ES: Labels = Labels {
    report: "Informe de Análisis",
    contents: "Índice",
    page: "Página",
    references: "Referencias",
    visualizations: "Visualizaciones",
    domain: "Área",
    style: "Estilo",
    date: "Fecha",
    generated_by: "Generado por",
    summary_sheet: "Informe",
    references_sheet: "Referencias",
    col_title: "Título",
    col_url: "URL",
    col_summary: "Resumen",
    chart_comparison: "Comparativo",
    chart_distribution: "Distribución",
    disclaimer: "Este informe fue generado automáticamente por {brand} con apoyo de \
                 inteligencia artificial. Verifique la información con un profesional \
                 antes de tomar cualquier decisión.",
};

pub fn labels(locale: Locale) -> &'static Labels {
    match locale {
        Locale::PtBr => &PT_BR,
        Locale::En => &EN,
        Locale::Es => &ES,
    }
}

pub fn domain_name(domain: Domain, locale: Locale) -> &'static str {
    match (domain, locale) {
        (Domain::Finance, Locale::En) => "Finance",
        (Domain::Finance, _) => "Financeiro",
        (Domain::Legal, Locale::En) => "Legal",
        (Domain::Legal, Locale::Es) => "Jurídico",
        (Domain::Legal, _) => "Jurídico",
        (Domain::Health, Locale::En) => "Health",
        (Domain::Health, Locale::Es) => "Salud",
        (Domain::Health, _) => "Saúde",
        (Domain::Aesthetics, Locale::En) => "Aesthetics",
        (Domain::Aesthetics, _) => "Estética",
        (Domain::Education, Locale::En) => "Education",
        (Domain::Education, Locale::Es) => "Educación",
        (Domain::Education, _) => "Educação",
        (Domain::Technology, Locale::En) => "Technology",
        (Domain::Technology, Locale::Es) => "Tecnología",
        (Domain::Technology, _) => "Tecnologia",
        (Domain::Training, Locale::En) => "Training",
        (Domain::Training, Locale::Es) => "Capacitación",
        (Domain::Training, _) => "Treinamento",
        (Domain::Protocol, Locale::En) => "Protocol",
        (Domain::Protocol, Locale::Es) => "Protocolo",
        (Domain::Protocol, _) => "Protocolo",
        (Domain::Marketing, _) => "Marketing",
        (Domain::Engineering, Locale::En) => "Engineering",
        (Domain::Engineering, Locale::Es) => "Ingeniería",
        (Domain::Engineering, _) => "Engenharia",
        (Domain::Other, Locale::En) => "General",
        (Domain::Other, _) => "Geral",
    }
}

pub fn style_name(style: ReportStyle, locale: Locale) -> &'static str {
    match (style, locale) {
        (ReportStyle::Analytical, Locale::En) => "Analytical",
        (ReportStyle::Analytical, Locale::Es) => "Analítico",
        (ReportStyle::Analytical, _) => "Analítico",
        (ReportStyle::Comparative, Locale::En) => "Comparative",
        (ReportStyle::Comparative, _) => "Comparativo",
        (ReportStyle::ExecutiveSummary, Locale::En) => "Executive Summary",
        (ReportStyle::ExecutiveSummary, Locale::Es) => "Resumen Ejecutivo",
        (ReportStyle::ExecutiveSummary, _) => "Resumo Executivo",
        (ReportStyle::Technical, Locale::En) => "Technical",
        (ReportStyle::Technical, Locale::Es) => "Técnico",
        (ReportStyle::Technical, _) => "Técnico",
        (ReportStyle::Opinion, Locale::En) => "Expert Opinion",
        (ReportStyle::Opinion, Locale::Es) => "Dictamen",
        (ReportStyle::Opinion, _) => "Parecer",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disclaimer_mentions_brand() {
        assert!(labels(Locale::En).disclaimer("Acme").contains("by Acme"));
        assert!(labels(Locale::PtBr).disclaimer("Acme").contains("por Acme"));
    }

    #[test]
    fn test_names_are_localized() {
        assert_eq!(domain_name(Domain::Health, Locale::PtBr), "Saúde");
        assert_eq!(domain_name(Domain::Health, Locale::Es), "Salud");
        assert_eq!(style_name(ReportStyle::Opinion, Locale::En), "Expert Opinion");
    }
}
