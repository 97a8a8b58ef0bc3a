//! Deterministic field extraction from the OCR list. Label keywords score
//! candidates; confidence breaks ties. The installment pair only ever comes
//! from here; the LLM is not trusted with it.

use std::cmp::Ordering;
use std::sync::LazyLock;

use refino_core::{LoanAnalysis, OcrField};
use regex::Regex;

// Brazilian money first (1.234,56 / 630,62), plain decimal as fallback.
static BRL_AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:\.\d{3})*,\d{2}|\d+,\d{2}").unwrap());
static PLAIN_AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.\d{2}").unwrap());

// n/m pairs: slash, hyphen, or the fullwidth solidus OCR sometimes emits.
static INSTALLMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3})\s*[/\-／]\s*(\d{1,3})").unwrap());

static COMPANY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(Banco|BV|Votorantim)\b").unwrap());

const MAX_INSTALLMENTS: i32 = 240;

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_label(label: &str) -> String {
    label.to_uppercase().replace('\n', " ")
}

/// First match that is not glued to surrounding digits (the regex crate has
/// no look-around, so the adjacency check is done by hand).
fn find_isolated<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.find_iter(text)
        .find(|m| {
            let before = text[..m.start()].chars().next_back();
            let after = text[m.end()..].chars().next();
            before.is_none_or(|c| !c.is_ascii_digit()) && after.is_none_or(|c| !c.is_ascii_digit())
        })
        .map(|m| m.as_str())
}

/// Extracts a monetary value: Brazilian format wins, `1234.56` is the
/// fallback.
pub fn parse_brl_amount(text: &str) -> Option<f64> {
    let t = normalize_whitespace(text);

    if let Some(m) = find_isolated(&BRL_AMOUNT_RE, &t) {
        let normalized = m.replace('.', "").replace(',', ".");
        if let Ok(value) = normalized.parse::<f64>() {
            return Some(value);
        }
    }

    if let Some(m) = find_isolated(&PLAIN_AMOUNT_RE, &t)
        && let Ok(value) = m.parse::<f64>()
    {
        return Some(value);
    }

    None
}

fn amount_label_score(label: &str) -> i32 {
    let l = normalize_label(label);
    let mut score = 0;
    if l.contains("VALOR DO DOCUMENTO") || l.contains("DOCUMENTO VALOR DO") || l.contains("VALOR DO")
    {
        score += 4;
    }
    if l.contains("VALOR PARCELA") || l.contains("VALOR DA PARCELA") {
        score += 3;
    }
    if l.contains("VALOR") {
        score += 2;
    }
    if l.contains("DOCUMENTO") {
        score += 1;
    }
    score
}

fn installment_label_score(label: &str) -> i32 {
    let l = normalize_label(label);
    let mut score = 0;
    if l.contains("PLANO") {
        score += 3;
    }
    if l.contains("PARCELA") {
        score += 2;
    }
    if l.contains("VENCIMENTO") {
        score -= 2;
    }
    score
}

fn by_score_then_conf(a: &(i32, f64), b: &(i32, f64)) -> Ordering {
    b.0.cmp(&a.0)
        .then(b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal))
}

/// Installment amount: strongly-labeled candidates first, then any field
/// with a monetary pattern, highest confidence wins.
pub fn find_amount(fields: &[OcrField]) -> Option<f64> {
    let mut scored: Vec<(i32, f64, f64)> = fields
        .iter()
        .filter_map(|field| {
            let label = field.label_text.as_deref().unwrap_or("");
            let score = amount_label_score(label);
            if score <= 0 {
                return None;
            }
            let amount = parse_brl_amount(field.value_text.as_deref()?)?;
            Some((score, field.value_conf.unwrap_or(0.0), amount))
        })
        .collect();

    if !scored.is_empty() {
        scored.sort_by(|a, b| by_score_then_conf(&(a.0, a.1), &(b.0, b.1)));
        return Some(scored[0].2);
    }

    let mut sweep: Vec<(f64, f64)> = fields
        .iter()
        .filter_map(|field| {
            let amount = parse_brl_amount(field.value_text.as_deref()?)?;
            Some((field.value_conf.unwrap_or(0.0), amount))
        })
        .collect();
    sweep.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    sweep.first().map(|&(_, amount)| amount)
}

fn installment_pair(value: &str) -> Option<(i32, i32)> {
    let caps = INSTALLMENT_RE.captures(value)?;
    let current: i32 = caps.get(1)?.as_str().parse().ok()?;
    let total: i32 = caps.get(2)?.as_str().parse().ok()?;
    (1 <= current && current <= total && total <= MAX_INSTALLMENTS).then_some((current, total))
}

/// `(current, total)`, only ever from an `n/m` pattern. Labels mentioning
/// the plan or installments are preferred; due-date fields are penalized
/// into the confidence fallback.
pub fn find_installments(fields: &[OcrField]) -> Option<(i32, i32)> {
    let mut scored: Vec<(i32, f64, (i32, i32))> = fields
        .iter()
        .filter_map(|field| {
            let pair = installment_pair(field.value_text.as_deref()?)?;
            let score = installment_label_score(field.label_text.as_deref().unwrap_or(""));
            (score > 0).then_some((score, field.value_conf.unwrap_or(0.0), pair))
        })
        .collect();

    if !scored.is_empty() {
        scored.sort_by(|a, b| by_score_then_conf(&(a.0, a.1), &(b.0, b.1)));
        return Some(scored[0].2);
    }

    let mut loose: Vec<(f64, (i32, i32))> = fields
        .iter()
        .filter_map(|field| {
            let pair = installment_pair(field.value_text.as_deref()?)?;
            Some((field.value_conf.unwrap_or(0.0), pair))
        })
        .collect();
    loose.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    loose.first().map(|&(_, pair)| pair)
}

/// Bank/company name: the highest-confidence value mentioning a known bank
/// keyword.
pub fn find_company(fields: &[OcrField]) -> Option<String> {
    let mut best: Option<(f64, String)> = None;
    for field in fields {
        let Some(value) = field.value_text.as_deref() else {
            continue;
        };
        let trimmed = value.trim();
        if trimmed.is_empty() || !COMPANY_RE.is_match(trimmed) {
            continue;
        }
        let conf = field.value_conf.unwrap_or(0.0);
        if best.as_ref().is_none_or(|(b, _)| conf > *b) {
            best = Some((conf, normalize_whitespace(trimmed)));
        }
    }
    best.map(|(_, name)| name)
}

/// The full deterministic pass. Anything unresolved stays null.
pub fn deterministic_analysis(fields: &[OcrField]) -> LoanAnalysis {
    let (current, total) = match find_installments(fields) {
        Some((current, total)) => (Some(current), Some(total)),
        None => (None, None),
    };
    LoanAnalysis {
        company: find_company(fields),
        installment_count: total,
        current_installment_number: current,
        installment_amount: find_amount(fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refino_core::FieldSource;

    fn field(label: Option<&str>, value: Option<&str>, conf: f64) -> OcrField {
        OcrField {
            source: FieldSource::Summary,
            label_text: label.map(str::to_string),
            label_conf: Some(conf),
            value_text: value.map(str::to_string),
            value_conf: Some(conf),
        }
    }

    #[test]
    fn brl_amount_prefers_brazilian_format() {
        assert_eq!(parse_brl_amount("630,62"), Some(630.62));
        assert_eq!(parse_brl_amount("R$ 1.234,56"), Some(1234.56));
        assert_eq!(parse_brl_amount("1234.56"), Some(1234.56));
        assert_eq!(parse_brl_amount("sem valor"), None);
    }

    #[test]
    fn brl_amount_ignores_digit_glued_matches() {
        // 1630,62 must not yield 630,62.
        assert_eq!(parse_brl_amount("11630,621"), None);
        assert_eq!(parse_brl_amount("total 630,62 hoje"), Some(630.62));
    }

    #[test]
    fn amount_follows_label_scores() {
        let fields = vec![
            field(Some("JUROS"), Some("10,00"), 99.0),
            field(Some("VALOR DO DOCUMENTO"), Some("630,62"), 80.0),
            field(Some("VALOR"), Some("500,00"), 95.0),
        ];
        assert_eq!(find_amount(&fields), Some(630.62));
    }

    #[test]
    fn amount_ties_break_on_confidence() {
        let fields = vec![
            field(Some("VALOR"), Some("100,00"), 60.0),
            field(Some("VALOR"), Some("200,00"), 90.0),
        ];
        assert_eq!(find_amount(&fields), Some(200.0));
    }

    #[test]
    fn amount_sweeps_unlabeled_fields_when_nothing_scores() {
        let fields = vec![
            field(None, Some("99,90"), 40.0),
            field(Some("TOTAL GERAL"), Some("150,00"), 70.0),
        ];
        assert_eq!(find_amount(&fields), Some(150.0));
    }

    #[test]
    fn installments_only_come_from_pair_patterns() {
        let fields = vec![
            field(Some("PLANO"), Some("12/60"), 90.0),
            field(Some("VALOR"), Some("630,62"), 99.0),
        ];
        assert_eq!(find_installments(&fields), Some((12, 60)));
    }

    #[test]
    fn installments_accept_alternate_separators() {
        assert_eq!(installment_pair("3-48"), Some((3, 48)));
        assert_eq!(installment_pair("7 ／ 24"), Some((7, 24)));
        assert_eq!(installment_pair("12 / 60"), Some((12, 60)));
    }

    #[test]
    fn installments_reject_invalid_ranges() {
        assert_eq!(installment_pair("0/12"), None);
        assert_eq!(installment_pair("13/12"), None);
        assert_eq!(installment_pair("1/241"), None);
        assert_eq!(installment_pair("240/240"), Some((240, 240)));
    }

    #[test]
    fn due_date_labels_lose_to_plan_labels() {
        let fields = vec![
            field(Some("VENCIMENTO"), Some("10/2025"), 99.0),
            field(Some("PLANO"), Some("12/60"), 50.0),
        ];
        assert_eq!(find_installments(&fields), Some((12, 60)));
    }

    #[test]
    fn penalized_labels_fall_back_to_confidence_sweep() {
        let fields = vec![
            field(Some("VENCIMENTO"), Some("10/12"), 99.0),
            field(Some("VENCIMENTO"), Some("11/12"), 80.0),
        ];
        // No positive score anywhere: highest-confidence valid pair wins.
        assert_eq!(find_installments(&fields), Some((10, 12)));
    }

    #[test]
    fn company_picks_highest_confidence_bank_mention() {
        let fields = vec![
            field(None, Some("Banco Votorantim S.A."), 88.0),
            field(None, Some("BV Financeira"), 95.0),
            field(None, Some("Padaria do João"), 99.0),
        ];
        assert_eq!(find_company(&fields), Some("BV Financeira".to_string()));
    }

    #[test]
    fn deterministic_analysis_resolves_the_boleto_scenario() {
        let fields = vec![
            field(Some("Banco emissor"), Some("Banco Votorantim"), 97.0),
            field(Some("VALOR DO DOCUMENTO"), Some("630,62"), 93.0),
            field(Some("PLANO"), Some("12/60"), 91.0),
            field(Some("VENCIMENTO"), Some("05/09/2025"), 99.0),
        ];
        let analysis = deterministic_analysis(&fields);
        assert_eq!(analysis.company.as_deref(), Some("Banco Votorantim"));
        assert_eq!(analysis.installment_amount, Some(630.62));
        assert_eq!(analysis.current_installment_number, Some(12));
        assert_eq!(analysis.installment_count, Some(60));
    }

    #[test]
    fn empty_field_list_resolves_nothing() {
        let analysis = deterministic_analysis(&[]);
        assert!(analysis.company.is_none());
        assert!(analysis.installment_amount.is_none());
        assert!(analysis.installment_count.is_none());
    }
}
