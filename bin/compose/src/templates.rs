//! Offer copywriting: the two LLM prompt templates (offer present / offer
//! absent, with their respective length budgets) and the deterministic
//! fallback used when the model returns nothing usable.

use refino_core::MatchedLoan;
use refino_core::money::{fmt_brl_opt, fmt_pct_opt};

/// Hard ceiling on anything we send to the user, whichever path produced it.
pub const MAX_MESSAGE_CHARS: usize = 600;

pub const SYSTEM_PROMPT: &str =
    "Você é um copywriter bancário. Escreva mensagens curtas, claras, amigáveis e \
     profissionais, em português do Brasil. Evite jargões, use frases curtas. Não inclua \
     markdown, emojis ou listas. Você está ajudando clientes a refinanciar ou portar \
     financiamentos vindos de outras instituições. Responda sempre apenas com o texto final.";

/// Picks the template for the message and fills it with formatted values.
pub fn build_prompt(msg: &MatchedLoan) -> String {
    let analysis = &msg.agent_analysis;
    let company = analysis.company.as_deref().unwrap_or("-");
    let current = analysis
        .current_installment_number
        .map_or("-".to_string(), |v| v.to_string());
    let total = analysis
        .installment_count
        .map_or("-".to_string(), |v| v.to_string());
    let amount = fmt_brl_opt(analysis.installment_amount);

    let header = format!(
        "Dados do cliente:\n\
         - Banco/empresa externa: {company}\n\
         - Parcela atual: {current} de {total}\n\
         - Valor da parcela: {amount}\n"
    );

    match msg.eligible_offer.as_ref().filter(|_| msg.offer_available) {
        Some(offer) => format!(
            "{header}\n\
             Oferta detectada:\n\
             - Saldo a financiar (atual): {}\n\
             - Taxa mensal atual: {}\n\
             - Nova taxa mensal: {}\n\
             - Novo valor financiado: {}\n\
             - Economia potencial estimada: {}\n\
             \n\
             Escreva uma mensagem curta convidando o cliente a avançar com a proposta.\n\
             Mencione com naturalidade a nova taxa e a economia potencial (sem exagero), \
             e ofereça ajuda para simular/contratar.\n\
             Máx. 550 caracteres.",
            fmt_brl_opt(Some(offer.remaining_finance_amount)),
            fmt_pct_opt(Some(offer.current_finance_month_tax)),
            fmt_pct_opt(Some(offer.new_finance_month_tax)),
            fmt_brl_opt(Some(offer.new_financing_amount)),
            fmt_brl_opt(Some(offer.potential_savings)),
        ),
        None => format!(
            "{header}\n\
             Escreva uma mensagem curta avisando que, por enquanto, não há oferta de \
             refinanciamento/portabilidade disponível.\n\
             Mostre-se à disposição para avisar quando surgir oportunidade. \
             Máx. 450 caracteres.",
        ),
    }
}

/// Three plain sentences assembled from the same fields, for when the model
/// is down or answers with nothing.
pub fn fallback_message(msg: &MatchedLoan) -> String {
    let analysis = &msg.agent_analysis;
    let company = analysis.company.as_deref().unwrap_or("seu banco");

    let mut base_info = Vec::new();
    if let (Some(current), Some(total)) = (
        analysis.current_installment_number,
        analysis.installment_count,
    ) {
        base_info.push(format!("parcela {current} de {total}"));
    }
    if let Some(amount) = analysis.installment_amount {
        base_info.push(format!("valor de {}", fmt_brl_opt(Some(amount))));
    }
    let info = if base_info.is_empty() {
        String::new()
    } else {
        format!(" ({})", base_info.join(", "))
    };

    match msg.eligible_offer.as_ref().filter(|_| msg.offer_available) {
        Some(offer) => {
            let new_rate = fmt_pct_opt(Some(offer.new_finance_month_tax));
            let savings = fmt_brl_opt(Some(offer.potential_savings));
            format!(
                "Identificamos uma condição melhor para seu financiamento no {company}{info}. \
                 Nova taxa a.m.: {new_rate}. Economia estimada: {savings}. \
                 Podemos avançar com a simulação e contratação agora mesmo. Posso te ajudar?"
            )
        }
        None => format!(
            "Analisamos seu financiamento no {company}{info} e, por enquanto, \
             não há uma oferta melhor disponível. Fico de olho e te aviso assim que surgir \
             uma oportunidade. Se quiser, posso revisar seus dados ou refazer a simulação."
        ),
    }
}

/// Applies the length ceiling on a char boundary.
pub fn clamp_message(text: String) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text;
    }
    text.chars().take(MAX_MESSAGE_CHARS).collect()
}

/// The composer's decision: the model's text when it produced something
/// real, the fallback otherwise, always clamped.
pub fn resolve_message(llm_text: Option<String>, msg: &MatchedLoan) -> String {
    let usable = llm_text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && t != "{}");
    clamp_message(usable.unwrap_or_else(|| fallback_message(msg)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use refino_core::{EligibleOffer, LoanAnalysis};

    fn matched(offer: Option<EligibleOffer>) -> MatchedLoan {
        MatchedLoan {
            source_id: 42,
            agent_analysis: LoanAnalysis {
                company: Some("Banco Votorantim".into()),
                installment_count: Some(60),
                current_installment_number: Some(12),
                installment_amount: Some(630.62),
            },
            offer_available: offer.is_some(),
            eligible_offer: offer,
            timestamp: 1,
        }
    }

    fn offer() -> EligibleOffer {
        EligibleOffer {
            remaining_finance_amount: 43_783.46,
            current_finance_month_tax: 3.0,
            new_finance_month_tax: 1.5,
            new_financing_amount: 1_000_000.0,
            potential_savings: 9_800.55,
        }
    }

    #[test]
    fn offer_prompt_caps_at_550_chars() {
        let prompt = build_prompt(&matched(Some(offer())));
        assert!(prompt.contains("Oferta detectada"));
        assert!(prompt.contains("Máx. 550 caracteres."));
        assert!(prompt.contains("1,50% a.m."));
        assert!(prompt.contains("R$ 43.783,46"));
    }

    #[test]
    fn no_offer_prompt_caps_at_450_chars() {
        let prompt = build_prompt(&matched(None));
        assert!(!prompt.contains("Oferta detectada"));
        assert!(prompt.contains("Máx. 450 caracteres."));
    }

    #[test]
    fn fallback_with_offer_mentions_rate_and_savings() {
        let text = fallback_message(&matched(Some(offer())));
        assert!(text.contains("1,50% a.m."));
        assert!(text.contains("R$ 9.800,55"));
        assert!(text.contains("Banco Votorantim"));
        assert!(text.contains("parcela 12 de 60"));
    }

    #[test]
    fn fallback_without_offer_says_so() {
        let text = fallback_message(&matched(None));
        assert!(text.contains("não há uma oferta"));
        assert!(text.chars().count() <= MAX_MESSAGE_CHARS);
    }

    #[test]
    fn empty_or_brace_llm_output_falls_back() {
        let msg = matched(None);
        let fallback = fallback_message(&msg);
        assert_eq!(resolve_message(None, &msg), fallback);
        assert_eq!(resolve_message(Some("  ".into()), &msg), fallback);
        assert_eq!(resolve_message(Some("{}".into()), &msg), fallback);
        assert_eq!(resolve_message(Some(" tudo certo ".into()), &msg), "tudo certo");
    }

    #[test]
    fn length_bound_holds_even_for_absurd_company_names() {
        let mut msg = matched(Some(offer()));
        msg.agent_analysis.company = Some("Banco ".repeat(120));
        let text = resolve_message(None, &msg);
        assert!(text.chars().count() <= MAX_MESSAGE_CHARS);

        let rambling = resolve_message(Some("x".repeat(2000)), &msg);
        assert_eq!(rambling.chars().count(), MAX_MESSAGE_CHARS);
    }
}
