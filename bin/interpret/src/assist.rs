//! Optional LLM pass over the OCR fields. It may only refine the company
//! name and the installment amount; when the model is down or answers
//! garbage, the deterministic result stands untouched.

use refino_core::OcrField;
use refino_llm::{LlmClient, extract_first_json};
use serde_json::{Value, json};
use tracing::debug;

const SYSTEM_PROMPT: &str =
    "Você extrai dados de boletos/contratos. Responda apenas JSON válido.";

#[derive(Debug, Default)]
pub struct AssistOutcome {
    pub company: Option<String>,
    pub installment_amount: Option<f64>,
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compacts the OCR list into `{label, value}` pairs; fields without a
/// value carry no signal and are skipped.
fn reduced_fields(fields: &[OcrField]) -> Vec<Value> {
    fields
        .iter()
        .filter_map(|field| {
            let value = field.value_text.as_deref()?;
            if value.trim().is_empty() {
                return None;
            }
            Some(json!({
                "label": field.label_text.as_deref().map(normalize),
                "value": normalize(value),
            }))
        })
        .collect()
}

fn build_prompt(fields: &[OcrField]) -> String {
    let payload = serde_json::to_string_pretty(&reduced_fields(fields)).unwrap_or_default();
    format!(
        "Você é um extrator de dados de documentos bancários.\n\
         \n\
         Abaixo está uma lista compacta de campos OCR:\n\
         cada item tem \"label\" (título) e \"value\" (valor).\n\
         \n\
         Extraia APENAS os campos:\n\
         {{\n\
           \"company\": string|null,\n\
           \"installment_amount\": float|null\n\
         }}\n\
         \n\
         Regras:\n\
         - \"installment_amount\" é o valor da parcela (ex.: \"630,62\" → 630.62);\n\
           normalmente vem de labels como \"VALOR DO DOCUMENTO\", \"VALOR PARCELA\".\n\
         - Converta vírgula decimal brasileira para ponto.\n\
         - \"company\" é o nome do banco/financeira (ex.: \"Banco Votorantim\").\n\
         - Não invente valores; se não tiver, use null.\n\
         - Responda APENAS o JSON pedido, sem texto extra.\n\
         \n\
         Campos OCR:\n\
         {payload}"
    )
}

/// `None` when the model was unreachable or produced no usable JSON.
pub async fn refine(llm: &LlmClient, fields: &[OcrField]) -> Option<AssistOutcome> {
    let prompt = build_prompt(fields);
    let text = match llm.generate(&prompt, Some(SYSTEM_PROMPT)).await {
        Ok(text) => text,
        Err(err) => {
            debug!(error = %err, "llm assist unavailable");
            return None;
        }
    };

    let data = extract_first_json(&text)?;

    let company = data
        .get("company")
        .and_then(Value::as_str)
        .map(str::to_string);
    let installment_amount = match data.get("installment_amount") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => crate::heuristics::parse_brl_amount(s),
        _ => None,
    };

    Some(AssistOutcome {
        company,
        installment_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use refino_core::FieldSource;

    fn field(label: &str, value: &str) -> OcrField {
        OcrField {
            source: FieldSource::Summary,
            label_text: Some(label.to_string()),
            label_conf: Some(90.0),
            value_text: Some(value.to_string()),
            value_conf: Some(90.0),
        }
    }

    #[test]
    fn reduced_list_skips_valueless_fields() {
        let fields = vec![
            field("VALOR", "630,62"),
            OcrField {
                source: FieldSource::Summary,
                label_text: Some("VAZIO".into()),
                label_conf: Some(50.0),
                value_text: None,
                value_conf: None,
            },
        ];
        let reduced = reduced_fields(&fields);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0]["value"], "630,62");
    }

    #[test]
    fn prompt_embeds_the_field_payload() {
        let prompt = build_prompt(&[field("VALOR DO  DOCUMENTO", "630,62")]);
        assert!(prompt.contains("VALOR DO DOCUMENTO"));
        assert!(prompt.contains("630,62"));
        assert!(prompt.contains("Responda APENAS o JSON"));
    }
}
