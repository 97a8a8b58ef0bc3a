//! Expense OCR over AWS Textract. The response's summary fields and line
//! items are flattened, in document order, into the pipeline's field list.

use anyhow::Result;
use aws_sdk_textract::Client;
use aws_sdk_textract::primitives::Blob;
use aws_sdk_textract::types::{Document, ExpenseField};
use refino_core::{FieldSource, OcrField};

pub struct ExpenseOcr {
    client: Client,
}

impl ExpenseOcr {
    /// Credentials and region come from the standard AWS environment chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&config),
        }
    }

    pub async fn analyze(&self, document_bytes: Vec<u8>) -> Result<Vec<OcrField>> {
        let response = self
            .client
            .analyze_expense()
            .document(Document::builder().bytes(Blob::new(document_bytes)).build())
            .send()
            .await?;

        let mut fields = Vec::new();
        for document in response.expense_documents() {
            for field in document.summary_fields() {
                fields.push(to_ocr_field(FieldSource::Summary, field));
            }
            for group in document.line_item_groups() {
                for item in group.line_items() {
                    for field in item.line_item_expense_fields() {
                        fields.push(to_ocr_field(FieldSource::LineItem, field));
                    }
                }
            }
        }
        Ok(fields)
    }
}

fn to_ocr_field(source: FieldSource, field: &ExpenseField) -> OcrField {
    let label = field.label_detection();
    let value = field.value_detection();
    OcrField {
        source,
        label_text: label.and_then(|d| d.text()).map(str::to_string),
        label_conf: label.and_then(|d| d.confidence()).map(f64::from),
        value_text: value.and_then(|d| d.text()).map(str::to_string),
        value_conf: value.and_then(|d| d.confidence()).map(f64::from),
    }
}
