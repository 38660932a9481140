use anyhow::{Context, Result};
use log::{debug, error};
use regex::Regex;
use serde::{Deserialize, Serialize};

const API_ENDPOINT: &str = "https://api.perplexity.ai/chat/completions";
const MODEL: &str = "sonar";
const SYSTEM_PROMPT: &str = "You are a data extraction assistant.";

/// Pay fields extracted from one payslip. Keys the service did not return
/// stay empty; numeric values are kept as their decimal rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayRecord {
    #[serde(default, deserialize_with = "de_stringish")]
    pub gross_pay: String,
    #[serde(default, deserialize_with = "de_stringish")]
    pub net_pay: String,
    #[serde(default, deserialize_with = "de_stringish")]
    pub tax: String,
    #[serde(default, deserialize_with = "de_stringish")]
    pub prsi: String,
    #[serde(default, deserialize_with = "de_stringish")]
    pub usc: String,
    #[serde(default, deserialize_with = "de_stringish")]
    pub payment_date: String,
    #[serde(default, deserialize_with = "de_stringish")]
    pub payer: String,
}

impl PayRecord {
    pub fn is_empty(&self) -> bool {
        self.gross_pay.is_empty()
            && self.net_pay.is_empty()
            && self.tax.is_empty()
            && self.prsi.is_empty()
            && self.usc.is_empty()
            && self.payment_date.is_empty()
            && self.payer.is_empty()
    }

    /// Renders the spreadsheet row. Column order is fixed; the last column
    /// stays blank for the operator's processed mark.
    pub fn to_row(&self, message_id: &str, email_date: &str) -> Vec<String> {
        vec![
            message_id.to_string(),
            email_date.to_string(),
            self.payment_date.clone(),
            self.payer.clone(),
            self.gross_pay.clone(),
            self.tax.clone(),
            self.prsi.clone(),
            self.usc.clone(),
            self.net_pay.clone(),
            String::new(),
        ]
    }
}

// The service replies with strings or numbers depending on the payslip;
// both land as the string the spreadsheet receives.
fn de_stringish<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

/// Turns payslip text into a `PayRecord` by delegating the parsing to the
/// text-understanding service.
pub struct PayslipExtractor {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl PayslipExtractor {
    pub fn new(api_key: &str) -> Self {
        PayslipExtractor {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            endpoint: API_ENDPOINT.to_string(),
        }
    }

    /// Returns the extracted fields, or an empty record when the service is
    /// unreachable, rejects the call, or replies without a parseable JSON
    /// object. Callers treat the empty record as the extraction error.
    pub async fn extract(&self, text: &str) -> PayRecord {
        match self.request_extraction(text).await {
            Ok(record) => record,
            Err(e) => {
                error!("❌ Value extraction failed: {}", e);
                PayRecord::default()
            }
        }
    }

    async fn request_extraction(&self, text: &str) -> Result<PayRecord> {
        if self.api_key.is_empty() {
            anyhow::bail!("no extraction API key configured");
        }

        let prompt = Self::build_prompt(text);
        let request = ChatRequest {
            model: MODEL,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        debug!("Sending {} characters of payslip text for extraction", text.len());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Unable to reach the extraction service")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("extraction service returned HTTP {}", status);
        }

        let reply: ChatResponse = response
            .json()
            .await
            .context("Extraction service reply is not valid JSON")?;

        let content = reply
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .unwrap_or_default();

        Self::parse_reply(content)
    }

    pub fn build_prompt(text: &str) -> String {
        format!(
            "Extract these values from the following Irish payslip text and return as a JSON \
             object with these keys: gross_pay, net_pay, tax, prsi, usc, payment_date, payer. \
             Here is the text:\n{}",
            text
        )
    }

    /// Mines the reply for its JSON object. The match is greedy, first `{`
    /// to last `}`, so a reply with several JSON-like blocks yields the
    /// whole span.
    pub fn parse_reply(content: &str) -> Result<PayRecord> {
        let json_block = Regex::new(r"(?s)\{.*\}")?
            .find(content)
            .context("no JSON object in the service reply")?;

        let record = serde_json::from_str(json_block.as_str())
            .context("JSON object in the service reply does not parse")?;

        Ok(record)
    }
}
