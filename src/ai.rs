use crate::models::{Category, CustomLabel, Enrichment, ExtractedTask};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const BODY_PREVIEW_CHARS: usize = 1000;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("no LLM API key configured; run with --set-api-key <key> or set GEMINI_API_KEY")]
    MissingApiKey,

    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("LLM service returned status {0}")]
    Status(u16),

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("could not parse LLM output: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        AiError::Transport(err.to_string())
    }
}

/// Everything the model sees about one message.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentRequest {
    pub snippet: String,
    pub subject: String,
    pub sender: String,
    pub body: Option<String>,
    pub labels: Vec<CustomLabel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DraftStyle {
    #[default]
    Default,
    Concise,
    Friendly,
    Professional,
}

impl DraftStyle {
    pub fn next(self) -> Self {
        match self {
            DraftStyle::Default => DraftStyle::Concise,
            DraftStyle::Concise => DraftStyle::Friendly,
            DraftStyle::Friendly => DraftStyle::Professional,
            DraftStyle::Professional => DraftStyle::Default,
        }
    }

    fn instruction(self) -> &'static str {
        match self {
            DraftStyle::Default => "Make the tone more professional, clear, and polite.",
            DraftStyle::Concise => {
                "Make the tone extremely concise and brief. Get straight to the point in as few words as possible."
            }
            DraftStyle::Friendly => {
                "Make the tone exceptionally friendly, warm, and approachable. Express enthusiasm."
            }
            DraftStyle::Professional => {
                "Make the tone highly formal, business-appropriate, and strictly professional."
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnhanceRequest {
    pub draft: String,
    pub language: String,
    pub style: DraftStyle,
    pub command: String,
}

/// LLM seam used by the synchronizer and the compose surface.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Never fails; any problem is reported as [`Enrichment::failed`].
    async fn enrich(&self, api_key: &str, request: &EnrichmentRequest) -> Enrichment;

    async fn enhance_draft(&self, api_key: &str, request: &EnhanceRequest)
        -> Result<String, AiError>;

    async fn generate_reply(&self, api_key: &str, body: &str, sender_name: &str)
        -> Result<String, AiError>;

    async fn chat(&self, api_key: &str, question: &str, inbox_context: &str)
        -> Result<String, AiError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RawEnrichment {
    category: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    requires_reply: bool,
    #[serde(default)]
    draft_reply: String,
    #[serde(default)]
    tasks: Vec<ExtractedTask>,
    #[serde(default, rename = "appliedLabels")]
    applied_labels: Vec<String>,
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(model: &str, timeout: Duration) -> Result<Self, AiError> {
        Self::with_base_url(GEMINI_API_BASE, model, timeout)
    }

    pub fn with_base_url(base_url: &str, model: &str, timeout: Duration) -> Result<Self, AiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                error!("Failed to create reqwest client: {}", e);
                AiError::Transport(e.to_string())
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, AiError> {
        if api_key.trim().is_empty() {
            return Err(AiError::MissingApiKey);
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(model = %self.model, prompt_len = prompt.len(), "LLM request");
        let response = self
            .http
            .post(&url)
            .query(&[("key", api_key)])
            .json(&GenerateRequest {
                contents: [Content {
                    parts: [Part { text: prompt }],
                }],
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AiError::Status(response.status().as_u16()));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AiError::Parse(e.to_string()))?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(text)
    }

    async fn try_enrich(
        &self,
        api_key: &str,
        request: &EnrichmentRequest,
    ) -> Result<Enrichment, AiError> {
        let raw = self.generate(api_key, &enrichment_prompt(request)).await?;
        parse_enrichment(&raw, &request.labels)
    }
}

#[async_trait]
impl Enricher for GeminiClient {
    async fn enrich(&self, api_key: &str, request: &EnrichmentRequest) -> Enrichment {
        match self.try_enrich(api_key, request).await {
            Ok(enrichment) => enrichment,
            Err(e) => {
                warn!("enrichment failed: {}", e);
                Enrichment::failed()
            }
        }
    }

    async fn enhance_draft(
        &self,
        api_key: &str,
        request: &EnhanceRequest,
    ) -> Result<String, AiError> {
        let text = self.generate(api_key, &enhance_prompt(request)).await?;
        Ok(strip_code_fence(&text))
    }

    async fn generate_reply(
        &self,
        api_key: &str,
        body: &str,
        sender_name: &str,
    ) -> Result<String, AiError> {
        let sender = if sender_name.trim().is_empty() {
            "there"
        } else {
            sender_name
        };
        let prompt = format!(
            "You are an AI assistant writing a concise, professional reply to the email below, addressed to {sender}. \
            Do not include conversational filler like 'Here is your reply:'. Draft only the final text of the response, \
            suitable for hitting send immediately.\n\nOriginal Email:\n{}",
            preview(body, BODY_PREVIEW_CHARS * 3)
        );
        let text = self.generate(api_key, &prompt).await?;
        Ok(strip_code_fence(&text))
    }

    async fn chat(
        &self,
        api_key: &str,
        question: &str,
        inbox_context: &str,
    ) -> Result<String, AiError> {
        let prompt = format!(
            "You are an AI assistant helping with an email inbox. Using the following emails context, answer the user's question.\n\n\
            Context:\n{}\n\nQuestion: {}",
            inbox_context, question
        );
        let text = self.generate(api_key, &prompt).await?;
        Ok(strip_code_fence(&text))
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn enrichment_prompt(request: &EnrichmentRequest) -> String {
    let body = request
        .body
        .as_deref()
        .map(|b| preview(b, BODY_PREVIEW_CHARS))
        .unwrap_or_default();

    let rules = if request.labels.is_empty() {
        "(none)".to_string()
    } else {
        request
            .labels
            .iter()
            .map(|l| format!("- \"{}\": {}", l.name, l.prompt))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Act as an email assistant. Read this email.\n\
        From: {sender}\nSubject: {subject}\nSnippet: \"{snippet}\"\nBody:\n{body}\n\n\
        The user has defined these custom labels (name: rule):\n{rules}\n\n\
        Respond with strictly valid JSON containing exactly these keys:\n\
        1. \"category\": one of \"Important\", \"Social\", \"Promotions\", \"Spam\".\n\
        2. \"summary\": a very short, 1-sentence summary of what the email is about.\n\
        3. \"requires_reply\": true or false.\n\
        4. \"draft_reply\": a short, professional draft response if requires_reply is true, otherwise \"\".\n\
        5. \"tasks\": an array of action items, each {{\"title\": string, \"date\": string, \"isUrgent\": bool, \"isPastDue\": bool}}; [] if none.\n\
        6. \"appliedLabels\": names of the custom labels whose rule matches this email; [] if none.\n\
        Do not include markdown formatting. Output only the JSON object.",
        sender = request.sender,
        subject = request.subject,
        snippet = request.snippet,
    )
}

fn enhance_prompt(request: &EnhanceRequest) -> String {
    let draft = request.draft.trim();
    let has_draft = !draft.is_empty() && draft != "<p><br></p>";
    let language = if request.language.trim().is_empty() {
        "English"
    } else {
        request.language.trim()
    };

    let task = if has_draft {
        "The user has written a draft email. Your job is to improve it."
    } else {
        "The user needs you to write a completely new email from scratch based on their instructions."
    };
    let third = if request.command.trim().is_empty() {
        "3. Fix any spelling or grammar mistakes if editing a draft.".to_string()
    } else {
        format!(
            "3. The user has provided a SPECIFIC CUSTOM COMMAND: \"{}\". Follow this command over everything else.",
            request.command.trim()
        )
    };
    let draft_section = if has_draft {
        format!("Here is the user's draft to work with:\n{}", draft)
    } else {
        String::new()
    };

    format!(
        "You are an elite executive copywriter.\n\n{task}\n\nINSTRUCTIONS:\n\
        1. {style}\n\
        2. Write the final email entirely in {language}. Ensure it sounds native in {language}.\n\
        {third}\n\
        4. Return plain text suitable for an email body. Do not wrap it in markdown blocks.\n\n\
        {draft_section}\n\nReturn ONLY the final email text.",
        style = request.style.instruction(),
    )
}

/// Remove a leading ```lang fence and a trailing ``` fence, if present.
pub fn strip_code_fence(text: &str) -> String {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            // single-line fence: only a `json` tag is dropped
            None => match rest.get(..4) {
                Some(tag)
                    if tag.eq_ignore_ascii_case("json")
                        && !rest[4..].starts_with(|c: char| c.is_ascii_alphanumeric()) =>
                {
                    &rest[4..]
                }
                _ => rest,
            },
        };
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim().to_string()
}

pub fn parse_enrichment(raw: &str, labels: &[CustomLabel]) -> Result<Enrichment, AiError> {
    let cleaned = strip_code_fence(raw);
    let parsed: RawEnrichment =
        serde_json::from_str(&cleaned).map_err(|e| AiError::Parse(e.to_string()))?;

    let applied_labels = parsed
        .applied_labels
        .into_iter()
        .filter(|name| labels.iter().any(|l| l.name.eq_ignore_ascii_case(name)))
        .collect();
    let draft_reply = if parsed.requires_reply {
        parsed.draft_reply
    } else {
        String::new()
    };

    Ok(Enrichment {
        category: Category::parse(&parsed.category),
        summary: parsed.summary,
        requires_reply: parsed.requires_reply,
        draft_reply,
        tasks: parsed
            .tasks
            .into_iter()
            .filter(|t| !t.title.trim().is_empty())
            .collect(),
        applied_labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoices_rule() -> CustomLabel {
        CustomLabel::new("Invoices", "Bills and payment requests", "green", true).unwrap()
    }

    #[test]
    fn test_strip_code_fence_with_language_tag() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\nhello\n```"), "hello");
        assert_eq!(strip_code_fence("  plain text  "), "plain text");
        assert_eq!(strip_code_fence("```json{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(
            strip_code_fence("```Thanks for writing```"),
            "Thanks for writing"
        );
        assert_eq!(strip_code_fence("```jsonify me```"), "jsonify me");
    }

    #[test]
    fn test_parse_enrichment_full() {
        let raw = r#"```json
{"category":"Important","summary":"Invoice due Friday.","requires_reply":true,
 "draft_reply":"Thanks, will pay.","tasks":[{"title":"Pay invoice","date":"Friday","isUrgent":true,"isPastDue":false}],
 "appliedLabels":["Invoices","Made Up"]}
```"#;
        let enrichment = parse_enrichment(raw, &[invoices_rule()]).unwrap();
        assert_eq!(enrichment.category, Category::Important);
        assert_eq!(enrichment.summary, "Invoice due Friday.");
        assert!(enrichment.requires_reply);
        assert_eq!(enrichment.tasks.len(), 1);
        assert!(enrichment.tasks[0].is_urgent);
        assert_eq!(enrichment.applied_labels, vec!["Invoices".to_string()]);
    }

    #[test]
    fn test_parse_enrichment_drops_draft_when_no_reply_needed() {
        let raw = r#"{"category":"Promotions","summary":"Sale.","requires_reply":false,"draft_reply":"Hi"}"#;
        let enrichment = parse_enrichment(raw, &[]).unwrap();
        assert_eq!(enrichment.draft_reply, "");
        assert!(enrichment.tasks.is_empty());
    }

    #[test]
    fn test_parse_enrichment_rejects_garbage() {
        assert!(matches!(
            parse_enrichment("Sorry, I cannot help.", &[]),
            Err(AiError::Parse(_))
        ));
    }

    #[test]
    fn test_enhance_prompt_switches_on_draft_presence() {
        let scratch = enhance_prompt(&EnhanceRequest {
            draft: "<p><br></p>".to_string(),
            ..Default::default()
        });
        assert!(scratch.contains("from scratch"));
        assert!(scratch.contains("English"));

        let edit = enhance_prompt(&EnhanceRequest {
            draft: "hi bob, meeting moved".to_string(),
            language: "German".to_string(),
            style: DraftStyle::Concise,
            command: "mention Tuesday".to_string(),
        });
        assert!(edit.contains("improve it"));
        assert!(edit.contains("German"));
        assert!(edit.contains("mention Tuesday"));
        assert!(edit.contains("extremely concise"));
    }

    #[test]
    fn test_enrichment_prompt_lists_rules() {
        let prompt = enrichment_prompt(&EnrichmentRequest {
            snippet: "Your invoice".to_string(),
            labels: vec![invoices_rule()],
            ..Default::default()
        });
        assert!(prompt.contains("\"Invoices\": Bills and payment requests"));
    }

    #[tokio::test]
    async fn test_missing_key_short_circuits() {
        let client =
            GeminiClient::with_base_url("http://127.0.0.1:9", "test-model", Duration::from_millis(200))
                .unwrap();
        let enrichment = client.enrich("", &EnrichmentRequest::default()).await;
        assert!(enrichment.is_failed());
        assert!(matches!(
            client.chat(" ", "q", "ctx").await,
            Err(AiError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_downgrades_to_error_category() {
        let client =
            GeminiClient::with_base_url("http://127.0.0.1:9", "test-model", Duration::from_millis(500))
                .unwrap();
        let enrichment = client.enrich("key", &EnrichmentRequest::default()).await;
        assert_eq!(enrichment, Enrichment::failed());
    }
}
