//! Lead qualification via a local LLM.
//!
//! The post text is wrapped in a fixed instruction template and sent to an
//! OpenAI-compatible `/chat/completions` endpoint (Ollama exposes one at
//! `http://localhost:11434/v1`). The service guarantees nothing about the
//! shape of the answer beyond "contains text", so the verdict is read with
//! [`heuristic_decision`]: an answer it cannot read is **not qualified**.

use crate::core::types::Decision;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_MODEL: &str = "deepseek-r1:8b";

/// Placeholder replaced by the post text in the instruction template.
pub const POST_PLACEHOLDER: &str = "{post}";

pub const DEFAULT_INSTRUCTION: &str = r#"You are a lead qualification expert for a Virtual Assistant business. A qualified lead is a LinkedIn post where an individual or small business owner is EXPLICITLY asking for recommendations for a Virtual Assistant, looking to hire a VA, or stating a clear, direct need for administrative help.
CRITICAL: Ignore posts that are just promotions FROM a VA or VA company. Ignore general business advice. Ignore posts from large corporate recruiters. Focus only on direct requests for help from potential clients.
Analyze the following post text. Is it a qualified lead?
Post: "{post}"
Respond ONLY in JSON with two keys: "is_lead" (boolean) and "reason" (a brief string justification). Example: {"is_lead": true, "reason": "The user is asking for VA recommendations."}"#;

const MAX_RATIONALE_CHARS: usize = 240;

#[derive(Debug, thiserror::Error)]
pub enum QualifierError {
    #[error("inference request timed out after {0:?}")]
    Timeout(Duration),

    #[error("inference request failed: {0}")]
    Transport(String),

    #[error("inference endpoint returned status={status} body={body}")]
    Status { status: u16, body: String },

    #[error("inference response had no completion text")]
    EmptyCompletion,
}

#[async_trait::async_trait]
pub trait Qualifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Decision, QualifierError>;
}

/// Settings for [`LlmQualifier`].
#[derive(Debug, Clone)]
pub struct QualifierConfig {
    pub base_url: String,
    pub model: String,
    /// Empty/absent for key-less local endpoints.
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub instruction: String,
}

impl Default for QualifierConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
            instruction: DEFAULT_INSTRUCTION.to_string(),
        }
    }
}

pub struct LlmQualifier {
    http: reqwest::Client,
    cfg: QualifierConfig,
}

impl LlmQualifier {
    pub fn new(cfg: QualifierConfig) -> Result<Self, QualifierError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .connect_timeout(Duration::from_secs(10).min(cfg.timeout))
            .build()
            .map_err(|e| QualifierError::Transport(e.to_string()))?;
        Ok(Self { http, cfg })
    }

    pub fn model(&self) -> &str {
        &self.cfg.model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        // Only send Authorization when a key is provided.
        match self.cfg.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => builder.bearer_auth(key),
            _ => builder,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> QualifierError {
        if e.is_timeout() {
            QualifierError::Timeout(self.cfg.timeout)
        } else {
            QualifierError::Transport(e.to_string())
        }
    }

    /// Connectivity check run once before the browser opens.
    pub async fn probe(&self) -> Result<(), QualifierError> {
        let response = self
            .authorize(self.http.get(self.endpoint("models")))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(QualifierError::Status { status, body });
        }
        info!(
            "qualifier: inference endpoint reachable at {} (model {})",
            self.cfg.base_url, self.cfg.model
        );
        Ok(())
    }

    pub fn render_prompt(&self, text: &str) -> String {
        render_prompt(&self.cfg.instruction, text)
    }
}

/// Substitute the post into the template; a template without the
/// placeholder gets the post appended.
pub fn render_prompt(template: &str, text: &str) -> String {
    if template.contains(POST_PLACEHOLDER) {
        template.replace(POST_PLACEHOLDER, text)
    } else {
        format!("{}\n\nPost: \"{}\"", template.trim_end(), text)
    }
}

#[async_trait::async_trait]
impl Qualifier for LlmQualifier {
    async fn classify(&self, text: &str) -> Result<Decision, QualifierError> {
        let preview: String = text.chars().take(100).collect();
        debug!("qualifier: classifying '{}…'", preview);

        let body = serde_json::json!({
            "model": self.cfg.model,
            "temperature": 0.0,
            "stream": false,
            "messages": [
                {"role": "user", "content": self.render_prompt(text)}
            ]
        });

        let response = self
            .authorize(self.http.post(self.endpoint("chat/completions")).json(&body))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(QualifierError::Status { status, body });
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let content = value
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(QualifierError::EmptyCompletion)?;

        Ok(heuristic_decision(&content))
    }
}

fn think_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<think>.*?(</think>|$)").expect("valid think regex"))
}

fn is_lead_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)"?\b(is_lead|is_qualified|qualified)\b"?\s*:\s*"?(true|false|yes|no)\b"#)
            .expect("valid is_lead regex")
    })
}

fn leading_verdict() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)^[\s*_`"'#>-]*(verdict\s*:\s*|answer\s*:\s*)?(yes|no)\b"#)
            .expect("valid verdict regex")
    })
}

fn negative_keywords() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(not\s+(a\s+)?qualified|unqualified|not\s+a\s+(qualified\s+)?lead|no)\b")
            .expect("valid negative regex")
    })
}

fn positive_keywords() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(yes|qualified)\b").expect("valid positive regex"))
}

/// Read a qualification verdict out of free-form model output.
///
/// Order of evidence:
/// 1. `<think>` reasoning blocks are discarded.
/// 2. An `"is_lead": true|false` style marker decides.
/// 3. A leading `yes` / `no` decides.
/// 4. Keywords: qualified only if a positive word appears and no negative
///    phrase does.
///
/// Anything else (including both signals at once) is **not qualified**.
pub fn heuristic_decision(response: &str) -> Decision {
    let answer = think_block().replace_all(response, " ");
    let answer = answer.trim();
    let rationale = extract_rationale(answer);

    if answer.is_empty() {
        return Decision::not_qualified("unparseable response: empty");
    }

    if let Some(caps) = is_lead_marker().captures(answer) {
        let v = caps.get(2).map(|m| m.as_str().to_ascii_lowercase());
        let yes = matches!(v.as_deref(), Some("true") | Some("yes"));
        return Decision {
            is_qualified: yes,
            rationale,
        };
    }

    if let Some(caps) = leading_verdict().captures(answer) {
        let yes = caps
            .get(2)
            .map(|m| m.as_str().eq_ignore_ascii_case("yes"))
            .unwrap_or(false);
        return Decision {
            is_qualified: yes,
            rationale,
        };
    }

    let negative = negative_keywords().is_match(answer);
    // "not qualified" also contains "qualified"; drop negatives first.
    let stripped = negative_keywords().replace_all(answer, " ");
    let positive = positive_keywords().is_match(&stripped);

    match (positive, negative) {
        (true, false) => Decision::qualified(rationale),
        (false, true) => Decision::not_qualified(rationale),
        (true, true) => Decision::not_qualified(format!("ambiguous response: {}", rationale)),
        (false, false) => Decision::not_qualified(format!("unparseable response: {}", rationale)),
    }
}

/// `reason` field of a JSON-ish answer, else its first non-empty line.
fn extract_rationale(answer: &str) -> String {
    if let (Some(start), Some(end)) = (answer.find('{'), answer.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<serde_json::Value>(&answer[start..=end]) {
                if let Some(reason) = v.get("reason").and_then(|r| r.as_str()) {
                    return truncate(reason.trim());
                }
            }
        }
    }
    let line = answer
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    truncate(line)
}

fn truncate(s: &str) -> String {
    crate::core::types::excerpt(s, MAX_RATIONALE_CHARS)
}
