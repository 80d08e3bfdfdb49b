//! Vision-language-model client: the production planner and validator.
//!
//! Talks to an OpenAI-compatible chat-completions endpoint, sending the
//! goal plus a base64 screenshot and decoding the model's JSON reply
//! strictly into the wire types.

use crate::action::{ActionPlan, ValidationOutcome};
use crate::errors::AutomationError;
use crate::orchestrator::{Planner, Validator};
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_ENDPOINT: &str = "https://api.siliconflow.cn/v1/chat/completions";
const DEFAULT_MODEL: &str = "zai-org/GLM-4.6V";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const API_KEY_ENV: &str = "SILICONFLOW_API_KEY";

const PLANNER_PROMPT: &str = r#"You are a desktop GUI automation expert. Analyze the screenshot and produce a JSON action queue that advances the user's intent.

COORDINATE SYSTEM:
- Normalized: (0, 0) is TOP-LEFT, (1, 1) is BOTTOM-RIGHT.

AVAILABLE ACTIONS (JSON format):
- move_mouse: {"action": "move_mouse", "params": {"x": 0.5, "y": 0.5, "duration": 500}} (duration in ms)
- click: {"action": "click", "params": {"button": "left"}} (left, right, center; clicks at the current cursor position, so move_mouse first)
- mouse_down / mouse_up: {"action": "mouse_down", "params": {"button": "left"}}
- paste_text: {"action": "paste_text", "params": {"text": "hello"}} (PREFERRED for typing; focus the field first)
- key_press / key_release: {"action": "key_press", "params": {"key": "enter"}} (shortcuts and control keys only)
- scroll: {"action": "scroll", "params": {"dx": 0, "dy": -120}}
- delay: {"action": "delay", "params": {"duration": 1000}}
- resubmit: {"action": "resubmit", "params": {"prompt": "..."}} (the task needs another screenshot-and-plan cycle; give the follow-up goal)
- finish: {"action": "finish"} (you believe the goal is reached)
- fail: {"action": "fail"} (the goal cannot be fulfilled on this screen)

OUTPUT FORMAT:
Respond with a single JSON object ONLY, no markdown:
{"thought": "...", "actions": [{"action": "...", "params": {...}}, ...]}

Be precise with coordinates. For a double click, emit click, delay 50, click. If the task is long, do the first part and resubmit."#;

/// Connection settings for the VLM endpoint.
#[derive(Debug, Clone)]
pub struct VlmConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl Default for VlmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl VlmConfig {
    /// Defaults plus the API key from `SILICONFLOW_API_KEY`.
    pub fn from_env() -> Self {
        Self {
            api_key: env::var(API_KEY_ENV).unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Chat-completions client implementing both [`Planner`] and
/// [`Validator`].
pub struct VlmClient {
    http: reqwest::Client,
    config: VlmConfig,
}

impl VlmClient {
    pub fn new(config: VlmConfig) -> Result<Self, AutomationError> {
        if config.api_key.is_empty() {
            warn!("VLM API key is empty; requests will likely be rejected");
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AutomationError::Resource(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    async fn chat(
        &self,
        system_prompt: &str,
        user_text: Option<&str>,
        screenshot: &[u8],
        max_tokens: u32,
    ) -> Result<String, String> {
        let image_url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(screenshot)
        );

        let mut user_content = Vec::new();
        if let Some(text) = user_text {
            user_content.push(json!({"type": "text", "text": text}));
        }
        user_content.push(json!({"type": "image_url", "image_url": {"url": image_url}}));

        let payload = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_content},
            ],
            "temperature": 0.1,
            "top_p": 0.1,
            "max_tokens": max_tokens,
            "enable_thinking": false,
        });

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("request to {} failed: {e}", self.config.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            return Err(format!("endpoint returned {status}: {snippet}"));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("malformed chat-completions response: {e}"))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| "chat-completions response had no choices".to_string())
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

/// Strip the markdown fences and box markers some models wrap their JSON
/// in before strict decoding.
fn clean_model_json(content: &str) -> String {
    content
        .replace("```json", "")
        .replace("```", "")
        .replace("<|begin_of_box|>", "")
        .replace("<|end_of_box|>", "")
        .trim()
        .to_string()
}

#[async_trait]
impl Planner for VlmClient {
    #[instrument(skip(self, screenshot))]
    async fn plan(&self, goal: &str, screenshot: &[u8]) -> Result<ActionPlan, AutomationError> {
        let user_text = format!("Intent: {goal}");
        let content = self
            .chat(PLANNER_PROMPT, Some(&user_text), screenshot, 2048)
            .await
            .map_err(AutomationError::Planning)?;

        let cleaned = clean_model_json(&content);
        let plan: ActionPlan =
            serde_json::from_str(&cleaned).map_err(|e| AutomationError::bad_plan(e, &cleaned))?;
        debug!(actions = plan.actions.len(), "decoded plan");
        Ok(plan)
    }
}

#[async_trait]
impl Validator for VlmClient {
    #[instrument(skip(self, screenshot))]
    async fn validate(
        &self,
        goal: &str,
        screenshot: &[u8],
    ) -> Result<ValidationOutcome, AutomationError> {
        let system_prompt = format!(
            r#"You are a QA validator for a desktop automation agent. Decide from the screenshot whether the user's goal has been achieved.

User goal: "{goal}"

OUTPUT FORMAT:
Respond with a single JSON object ONLY:
{{"success": true | false, "summary": "what was achieved or what went wrong", "nextPrompt": "corrective goal if failed, otherwise null"}}

Be strict but reasonable. If the goal is only partially met, return success: false with a corrective nextPrompt."#
        );

        let content = self
            .chat(&system_prompt, None, screenshot, 1024)
            .await
            .map_err(AutomationError::Validation)?;

        let cleaned = clean_model_json(&content);
        serde_json::from_str(&cleaned).map_err(|e| {
            let snippet: String = cleaned.chars().take(200).collect();
            AutomationError::Validation(format!("unparsable verdict: {e} (content: {snippet:?})"))
        })
    }
}
