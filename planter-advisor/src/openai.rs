use async_trait::async_trait;
use planter_policy::RawCare;
use serde::{Deserialize, Serialize};

use crate::{AdvisorError, CareAdvisor};

pub const DEFAULT_LLM_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-3.5-turbo-1106";

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Asks an OpenAI-compatible chat endpoint for care ranges in JSON mode.
pub struct OpenAiCareAdvisor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCareAdvisor {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

fn care_prompt(plant_name: &str) -> String {
    format!(
        "Identify \"{plant_name}\". Return JSON: {{\"moisture_percent\":int,\"min_temp\":int,\"max_temp\":int,\"watering_freq\":string,\"watering_desc\":string_no_quotes}}"
    )
}

fn parse_care(body: &str) -> Result<RawCare, AdvisorError> {
    let resp: ChatResponse =
        serde_json::from_str(body).map_err(|e| AdvisorError::Decode(e.to_string()))?;
    if let Some(err) = resp.error {
        return Err(AdvisorError::Decode(err.message));
    }
    let content = resp
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| AdvisorError::Decode("no choices".into()))?;
    serde_json::from_str(&content).map_err(|e| AdvisorError::Decode(e.to_string()))
}

#[async_trait]
impl CareAdvisor for OpenAiCareAdvisor {
    async fn care_for(&self, plant_name: &str) -> Result<RawCare, AdvisorError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: self.model.clone(),
            response_format: ResponseFormat { kind: "json_object" },
            messages: vec![ChatMessage {
                role: "user".into(),
                content: care_prompt(plant_name),
            }],
            temperature: 0.2,
        };

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(AdvisorError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        parse_care(&text)
    }
}
