use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{AdvisorError, PlantIdentifier};

pub const DEFAULT_PLANT_ID_URL: &str = "https://api.plant.id";

#[derive(Serialize)]
struct IdentificationRequest<'a> {
    images: Vec<&'a str>,
    similar_images: bool,
}

#[derive(Deserialize, Debug)]
struct IdentificationResponse {
    #[serde(default)]
    result: Option<IdentificationResult>,
}

#[derive(Deserialize, Debug)]
struct IdentificationResult {
    #[serde(default)]
    classification: Option<Classification>,
}

#[derive(Deserialize, Debug)]
struct Classification {
    #[serde(default)]
    suggestions: Vec<Suggestion>,
}

#[derive(Deserialize, Debug)]
struct Suggestion {
    name: String,
}

/// plant.id v3 identification client.
pub struct PlantIdClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PlantIdClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

fn top_suggestion(body: &str) -> Result<String, AdvisorError> {
    let resp: IdentificationResponse =
        serde_json::from_str(body).map_err(|e| AdvisorError::Decode(e.to_string()))?;
    resp.result
        .and_then(|r| r.classification)
        .and_then(|c| c.suggestions.into_iter().next())
        .map(|s| s.name)
        .ok_or(AdvisorError::NotRecognized)
}

#[async_trait]
impl PlantIdentifier for PlantIdClient {
    async fn identify(&self, image_base64: &str) -> Result<String, AdvisorError> {
        let url = format!("{}/v3/identification", self.base_url);
        let resp = self
            .client
            .post(url)
            .header("Api-Key", &self.api_key)
            .json(&IdentificationRequest {
                images: vec![image_base64],
                similar_images: true,
            })
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(AdvisorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        top_suggestion(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_suggestion() {
        let body = r#"{"result":{"classification":{"suggestions":[
            {"name":"Ficus lyrata","probability":0.91},
            {"name":"Ficus elastica","probability":0.05}]}}}"#;
        assert_eq!(top_suggestion(body).unwrap(), "Ficus lyrata");
    }

    #[test]
    fn no_suggestions_means_not_recognized() {
        let body = r#"{"result":{"classification":{"suggestions":[]}}}"#;
        assert!(matches!(top_suggestion(body), Err(AdvisorError::NotRecognized)));
        assert!(matches!(top_suggestion("{}"), Err(AdvisorError::NotRecognized)));
    }
}
