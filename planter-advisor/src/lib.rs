//! Auto-population of care parameters from a plant photo: identify the
//! species, ask a language model for its care ranges, then clamp the answer
//! to the safety limits.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use planter_policy::{apply_safety_limits, fallback_care, RawCare};
use planter_types::{AlertMessages, PlantProfile, ProfileId, ProfileKind};
use thiserror::Error;

pub mod openai;
pub use openai::OpenAiCareAdvisor;

pub mod plant_id;
pub use plant_id::PlantIdClient;

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("no plant recognized in the image")]
    NotRecognized,
    #[error("image is empty")]
    EmptyImage,
}

impl From<reqwest::Error> for AdvisorError {
    fn from(e: reqwest::Error) -> Self {
        AdvisorError::Http(e.to_string())
    }
}

#[async_trait]
pub trait PlantIdentifier: Send + Sync {
    /// Most likely species name for a base64-encoded photo.
    async fn identify(&self, image_base64: &str) -> Result<String, AdvisorError>;
}

#[async_trait]
pub trait CareAdvisor: Send + Sync {
    async fn care_for(&self, plant_name: &str) -> Result<RawCare, AdvisorError>;
}

/// Identifier that always answers the same name.
pub struct StaticIdentifier(pub String);

#[async_trait]
impl PlantIdentifier for StaticIdentifier {
    async fn identify(&self, image_base64: &str) -> Result<String, AdvisorError> {
        if image_base64.is_empty() {
            return Err(AdvisorError::EmptyImage);
        }
        Ok(self.0.clone())
    }
}

/// Advisor that skips the model and answers the fallback ranges.
pub struct FallbackCareAdvisor;

#[async_trait]
impl CareAdvisor for FallbackCareAdvisor {
    async fn care_for(&self, _plant_name: &str) -> Result<RawCare, AdvisorError> {
        Ok(fallback_care())
    }
}

pub fn encode_image(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Accepts either bare base64 or a `data:image/...;base64,` URL.
pub fn strip_data_url(image: &str) -> &str {
    match image.split_once(',') {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => image,
    }
}

#[derive(Clone, Debug)]
pub struct ProfileRequest {
    pub image: String,
    pub kind: ProfileKind,
    pub messages: AlertMessages,
}

/// Build a new profile from a photo. Identification failures are returned;
/// advisor failures fall back to conservative defaults.
pub async fn derive_profile(
    identifier: &dyn PlantIdentifier,
    advisor: &dyn CareAdvisor,
    req: ProfileRequest,
) -> Result<PlantProfile, AdvisorError> {
    let payload = strip_data_url(&req.image);
    if payload.is_empty() {
        return Err(AdvisorError::EmptyImage);
    }
    let name = identifier.identify(payload).await?;
    tracing::info!(plant = %name, "plant identified");

    let raw = match advisor.care_for(&name).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(plant = %name, error = %e, "care advisor failed, using fallback");
            fallback_care()
        }
    };

    Ok(PlantProfile {
        id: ProfileId::for_kind(req.kind),
        kind: req.kind,
        name,
        care: apply_safety_limits(&raw),
        image: Some(req.image),
        messages: req.messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingAdvisor;

    #[async_trait]
    impl CareAdvisor for FailingAdvisor {
        async fn care_for(&self, _plant_name: &str) -> Result<RawCare, AdvisorError> {
            Err(AdvisorError::Http("connection refused".into()))
        }
    }

    struct HotHouseAdvisor;

    #[async_trait]
    impl CareAdvisor for HotHouseAdvisor {
        async fn care_for(&self, _plant_name: &str) -> Result<RawCare, AdvisorError> {
            Ok(RawCare {
                moisture_percent: Some(95),
                min_temp: Some(20),
                max_temp: Some(50),
                ..Default::default()
            })
        }
    }

    fn request(kind: ProfileKind) -> ProfileRequest {
        ProfileRequest {
            image: format!("data:image/jpeg;base64,{}", encode_image(b"jpeg")),
            kind,
            messages: AlertMessages::default(),
        }
    }

    #[tokio::test]
    async fn advisor_failure_uses_fallback_ranges() {
        let id = StaticIdentifier("Ocimum basilicum".into());
        let profile = derive_profile(&id, &FailingAdvisor, request(ProfileKind::Sim))
            .await
            .unwrap();
        assert_eq!(profile.name, "Ocimum basilicum");
        assert_eq!(profile.care.moisture_percent, 40);
        assert_eq!(profile.care.min_temp, 18);
        assert_eq!(profile.care.max_temp, 30);
        assert!(profile.id.as_str().starts_with("sim-"));
    }

    #[tokio::test]
    async fn advice_is_clamped_and_real_id_assigned() {
        let id = StaticIdentifier("Monstera".into());
        let profile = derive_profile(&id, &HotHouseAdvisor, request(ProfileKind::Real))
            .await
            .unwrap();
        assert_eq!(profile.id, ProfileId::real());
        assert_eq!(profile.care.moisture_percent, 90);
        assert_eq!(profile.care.max_temp, 45);
    }

    #[tokio::test]
    async fn empty_image_is_rejected() {
        let id = StaticIdentifier("Monstera".into());
        let req = ProfileRequest {
            image: "data:image/png;base64,".into(),
            kind: ProfileKind::Sim,
            messages: AlertMessages::default(),
        };
        assert!(matches!(
            derive_profile(&id, &FallbackCareAdvisor, req).await,
            Err(AdvisorError::EmptyImage)
        ));
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        assert_eq!(strip_data_url("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_url("QUJD"), "QUJD");
    }
}
