use std::collections::HashMap;

use async_trait::async_trait;
use planter_types::{ActuatorCommand, PlantProfile, ProfileId};
use serde::{de::DeserializeOwned, Serialize};

use crate::{sort_profiles, ActuatorError, ActuatorSink, ProfileStore, StoreError};

/// Node the planter board polls for control bytes.
pub const CONTROL_NODE: &str = "toAltera";
/// Node mirroring the committed actuator flags for dashboards.
pub const STATUS_NODE: &str = "smart_planter/controls";
pub const PROFILES_NODE: &str = "saved_planters";

/// Minimal REST client for a Firebase-style realtime database
/// (`<base>/<path>.json[?auth=<token>]`).
#[derive(Clone)]
pub struct RtdbClient {
    client: reqwest::Client,
    base_url: String,
    auth: Option<String>,
}

#[derive(Debug)]
pub struct RtdbError {
    pub status: Option<u16>,
    pub message: String,
}

impl RtdbClient {
    pub fn new(base_url: impl Into<String>, auth: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    fn url(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        match &self.auth {
            Some(token) => format!("{}/{}.json?auth={}", self.base_url, path, token),
            None => format!("{}/{}.json", self.base_url, path),
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, RtdbError> {
        let resp = req.send().await.map_err(|e| RtdbError {
            status: None,
            message: e.to_string(),
        })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RtdbError {
                status: Some(status.as_u16()),
                message: body,
            });
        }
        Ok(resp)
    }

    pub async fn put<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<(), RtdbError> {
        self.send(self.client.put(self.url(path)).json(value)).await?;
        Ok(())
    }

    pub async fn patch<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<(), RtdbError> {
        self.send(self.client.patch(self.url(path)).json(value)).await?;
        Ok(())
    }

    /// `null` at the node decodes to `None`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, RtdbError> {
        let resp = self.send(self.client.get(self.url(path))).await?;
        resp.json::<Option<T>>().await.map_err(|e| RtdbError {
            status: None,
            message: e.to_string(),
        })
    }

    pub async fn delete(&self, path: &str) -> Result<(), RtdbError> {
        self.send(self.client.delete(self.url(path))).await?;
        Ok(())
    }
}

impl From<RtdbError> for ActuatorError {
    fn from(e: RtdbError) -> Self {
        match e.status {
            Some(code) => ActuatorError::Status(code),
            None => ActuatorError::Transport(e.message),
        }
    }
}

impl From<RtdbError> for StoreError {
    fn from(e: RtdbError) -> Self {
        match e.status {
            Some(code) => StoreError::Remote(format!("status {code}: {}", e.message)),
            None => StoreError::Remote(e.message),
        }
    }
}

/// Drives the board through the control node, then mirrors the flag.
///
/// The control-node PUT is the actuation: once it succeeds the board has
/// switched, so a failed mirror update is logged and the write still counts
/// as confirmed.
pub struct RtdbActuatorSink {
    rtdb: RtdbClient,
}

impl RtdbActuatorSink {
    pub fn new(rtdb: RtdbClient) -> Self {
        Self { rtdb }
    }
}

#[async_trait]
impl ActuatorSink for RtdbActuatorSink {
    async fn apply(&self, command: ActuatorCommand) -> Result<(), ActuatorError> {
        self.rtdb.put(CONTROL_NODE, &command.wire_code()).await?;
        let mut status = HashMap::new();
        status.insert(command.actuator.status_field(), u8::from(command.on));
        if let Err(e) = self.rtdb.patch(STATUS_NODE, &status).await {
            tracing::warn!(
                command = %command,
                status = ?e.status,
                error = %e.message,
                "status mirror update failed"
            );
        }
        Ok(())
    }
}

pub struct RtdbProfileStore {
    rtdb: RtdbClient,
}

impl RtdbProfileStore {
    pub fn new(rtdb: RtdbClient) -> Self {
        Self { rtdb }
    }

    fn node(id: &ProfileId) -> String {
        format!("{PROFILES_NODE}/{}", id.as_str())
    }
}

#[async_trait]
impl ProfileStore for RtdbProfileStore {
    async fn put(&self, profile: PlantProfile) -> Result<(), StoreError> {
        self.rtdb.put(&Self::node(&profile.id), &profile).await?;
        Ok(())
    }

    async fn get(&self, id: &ProfileId) -> Result<Option<PlantProfile>, StoreError> {
        Ok(self.rtdb.get(&Self::node(id)).await?)
    }

    async fn remove(&self, id: &ProfileId) -> Result<bool, StoreError> {
        let existed = self.get(id).await?.is_some();
        if existed {
            self.rtdb.delete(&Self::node(id)).await?;
        }
        Ok(existed)
    }

    async fn list(&self) -> Result<Vec<PlantProfile>, StoreError> {
        let all: Option<HashMap<String, PlantProfile>> = self.rtdb.get(PROFILES_NODE).await?;
        let mut all: Vec<PlantProfile> = all.unwrap_or_default().into_values().collect();
        sort_profiles(&mut all);
        Ok(all)
    }
}
