use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::stream;
use planter_policy::{normalize, sanitize};
use planter_types::{RawTelemetry, SensorReading};
use tokio::sync::{mpsc, Mutex};

use crate::{ReadingStream, SensorSource, SourceError};

const BOARD_KEYS: [&str; 5] = ["A", "B", "C", "TEMP", "HUMIDITY"];

/// Decode one pushed frame. Board frames (`A`/`B`/`C`/`TEMP`/`HUMIDITY`) are
/// normalized; anything else is read as a [`SensorReading`] and sanitized.
pub fn parse_frame(value: serde_json::Value) -> Result<SensorReading, SourceError> {
    let is_board_frame = value
        .as_object()
        .map(|o| BOARD_KEYS.iter().any(|k| o.contains_key(*k)))
        .ok_or_else(|| SourceError::BadFrame("expected a JSON object".into()))?;

    if is_board_frame {
        let raw: RawTelemetry =
            serde_json::from_value(value).map_err(|e| SourceError::BadFrame(e.to_string()))?;
        Ok(normalize(&raw))
    } else {
        let reading: SensorReading =
            serde_json::from_value(value).map_err(|e| SourceError::BadFrame(e.to_string()))?;
        Ok(sanitize(&reading))
    }
}

/// Source fed through an in-process channel.
/// Can be subscribed once.
pub struct ChannelSensorSource {
    rx: Mutex<Option<mpsc::Receiver<SensorReading>>>,
}

impl ChannelSensorSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<SensorReading>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                rx: Mutex::new(Some(rx)),
            },
        )
    }
}

#[async_trait]
impl SensorSource for ChannelSensorSource {
    async fn subscribe(&self) -> Result<ReadingStream, SourceError> {
        let rx = self.rx.lock().await.take().ok_or(SourceError::AlreadySubscribed)?;
        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|r| (Ok(r), rx))
        })))
    }
}

enum Lines {
    File(PathBuf),
    Text(String),
}

/// One JSON frame per line; blank lines and `#` comments are skipped.
pub struct JsonLinesSensorSource {
    lines: Lines,
}

impl JsonLinesSensorSource {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            lines: Lines::File(path.as_ref().to_path_buf()),
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            lines: Lines::Text(text.into()),
        }
    }
}

#[async_trait]
impl SensorSource for JsonLinesSensorSource {
    async fn subscribe(&self) -> Result<ReadingStream, SourceError> {
        let text = match &self.lines {
            Lines::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| SourceError::Io(e.to_string()))?,
            Lines::Text(text) => text.clone(),
        };
        let frames: Vec<Result<SensorReading, SourceError>> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| {
                serde_json::from_str::<serde_json::Value>(l)
                    .map_err(|e| SourceError::BadFrame(e.to_string()))
                    .and_then(parse_frame)
            })
            .collect();
        Ok(Box::pin(stream::iter(frames)))
    }
}
