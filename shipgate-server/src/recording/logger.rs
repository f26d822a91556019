use super::types::RecordedEvent;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::{error, info};

/// Appends recorded events to a JSONL file from a background task.
#[derive(Clone)]
pub struct RecordingLogger {
    sender: mpsc::UnboundedSender<RecordedEvent>,
}

impl RecordingLogger {
    /// Must be called inside a tokio runtime.
    pub fn new(log_file_path: PathBuf) -> Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            if let Err(e) = Self::writer_task(log_file_path, receiver).await {
                error!("Recording logger failed: {:#}", e);
            }
        });

        Ok(Self { sender })
    }

    pub fn record(&self, event: RecordedEvent) {
        if self.sender.send(event).is_err() {
            error!("Failed to send event to recording logger: receiver dropped");
        }
    }

    async fn writer_task(
        log_file_path: PathBuf,
        mut receiver: mpsc::UnboundedReceiver<RecordedEvent>,
    ) -> Result<()> {
        if let Some(parent) = log_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file_path)
            .await
            .with_context(|| format!("Failed to open {}", log_file_path.display()))?;
        let mut out = BufWriter::new(file);

        info!("Recording events to: {}", log_file_path.display());

        while let Some(event) = receiver.recv().await {
            let mut line = match serde_json::to_vec(&event) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to serialize {} event: {}", event.operation, e);
                    continue;
                }
            };
            line.push(b'\n');
            // Flushed per event.
            let written = async {
                out.write_all(&line).await?;
                out.flush().await
            };
            if let Err(e) = written.await {
                error!("Failed to append to {}: {}", log_file_path.display(), e);
            }
        }

        info!("Recording writer task shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Direction, EventType};
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_events_are_appended_as_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("recordings.jsonl");
        let logger = RecordingLogger::new(path.clone()).unwrap();

        for n in 0..2 {
            logger.record(RecordedEvent {
                timestamp: "2024-01-01T00:00:00Z".to_string(),
                correlation_id: format!("c{}", n),
                event_type: EventType::SlackApiCall,
                direction: Direction::Request,
                operation: "POST /api/chat.postMessage".to_string(),
                data: serde_json::Value::Null,
                metadata: HashMap::new(),
            });
        }

        let mut contents = String::new();
        for _ in 0..50 {
            contents = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            if contents.lines().count() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let lines: Vec<RecordedEvent> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].correlation_id, "c1");
    }
}
