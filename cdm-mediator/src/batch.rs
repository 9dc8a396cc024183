//! Concurrent NDJSON batch processing.
//!
//! Each input line is routed on its own task, bounded by a semaphore. The
//! manager is shared read-mostly behind a `RwLock`. Output lines come out in
//! input order; a line that cannot be processed yields an error record
//! instead of stopping the batch.

use std::collections::VecDeque;
use std::sync::Arc;

use cdm_core::{DispatchState, InteropManager, MessageStandard, ProcessingResult};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;

use crate::config::MediatorConfig;
use crate::error::MediatorResult;

/// A rejected input line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineError {
    pub line: usize,
    pub error: String,
}

/// Per-line result, written as one JSON object.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LineOutcome {
    Processed(Box<ProcessingResult>),
    Rejected(LineError),
}

/// Totals over a batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub dispatched: usize,
    pub unrouted: usize,
    pub rejected: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &LineOutcome) {
        match outcome {
            LineOutcome::Processed(result) => {
                self.processed += 1;
                match result.state {
                    DispatchState::Dispatched => self.dispatched += 1,
                    _ => self.unrouted += 1,
                }
            }
            LineOutcome::Rejected(_) => self.rejected += 1,
        }
    }
}

/// Routes batches of messages through a shared manager.
pub struct BatchProcessor {
    manager: Arc<RwLock<InteropManager>>,
    standard: MessageStandard,
    semaphore: Arc<Semaphore>,
    max_line_size: usize,
}

impl BatchProcessor {
    /// Processor bounded by the configured concurrency.
    pub fn new(manager: Arc<RwLock<InteropManager>>, config: &MediatorConfig) -> Self {
        Self {
            manager,
            standard: config.source_standard,
            semaphore: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            max_line_size: config.max_line_size,
        }
    }

    /// Parse and route one line.
    pub async fn process_line(
        manager: &RwLock<InteropManager>,
        standard: MessageStandard,
        line_no: usize,
        line: &str,
    ) -> LineOutcome {
        let message = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(message)) => message,
            Ok(other) => {
                return LineOutcome::Rejected(LineError {
                    line: line_no,
                    error: format!("expected a JSON object, got {}", cdm_core::message::type_name(&other)),
                })
            }
            Err(e) => {
                return LineOutcome::Rejected(LineError {
                    line: line_no,
                    error: format!("invalid JSON: {e}"),
                })
            }
        };

        let manager = manager.read().await;
        let result = manager.process_message_with_routing(&message, standard);
        tracing::debug!(line = line_no, id = %result.id, state = ?result.state, "processed message");
        LineOutcome::Processed(Box::new(result))
    }

    fn spawn_line(&self, line_no: usize, line: String, permit: tokio::sync::OwnedSemaphorePermit) -> JoinHandle<LineOutcome> {
        let manager = Arc::clone(&self.manager);
        let standard = self.standard;
        tokio::spawn(async move {
            let outcome = Self::process_line(&manager, standard, line_no, &line).await;
            drop(permit);
            outcome
        })
    }

    /// Read NDJSON from `reader`, write one result per line to `writer`.
    /// Blank lines are skipped.
    pub async fn run<R, W>(&self, reader: R, writer: &mut W) -> MediatorResult<BatchSummary>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        let mut pending: VecDeque<JoinHandle<LineOutcome>> = VecDeque::new();
        let mut summary = BatchSummary::default();
        let mut line_no = 0;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            if line.len() > self.max_line_size {
                let outcome = LineOutcome::Rejected(LineError {
                    line: line_no,
                    error: format!("line exceeds {} bytes", self.max_line_size),
                });
                pending.push_back(tokio::spawn(async move { outcome }));
                continue;
            }

            let permit = Arc::clone(&self.semaphore).acquire_owned().await?;
            pending.push_back(self.spawn_line(line_no, line, permit));

            // flush whatever is already finished at the head
            while pending.front().is_some_and(JoinHandle::is_finished) {
                if let Some(handle) = pending.pop_front() {
                    write_outcome(writer, &handle.await?, &mut summary).await?;
                }
            }
        }

        while let Some(handle) = pending.pop_front() {
            write_outcome(writer, &handle.await?, &mut summary).await?;
        }
        writer.flush().await?;

        tracing::info!(
            processed = summary.processed,
            dispatched = summary.dispatched,
            unrouted = summary.unrouted,
            rejected = summary.rejected,
            "batch complete"
        );
        Ok(summary)
    }
}

async fn write_outcome<W: AsyncWrite + Unpin>(
    writer: &mut W,
    outcome: &LineOutcome,
    summary: &mut BatchSummary,
) -> MediatorResult<()> {
    summary.record(outcome);
    let mut line = serde_json::to_vec(outcome)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(concurrency: usize) -> BatchProcessor {
        let manager = Arc::new(RwLock::new(InteropManager::new()));
        let config = MediatorConfig::default().with_concurrency(concurrency);
        BatchProcessor::new(manager, &config)
    }

    fn output_lines(bytes: &[u8]) -> Vec<Value> {
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn output_preserves_input_order() {
        let mut input = String::new();
        for i in 0..40 {
            input.push_str(&format!(
                "{{\"message_type\": \"J2.0\", \"latitude\": {}.0, \"track_id\": \"T{i}\"}}\n",
                i % 80
            ));
        }
        let mut out = Vec::new();
        let summary = processor(4).run(input.as_bytes(), &mut out).await.unwrap();
        assert_eq!(summary.processed, 40);
        assert_eq!(summary.dispatched, 40);

        let lines = output_lines(&out);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(line["original_message"]["track_id"], format!("T{i}"));
            assert_eq!(line["routed_messages"][0]["message"]["sysid"], format!("T{i}"));
        }
    }

    #[tokio::test]
    async fn bad_lines_become_error_records() {
        let input = "{\"message_type\": \"J2.0\", \"latitude\": 1.0}\nnot json\n\n[1, 2]\n";
        let mut out = Vec::new();
        let summary = processor(2).run(input.as_bytes(), &mut out).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.rejected, 2);

        let lines = output_lines(&out);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["line"], 2);
        assert!(lines[1]["error"].as_str().unwrap().starts_with("invalid JSON"));
        assert_eq!(lines[2]["line"], 4);
    }

    #[tokio::test]
    async fn oversized_line_is_rejected() {
        let manager = Arc::new(RwLock::new(InteropManager::new()));
        let config = MediatorConfig::default().with_max_line_size(16);
        let processor = BatchProcessor::new(manager, &config);
        let input = "{\"message_type\": \"J2.0\", \"latitude\": 1.0}\n";
        let mut out = Vec::new();
        let summary = processor.run(input.as_bytes(), &mut out).await.unwrap();
        assert_eq!(summary.rejected, 1);
    }

    #[tokio::test]
    async fn unrouted_messages_are_counted() {
        let input = "{\"message_type\": \"HEARTBEAT\", \"type\": 2}\n";
        let mut out = Vec::new();
        let summary = processor(1).run(input.as_bytes(), &mut out).await.unwrap();
        assert_eq!(summary.unrouted, 1);
        let lines = output_lines(&out);
        assert_eq!(lines[0]["state"], "UNROUTED");
    }

    #[tokio::test]
    async fn registrations_are_visible_to_later_batches() {
        let manager = Arc::new(RwLock::new(InteropManager::new()));
        let processor = BatchProcessor::new(Arc::clone(&manager), &MediatorConfig::default());
        manager
            .write()
            .await
            .add_routing_rule("J3\\.", vec![MessageStandard::MavLink], None, 1)
            .unwrap();
        manager.write().await.create_custom_mapping(
            "J3.2",
            "TRACK",
            MessageStandard::MilStd6016,
            MessageStandard::MavLink,
            vec![cdm_core::FieldMapping::new("track_number", "id")],
        );

        let mut out = Vec::new();
        processor
            .run("{\"message_type\": \"J3.2\", \"track_number\": 9}\n".as_bytes(), &mut out)
            .await
            .unwrap();
        let lines = output_lines(&out);
        assert_eq!(lines[0]["routed_messages"][0]["message"]["id"], 9);
    }
}
