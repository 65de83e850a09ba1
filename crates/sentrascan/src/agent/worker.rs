use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error};

use crate::detect::EntityDetector;

use super::work::{AgentResult, WorkItem};

/// Inbound message for one agent. `Stop` is the poison pill: the receiving
/// agent exits without processing further items.
pub enum AgentMessage {
    Work(WorkItem),
    Stop,
}

/// Body of one agent thread.
///
/// Pulls exactly one item at a time, classifies it, and publishes the result.
/// A failing or panicking chunk is reported through `AgentResult::error`;
/// only a closed channel or the stop sentinel ends the loop.
pub(crate) fn run_agent(
    agent_id: usize,
    receiver: Receiver<AgentMessage>,
    sender: Sender<AgentResult>,
    detector: Box<dyn EntityDetector>,
) {
    debug!("Agent {} started", agent_id);

    loop {
        let item = match receiver.recv() {
            Ok(AgentMessage::Work(item)) => item,
            Ok(AgentMessage::Stop) => {
                debug!("Agent {} received stop sentinel", agent_id);
                break;
            }
            Err(_) => {
                debug!("Agent {} work channel disconnected", agent_id);
                break;
            }
        };

        let result = classify(&item, detector.as_ref());
        if sender.send(result).is_err() {
            error!("Agent {} failed to send result, shutting down", agent_id);
            break;
        }
    }

    debug!("Agent {} stopped", agent_id);
}

fn classify(item: &WorkItem, detector: &dyn EntityDetector) -> AgentResult {
    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| detector.detect(&item.text)));
    let processing_ms = start.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(Ok(entities)) => AgentResult {
            file_path: item.file_path.clone(),
            chunk_index: item.chunk_index,
            entities,
            processing_ms,
            error: None,
        },
        Ok(Err(err)) => AgentResult::failed(item, err.to_string(), processing_ms),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            AgentResult::failed(item, format!("classification panicked: {reason}"), processing_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::work::WorkMetadata;
    use crate::detect::{DetectedEntity, EntityDetector};
    use crate::error::DetectError;
    use crossbeam_channel::bounded;

    struct FixedDetector;

    impl EntityDetector for FixedDetector {
        fn detect(&self, _text: &str) -> Result<Vec<DetectedEntity>, DetectError> {
            Ok(vec![DetectedEntity {
                entity_type: "EMAIL".to_string(),
                start: 0,
                end: 5,
                confidence: 1.0,
            }])
        }
    }

    struct FailingDetector;

    impl EntityDetector for FailingDetector {
        fn detect(&self, _text: &str) -> Result<Vec<DetectedEntity>, DetectError> {
            Err(DetectError::Failed("bad chunk".to_string()))
        }
    }

    struct PanickingDetector;

    impl EntityDetector for PanickingDetector {
        fn detect(&self, _text: &str) -> Result<Vec<DetectedEntity>, DetectError> {
            panic!("model buffer overrun");
        }
    }

    fn item(index: usize) -> WorkItem {
        WorkItem::new("/data/a.txt", "text", index, 3, WorkMetadata::default())
    }

    #[test]
    fn test_agent_processes_and_stops_on_sentinel() {
        let (work_tx, work_rx) = bounded(4);
        let (result_tx, result_rx) = bounded(4);

        work_tx.send(AgentMessage::Work(item(0))).unwrap();
        work_tx.send(AgentMessage::Stop).unwrap();
        // Queued after the sentinel, must never be processed
        work_tx.send(AgentMessage::Work(item(1))).unwrap();

        run_agent(0, work_rx, result_tx, Box::new(FixedDetector));

        let result = result_rx.try_recv().unwrap();
        assert_eq!(result.chunk_index, 0);
        assert_eq!(result.entities.len(), 1);
        assert!(result_rx.try_recv().is_err());
    }

    #[test]
    fn test_detector_error_becomes_result_error() {
        let (work_tx, work_rx) = bounded(2);
        let (result_tx, result_rx) = bounded(2);

        work_tx.send(AgentMessage::Work(item(0))).unwrap();
        drop(work_tx);

        run_agent(1, work_rx, result_tx, Box::new(FailingDetector));

        let result = result_rx.try_recv().unwrap();
        assert!(result.error.as_deref().unwrap().contains("bad chunk"));
        assert!(result.entities.is_empty());
    }

    #[test]
    fn test_detector_panic_does_not_kill_agent() {
        let (work_tx, work_rx) = bounded(4);
        let (result_tx, result_rx) = bounded(4);

        work_tx.send(AgentMessage::Work(item(0))).unwrap();
        work_tx.send(AgentMessage::Work(item(1))).unwrap();
        drop(work_tx);

        run_agent(2, work_rx, result_tx, Box::new(PanickingDetector));

        // Both chunks produce error results despite the panics
        let first = result_rx.try_recv().unwrap();
        let second = result_rx.try_recv().unwrap();
        assert!(first.error.as_deref().unwrap().contains("panicked"));
        assert!(second.error.as_deref().unwrap().contains("model buffer overrun"));
    }
}
