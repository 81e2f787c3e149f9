//! Decision loop wiring the link to the ensemble
//!
//! The supervisor owns no protocol or inference logic of its own. It
//! subscribes to the link bus and, per event:
//!
//! - sensor frame: run every predictor slot, take the majority vote, and
//!   send the winning label back over the link as a command
//! - feedback frame: persist it through the feedback sink
//!
//! Indecisive votes are not sent; the board keeps its last command until
//! the ensemble produces a real label again.

use std::sync::Arc;

use coordination::{vote, SharedEnsembleCoordinator};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::{FeedbackFrame, SensorFrame};
use crate::feedback_log::{FeedbackEntry, FeedbackSink};
use crate::session::{LinkEvent, LinkSession, SharedLinkBus};

/// Event-driven bridge between the link session and the ensemble
pub struct SessionSupervisor {
    session: Arc<LinkSession>,
    coordinator: SharedEnsembleCoordinator,
    feedback: Arc<dyn FeedbackSink>,
    events: SharedLinkBus,
}

impl SessionSupervisor {
    pub fn new(
        session: Arc<LinkSession>,
        coordinator: SharedEnsembleCoordinator,
        feedback: Arc<dyn FeedbackSink>,
        events: SharedLinkBus,
    ) -> Self {
        Self {
            session,
            coordinator,
            feedback,
            events,
        }
    }

    /// Subscribe to the link bus and run the decision loop until the bus
    /// closes
    pub fn spawn(self) -> JoinHandle<()> {
        let mut rx = self.events.subscribe();

        tokio::spawn(async move {
            info!("Decision loop started");
            loop {
                match rx.recv().await {
                    Ok(LinkEvent::Sensor { frame }) => self.decide(&frame).await,
                    Ok(LinkEvent::Feedback { frame, .. }) => self.persist(&frame),
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        // Sensor frames supersede each other, so catching up
                        // from the newest event is correct.
                        warn!(missed, "Decision loop lagged behind the link bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            info!("Decision loop stopped");
        })
    }

    async fn decide(&self, frame: &SensorFrame) {
        let predictions = self
            .coordinator
            .predict_all([frame.temperature, frame.humidity]);
        let result = vote(&predictions);

        if !result.decisive {
            debug!(
                temperature = frame.temperature,
                humidity = frame.humidity,
                "No usable predictions; holding last command"
            );
            return;
        }

        debug!(
            temperature = frame.temperature,
            humidity = frame.humidity,
            decision = %result.label,
            "Ensemble decision"
        );

        if let Err(e) = self.session.send(&result.label).await {
            warn!(error = %e, "Failed to send decision to the board");
        }
    }

    fn persist(&self, frame: &FeedbackFrame) {
        if let Err(e) = self.feedback.record(&FeedbackEntry::from_frame(frame)) {
            warn!(error = %e, "Failed to persist feedback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use coordination::ensemble::dataset::{Dataset, DatasetResult};
    use coordination::{
        DatasetSource, EnsembleBus, EnsembleCoordinator, Predictor, PredictorRegistry, Profile,
    };
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::time::timeout;

    use crate::codec::ProtocolCodec;
    use crate::feedback_log::{FeedbackError, FeedbackResult};
    use crate::session::{LinkBus, LinkConfig};
    use crate::transport::{ConnResult, LinkConnector, TransportPair};

    /// Predictor that always answers with a fixed label
    struct Fixed(&'static str);

    impl Predictor for Fixed {
        fn train(&mut self, _data: &Dataset) -> coordination::ensemble::predictor::PredictorResult<()> {
            Ok(())
        }

        fn predict(
            &self,
            _observation: coordination::Observation,
        ) -> coordination::ensemble::predictor::PredictorResult<String> {
            Ok(self.0.to_string())
        }
    }

    struct TinySource;

    impl DatasetSource for TinySource {
        fn load(&self, _profile: Profile) -> DatasetResult<Dataset> {
            let mut data = Dataset::default();
            data.push([20.0, 50.0], "comfortable".to_string());
            Ok(data)
        }
    }

    #[derive(Default)]
    struct MemorySink {
        entries: Mutex<Vec<FeedbackEntry>>,
    }

    impl FeedbackSink for MemorySink {
        fn record(&self, entry: &FeedbackEntry) -> FeedbackResult<()> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    struct DuplexConnector(Mutex<Option<tokio::io::DuplexStream>>);

    #[async_trait::async_trait]
    impl LinkConnector for DuplexConnector {
        async fn open(&self) -> ConnResult<TransportPair> {
            Ok(TransportPair::from_stream(
                self.0.lock().unwrap().take().unwrap(),
            ))
        }
    }

    fn trained_coordinator(labels: &[&'static str]) -> SharedEnsembleCoordinator {
        let mut registry = PredictorRegistry::new();
        for (i, label) in labels.iter().enumerate() {
            let label = *label;
            registry.register(format!("slot_{i}"), move || Box::new(Fixed(label)));
        }

        EnsembleCoordinator::new(registry, Arc::new(TinySource), EnsembleBus::new().shared())
            .shared()
    }

    async fn running_session(bus: SharedLinkBus) -> (Arc<LinkSession>, tokio::io::DuplexStream) {
        let (host_end, board_end) = tokio::io::duplex(4096);
        let session = Arc::new(LinkSession::new(
            Arc::new(DuplexConnector(Mutex::new(Some(host_end)))),
            ProtocolCodec::new(),
            LinkConfig {
                read_timeout: Duration::from_millis(10),
                stop_timeout: Duration::from_secs(1),
            },
            bus,
        ));
        session.connect().await.unwrap();
        session.start().await.unwrap();
        (session, board_end)
    }

    #[tokio::test]
    async fn test_decisive_vote_is_sent_to_the_board() {
        let bus = LinkBus::new().shared();
        let coordinator = trained_coordinator(&["hot", "hot", "cold"]);
        coordinator
            .switch_profile(Profile::Normal)
            .unwrap()
            .await
            .unwrap();

        let (session, board) = running_session(bus.clone()).await;
        let sink = Arc::new(MemorySink::default());
        let _loop = SessionSupervisor::new(session.clone(), coordinator, sink, bus).spawn();

        let (read_half, mut write_half) = tokio::io::split(board);
        tokio::io::AsyncWriteExt::write_all(&mut write_half, b"T:31.0,H:60.0\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line.as_deref(), Some("hot"));

        session.stop().await;
    }

    #[tokio::test]
    async fn test_indecisive_vote_sends_nothing() {
        let bus = LinkBus::new().shared();
        // Nothing trained, so every slot abstains.
        let coordinator = trained_coordinator(&["hot"]);

        let (session, board) = running_session(bus.clone()).await;
        let sink = Arc::new(MemorySink::default());
        let _loop = SessionSupervisor::new(session.clone(), coordinator, sink, bus).spawn();

        let (read_half, mut write_half) = tokio::io::split(board);
        tokio::io::AsyncWriteExt::write_all(&mut write_half, b"T:31.0,H:60.0\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let outcome = timeout(Duration::from_millis(300), lines.next_line()).await;
        assert!(outcome.is_err(), "no command expected, got {outcome:?}");

        session.stop().await;
    }

    #[tokio::test]
    async fn test_feedback_is_persisted() {
        let bus = LinkBus::new().shared();
        let coordinator = trained_coordinator(&["hot"]);

        let (session, board) = running_session(bus.clone()).await;
        let sink = Arc::new(MemorySink::default());
        let _loop =
            SessionSupervisor::new(session.clone(), coordinator, sink.clone(), bus).spawn();

        let (_read_half, mut write_half) = tokio::io::split(board);
        tokio::io::AsyncWriteExt::write_all(&mut write_half, b"USER_FEEDBACK:22.5,48,hot\n")
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if !sink.entries.lock().unwrap().is_empty() {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "feedback never arrived");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].feeling, "hot");
        assert_eq!(entries[0].temperature, 22.5);
        drop(entries);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_kill_the_loop() {
        struct BrokenSink;
        impl FeedbackSink for BrokenSink {
            fn record(&self, _entry: &FeedbackEntry) -> FeedbackResult<()> {
                Err(FeedbackError::Io {
                    path: "nowhere".into(),
                    source: std::io::Error::other("disk on fire"),
                })
            }
        }

        let bus = LinkBus::new().shared();
        let coordinator = trained_coordinator(&["hot"]);
        coordinator
            .switch_profile(Profile::Normal)
            .unwrap()
            .await
            .unwrap();

        let (session, board) = running_session(bus.clone()).await;
        let _loop =
            SessionSupervisor::new(session.clone(), coordinator, Arc::new(BrokenSink), bus).spawn();

        let (read_half, mut write_half) = tokio::io::split(board);
        tokio::io::AsyncWriteExt::write_all(
            &mut write_half,
            b"USER_FEEDBACK:22.5,48,hot\nT:31.0,H:60.0\n",
        )
        .await
        .unwrap();

        // The loop survives the sink failure and still serves decisions.
        let mut lines = BufReader::new(read_half).lines();
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line.as_deref(), Some("hot"));

        session.stop().await;
    }
}
