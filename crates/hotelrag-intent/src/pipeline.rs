use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use hotelrag_core::config::IntentConfig;
use hotelrag_core::traits::ChatModel;
use hotelrag_core::types::{Intent, PriorTurn};
use hotelrag_core::ModelError;

use crate::detector::IntentDetector;
use crate::expander::IntentExpander;
use crate::recognizer::IntentRecognizer;

/// Recognizer gate, then detector and expander side by side.
pub struct IntentPipeline {
    recognizer: IntentRecognizer,
    detector: IntentDetector,
    expander: IntentExpander,
}

impl IntentPipeline {
    pub fn new(
        recognizer: Arc<dyn ChatModel>,
        detector: Arc<dyn ChatModel>,
        expander: Arc<dyn ChatModel>,
        cfg: &IntentConfig,
    ) -> Self {
        Self {
            recognizer: IntentRecognizer::new(recognizer),
            detector: IntentDetector::new(detector, cfg),
            expander: IntentExpander::new(expander, cfg.max_sub_queries),
        }
    }

    pub fn detector(&self) -> &IntentDetector { &self.detector }

    /// The only error is cancellation; every model failure has a fallback.
    pub async fn analyze(&self, question: &str, prior: Option<&PriorTurn>, cancel: &CancellationToken) -> Result<Intent, ModelError> {
        if !self.recognizer.recognize(question, prior, cancel).await? {
            return Ok(Intent::direct());
        }
        let (detection, sub_queries) = tokio::join!(
            self.detector.detect(question, cancel),
            self.expander.expand(question, prior, cancel),
        );
        let detection = detection?;
        Ok(Intent {
            needs_retrieval: true,
            room_type: detection.room_type,
            time_sensitivity: detection.time_sensitivity,
            sub_queries: sub_queries?,
        })
    }
}
