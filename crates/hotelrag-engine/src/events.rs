use std::collections::BTreeMap;

use serde::Serialize;

use hotelrag_core::types::{Intent, Route};

use crate::format::References;

/// Per-stage wall-clock timings in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub intent_ms: u64,
    pub retrieval_ms: u64,
    pub ranking_ms: u64,
    pub generation_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_chunk_ms: Option<u64>,
    pub total_ms: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub routes: BTreeMap<Route, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DonePayload {
    pub timing: StageTimings,
}

/// Events of a streamed answer, in emission order: one `Intent`, one
/// `References`, any number of `Chunk`s, then `Done` or `Error`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Intent { data: Intent },
    References { data: References },
    Chunk { content: String },
    Done { data: DonePayload },
    Error { message: String },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Intent { .. } => "intent",
            Self::References { .. } => "references",
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
