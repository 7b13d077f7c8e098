use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use hotelrag_core::config::{GenerationConfig, RagConfig};
use hotelrag_core::types::{CategorySummary, Intent, MatchedSummary, PriorTurn};
use hotelrag_core::traits::VectorCollection;
use hotelrag_core::{CommentStore, Error, ModelError};
use hotelrag_hybrid::{HybridRetriever, RetrievalOutcome, RetrievalSources, RouteReport};
use hotelrag_intent::{HypotheticalWriter, IntentPipeline};
use hotelrag_models::ModelClients;
use hotelrag_rank::Ranker;
use hotelrag_text::InvertedIndex;

use crate::events::{DonePayload, StageTimings, StreamEvent};
use crate::format::References;
use crate::generator::{GenerationContext, ResponseGenerator};

#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub enable_generation: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { enable_generation: true }
    }
}

/// Read-only corpus data loaded once at startup.
pub struct CorpusData {
    pub index: Arc<InvertedIndex>,
    pub store: Arc<CommentStore>,
    pub comments: Arc<dyn VectorCollection>,
    pub reverse_queries: Arc<dyn VectorCollection>,
    pub summaries: Arc<Vec<CategorySummary>>,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub intent: Intent,
    pub references: References,
    pub summaries: Vec<MatchedSummary>,
    pub hypotheticals: BTreeMap<usize, Vec<String>>,
    pub routes: Vec<RouteReport>,
    pub answer: Option<String>,
    pub timing: StageTimings,
}

/// Retrieval and ranking result for one analyzed question.
struct Grounding {
    outcome: RetrievalOutcome,
    references: References,
}

/// Request pipeline: intent, retrieval, ranking, then generation.
pub struct RagEngine {
    intent: IntentPipeline,
    retriever: HybridRetriever,
    ranker: Ranker,
    generator: ResponseGenerator,
    cfg: GenerationConfig,
}

/// Stream sender that goes quiet once the request is cancelled or the
/// receiver is gone.
struct Emitter {
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl Emitter {
    /// A send parked on a full channel loses to cancellation, so nothing is
    /// enqueued once the token fires.
    async fn send(&self, event: StreamEvent) -> bool {
        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return false,
            sent = self.tx.send(event) => sent,
        };
        if sent.is_err() {
            self.cancel.cancel();
            return false;
        }
        true
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

impl RagEngine {
    pub fn new(intent: IntentPipeline, retriever: HybridRetriever, ranker: Ranker, generator: ResponseGenerator, cfg: GenerationConfig) -> Self {
        Self { intent, retriever, ranker, generator, cfg }
    }

    /// Wires model clients and corpus data according to `cfg`.
    pub fn assemble(clients: ModelClients, data: CorpusData, cfg: &RagConfig) -> Self {
        let intent = IntentPipeline::new(clients.recognizer, clients.detector, clients.expander, &cfg.intent);
        let sources = RetrievalSources {
            index: data.index,
            store: data.store,
            comments: data.comments,
            reverse_queries: data.reverse_queries,
            summaries: data.summaries,
            embedder: clients.embedder,
            hypothetical: Arc::new(HypotheticalWriter::new(clients.hypothetical, cfg.retrieval.hypothetical_per_query)),
        };
        Self::new(
            intent,
            HybridRetriever::new(sources, cfg.retrieval.clone()),
            Ranker::new(clients.reranker, cfg.ranking.clone()),
            ResponseGenerator::new(clients.generator, cfg.generation.clone()),
            cfg.generation.clone(),
        )
    }

    pub fn store(&self) -> &CommentStore {
        &self.retriever.sources().store
    }

    /// Trimmed question, or a validation error.
    pub fn validate(&self, question: &str) -> Result<String, Error> {
        let q = question.trim();
        if q.is_empty() {
            return Err(Error::Validation("query must not be empty".into()));
        }
        let chars = q.chars().count();
        if chars > self.cfg.max_query_chars {
            return Err(Error::Validation(format!("query is {} characters, limit is {}", chars, self.cfg.max_query_chars)));
        }
        Ok(q.to_string())
    }

    async fn ground(&self, question: &str, intent: &Intent, cancel: &CancellationToken, timing: &mut StageTimings) -> Result<Grounding, Error> {
        if !intent.needs_retrieval {
            return Ok(Grounding { outcome: RetrievalOutcome::default(), references: References::default() });
        }
        let started = Instant::now();
        let outcome = self.retriever.retrieve(intent, cancel).await?;
        timing.retrieval_ms = elapsed_ms(started);
        timing.routes = outcome.route_timings();

        let started = Instant::now();
        let ranked = self.ranker.rank(question, &outcome.candidates, self.store(), intent.time_sensitivity, cancel).await?;
        timing.ranking_ms = elapsed_ms(started);

        let references = References::build(&ranked, &outcome, self.store());
        if let Some(e) = outcome.failure() {
            tracing::warn!(error = %e, "answering without evidence");
        }
        Ok(Grounding { outcome, references })
    }

    fn context<'a>(&self, question: &'a str, prior: Option<&'a PriorTurn>, intent: &'a Intent, g: &'a Grounding) -> GenerationContext<'a> {
        GenerationContext {
            question,
            prior,
            intent,
            evidence: &g.references.comments,
            summaries: &g.outcome.summaries,
            retrieval_failed: g.references.retrieval_failed,
            as_of: self.ranker.as_of(),
        }
    }

    /// Runs the whole pipeline and returns the answer with its evidence.
    pub async fn query(&self, question: &str, prior: Option<&PriorTurn>, options: QueryOptions, cancel: &CancellationToken) -> Result<QueryResult, Error> {
        let question = self.validate(question)?;
        let total = Instant::now();
        let mut timing = StageTimings::default();

        let started = Instant::now();
        let intent = self.intent.analyze(&question, prior, cancel).await?;
        timing.intent_ms = elapsed_ms(started);

        let grounding = self.ground(&question, &intent, cancel, &mut timing).await?;

        let answer = if options.enable_generation {
            let started = Instant::now();
            let ctx = self.context(&question, prior, &intent, &grounding);
            let answer = self.generator.generate(&ctx, cancel).await.map_err(|e| match e {
                ModelError::Cancelled => Error::Model(ModelError::Cancelled),
                other => Error::Generation(other),
            })?;
            timing.generation_ms = elapsed_ms(started);
            Some(answer)
        } else {
            None
        };
        timing.total_ms = elapsed_ms(total);
        tracing::info!(
            needs_retrieval = intent.needs_retrieval,
            evidence = grounding.references.comments.len(),
            total_ms = timing.total_ms,
            "query answered"
        );

        let Grounding { outcome, references } = grounding;
        Ok(QueryResult {
            intent,
            references,
            summaries: outcome.summaries,
            hypotheticals: outcome.hypotheticals,
            routes: outcome.reports,
            answer,
            timing,
        })
    }

    /// Validates synchronously, then runs the pipeline on a task and streams
    /// its events. Cancelling `cancel` (or dropping the receiver) stops the
    /// task and the upstream generation call; no event follows cancellation.
    pub fn query_stream(
        self: &Arc<Self>,
        question: &str,
        prior: Option<PriorTurn>,
        options: QueryOptions,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<StreamEvent>, Error> {
        let question = self.validate(question)?;
        let (tx, rx) = mpsc::channel(self.cfg.stream_buffer.max(1));
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let emit = Emitter { tx, cancel: cancel.clone() };
            if let Err(e) = engine.drive(&question, prior.as_ref(), options, &emit).await {
                if cancel.is_cancelled() {
                    tracing::debug!("stream cancelled");
                } else {
                    tracing::warn!(error = %e, "stream failed");
                    emit.send(StreamEvent::Error { message: e.to_string() }).await;
                }
            }
        });
        Ok(rx)
    }

    async fn drive(&self, question: &str, prior: Option<&PriorTurn>, options: QueryOptions, emit: &Emitter) -> Result<(), Error> {
        let cancel = &emit.cancel;
        let total = Instant::now();
        let mut timing = StageTimings::default();

        let started = Instant::now();
        let intent = self.intent.analyze(question, prior, cancel).await?;
        timing.intent_ms = elapsed_ms(started);
        if !emit.send(StreamEvent::Intent { data: intent.clone() }).await {
            return Ok(());
        }

        let grounding = self.ground(question, &intent, cancel, &mut timing).await?;
        if !emit.send(StreamEvent::References { data: grounding.references.clone() }).await {
            return Ok(());
        }

        if options.enable_generation {
            let started = Instant::now();
            let ctx = self.context(question, prior, &intent, &grounding);
            let mut fragments = self.generator.generate_stream(&ctx, cancel).await.map_err(Error::Generation)?;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    next = fragments.next() => next,
                };
                match next {
                    Some(Ok(fragment)) if fragment.is_empty() => continue,
                    Some(Ok(fragment)) => {
                        timing.first_chunk_ms.get_or_insert_with(|| elapsed_ms(total));
                        if !emit.send(StreamEvent::Chunk { content: fragment }).await {
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => return Err(Error::Generation(e)),
                    None => break,
                }
            }
            timing.generation_ms = elapsed_ms(started);
        }

        timing.total_ms = elapsed_ms(total);
        tracing::info!(
            needs_retrieval = intent.needs_retrieval,
            evidence = grounding.references.comments.len(),
            total_ms = timing.total_ms,
            "stream finished"
        );
        emit.send(StreamEvent::Done { data: DonePayload { timing } }).await;
        Ok(())
    }
}
