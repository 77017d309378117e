//! Motor RAG: compone recuperación, clasificación, confianza y síntesis.
//!
//! Flujo de `answer` (una petición, sin estado compartido mutable):
//!   Idle -> Retrieving -> {RetrievalEmpty | Scoring} -> Synthesizing -> {Done | DoneWithFallback}
//!
//!   1. Se valida la consulta antes de tocar ningún backend.
//!   2. Se toma una instantánea del corpus; una recarga posterior no la afecta.
//!   3. Embedding + búsqueda vectorial (primer punto de suspensión).
//!   4. Relevancia por candidato y confianza sobre todos ellos.
//!   5. Llamada al LLM con el contexto acotado (segundo punto de suspensión).

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ErrorCode, RagError};
use crate::ingest::{CorpusLoader, IngestionSummary};
use crate::models::{
    Article, CorpusStats, EngineInfo, Query, RagResponse, RetrievedCandidate, SearchHit,
    SearchResponse, SimilarArticles, Source,
};
use crate::retriever::Retriever;
use crate::scoring::{self, LOW_CONFIDENCE};
use crate::synthesis::{
    AnswerSynthesizer, EMBEDDING_FAILURE_RESPONSE, LOW_CONFIDENCE_NOTICE, NO_RESULTS_RESPONSE,
};
use crate::vector_store::{Corpus, CorpusHandle};

const SERVICE_TYPE: &str = "RAG (Retrieval-Augmented Generation)";
const COLLECTION_NAME: &str = "articulos_ley_109";
const CAPABILITIES: [&str; 4] = [
    "Búsqueda semántica",
    "Generación de respuestas conversacionales",
    "Citas de artículos específicos",
    "Respuestas contextualizadas",
];

/// Etapas de una petición `answer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Retrieving,
    RetrievalEmpty,
    Scoring,
    Synthesizing,
    Done,
    DoneWithFallback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Retrieving => "retrieving",
            Stage::RetrievalEmpty => "retrieval_empty",
            Stage::Scoring => "scoring",
            Stage::Synthesizing => "synthesizing",
            Stage::Done => "done",
            Stage::DoneWithFallback => "done_with_fallback",
        };
        f.write_str(name)
    }
}

pub struct RagEngine {
    corpus: CorpusHandle,
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
    loader: Option<CorpusLoader>,
    reload_lock: Mutex<()>,
    min_similarity: f64,
    embedding_model: String,
}

impl RagEngine {
    pub fn new(
        corpus: Option<Corpus>,
        retriever: Retriever,
        synthesizer: AnswerSynthesizer,
        min_similarity: f64,
    ) -> Self {
        let embedding_model = retriever.embedding_model().to_string();
        Self {
            corpus: CorpusHandle::new(corpus),
            retriever,
            synthesizer,
            loader: None,
            reload_lock: Mutex::new(()),
            min_similarity,
            embedding_model,
        }
    }

    pub fn with_loader(mut self, loader: CorpusLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Arranque completo: backends desde la configuración y primera carga del
    /// corpus. Si la carga falla el motor arranca sin corpus (no listo).
    pub async fn bootstrap(cfg: &AppConfig) -> Self {
        let embedder = crate::llm::build_embedder(cfg);
        let generator = Arc::new(crate::llm::LlmManager::from_config(cfg));

        let retriever = Retriever::new(embedder.clone(), cfg.embedding_timeout);
        let synthesizer =
            AnswerSynthesizer::new(generator, cfg.generation_timeout, cfg.context_char_budget);
        let loader = CorpusLoader::from_config(cfg, embedder);

        let corpus = match loader.load().await {
            Ok((corpus, _)) => Some(corpus),
            Err(err) => {
                warn!("No se pudo cargar el corpus, el motor arranca sin datos: {err:#}");
                None
            }
        };

        Self::new(corpus, retriever, synthesizer, cfg.min_similarity).with_loader(loader)
    }

    pub fn is_ready(&self) -> bool {
        self.corpus.is_loaded()
    }

    pub fn total_articles(&self) -> usize {
        self.corpus.snapshot().map(|c| c.len()).unwrap_or(0)
    }

    pub fn provider_name(&self) -> &str {
        self.synthesizer.provider_name()
    }

    /// Responde a una consulta. Sólo falla por validación o corpus no cargado;
    /// el resto de fallos se reflejan en el campo `error` de la respuesta.
    pub async fn answer(&self, text: &str, max_articles: i64) -> Result<RagResponse, RagError> {
        let query = Query::new(text, max_articles)?;
        let corpus = self.corpus.snapshot()?;
        let request_id = Uuid::new_v4();

        self.run_pipeline(&corpus, query)
            .instrument(info_span!("answer", %request_id))
            .await
    }

    async fn run_pipeline(&self, corpus: &Corpus, query: Query) -> Result<RagResponse, RagError> {
        let preview: String = query.text.chars().take(50).collect();
        info!("Generando respuesta RAG para: '{preview}'");
        debug!(stage = %Stage::Idle);

        debug!(stage = %Stage::Retrieving);
        let candidates = match self.retrieve(corpus, &query).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!("Fallo en la recuperación: {err}");
                return Ok(degraded_response(query.text, err.code()));
            }
        };

        if candidates.is_empty() {
            debug!(stage = %Stage::RetrievalEmpty);
            debug!(stage = %Stage::Done);
            return Ok(RagResponse {
                query: query.text,
                response: NO_RESULTS_RESPONSE.to_string(),
                sources: Vec::new(),
                confidence: 0.0,
                model_used: None,
                articles_consulted: 0,
                error: None,
            });
        }

        debug!(stage = %Stage::Scoring);
        let sources = build_sources(corpus, &candidates)?;
        let confidence = scoring::confidence_of(&candidates);

        debug!(stage = %Stage::Synthesizing);
        let articles: Vec<&Article> = candidates
            .iter()
            .map(|c| corpus.store.get(c.article_id))
            .collect::<Result<_, _>>()?;
        let synthesis = self.synthesizer.synthesize(&query.text, &articles).await;

        let stage = if synthesis.is_fallback() {
            Stage::DoneWithFallback
        } else {
            Stage::Done
        };
        debug!(stage = %stage);

        let response = if confidence < LOW_CONFIDENCE {
            format!("{LOW_CONFIDENCE_NOTICE}\n\n{}", synthesis.response)
        } else {
            synthesis.response
        };

        info!(
            "Respuesta RAG generada. Artículos consultados: {}, confianza: {confidence:.3}",
            sources.len()
        );

        Ok(RagResponse {
            query: query.text,
            response,
            articles_consulted: sources.len(),
            sources,
            confidence,
            model_used: synthesis.model_used,
            error: synthesis.error,
        })
    }

    /// Búsqueda semántica sin síntesis. Comparte la recuperación con `answer`.
    pub async fn search(&self, text: &str, n_results: i64) -> Result<SearchResponse, RagError> {
        let query = Query::new(text, n_results)?;
        let corpus = self.corpus.snapshot()?;
        let candidates = self.retrieve(&corpus, &query).await?;

        let results = candidates
            .iter()
            .map(|c| search_hit(&corpus, c))
            .collect::<Result<Vec<_>, _>>()?;
        info!("Encontrados {} resultados", results.len());

        Ok(SearchResponse {
            query: query.text,
            results,
        })
    }

    /// Candidatos por encima del umbral `min_similarity` (comparación estricta).
    async fn retrieve(&self, corpus: &Corpus, query: &Query) -> Result<Vec<RetrievedCandidate>, RagError> {
        let mut candidates = self.retriever.retrieve(corpus, query).await?;
        candidates.retain(|c| c.similarity_score > self.min_similarity);
        Ok(candidates)
    }

    pub fn article(&self, id: u32) -> Result<Article, RagError> {
        let corpus = self.corpus.snapshot()?;
        corpus.store.get(id).cloned()
    }

    /// Artículos parecidos a uno dado, usando su propio embedding como consulta.
    pub fn similar(&self, id: u32, n_results: i64) -> Result<SimilarArticles, RagError> {
        if n_results <= 0 {
            return Err(RagError::Validation(
                "El número de resultados debe ser positivo".to_string(),
            ));
        }
        let corpus = self.corpus.snapshot()?;
        let article = corpus.store.get(id)?.clone();
        let vector = corpus
            .index
            .vector(id)
            .ok_or(RagError::ArticleNotFound(id))?;

        let wanted = usize::try_from(n_results).unwrap_or(usize::MAX);
        let neighbors = corpus.index.nearest_neighbors(vector, wanted.saturating_add(1))?;
        let similar_articles = neighbors
            .into_iter()
            .filter(|(other, _)| *other != id)
            .take(wanted)
            .map(|(other, score)| search_hit(&corpus, &RetrievedCandidate::new(other, score)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SimilarArticles {
            query_article: article,
            similar_articles,
        })
    }

    /// Metadatos estáticos del motor; no hace ningún cálculo.
    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            service_type: SERVICE_TYPE.to_string(),
            llm_provider: self.synthesizer.provider_name().to_string(),
            model: self.synthesizer.model_name().to_string(),
            embedding_model: self.embedding_model.clone(),
            total_articles: self.total_articles(),
            capabilities: CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn stats(&self) -> Result<CorpusStats, RagError> {
        let corpus = self.corpus.snapshot()?;
        Ok(CorpusStats {
            collection_name: COLLECTION_NAME.to_string(),
            total_documents: corpus.len(),
            model_name: corpus.embedding_model.clone(),
            embedding_dimensions: corpus.index.dimensions(),
            cache_path: corpus.cache_path.clone(),
            loaded_at: corpus.loaded_at,
        })
    }

    /// Reconstruye el corpus desde disco y lo sustituye de una vez.
    /// Las recargas concurrentes se serializan.
    pub async fn reload(&self) -> Result<IngestionSummary> {
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("El motor no tiene cargador de corpus configurado"))?;

        let _guard = self.reload_lock.lock().await;
        let (corpus, summary) = loader.load().await?;
        self.corpus.replace(corpus);
        info!("Corpus recargado. {summary}");
        Ok(summary)
    }
}

fn build_sources(corpus: &Corpus, candidates: &[RetrievedCandidate]) -> Result<Vec<Source>, RagError> {
    candidates
        .iter()
        .map(|c| {
            let article = corpus.store.get(c.article_id)?;
            Ok(Source {
                id: article.id,
                contenido: article.content.clone(),
                similarity_score: c.similarity_score,
                relevance: scoring::classify(c),
            })
        })
        .collect()
}

fn search_hit(corpus: &Corpus, candidate: &RetrievedCandidate) -> Result<SearchHit, RagError> {
    let article = corpus.store.get(candidate.article_id)?;
    Ok(SearchHit {
        id: article.id,
        contenido: article.content.clone(),
        similarity_score: candidate.similarity_score,
        distance: candidate.distance,
    })
}

fn degraded_response(query: String, error: Option<ErrorCode>) -> RagResponse {
    RagResponse {
        query,
        response: EMBEDDING_FAILURE_RESPONSE.to_string(),
        sources: Vec::new(),
        confidence: 0.0,
        model_used: None,
        articles_consulted: 0,
        error: error.or(Some(ErrorCode::EmbeddingFailure)),
    }
}
