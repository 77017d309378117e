//! Recuperación: embedding de la consulta + búsqueda en el índice.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::RagError;
use crate::llm::Embedder;
use crate::models::{Query, RetrievedCandidate};
use crate::vector_store::Corpus;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    embedding_timeout: Duration,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, embedding_timeout: Duration) -> Self {
        Self {
            embedder,
            embedding_timeout,
        }
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    /// Devuelve `min(query.max_articles, corpus.len())` candidatos ordenados.
    /// Un fallo o un timeout del embedding se devuelve tal cual, sin reintentos.
    pub async fn retrieve(
        &self,
        corpus: &Corpus,
        query: &Query,
    ) -> Result<Vec<RetrievedCandidate>, RagError> {
        let query_vec = match timeout(self.embedding_timeout, self.embedder.embed_query(&query.text)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Timeout de {}s generando el embedding de la consulta",
                    self.embedding_timeout.as_secs()
                );
                return Err(RagError::EmbeddingFailure(format!(
                    "timeout de {}s",
                    self.embedding_timeout.as_secs()
                )));
            }
        };

        let neighbors = corpus.index.nearest_neighbors(&query_vec, query.max_articles)?;
        debug!("Recuperados {} candidatos", neighbors.len());

        Ok(neighbors
            .into_iter()
            .map(|(article_id, score)| RetrievedCandidate::new(article_id, score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{corpus_from, ScriptedEmbedder};

    #[tokio::test]
    async fn returns_min_of_limit_and_corpus_size() {
        let corpus = corpus_from(&[(1, vec![1.0, 0.0]), (2, vec![0.0, 1.0]), (3, vec![0.6, 0.8])]);
        let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0]));
        let retriever = Retriever::new(embedder.clone(), Duration::from_secs(1));

        let two = retriever
            .retrieve(&corpus, &Query::new("q", 2).unwrap())
            .await
            .unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].article_id, 1);
        assert_eq!(two[1].article_id, 3);

        let all = retriever
            .retrieve(&corpus, &Query::new("q", 50).unwrap())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].similarity_score >= w[1].similarity_score));
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test]
    async fn embedding_errors_are_surfaced_without_retry() {
        let corpus = corpus_from(&[(1, vec![1.0, 0.0])]);
        let embedder = Arc::new(ScriptedEmbedder::failing());
        let retriever = Retriever::new(embedder.clone(), Duration::from_secs(1));

        let err = retriever
            .retrieve(&corpus, &Query::new("q", 5).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure(_)));
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn slow_embedding_times_out() {
        let corpus = corpus_from(&[(1, vec![1.0, 0.0])]);
        let embedder =
            Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0]).with_delay(Duration::from_secs(5)));
        let retriever = Retriever::new(embedder, Duration::from_millis(20));

        let err = retriever
            .retrieve(&corpus, &Query::new("q", 5).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure(_)));
    }
}
