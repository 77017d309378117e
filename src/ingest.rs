//! Carga del corpus: lee el JSON de artículos, calcula (o reutiliza de la
//! caché en disco) los embeddings y construye una instantánea `Corpus`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::article_store::ArticleStore;
use crate::config::AppConfig;
use crate::llm::Embedder;
use crate::models::Article;
use crate::vector_store::{Corpus, EmbeddingIndex};

const EMBED_BATCH_SIZE: usize = 64;
const EMBED_CONCURRENCY: usize = 4;

/// Resumen de una carga del corpus.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestionSummary {
    pub articles_loaded: usize,
    pub articles_embedded: usize,
    pub from_cache: bool,
}

impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} artículos cargados, {} embeddings calculados{}.",
            self.articles_loaded,
            self.articles_embedded,
            if self.from_cache { " (caché reutilizada)" } else { "" }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    id: u32,
    content_hash: String,
    embedding: Vec<f64>,
}

/// Fichero de caché de embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingCache {
    model: String,
    dimensions: usize,
    created_at: DateTime<Utc>,
    entries: Vec<CacheEntry>,
}

impl EmbeddingCache {
    /// Sólo es válida si el modelo coincide y cubre exactamente los mismos
    /// artículos con el mismo contenido.
    fn matches(&self, model: &str, store: &ArticleStore) -> bool {
        if self.model != model || self.entries.len() != store.len() {
            return false;
        }
        self.entries.iter().zip(store.all()).all(|(entry, article)| {
            entry.id == article.id
                && entry.content_hash == content_hash(&article.content)
                && entry.embedding.len() == self.dimensions
        })
    }
}

/// Huella FNV-1a del contenido de un artículo.
pub fn content_hash(text: &str) -> String {
    let mut h: u64 = 1469598103934665603;
    for b in text.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211);
    }
    format!("{h:016x}")
}

pub struct CorpusLoader {
    articles_path: PathBuf,
    cache_path: Option<PathBuf>,
    embedder: Arc<dyn Embedder>,
}

impl CorpusLoader {
    pub fn new(articles_path: PathBuf, cache_path: Option<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            articles_path,
            cache_path,
            embedder,
        }
    }

    pub fn from_config(cfg: &AppConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self::new(cfg.articles_path.clone(), cfg.embeddings_cache.clone(), embedder)
    }

    /// Construye un corpus completo; no toca ninguna instantánea existente.
    pub async fn load(&self) -> Result<(Corpus, IngestionSummary)> {
        let articles = read_articles(&self.articles_path).await?;
        // Se valida antes de gastar llamadas de embedding.
        let store = ArticleStore::from_articles(articles)?;
        let model = self.embedder.model_name().to_string();

        let mut summary = IngestionSummary {
            articles_loaded: store.len(),
            ..Default::default()
        };

        let cached = match &self.cache_path {
            Some(path) => read_cache(path).await.filter(|c| c.matches(&model, &store)),
            None => None,
        };

        let embeddings: Vec<(u32, Vec<f64>)> = match cached {
            Some(cache) => {
                info!("Reutilizando {} embeddings de la caché", cache.entries.len());
                summary.from_cache = true;
                cache.entries.into_iter().map(|e| (e.id, e.embedding)).collect()
            }
            None => {
                let embeddings = self.embed_articles(&store).await?;
                summary.articles_embedded = embeddings.len();
                if let Some(path) = &self.cache_path {
                    if let Err(err) = write_cache(path, &model, &store, &embeddings).await {
                        warn!("No se pudo escribir la caché de embeddings en {}: {err}", path.display());
                    }
                }
                embeddings
            }
        };

        let index = EmbeddingIndex::build(embeddings)?;
        let corpus = Corpus::new(store, index, model)?
            .with_cache_path(self.cache_path.as_ref().map(|p| p.display().to_string()));

        info!("Corpus cargado. {summary}");
        Ok((corpus, summary))
    }

    async fn embed_articles(&self, store: &ArticleStore) -> Result<Vec<(u32, Vec<f64>)>> {
        info!("Creando embeddings para {} artículos", store.len());
        let embedder = &self.embedder;

        let articles: Vec<&Article> = store.all().collect();
        let batches: Vec<Vec<String>> = articles
            .chunks(EMBED_BATCH_SIZE)
            .map(|chunk| chunk.iter().map(|a| a.content.clone()).collect())
            .collect();

        let vectors: Vec<Vec<Vec<f64>>> = stream::iter(batches)
            .map(|batch| async move {
                let expected = batch.len();
                let vectors = embedder.embed_texts(batch).await?;
                if vectors.len() != expected {
                    return Err(anyhow!(
                        "Número de embeddings ({}) distinto al número de artículos ({expected})",
                        vectors.len()
                    ));
                }
                Ok::<_, anyhow::Error>(vectors)
            })
            .buffered(EMBED_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(articles
            .iter()
            .map(|a| a.id)
            .zip(vectors.into_iter().flatten())
            .collect())
    }
}

/// Lee el fichero JSON `[{"id": 1, "contenido": "..."}, ...]`.
pub async fn read_articles(path: &Path) -> Result<Vec<Article>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("No se pudo leer el corpus {}", path.display()))?;
    let articles: Vec<Article> = serde_json::from_str(&raw)
        .with_context(|| format!("JSON de artículos inválido en {}", path.display()))?;
    if articles.is_empty() {
        return Err(anyhow!("El corpus {} no contiene artículos", path.display()));
    }
    info!("Cargados {} artículos desde {}", articles.len(), path.display());
    Ok(articles)
}

async fn read_cache(path: &Path) -> Option<EmbeddingCache> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(_) => return None,
    };
    match serde_json::from_str::<EmbeddingCache>(&raw) {
        Ok(cache) => Some(cache),
        Err(err) => {
            warn!("Caché de embeddings ilegible en {}: {err}", path.display());
            None
        }
    }
}

async fn write_cache(
    path: &Path,
    model: &str,
    store: &ArticleStore,
    embeddings: &[(u32, Vec<f64>)],
) -> Result<()> {
    let cache = EmbeddingCache {
        model: model.to_string(),
        dimensions: embeddings.first().map(|(_, v)| v.len()).unwrap_or(0),
        created_at: Utc::now(),
        entries: store
            .all()
            .zip(embeddings)
            .map(|(article, (id, embedding))| CacheEntry {
                id: *id,
                content_hash: content_hash(&article.content),
                embedding: embedding.clone(),
            })
            .collect(),
    };
    let json = serde_json::to_string(&cache).context("serializar la caché de embeddings")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("escribir {}", path.display()))?;
    info!("Caché de embeddings guardada en {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashEmbedder;
    use crate::testing::{write_articles, ScriptedEmbedder, TempDir};

    #[tokio::test]
    async fn loads_articles_and_builds_index() {
        let dir = TempDir::new();
        let path = dir.path("articulos.json");
        write_articles(
            &path,
            &[(2, "velocidad máxima en zona urbana"), (1, "definiciones generales")],
        );

        let loader = CorpusLoader::new(path, None, Arc::new(HashEmbedder::new(32)));
        let (corpus, summary) = loader.load().await.unwrap();

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.index.dimensions(), 32);
        assert_eq!(corpus.embedding_model, "hash-32");
        assert_eq!(summary.articles_embedded, 2);
        assert!(!summary.from_cache);
    }

    #[tokio::test]
    async fn cache_from_another_model_is_ignored() {
        let dir = TempDir::new();
        let path = dir.path("articulos.json");
        let cache = dir.path("cache.json");
        write_articles(&path, &[(1, "uno"), (2, "dos")]);

        let first = CorpusLoader::new(path.clone(), Some(cache.clone()), Arc::new(HashEmbedder::new(16)));
        let (_, summary) = first.load().await.unwrap();
        assert!(!summary.from_cache);
        assert!(cache.exists());

        let embedder = Arc::new(ScriptedEmbedder::failing());
        let second = CorpusLoader::new(path, Some(cache), embedder.clone());
        // El nombre del modelo no coincide ("scripted" frente a "hash-16"), así que
        // la caché se ignora y el embedder que falla hace fallar la carga.
        assert!(second.load().await.is_err());
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn cache_is_ignored_when_content_changes() {
        let dir = TempDir::new();
        let path = dir.path("articulos.json");
        let cache = dir.path("cache.json");
        write_articles(&path, &[(1, "uno"), (2, "dos")]);

        let loader = CorpusLoader::new(path.clone(), Some(cache.clone()), Arc::new(HashEmbedder::new(16)));
        loader.load().await.unwrap();
        let (_, reused) = loader.load().await.unwrap();
        assert!(reused.from_cache);

        write_articles(&path, &[(1, "uno"), (2, "dos, modificado")]);
        let (_, rebuilt) = loader.load().await.unwrap();
        assert!(!rebuilt.from_cache);
        assert_eq!(rebuilt.articles_embedded, 2);
    }

    #[tokio::test]
    async fn embeds_in_batches() {
        let dir = TempDir::new();
        let path = dir.path("articulos.json");
        let contents: Vec<String> = (1..=150).map(|i| format!("artículo número {i}")).collect();
        let articles: Vec<(u32, &str)> = contents
            .iter()
            .enumerate()
            .map(|(i, c)| (i as u32 + 1, c.as_str()))
            .collect();
        write_articles(&path, &articles);

        let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0]));
        let loader = CorpusLoader::new(path, None, embedder.clone());
        let (corpus, _) = loader.load().await.unwrap();

        assert_eq!(corpus.len(), 150);
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn missing_or_invalid_files_are_errors() {
        let dir = TempDir::new();
        let loader = CorpusLoader::new(dir.path("nope.json"), None, Arc::new(HashEmbedder::new(8)));
        assert!(loader.load().await.is_err());

        let bad = dir.path("bad.json");
        std::fs::write(&bad, "[{\"id\": 1, \"contenido\": \"a\"}, {\"id\": 1, \"contenido\": \"b\"}]").unwrap();
        let loader = CorpusLoader::new(bad, None, Arc::new(HashEmbedder::new(8)));
        assert!(loader.load().await.is_err());
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 16);
    }
}
