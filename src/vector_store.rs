//! Índice vectorial en memoria sobre los embeddings de los artículos.
//!
//! API pública:
//!   - `EmbeddingIndex::build` / `EmbeddingIndex::nearest_neighbors`
//!   - `Corpus`: instantánea inmutable (almacén + índice).
//!   - `CorpusHandle`: punto de intercambio atómico de instantáneas.

use std::cmp::Ordering;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::article_store::ArticleStore;
use crate::error::RagError;

/// Similitud coseno. Vectores vacíos, de distinta longitud o nulos dan 0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, na, nb) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f64, 0.0f64, 0.0f64), |(d, aa, bb), (x, y)| {
            (d + (x * y), aa + (x * x), bb + (y * y))
        });

    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

/// Normaliza a norma L2 unitaria. El vector nulo se devuelve tal cual.
pub fn normalize(v: &[f64]) -> Vec<f64> {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    article_id: u32,
    vector: Vec<f64>,
}

/// Índice exhaustivo (fuerza bruta) con los vectores normalizados en la construcción.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

impl EmbeddingIndex {
    pub fn build(embeddings: Vec<(u32, Vec<f64>)>) -> Result<Self, RagError> {
        let dimensions = match embeddings.first() {
            Some((_, v)) if !v.is_empty() => v.len(),
            Some(_) => {
                return Err(RagError::InvalidCorpus(
                    "embedding vacío en el índice".to_string(),
                ))
            }
            None => 0,
        };

        let mut entries = Vec::with_capacity(embeddings.len());
        for (article_id, vector) in embeddings {
            if vector.len() != dimensions {
                return Err(RagError::InvalidCorpus(format!(
                    "el embedding del artículo {article_id} tiene {} dimensiones, se esperaban {dimensions}",
                    vector.len()
                )));
            }
            entries.push(IndexEntry {
                article_id,
                vector: normalize(&vector),
            });
        }

        Ok(Self {
            dimensions,
            entries,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Vector almacenado (normalizado) de un artículo.
    pub fn vector(&self, article_id: u32) -> Option<&[f64]> {
        self.entries
            .iter()
            .find(|e| e.article_id == article_id)
            .map(|e| e.vector.as_slice())
    }

    pub fn article_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|e| e.article_id)
    }

    /// Los `k` artículos más cercanos, por similitud descendente y, a igual
    /// similitud, por id ascendente. Las similitudes se recortan a [0, 1].
    pub fn nearest_neighbors(&self, query: &[f64], k: usize) -> Result<Vec<(u32, f64)>, RagError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            return Err(RagError::EmbeddingFailure(format!(
                "el embedding de la consulta tiene {} dimensiones, el índice {}",
                query.len(),
                self.dimensions
            )));
        }

        let query = normalize(query);
        let mut scored: Vec<(u32, f64)> = self
            .entries
            .iter()
            .map(|e| {
                let sim = cosine_similarity(&query, &e.vector);
                let sim = if sim.is_nan() { 0.0 } else { sim.clamp(0.0, 1.0) };
                (e.article_id, sim)
            })
            .collect();

        scored.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        scored.truncate(k);
        Ok(scored)
    }
}

/// Instantánea completa del corpus: nunca se modifica una vez construida.
#[derive(Debug)]
pub struct Corpus {
    pub store: ArticleStore,
    pub index: EmbeddingIndex,
    pub embedding_model: String,
    pub cache_path: Option<String>,
    pub loaded_at: DateTime<Utc>,
}

impl Corpus {
    /// Comprueba que almacén e índice cubren exactamente los mismos artículos.
    pub fn new(
        store: ArticleStore,
        index: EmbeddingIndex,
        embedding_model: impl Into<String>,
    ) -> Result<Self, RagError> {
        if store.len() != index.len() {
            return Err(RagError::InvalidCorpus(format!(
                "{} artículos pero {} embeddings",
                store.len(),
                index.len()
            )));
        }
        if let Some(missing) = index.article_ids().find(|id| !store.contains(*id)) {
            return Err(RagError::InvalidCorpus(format!(
                "embedding para el artículo inexistente {missing}"
            )));
        }
        Ok(Self {
            store,
            index,
            embedding_model: embedding_model.into(),
            cache_path: None,
            loaded_at: Utc::now(),
        })
    }

    pub fn with_cache_path(mut self, path: Option<String>) -> Self {
        self.cache_path = path;
        self
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }
}

/// Punto compartido desde el que cada petición toma su instantánea.
///
/// El cerrojo sólo protege el intercambio del `Arc`; las lecturas del índice
/// ocurren fuera de él, sobre la instantánea clonada.
#[derive(Debug, Default)]
pub struct CorpusHandle {
    current: RwLock<Option<Arc<Corpus>>>,
}

impl CorpusHandle {
    pub fn new(corpus: Option<Corpus>) -> Self {
        Self {
            current: RwLock::new(corpus.map(Arc::new)),
        }
    }

    pub fn snapshot(&self) -> Result<Arc<Corpus>, RagError> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        guard.clone().ok_or(RagError::CorpusUnavailable)
    }

    /// Sustituye el corpus completo; las peticiones en curso conservan el anterior.
    pub fn replace(&self, corpus: Corpus) {
        let next = Arc::new(corpus);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(next);
    }

    pub fn is_loaded(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Article;

    fn index(entries: &[(u32, &[f64])]) -> EmbeddingIndex {
        EmbeddingIndex::build(entries.iter().map(|(id, v)| (*id, v.to_vec())).collect()).unwrap()
    }

    #[test]
    fn cosine_works_for_unit_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn neighbors_are_sorted_and_bounded_by_k() {
        let idx = index(&[
            (1, &[0.0, 1.0]),
            (2, &[1.0, 0.0]),
            (3, &[0.7, 0.7]),
        ]);
        let hits = idx.nearest_neighbors(&[1.0, 0.1], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 2);
        assert_eq!(hits[1].0, 3);
        assert!(hits[0].1 >= hits[1].1);

        assert_eq!(idx.nearest_neighbors(&[1.0, 0.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn ties_are_broken_by_ascending_id() {
        let idx = index(&[(9, &[1.0, 0.0]), (4, &[2.0, 0.0]), (6, &[1.0, 0.0])]);
        let ids: Vec<u32> = idx
            .nearest_neighbors(&[1.0, 0.0], 3)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![4, 6, 9]);
    }

    #[test]
    fn opposite_vectors_clamp_to_zero() {
        let idx = index(&[(1, &[-1.0, 0.0])]);
        let hits = idx.nearest_neighbors(&[1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].1, 0.0);
    }

    #[test]
    fn dimension_mismatch_is_an_embedding_failure() {
        let idx = index(&[(1, &[1.0, 0.0])]);
        assert!(matches!(
            idx.nearest_neighbors(&[1.0, 0.0, 0.0], 1),
            Err(RagError::EmbeddingFailure(_))
        ));
        assert!(EmbeddingIndex::build(vec![(1, vec![1.0]), (2, vec![1.0, 2.0])]).is_err());
    }

    #[test]
    fn corpus_requires_matching_store_and_index() {
        let store = ArticleStore::from_articles(vec![Article {
            id: 1,
            content: "a".into(),
        }])
        .unwrap();
        let idx = index(&[(2, &[1.0])]);
        assert!(Corpus::new(store, idx, "m").is_err());
    }

    #[test]
    fn handle_swaps_whole_snapshots() {
        let handle = CorpusHandle::new(None);
        assert_eq!(handle.snapshot().unwrap_err(), RagError::CorpusUnavailable);

        let build = |content: &str| {
            let store = ArticleStore::from_articles(vec![Article {
                id: 1,
                content: content.into(),
            }])
            .unwrap();
            Corpus::new(store, index(&[(1, &[1.0])]), "m").unwrap()
        };

        handle.replace(build("antes"));
        let old = handle.snapshot().unwrap();
        handle.replace(build("después"));

        assert_eq!(old.store.get(1).unwrap().content, "antes");
        assert_eq!(handle.snapshot().unwrap().store.get(1).unwrap().content, "después");
    }
}
