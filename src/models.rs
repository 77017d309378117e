//! Modelos de dominio: artículos, consultas, candidatos recuperados y las
//! respuestas que el motor entrega a la capa HTTP.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, RagError};
use crate::scoring::RelevanceTier;

/// Longitud máxima (en caracteres) de una consulta.
pub const MAX_QUERY_CHARS: usize = 500;
pub const DEFAULT_MAX_ARTICLES: i64 = 5;

/// Un artículo numerado de la ley. Inmutable una vez cargado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: u32,
    #[serde(rename = "contenido")]
    pub content: String,
}

/// Consulta ya validada.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub text: String,
    pub max_articles: usize,
}

impl Query {
    /// Valida texto y límite antes de hacer cualquier trabajo de recuperación.
    pub fn new(text: &str, max_articles: i64) -> Result<Self, RagError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(RagError::Validation(
                "La consulta no puede estar vacía".to_string(),
            ));
        }
        if trimmed.chars().count() > MAX_QUERY_CHARS {
            return Err(RagError::Validation(format!(
                "La consulta supera los {MAX_QUERY_CHARS} caracteres"
            )));
        }
        if max_articles <= 0 {
            return Err(RagError::Validation(
                "El número de artículos debe ser positivo".to_string(),
            ));
        }
        Ok(Self {
            text: trimmed.to_string(),
            max_articles: usize::try_from(max_articles).unwrap_or(usize::MAX),
        })
    }
}

/// Resultado de la búsqueda vectorial para un artículo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievedCandidate {
    pub article_id: u32,
    pub similarity_score: f64,
    pub distance: f64,
}

impl RetrievedCandidate {
    pub fn new(article_id: u32, similarity_score: f64) -> Self {
        let similarity_score = similarity_score.clamp(0.0, 1.0);
        Self {
            article_id,
            similarity_score,
            distance: 1.0 - similarity_score,
        }
    }
}

/// Fuente citada en una respuesta RAG.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub id: u32,
    pub contenido: String,
    pub similarity_score: f64,
    pub relevance: RelevanceTier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagResponse {
    pub query: String,
    pub response: String,
    pub sources: Vec<Source>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub articles_consulted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: u32,
    pub contenido: String,
    pub similarity_score: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarArticles {
    pub query_article: Article,
    pub similar_articles: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineInfo {
    pub service_type: String,
    pub llm_provider: String,
    pub model: String,
    pub embedding_model: String,
    pub total_articles: usize,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database_ready: bool,
    pub total_articles: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rag_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<String>,
}

/// Estadísticas de la colección cargada.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusStats {
    pub collection_name: String,
    pub total_documents: usize,
    pub model_name: String,
    pub embedding_dimensions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<String>,
    pub loaded_at: DateTime<Utc>,
}
