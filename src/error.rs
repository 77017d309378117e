//! Taxonomía de errores del motor RAG.
//!
//! Sólo `CorpusUnavailable` y `Validation` llegan como fallos a la frontera
//! HTTP desde `answer`; el resto se degrada en una `RagResponse` válida.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RagError {
    #[error("El corpus de artículos no está cargado")]
    CorpusUnavailable,

    #[error("Consulta inválida: {0}")]
    Validation(String),

    #[error("Artículo {0} no encontrado")]
    ArticleNotFound(u32),

    #[error("Error generando el embedding: {0}")]
    EmbeddingFailure(String),

    #[error("El modelo de lenguaje no respondió a tiempo ({0}s)")]
    GenerationTimeout(u64),

    #[error("Modelo de lenguaje no disponible: {0}")]
    GenerationUnavailable(String),

    #[error("Corpus inválido: {0}")]
    InvalidCorpus(String),
}

impl RagError {
    /// Código estable que acompaña a una respuesta degradada.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::EmbeddingFailure(_) => Some(ErrorCode::EmbeddingFailure),
            Self::GenerationTimeout(_) => Some(ErrorCode::GenerationTimeout),
            Self::GenerationUnavailable(_) => Some(ErrorCode::GenerationUnavailable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    EmbeddingFailure,
    GenerationTimeout,
    GenerationUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_degradable_errors_carry_a_code() {
        assert_eq!(
            RagError::GenerationTimeout(30).code(),
            Some(ErrorCode::GenerationTimeout)
        );
        assert_eq!(
            RagError::EmbeddingFailure("x".into()).code(),
            Some(ErrorCode::EmbeddingFailure)
        );
        assert_eq!(RagError::CorpusUnavailable.code(), None);
        assert_eq!(RagError::Validation("vacía".into()).code(), None);
    }

    #[test]
    fn codes_serialize_as_snake_case() {
        let json = serde_json::to_string(&ErrorCode::GenerationUnavailable).unwrap();
        assert_eq!(json, "\"generation_unavailable\"");
    }
}
