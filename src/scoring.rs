//! Clasificación de relevancia por candidato y confianza agregada de una respuesta.
//!
//! Umbrales de relevancia (inclusivos por abajo):
//!   - `alta`  : similitud >= 0.70
//!   - `media` : 0.50 <= similitud < 0.70
//!   - `baja`  : similitud < 0.50
//!
//! Confianza: con las similitudes ordenadas `s1 >= s2 >= ... >= sn` y pesos por
//! posición `w1 = 1`, `wk = 0.25 * 0.5^(k-2)`,
//!
//! ```text
//! confianza = 1 - Π (1 - wk * sk)
//! ```
//!
//! Es un "noisy-OR" con pesos decrecientes: la mejor coincidencia domina y el
//! resto aporta cada vez menos. Cada factor decrece al subir cualquier
//! estadístico de orden, así que añadir o mejorar un candidato nunca baja la
//! confianza y quitar el mejor nunca la sube.

use serde::Serialize;

use crate::models::RetrievedCandidate;

pub const HIGH_RELEVANCE: f64 = 0.70;
pub const MEDIUM_RELEVANCE: f64 = 0.50;

/// Por debajo de esta confianza la respuesta se acompaña de un aviso.
pub const LOW_CONFIDENCE: f64 = 0.30;

const SECONDARY_WEIGHT: f64 = 0.25;
const RANK_DECAY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceTier {
    Alta,
    Media,
    Baja,
}

impl RelevanceTier {
    pub fn from_score(similarity_score: f64) -> Self {
        if similarity_score >= HIGH_RELEVANCE {
            Self::Alta
        } else if similarity_score >= MEDIUM_RELEVANCE {
            Self::Media
        } else {
            Self::Baja
        }
    }
}

pub fn classify(candidate: &RetrievedCandidate) -> RelevanceTier {
    RelevanceTier::from_score(candidate.similarity_score)
}

/// Confianza en [0, 1] a partir de las similitudes; 0 para un conjunto vacío.
pub fn confidence(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }

    let mut sorted: Vec<f64> = scores
        .iter()
        .map(|s| if s.is_nan() { 0.0 } else { s.clamp(0.0, 1.0) })
        .collect();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut miss = 1.0;
    let mut weight = 1.0;
    for (rank, score) in sorted.iter().enumerate() {
        if rank == 1 {
            weight = SECONDARY_WEIGHT;
        } else if rank > 1 {
            weight *= RANK_DECAY;
        }
        miss *= 1.0 - weight * score;
    }

    (1.0 - miss).clamp(0.0, 1.0)
}

pub fn confidence_of(candidates: &[RetrievedCandidate]) -> f64 {
    let scores: Vec<f64> = candidates.iter().map(|c| c.similarity_score).collect();
    confidence(&scores)
}
