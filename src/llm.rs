//! Abstracción sobre Rig para los proveedores de embeddings y de chat.
//!
//! El motor sólo conoce los traits `Embedder` y `Generator`; aquí viven las
//! implementaciones para Mistral AI y OpenAI, y un embedder local por hashing.

use std::sync::Arc;

use async_trait::async_trait;
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel as _;

use crate::config::{AppConfig, EmbeddingProvider, LlmProvider};
use crate::error::RagError;

const TEMPERATURE: f64 = 0.3;
const MAX_TOKENS: u64 = 1000;

/// Capacidad de convertir textos en vectores.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    /// Un vector por texto, en el mismo orden.
    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>, RagError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f64>, RagError> {
        self.embed_texts(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RagError::EmbeddingFailure("No se pudo generar embedding de la query".to_string())
            })
    }
}

/// Capacidad de generar texto a partir de un prompt de sistema y uno de usuario.
#[async_trait]
pub trait Generator: Send + Sync {
    fn provider_name(&self) -> &str;
    fn model_name(&self) -> &str;
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, RagError>;
}

/// Construye el embedder indicado por la configuración.
pub fn build_embedder(cfg: &AppConfig) -> Arc<dyn Embedder> {
    match &cfg.embedding_provider {
        EmbeddingProvider::Remote(provider) => Arc::new(RemoteEmbedder {
            provider: provider.clone(),
            model: cfg.llm_embedding_model.clone(),
            api_key: cfg.api_key(provider),
        }),
        EmbeddingProvider::Hash { dimensions } => Arc::new(HashEmbedder::new(*dimensions)),
    }
}

// ---------------------------------------------------------------------
// EMBEDDINGS
// ---------------------------------------------------------------------

/// Mensaje para un proveedor sin clave configurada.
fn missing_key(provider: &LlmProvider) -> String {
    format!(
        "{} no configurada para {}",
        provider.api_key_var(),
        provider.display_name()
    )
}

#[derive(Clone)]
pub struct RemoteEmbedder {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: Option<String>,
}

impl RemoteEmbedder {
    fn api_key(&self) -> Result<&str, RagError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| RagError::EmbeddingFailure(missing_key(&self.provider)))
    }

    async fn embed_with_openai(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>, RagError> {
        use rig::client::EmbeddingsClient as _;
        use rig::providers::openai;

        let client = openai::Client::new(self.api_key()?);
        let embedding_model = client.embedding_model(&self.model);
        let embeddings = embedding_model
            .embed_texts(texts)
            .await
            .map_err(|e| RagError::EmbeddingFailure(e.to_string()))?;
        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }

    async fn embed_with_mistral(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>, RagError> {
        use rig::client::EmbeddingsClient as _;
        use rig::providers::mistral;

        let client = mistral::Client::new(self.api_key()?);
        let embedding_model = client.embedding_model(&self.model);
        let embeddings = embedding_model
            .embed_texts(texts)
            .await
            .map_err(|e| RagError::EmbeddingFailure(e.to_string()))?;
        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>, RagError> {
        let expected = texts.len();
        let vectors = match self.provider {
            LlmProvider::OpenAI => self.embed_with_openai(texts).await?,
            LlmProvider::Mistral => self.embed_with_mistral(texts).await?,
        };

        if vectors.len() != expected {
            return Err(RagError::EmbeddingFailure(format!(
                "Número de embeddings ({}) distinto al número de textos ({expected})",
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

/// Embedder determinista sin red: bolsa de palabras con hashing FNV-1a.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    name: String,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(8);
        Self {
            dimensions,
            name: format!("hash-{dimensions}"),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f64> {
        let mut v = vec![0.0f64; self.dimensions];

        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut h: u64 = 1469598103934665603;
            for b in token.as_bytes() {
                h ^= *b as u64;
                h = h.wrapping_mul(1099511628211);
            }
            let idx = (h % self.dimensions as u64) as usize;
            v[idx] += 1.0;
        }

        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>, RagError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ---------------------------------------------------------------------
// CHAT / COMPLETION
// ---------------------------------------------------------------------

/// Gestor del modelo de chat.
#[derive(Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub chat_model: String,
    pub api_key: Option<String>,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            api_key: cfg.api_key(&cfg.llm_provider),
        }
    }

    fn api_key(&self) -> Result<&str, RagError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| RagError::GenerationUnavailable(missing_key(&self.provider)))
    }

    async fn answer_with_openai(&self, system_prompt: &str, user_prompt: &str) -> Result<String, RagError> {
        use rig::client::CompletionClient as _;
        use rig::providers::openai;

        let client = openai::Client::new(self.api_key()?);
        let agent = client
            .agent(&self.chat_model)
            .preamble(system_prompt)
            .temperature(TEMPERATURE)
            .max_tokens(MAX_TOKENS)
            .build();

        agent
            .prompt(user_prompt)
            .await
            .map_err(|e| RagError::GenerationUnavailable(e.to_string()))
    }

    async fn answer_with_mistral(&self, system_prompt: &str, user_prompt: &str) -> Result<String, RagError> {
        use rig::client::CompletionClient as _;
        use rig::providers::mistral;

        let client = mistral::Client::new(self.api_key()?);
        let agent = client
            .agent(&self.chat_model)
            .preamble(system_prompt)
            .temperature(TEMPERATURE)
            .max_tokens(MAX_TOKENS)
            .build();

        agent
            .prompt(user_prompt)
            .await
            .map_err(|e| RagError::GenerationUnavailable(e.to_string()))
    }
}

#[async_trait]
impl Generator for LlmManager {
    fn provider_name(&self) -> &str {
        self.provider.display_name()
    }

    fn model_name(&self) -> &str {
        &self.chat_model
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, RagError> {
        let answer = match self.provider {
            LlmProvider::OpenAI => self.answer_with_openai(system_prompt, user_prompt).await?,
            LlmProvider::Mistral => self.answer_with_mistral(system_prompt, user_prompt).await?,
        };

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(RagError::GenerationUnavailable(
                "el modelo devolvió una respuesta vacía".to_string(),
            ));
        }
        Ok(answer.to_string())
    }
}
