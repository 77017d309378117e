//! Carga y gestión de configuración de la aplicación (corpus + LLM + embeddings).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

/// Proveedor del modelo de chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    Mistral,
    OpenAI,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mistral" => Ok(Self::Mistral),
            "openai" => Ok(Self::OpenAI),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }

    /// Nombre legible que se expone en `/rag/info` y `/health`.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Mistral => "Mistral AI",
            Self::OpenAI => "OpenAI",
        }
    }

    /// Variable de entorno con la clave de API del proveedor.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Mistral => "MISTRAL_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
        }
    }

    fn default_chat_model(&self) -> &'static str {
        match self {
            Self::Mistral => "mistral-small-latest",
            Self::OpenAI => "gpt-4o-mini",
        }
    }
}

/// Origen de los embeddings. `Hash` no necesita red y sirve para entornos
/// sin clave de API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    Remote(LlmProvider),
    Hash { dimensions: usize },
}

impl EmbeddingProvider {
    fn parse(s: &str, hash_dimensions: usize) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hash" => Ok(Self::Hash {
                dimensions: hash_dimensions,
            }),
            other => Ok(Self::Remote(LlmProvider::from_str(other)?)),
        }
    }

    fn default_model(&self) -> String {
        match self {
            Self::Remote(LlmProvider::Mistral) => "mistral-embed".to_string(),
            Self::Remote(LlmProvider::OpenAI) => "text-embedding-3-small".to_string(),
            Self::Hash { dimensions } => format!("hash-{dimensions}"),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,
    pub embedding_provider: EmbeddingProvider,
    pub llm_embedding_model: String,

    pub articles_path: PathBuf,
    pub embeddings_cache: Option<PathBuf>,

    pub embedding_timeout: Duration,
    pub generation_timeout: Duration,
    pub context_char_budget: usize,
    pub min_similarity: f64,

    pub mistral_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env`, pero leyendo de una función arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server_addr = var("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:5000".to_string());

        let llm_provider_str = var("LLM_PROVIDER").unwrap_or_else(|| "mistral".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;
        let llm_chat_model =
            var("LLM_CHAT_MODEL").unwrap_or_else(|| llm_provider.default_chat_model().to_string());

        let hash_dimensions: usize = parse_or(&var, "HASH_EMBEDDING_DIM", 768)?;
        if hash_dimensions == 0 {
            return Err(anyhow!("HASH_EMBEDDING_DIM debe ser mayor que 0"));
        }
        let embedding_provider = EmbeddingProvider::parse(
            &var("EMBEDDING_PROVIDER").unwrap_or(llm_provider_str),
            hash_dimensions,
        )?;
        let llm_embedding_model =
            var("LLM_EMBEDDING_MODEL").unwrap_or_else(|| embedding_provider.default_model());

        let articles_path = PathBuf::from(
            var("ARTICLES_PATH").unwrap_or_else(|| "articulos_ley_109.json".to_string()),
        );
        // Definida pero vacía desactiva la caché.
        let embeddings_cache = match lookup("EMBEDDINGS_CACHE") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(PathBuf::from(v)),
            None => Some(PathBuf::from("embeddings_cache.json")),
        };

        let embedding_timeout = timeout_secs(&var, "EMBEDDING_TIMEOUT_SECS", 10)?;
        let generation_timeout = timeout_secs(&var, "GENERATION_TIMEOUT_SECS", 30)?;
        let context_char_budget = parse_or(&var, "CONTEXT_CHAR_BUDGET", 6000)?;
        let min_similarity: f64 = parse_or(&var, "MIN_SIMILARITY", 0.0)?;
        if !(0.0..1.0).contains(&min_similarity) {
            return Err(anyhow!("MIN_SIMILARITY debe estar en [0, 1)"));
        }

        Ok(Self {
            server_addr,
            llm_provider,
            llm_chat_model,
            embedding_provider,
            llm_embedding_model,
            articles_path,
            embeddings_cache,
            embedding_timeout,
            generation_timeout,
            context_char_budget,
            min_similarity,
            mistral_api_key: var(LlmProvider::Mistral.api_key_var()),
            openai_api_key: var(LlmProvider::OpenAI.api_key_var()),
        })
    }

    /// Clave de API configurada para un proveedor, si existe.
    pub fn api_key(&self, provider: &LlmProvider) -> Option<String> {
        match provider {
            LlmProvider::Mistral => self.mistral_api_key.clone(),
            LlmProvider::OpenAI => self.openai_api_key.clone(),
        }
    }
}

fn timeout_secs<F>(var: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(var, key, default)?;
    if secs == 0 {
        return Err(anyhow!("{key} debe ser mayor que 0"));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {key}: {raw}")),
        None => Ok(default),
    }
}
