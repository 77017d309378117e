//! Dobles de prueba para los backends de embeddings y generación.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::article_store::ArticleStore;
use crate::error::RagError;
use crate::llm::{Embedder, Generator};
use crate::models::Article;
use crate::vector_store::{Corpus, EmbeddingIndex};

/// Corpus con contenido "Artículo {id}" y los vectores dados.
pub fn corpus_from(entries: &[(u32, Vec<f64>)]) -> Corpus {
    let articles = entries
        .iter()
        .map(|(id, _)| Article {
            id: *id,
            content: format!("Contenido del artículo {id}"),
        })
        .collect();
    let store = ArticleStore::from_articles(articles).expect("store");
    let index = EmbeddingIndex::build(entries.to_vec()).expect("index");
    Corpus::new(store, index, "scripted").expect("corpus")
}

/// Directorio temporal que se borra al salir del test.
pub struct TempDir(PathBuf);

impl TempDir {
    pub fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("ley109-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        Self(dir)
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.0.join(name)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Escribe un corpus JSON con el formato de `articulos_ley_109.json`.
pub fn write_articles(path: &Path, articles: &[(u32, &str)]) {
    let articles: Vec<Article> = articles
        .iter()
        .map(|(id, c)| Article {
            id: *id,
            content: c.to_string(),
        })
        .collect();
    std::fs::write(path, serde_json::to_string(&articles).expect("json")).expect("write");
}

/// Vector 2D unitario cuya similitud coseno con `[1, 0]` es `score`.
pub fn at_similarity(score: f64) -> Vec<f64> {
    vec![score, (1.0 - score * score).max(0.0).sqrt()]
}

pub struct ScriptedEmbedder {
    default: Option<Vec<f64>>,
    by_text: HashMap<String, Vec<f64>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedEmbedder {
    pub fn new(default: Vec<f64>) -> Self {
        Self {
            default: Some(default),
            by_text: HashMap::new(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            default: None,
            by_text: HashMap::new(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_text(mut self, text: &str, vector: Vec<f64>) -> Self {
        self.by_text.insert(text.to_string(), vector);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        texts
            .iter()
            .map(|t| {
                self.by_text
                    .get(t)
                    .or(self.default.as_ref())
                    .cloned()
                    .ok_or_else(|| RagError::EmbeddingFailure("backend caído".to_string()))
            })
            .collect()
    }
}

pub enum Script {
    Answer(String),
    Fail,
    Hang,
}

pub struct ScriptedGenerator {
    script: Script,
    calls: AtomicUsize,
    last_prompt: std::sync::Mutex<Option<String>>,
}

impl ScriptedGenerator {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            last_prompt: std::sync::Mutex::new(None),
        }
    }

    pub fn answering(text: &str) -> Self {
        Self::new(Script::Answer(text.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn provider_name(&self) -> &str {
        "Scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-chat"
    }

    async fn generate(&self, _system_prompt: &str, user_prompt: &str) -> Result<String, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(user_prompt.to_string());
        match &self.script {
            Script::Answer(text) => Ok(text.clone()),
            Script::Fail => Err(RagError::GenerationUnavailable("503".to_string())),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("demasiado tarde".to_string())
            }
        }
    }
}
