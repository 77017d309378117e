//! Síntesis de la respuesta con el LLM a partir de los artículos recuperados,
//! con respuesta de respaldo determinista si el backend falla o no responde.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::{ErrorCode, RagError};
use crate::llm::Generator;
use crate::models::Article;

/// Artículos citados literalmente en la respuesta de respaldo.
const FALLBACK_ARTICLES: usize = 3;

pub const NO_RESULTS_RESPONSE: &str = "Lo siento, no encontré información relevante en la Ley 109 para responder tu consulta. Intenta reformular tu pregunta o usar términos más específicos.";

pub const EMBEDDING_FAILURE_RESPONSE: &str = "Lo siento, no fue posible procesar tu consulta en este momento porque el servicio de búsqueda semántica no está disponible. Inténtalo de nuevo más tarde.";

pub const LOW_CONFIDENCE_NOTICE: &str = "Aviso: los artículos encontrados tienen poca relación con tu consulta, por lo que esta respuesta puede no ser precisa.";

const SYSTEM_PROMPT: &str = r#"
Eres un asistente especializado en la Ley 109, Código de Seguridad Vial de Cuba.
Respondes en español, de forma clara, precisa y profesional.
Sólo puedes usar la información de los artículos suministrados en el contexto.
Si los artículos no contienen la respuesta, dilo explícitamente.
Menciona el número de los artículos en los que te basas.
Responde en texto plano, sin Markdown: no uses asteriscos, guiones bajos ni otros símbolos de formato.
Empieza con una respuesta directa y después explica los detalles relevantes de los artículos.
"#;

/// Resultado de la síntesis. Nunca es un error: los fallos del backend se
/// convierten en una respuesta de respaldo con `error` informado.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub response: String,
    pub model_used: Option<String>,
    pub error: Option<ErrorCode>,
}

impl Synthesis {
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

pub struct AnswerSynthesizer {
    generator: Arc<dyn Generator>,
    generation_timeout: Duration,
    context_char_budget: usize,
}

impl AnswerSynthesizer {
    pub fn new(
        generator: Arc<dyn Generator>,
        generation_timeout: Duration,
        context_char_budget: usize,
    ) -> Self {
        Self {
            generator,
            generation_timeout,
            context_char_budget,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.generator.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    /// Concatena los artículos en orden hasta agotar el presupuesto de
    /// caracteres. Devuelve el contexto y cuántos artículos entraron.
    /// El primero siempre entra, recortado si hace falta.
    pub fn build_context(&self, articles: &[&Article]) -> (String, usize) {
        const SEPARATOR: &str = "\n\n";

        let mut context = String::new();
        let mut used_chars = 0usize;
        let mut included = 0usize;

        for article in articles {
            let block = format!("Artículo {}:\n{}", article.id, article.content);
            let block_chars = block.chars().count();

            if included == 0 {
                if block_chars > self.context_char_budget {
                    context.extend(block.chars().take(self.context_char_budget));
                    return (context, 1);
                }
                context.push_str(&block);
                used_chars = block_chars;
                included = 1;
                continue;
            }

            let needed = SEPARATOR.len() + block_chars;
            if used_chars + needed > self.context_char_budget {
                break;
            }
            context.push_str(SEPARATOR);
            context.push_str(&block);
            used_chars += needed;
            included += 1;
        }

        (context, included)
    }

    pub fn user_prompt(query: &str, context: &str) -> String {
        format!(
            "CONTEXTO (artículos de la Ley 109):\n{context}\n\nPREGUNTA DEL USUARIO:\n{query}\n\nResponde basándote únicamente en los artículos anteriores."
        )
    }

    /// Genera la respuesta; `articles` llega ordenado por relevancia.
    pub async fn synthesize(&self, query: &str, articles: &[&Article]) -> Synthesis {
        let (context, included) = self.build_context(articles);
        if included < articles.len() {
            info!(
                "Contexto limitado a {included} de {} artículos ({} caracteres)",
                articles.len(),
                self.context_char_budget
            );
        }
        let prompt = Self::user_prompt(query, &context);

        let result = match timeout(
            self.generation_timeout,
            self.generator.generate(SYSTEM_PROMPT, &prompt),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RagError::GenerationTimeout(self.generation_timeout.as_secs())),
        };

        match result {
            Ok(text) => Synthesis {
                response: text,
                model_used: Some(self.generator.model_name().to_string()),
                error: None,
            },
            Err(err) => {
                warn!("Fallo del modelo de lenguaje, se usa respuesta de respaldo: {err}");
                Synthesis {
                    response: fallback_response(articles),
                    model_used: None,
                    error: err.code().or(Some(ErrorCode::GenerationUnavailable)),
                }
            }
        }
    }
}

/// Respuesta plantilla con el texto literal de los mejores artículos.
pub fn fallback_response(articles: &[&Article]) -> String {
    let mut response = String::from(
        "No fue posible generar una respuesta con el modelo de lenguaje en este momento. \
         Estos son los artículos de la Ley 109 más relacionados con tu consulta:",
    );
    for article in articles.iter().take(FALLBACK_ARTICLES) {
        response.push_str(&format!("\n\nArtículo {}:\n{}", article.id, article.content));
    }
    response
}
