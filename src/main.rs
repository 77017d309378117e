// Módulos de la aplicación
mod api;
mod app_state;
mod article_store;
mod config;
mod error;
mod ingest;
mod llm;
mod models;
mod rag;
mod retriever;
mod scoring;
mod synthesis;
mod vector_store;

#[cfg(test)]
mod testing;

use crate::app_state::AppState;
use crate::rag::RagEngine;
use anyhow::Context;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;
    info!(
        "Proveedor LLM: {} ({}), embeddings: {}",
        cfg.llm_provider.display_name(),
        cfg.llm_chat_model,
        cfg.llm_embedding_model
    );

    // 3. Construir el motor RAG y cargar el corpus
    let engine = RagEngine::bootstrap(&cfg).await;
    if engine.is_ready() {
        info!("✅ Corpus listo: {} artículos", engine.total_articles());
    } else {
        warn!("⚠️  Corpus no disponible; /api/admin/reload permite reintentar la carga.");
    }

    // 4. Crear estado compartido de la aplicación
    let app_state = AppState::new(engine);

    // 5. Configurar el router de la API
    let app = api::create_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 6. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .context("Error en el servidor HTTP")?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
