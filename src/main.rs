// Módulos de la aplicación
mod analytics;
mod annotations;
mod api;
mod app_state;
mod config;
mod error;
mod extract;
mod geo;
mod hotspot;
mod llm;
mod models;
mod neo4j_client;
mod store;
mod triage;

use std::sync::Arc;

use crate::app_state::AppState;
use crate::config::StoreBackend;
use crate::store::{IssueStore, MemoryIssueStore};
use axum::http::HeaderValue;
use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().expect("Error al cargar la configuración");

    // 3. Preparar el almacén de incidencias
    info!("Backend de almacenamiento: {}", cfg.store_backend.as_str());
    let store: Arc<dyn IssueStore> = match (&cfg.store_backend, &cfg.neo4j) {
        (StoreBackend::Neo4j, Some(neo4j_cfg)) => {
            let graph = neo4j_client::connect_from_config(neo4j_cfg)
                .await
                .expect("Error conectando a Neo4j");
            neo4j_client::ensure_schema(&graph)
                .await
                .expect("Error asegurando el esquema de Neo4j");
            Arc::new(neo4j_client::Neo4jIssueStore::new(graph))
        }
        _ => {
            warn!("Usando almacén en memoria: las incidencias se pierden al reiniciar.");
            Arc::new(MemoryIssueStore::new())
        }
    };

    // 4. Inicializar gestor de LLMs y distritos
    let llm_manager = llm::LlmManager::from_config(&cfg);
    info!(
        "Clasificación con {:?} / {} (timeout {:?})",
        cfg.llm_provider, llm_manager.chat_model, cfg.llm_timeout
    );
    let wards = match &cfg.wards_file {
        Some(path) => hotspot::load_wards(path).expect("Error cargando los wards"),
        None => hotspot::default_wards(),
    };

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        triage: triage::TriageService {
            store: store.clone(),
            completion: Arc::new(llm_manager),
            city_bounds: cfg.city_bounds,
            timeout: cfg.llm_timeout,
        },
        config: cfg.clone(),
        store,
        annotations: Arc::new(annotations::AnnotationBook::new()),
        wards: Arc::new(wards),
    };

    // 6. Configurar el router de la API
    let cors = match &cfg.cors_origin {
        Some(origin) => CorsLayer::new().allow_origin(
            origin
                .parse::<HeaderValue>()
                .expect("CORS_ORIGIN no es un origen válido"),
        ),
        None => CorsLayer::new().allow_origin(Any),
    }
    .allow_methods(Any)
    .allow_headers(Any);

    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // 7. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .expect("No se pudo abrir el puerto del servidor");
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .expect("Error en el servidor");

    info!("✅ Servidor cerrado correctamente.");
}
