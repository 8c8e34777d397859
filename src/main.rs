use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{info, warn};
use std::sync::Arc;

use mediascribe::config::{
    EngineConfig, FallbackConfig, HandlerConfig, OrchestratorConfig, StoreConfig, TranscoderConfig,
};
use mediascribe::engine::{CliEngine, ScriptEngine, TranscriptionEngine};
use mediascribe::handlers::{
    chunk_upload_slot, complete_upload, create_media, init_upload, media_status,
    record_chunk_stored, register_media, store_object, trigger_transcription,
};
use mediascribe::object_store::{LocalObjectStore, ObjectStore};
use mediascribe::orchestrator::{spawn_dispatcher, TranscriptionOrchestrator};
use mediascribe::store::MediaStore;
use mediascribe::transcoder::AudioExtractor;
use mediascribe::{config_loader, MultipartUploadManager};

const DEFAULT_API_HOST: &str = "127.0.0.1";
const DEFAULT_API_PORT: &str = "8181";

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Seed environment from the optional config file before reading configs
    config_loader::load_config();

    let store_config = StoreConfig::default();
    let handler_config = HandlerConfig::default();
    let orchestrator_config = OrchestratorConfig::default();

    // Create the working directory for run scratch files
    if let Err(e) = std::fs::create_dir_all(&orchestrator_config.work_dir) {
        warn!(
            "Failed to create work directory {}: {}",
            orchestrator_config.work_dir, e
        );
    }

    // Wire the collaborators; every component receives its handles
    // explicitly, lifecycle owned here.
    let objects: Arc<dyn ObjectStore> = Arc::new(
        LocalObjectStore::new(store_config.base_dir.clone(), store_config.base_url.clone())
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?,
    );
    let media = MediaStore::new();
    let manager = Arc::new(MultipartUploadManager::new(objects.clone()));
    let extractor = AudioExtractor::new(TranscoderConfig::default());
    let primary: Arc<dyn TranscriptionEngine> = Arc::new(CliEngine::new(EngineConfig::default()));
    let fallback: Arc<dyn TranscriptionEngine> =
        Arc::new(ScriptEngine::new(FallbackConfig::default()));

    let orchestrator = TranscriptionOrchestrator::new(
        media.clone(),
        manager.clone(),
        objects.clone(),
        extractor,
        primary,
        fallback,
        orchestrator_config.clone(),
    );
    let orchestrator_handle = spawn_dispatcher(orchestrator);

    // Server settings
    let host = std::env::var("MEDIASCRIBE_HOST").unwrap_or_else(|_| DEFAULT_API_HOST.to_string());
    let port = std::env::var("MEDIASCRIBE_PORT").unwrap_or_else(|_| DEFAULT_API_PORT.to_string());

    info!("Starting mediascribe server on http://{}:{}", host, port);
    info!("Object store directory: {}", store_config.base_dir);
    info!("Work directory: {}", orchestrator_config.work_dir);
    info!(
        "Max concurrent transcription runs: {}",
        orchestrator_config.max_concurrent_runs
    );

    let max_payload = handler_config.max_file_size;
    let objects_data = web::Data::from(objects);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::PayloadConfig::new(max_payload))
            .app_data(objects_data.clone())
            .app_data(web::Data::new(media.clone()))
            .app_data(web::Data::new(manager.clone()))
            .app_data(web::Data::new(orchestrator_handle.clone()))
            .app_data(web::Data::new(handler_config.clone()))
            .service(init_upload)
            .service(chunk_upload_slot)
            .service(record_chunk_stored)
            .service(complete_upload)
            .service(store_object)
            .service(create_media)
            .service(register_media)
            .service(trigger_transcription)
            .service(media_status)
    })
    .bind(format!("{}:{}", host, port))?
    .run()
    .await
}
