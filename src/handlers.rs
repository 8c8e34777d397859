// HTTP handlers for mediascribe
//
// Route handlers exposing the upload protocol, the object store write
// target and the transcription trigger/read-model endpoints. Handlers stay
// thin: validate at the boundary, delegate to the manager, store and
// orchestrator, and map protocol errors onto HTTP responses.

use actix_multipart::Multipart;
use actix_web::{get, post, put, web, HttpResponse};
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::HandlerConfig;
use crate::error::ApiError;
use crate::models::{
    CompleteUploadRequest, CompleteUploadResponse, InitUploadRequest, InitUploadResponse,
    MediaCreatedResponse, MediaRecord, MediaStatusResponse, RecordChunkRequest,
    RegisterMediaRequest, StoreObjectResponse, TriggerTranscriptionRequest,
};
use crate::multipart::MultipartUploadManager;
use crate::object_store::ObjectStore;
use crate::orchestrator::OrchestratorHandle;
use crate::store::MediaStore;

/// Create a new multipart upload
#[post("/uploads")]
pub async fn init_upload(
    body: web::Json<InitUploadRequest>,
    manager: web::Data<Arc<MultipartUploadManager>>,
) -> Result<HttpResponse, ApiError> {
    let upload_id = manager.init_upload(body.num_chunks).await?;
    Ok(HttpResponse::Created().json(InitUploadResponse { upload_id }))
}

/// Hand out a single-use upload slot for one chunk
#[post("/uploads/{upload_id}/chunks/{index}/slot")]
pub async fn chunk_upload_slot(
    path: web::Path<(Uuid, u32)>,
    manager: web::Data<Arc<MultipartUploadManager>>,
) -> Result<HttpResponse, ApiError> {
    let (upload_id, index) = path.into_inner();
    let slot = manager.get_chunk_upload_slot(upload_id, index).await?;
    Ok(HttpResponse::Ok().json(slot))
}

/// Record that a chunk's payload landed in the object store
#[post("/chunks/{chunk_id}/stored")]
pub async fn record_chunk_stored(
    chunk_id: web::Path<Uuid>,
    body: web::Json<RecordChunkRequest>,
    manager: web::Data<Arc<MultipartUploadManager>>,
) -> Result<HttpResponse, ApiError> {
    manager
        .record_chunk_stored(chunk_id.into_inner(), body.storage_id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Assemble a fully-stored upload into its final object
#[post("/uploads/{upload_id}/complete")]
pub async fn complete_upload(
    upload_id: web::Path<Uuid>,
    body: web::Json<CompleteUploadRequest>,
    manager: web::Data<Arc<MultipartUploadManager>>,
) -> Result<HttpResponse, ApiError> {
    let storage_id = manager
        .complete_upload(
            upload_id.into_inner(),
            &body.content_type,
            body.first_chunk_storage_id,
        )
        .await?;
    Ok(HttpResponse::Ok().json(CompleteUploadResponse { storage_id }))
}

/// Raw write target backing the destination URLs handed out in chunk
/// slots. Stands in for a pre-signed PUT against a hosted store.
#[put("/store/{token}")]
pub async fn store_object(
    token: web::Path<Uuid>,
    body: web::Bytes,
    objects: web::Data<dyn ObjectStore>,
    config: web::Data<HandlerConfig>,
) -> Result<HttpResponse, ApiError> {
    if body.len() > config.max_file_size {
        return Err(ApiError::FileTooLarge(body.len(), config.max_file_size));
    }
    let storage_id = token.into_inner();
    objects
        .put_with_id(storage_id, body.to_vec())
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Created().json(StoreObjectResponse { storage_id }))
}

/// Single-shot upload: multipart form with a `file` field and an optional
/// `owner_id` field. Creates the media record in `pending` status.
#[post("/media")]
pub async fn create_media(
    mut form: Multipart,
    objects: web::Data<dyn ObjectStore>,
    media: web::Data<MediaStore>,
    config: web::Data<HandlerConfig>,
) -> Result<HttpResponse, ApiError> {
    let mut owner_id = Uuid::nil();
    let mut display_name = String::new();
    let mut content_type = String::from("application/octet-stream");
    let mut payload: Option<Vec<u8>> = None;

    while let Ok(Some(mut field)) = form.try_next().await {
        let content_disposition = field.content_disposition();
        let field_name = content_disposition
            .and_then(|cd| cd.get_name().map(|name| name.to_string()))
            .unwrap_or_default();

        match field_name.as_str() {
            "owner_id" => {
                let mut value = String::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk
                        .map_err(|e| ApiError::form_error(format!("Error reading owner_id: {}", e)))?;
                    if let Ok(s) = std::str::from_utf8(&chunk) {
                        value.push_str(s);
                    }
                }
                owner_id = value
                    .trim()
                    .parse()
                    .map_err(|_| ApiError::BadRequest(format!("invalid owner_id: {}", value)))?;
            }
            "file" => {
                if let Some(cd) = field.content_disposition() {
                    if let Some(filename) = cd.get_filename() {
                        display_name = filename.to_string();
                    }
                }
                if let Some(mime) = field.content_type() {
                    content_type = mime.to_string();
                }

                let mut data = Vec::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk.map_err(|e| {
                        ApiError::form_error(format!("Error processing file upload: {}", e))
                    })?;
                    if data.len() + chunk.len() > config.max_file_size {
                        return Err(ApiError::FileTooLarge(
                            data.len() + chunk.len(),
                            config.max_file_size,
                        ));
                    }
                    data.extend_from_slice(&chunk);
                }
                payload = Some(data);
            }
            _ => {
                // Skip unknown fields
                while field.next().await.is_some() {}
            }
        }
    }

    let payload = payload.ok_or(ApiError::NoMediaFile)?;
    if display_name.is_empty() {
        display_name = "upload".to_string();
    }

    let size_bytes = payload.len() as u64;
    let storage_id = objects.put(payload).await.map_err(|e| {
        error!("Failed to store uploaded media: {}", e);
        ApiError::from(e)
    })?;

    let record = MediaRecord::new(owner_id, display_name, size_bytes, content_type, storage_id);
    let media_id = record.id;
    media.insert(record).await;

    info!("Created media {} over storage {}", media_id, storage_id);
    Ok(HttpResponse::Created().json(MediaCreatedResponse {
        media_id,
        storage_id,
        status_url: format!("/media/{}", media_id),
    }))
}

/// Register a media record over an object that is already stored, e.g. the
/// assembled result of a chunked upload.
#[post("/media/register")]
pub async fn register_media(
    body: web::Json<RegisterMediaRequest>,
    objects: web::Data<dyn ObjectStore>,
    media: web::Data<MediaStore>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    if !objects.exists(body.storage_id).await.map_err(ApiError::from)? {
        return Err(ApiError::NotFound(format!(
            "storage id {}",
            body.storage_id
        )));
    }

    let record = MediaRecord::new(
        body.owner_id,
        body.display_name,
        body.size_bytes,
        body.content_type,
        body.storage_id,
    );
    let media_id = record.id;
    let storage_id = record.storage_id;
    media.insert(record).await;

    info!("Registered media {} over storage {}", media_id, storage_id);
    Ok(HttpResponse::Created().json(MediaCreatedResponse {
        media_id,
        storage_id,
        status_url: format!("/media/{}", media_id),
    }))
}

/// Fire-and-forget transcription trigger
#[post("/media/{media_id}/transcribe")]
pub async fn trigger_transcription(
    media_id: web::Path<Uuid>,
    body: web::Json<TriggerTranscriptionRequest>,
    media: web::Data<MediaStore>,
    orchestrator: web::Data<OrchestratorHandle>,
) -> Result<HttpResponse, ApiError> {
    let media_id = media_id.into_inner();

    // Validate the event at the boundary rather than trusting the payload.
    let record = media
        .get(media_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("media {}", media_id)))?;
    if body.storage_id != record.storage_id {
        return Err(ApiError::BadRequest(format!(
            "storage id {} does not belong to media {}",
            body.storage_id, media_id
        )));
    }

    if !orchestrator.trigger(media_id, body.storage_id).await {
        return Err(ApiError::Internal(
            "transcription dispatcher unavailable".to_string(),
        ));
    }

    info!("Queued transcription for media {}", media_id);
    Ok(HttpResponse::Accepted().finish())
}

/// Read model for polling a media record's transcription state
#[get("/media/{media_id}")]
pub async fn media_status(
    media_id: web::Path<Uuid>,
    media: web::Data<MediaStore>,
) -> Result<HttpResponse, ApiError> {
    let media_id = media_id.into_inner();
    let record = media
        .get(media_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("media {}", media_id)))?;
    Ok(HttpResponse::Ok().json(MediaStatusResponse::from(&record)))
}
