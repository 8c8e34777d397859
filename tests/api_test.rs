// HTTP surface tests: the chunked upload protocol end to end over the API,
// error mapping onto status codes, and a full trigger-then-poll round.

use actix_web::{test, web, App};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use uuid::Uuid;

use mediascribe::config::{
    FallbackConfig, HandlerConfig, OrchestratorConfig, TranscoderConfig, UploadConfig,
};
use mediascribe::engine::{ScriptEngine, TranscriptionEngine};
use mediascribe::handlers::{
    chunk_upload_slot, complete_upload, create_media, init_upload, media_status,
    record_chunk_stored, register_media, store_object, trigger_transcription,
};
use mediascribe::object_store::{LocalObjectStore, ObjectStore};
use mediascribe::orchestrator::{spawn_dispatcher, TranscriptionOrchestrator};
use mediascribe::store::MediaStore;
use mediascribe::transcoder::AudioExtractor;
use mediascribe::upload_client::UploadClientDriver;
use mediascribe::{EngineConfig, MultipartUploadManager};

struct TestApp {
    objects: Arc<dyn ObjectStore>,
    media: MediaStore,
    manager: Arc<MultipartUploadManager>,
    handle: mediascribe::OrchestratorHandle,
    config: HandlerConfig,
}

fn write_script(dir: &std::path::Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path.to_string_lossy().to_string()
}

/// Wire the service graph the way the binary does, with a scripted engine
/// standing in for the real one.
async fn test_app(dir: &tempfile::TempDir, max_file_size: usize) -> TestApp {
    let objects: Arc<dyn ObjectStore> = Arc::new(
        LocalObjectStore::new(dir.path().join("store"), "http://localhost:8181".to_string())
            .await
            .unwrap(),
    );
    let media = MediaStore::new();
    let manager = Arc::new(MultipartUploadManager::new(objects.clone()));

    let engine_cmd = write_script(
        dir.path(),
        "engine.sh",
        "#!/bin/sh\nstem=$(basename \"$1\" .wav)\nprintf 'scripted transcript' > \"$3/$stem.txt\"\n",
    );
    let primary: Arc<dyn TranscriptionEngine> = Arc::new(mediascribe::CliEngine::new(EngineConfig {
        command_path: engine_cmd,
        timeout: Duration::from_secs(10),
    }));
    let fallback: Arc<dyn TranscriptionEngine> = Arc::new(ScriptEngine::new(FallbackConfig {
        interpreter: "sh".to_string(),
        script_path: "/nonexistent/fallback.sh".to_string(),
        timeout: Duration::from_secs(10),
    }));
    let extractor = AudioExtractor::new(TranscoderConfig {
        command_path: "/nonexistent/ffmpeg".to_string(),
        timeout: Duration::from_secs(5),
    });

    let work_dir = dir.path().join("work");
    std::fs::create_dir_all(&work_dir).unwrap();
    let orchestrator = TranscriptionOrchestrator::new(
        media.clone(),
        manager.clone(),
        objects.clone(),
        extractor,
        primary,
        fallback,
        OrchestratorConfig {
            work_dir: work_dir.to_string_lossy().to_string(),
            max_concurrent_runs: 2,
            step_attempts: 2,
            step_backoff: Duration::from_millis(1),
        },
    );
    let handle = spawn_dispatcher(orchestrator);

    TestApp {
        objects,
        media,
        manager,
        handle,
        config: HandlerConfig { max_file_size },
    }
}

macro_rules! service {
    ($app:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::from($app.objects.clone()))
                .app_data(web::Data::new($app.media.clone()))
                .app_data(web::Data::new($app.manager.clone()))
                .app_data(web::Data::new($app.handle.clone()))
                .app_data(web::Data::new($app.config.clone()))
                .service(init_upload)
                .service(chunk_upload_slot)
                .service(record_chunk_stored)
                .service(complete_upload)
                .service(store_object)
                .service(create_media)
                .service(register_media)
                .service(trigger_transcription)
                .service(media_status),
        )
        .await
    };
}

fn token_from_destination(destination: &str) -> Uuid {
    destination.rsplit('/').next().unwrap().parse().unwrap()
}

#[actix_web::test]
async fn chunk_protocol_round_trips_over_http() {
    let dir = tempdir().unwrap();
    let app = test_app(&dir, 1024 * 1024).await;
    let srv = service!(app);

    // Init: two chunks expected.
    let resp = test::call_service(
        &srv,
        test::TestRequest::post()
            .uri("/uploads")
            .set_json(json!({ "num_chunks": 2 }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    let upload_id = body["upload_id"].as_str().unwrap().to_string();

    let mut first_chunk_storage_id = String::new();
    for (index, payload) in [&b"first-"[..], &b"second"[..]].iter().enumerate() {
        // Slot for this chunk.
        let resp = test::call_service(
            &srv,
            test::TestRequest::post()
                .uri(&format!("/uploads/{}/chunks/{}/slot", upload_id, index))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 200);
        let slot: Value = test::read_body_json(resp).await;
        let chunk_id = slot["chunk_id"].as_str().unwrap().to_string();
        let token = token_from_destination(slot["destination"].as_str().unwrap());

        // PUT the payload to the slot's destination.
        let resp = test::call_service(
            &srv,
            test::TestRequest::put()
                .uri(&format!("/store/{}", token))
                .set_payload(payload.to_vec())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 201);
        let stored: Value = test::read_body_json(resp).await;
        let storage_id = stored["storage_id"].as_str().unwrap().to_string();
        if index == 0 {
            first_chunk_storage_id = storage_id.clone();
        }

        // Record the landing.
        let resp = test::call_service(
            &srv,
            test::TestRequest::post()
                .uri(&format!("/chunks/{}/stored", chunk_id))
                .set_json(json!({ "storage_id": storage_id }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 204);
    }

    // Complete and verify the assembled bytes.
    let resp = test::call_service(
        &srv,
        test::TestRequest::post()
            .uri(&format!("/uploads/{}/complete", upload_id))
            .set_json(json!({
                "content_type": "audio/wav",
                "first_chunk_storage_id": first_chunk_storage_id
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    let final_id: Uuid = body["storage_id"].as_str().unwrap().parse().unwrap();

    assert_eq!(app.objects.read(final_id).await.unwrap(), b"first-second");
}

#[actix_web::test]
async fn premature_complete_maps_to_conflict() {
    let dir = tempdir().unwrap();
    let app = test_app(&dir, 1024).await;
    let srv = service!(app);

    let resp = test::call_service(
        &srv,
        test::TestRequest::post()
            .uri("/uploads")
            .set_json(json!({ "num_chunks": 3 }))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    let upload_id = body["upload_id"].as_str().unwrap().to_string();

    let resp = test::call_service(
        &srv,
        test::TestRequest::post()
            .uri(&format!("/uploads/{}/complete", upload_id))
            .set_json(json!({
                "content_type": "audio/wav",
                "first_chunk_storage_id": Uuid::new_v4()
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 409);
}

#[actix_web::test]
async fn out_of_range_chunk_index_maps_to_bad_request() {
    let dir = tempdir().unwrap();
    let app = test_app(&dir, 1024).await;
    let srv = service!(app);

    let resp = test::call_service(
        &srv,
        test::TestRequest::post()
            .uri("/uploads")
            .set_json(json!({ "num_chunks": 2 }))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    let upload_id = body["upload_id"].as_str().unwrap().to_string();

    let resp = test::call_service(
        &srv,
        test::TestRequest::post()
            .uri(&format!("/uploads/{}/chunks/5/slot", upload_id))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn oversized_store_payload_maps_to_payload_too_large() {
    let dir = tempdir().unwrap();
    let app = test_app(&dir, 16).await;
    let srv = service!(app);

    let resp = test::call_service(
        &srv,
        test::TestRequest::put()
            .uri(&format!("/store/{}", Uuid::new_v4()))
            .set_payload(vec![0u8; 64])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 413);
}

#[actix_web::test]
async fn unknown_media_maps_to_not_found() {
    let dir = tempdir().unwrap();
    let app = test_app(&dir, 1024).await;
    let srv = service!(app);

    let resp = test::call_service(
        &srv,
        test::TestRequest::get()
            .uri(&format!("/media/{}", Uuid::new_v4()))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn trigger_with_foreign_storage_id_maps_to_bad_request() {
    let dir = tempdir().unwrap();
    let app = test_app(&dir, 1024 * 1024).await;
    let srv = service!(app);

    let storage_id = app.objects.put(b"audio bytes".to_vec()).await.unwrap();
    let resp = test::call_service(
        &srv,
        test::TestRequest::post()
            .uri("/media/register")
            .set_json(json!({
                "owner_id": Uuid::new_v4(),
                "display_name": "talk.wav",
                "size_bytes": 11,
                "content_type": "audio/wav",
                "storage_id": storage_id
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    let media_id = body["media_id"].as_str().unwrap().to_string();

    let resp = test::call_service(
        &srv,
        test::TestRequest::post()
            .uri(&format!("/media/{}/transcribe", media_id))
            .set_json(json!({ "storage_id": Uuid::new_v4() }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn register_over_unknown_storage_maps_to_not_found() {
    let dir = tempdir().unwrap();
    let app = test_app(&dir, 1024).await;
    let srv = service!(app);

    let resp = test::call_service(
        &srv,
        test::TestRequest::post()
            .uri("/media/register")
            .set_json(json!({
                "owner_id": Uuid::new_v4(),
                "display_name": "ghost.wav",
                "size_bytes": 1,
                "content_type": "audio/wav",
                "storage_id": Uuid::new_v4()
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn form_upload_creates_a_pending_record() {
    let dir = tempdir().unwrap();
    let app = test_app(&dir, 1024 * 1024).await;
    let srv = service!(app);

    let boundary = "------------------------mediascribetest";
    let body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"owner_id\"\r\n\r\n\
         {owner}\r\n\
         --{b}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"talk.wav\"\r\n\
         Content-Type: audio/wav\r\n\r\n\
         fake audio bytes\r\n\
         --{b}--\r\n",
        b = boundary,
        owner = Uuid::new_v4()
    );

    let resp = test::call_service(
        &srv,
        test::TestRequest::post()
            .uri("/media")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);
    let created: Value = test::read_body_json(resp).await;
    let media_id = created["media_id"].as_str().unwrap().to_string();
    let storage_id: Uuid = created["storage_id"].as_str().unwrap().parse().unwrap();

    // The payload landed in the object store as-is.
    assert_eq!(app.objects.read(storage_id).await.unwrap(), b"fake audio bytes");

    let resp = test::call_service(
        &srv,
        test::TestRequest::get()
            .uri(&format!("/media/{}", media_id))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"].as_str().unwrap(), "pending");
}

#[actix_web::test]
async fn trigger_then_poll_reaches_completed() {
    let dir = tempdir().unwrap();
    let app = test_app(&dir, 1024 * 1024).await;
    let srv = service!(app);

    // Upload through the client driver, register, trigger, poll.
    let input = dir.path().join("talk.wav");
    std::fs::write(&input, vec![1u8; 4000]).unwrap();
    let driver = UploadClientDriver::new(
        app.manager.clone(),
        app.objects.clone(),
        UploadConfig {
            chunk_size: 1500,
            chunking_enabled: true,
            chunk_retries: 3,
            retry_backoff: Duration::from_millis(1),
        },
    );
    let storage_id = driver.upload_file(&input, "audio/wav").await.unwrap();

    let resp = test::call_service(
        &srv,
        test::TestRequest::post()
            .uri("/media/register")
            .set_json(json!({
                "owner_id": Uuid::new_v4(),
                "display_name": "talk.wav",
                "size_bytes": 4000,
                "content_type": "audio/wav",
                "storage_id": storage_id
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    let media_id = body["media_id"].as_str().unwrap().to_string();

    let resp = test::call_service(
        &srv,
        test::TestRequest::post()
            .uri(&format!("/media/{}/transcribe", media_id))
            .set_json(json!({ "storage_id": storage_id }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 202);

    // Poll the read model until the background run lands.
    let mut last_status = String::new();
    for _ in 0..100 {
        let resp = test::call_service(
            &srv,
            test::TestRequest::get()
                .uri(&format!("/media/{}", media_id))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        last_status = body["status"].as_str().unwrap().to_string();
        if last_status == "completed" {
            assert_eq!(body["text"].as_str().unwrap(), "scripted transcript");
            assert!(body["error"].is_null());
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("run never completed, last status: {}", last_status);
}
