// Transcription orchestrator for mediascribe
//
// State machine over MediaRecord status: pending -> processing ->
// {completed | error}. One run materializes the stored file, normalizes it
// to audio, drives the primary engine with fallback to the secondary, and
// persists the result; scratch files are deleted on every exit path.
//
// Runs for different records execute concurrently up to a bounded limit;
// steps within a run are strictly sequential. The processing claim on the
// media record doubles as the advisory lock, so a duplicate trigger for a
// record already processing is a logged no-op.

use futures::StreamExt;
use log::{debug, error, info, warn};
use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::engine::TranscriptionEngine;
use crate::error::RunError;
use crate::file_utils::{extension_for, RunScratch};
use crate::multipart::MultipartUploadManager;
use crate::object_store::ObjectStore;
use crate::store::{ClaimOutcome, MediaStore};
use crate::transcoder::{is_video_path, AudioExtractor};

/// Trigger event for one transcription run. Deserialized and validated at
/// the API boundary before it reaches the orchestrator.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub media_id: Uuid,
    pub storage_id: Uuid,
}

/// Per-run mutable state: the scratch space plus the engine bookkeeping
/// that keeps fallback a one-way, once-only decision within the run.
struct RunContext {
    scratch: RunScratch,
    primary_attempted: bool,
}

/// The transcription state machine. Holds its collaborators by injection;
/// lifecycle of the handles is owned by the process entry point.
pub struct TranscriptionOrchestrator {
    media: MediaStore,
    multipart: Arc<MultipartUploadManager>,
    objects: Arc<dyn ObjectStore>,
    extractor: AudioExtractor,
    primary: Arc<dyn TranscriptionEngine>,
    fallback: Arc<dyn TranscriptionEngine>,
    config: OrchestratorConfig,
    run_permits: Arc<Semaphore>,
}

impl TranscriptionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        media: MediaStore,
        multipart: Arc<MultipartUploadManager>,
        objects: Arc<dyn ObjectStore>,
        extractor: AudioExtractor,
        primary: Arc<dyn TranscriptionEngine>,
        fallback: Arc<dyn TranscriptionEngine>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        let run_permits = Arc::new(Semaphore::new(config.max_concurrent_runs.max(1)));
        Arc::new(Self {
            media,
            multipart,
            objects,
            extractor,
            primary,
            fallback,
            config,
            run_permits,
        })
    }

    /// Execute one full run to completion. Public so a durable-execution
    /// substrate (or a test) can re-drive a run directly; the HTTP path
    /// goes through [`OrchestratorHandle::trigger`] instead.
    pub async fn run(&self, request: TranscriptionRequest) {
        let media_id = request.media_id;

        // Step 1: mark processing. The claim is the advisory lock.
        match self.media.try_claim_for_processing(media_id).await {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyProcessing => {
                info!(
                    "Media {} is already processing, ignoring duplicate trigger",
                    media_id
                );
                return;
            }
            ClaimOutcome::NotFound => {
                error!("Trigger for unknown media record {}", media_id);
                return;
            }
        }

        let run_id = Uuid::new_v4();
        info!("Run {} started for media {}", run_id, media_id);

        let scratch = match RunScratch::create(&self.config.work_dir, run_id) {
            Ok(scratch) => scratch,
            Err(e) => {
                error!("Run {} could not create scratch space: {}", run_id, e);
                self.media
                    .fail(media_id, RunError::Io(e).to_string())
                    .await;
                return;
            }
        };

        let mut ctx = RunContext {
            scratch,
            primary_attempted: false,
        };

        let outcome = self.execute(&request, &mut ctx).await;

        match outcome {
            Ok(text) => {
                // Step 7: status, text and timestamp in a single mutation.
                if self.media.complete(media_id, text).await {
                    info!("Run {} completed for media {}", run_id, media_id);
                } else {
                    error!(
                        "Run {} finished but media {} no longer exists",
                        run_id, media_id
                    );
                }
            }
            Err(e) => {
                error!("Run {} failed for media {}: {}", run_id, media_id, e);
                self.media.fail(media_id, e.to_string()).await;
            }
        }

        // Step 8: unconditional cleanup; failures are logged inside.
        ctx.scratch.cleanup();
    }

    /// Steps 2 through 6. Any error here becomes the record's terminal
    /// error message; cleanup happens in the caller regardless.
    async fn execute(
        &self,
        request: &TranscriptionRequest,
        ctx: &mut RunContext,
    ) -> Result<String, RunError> {
        let media = self
            .media
            .get(request.media_id)
            .await
            .ok_or(RunError::MediaNotFound(request.media_id))?;
        let storage_id = request.storage_id;

        // Step 2: pre-flight check that the stored object resolves, so an
        // unknown storage id ends the run before any scratch I/O. The
        // retrieval itself goes by storage id in materialize below.
        let url = {
            let objects = self.objects.clone();
            self.with_retries("resolve-source", || {
                let objects = objects.clone();
                async move { objects.get_url(storage_id).await }
            })
            .await?
        };
        debug!("Source for media {} resolves to {}", request.media_id, url);

        // Step 3: materialize to a scratch file.
        let input_path = ctx
            .scratch
            .register_file("input", &extension_for(&media.display_name));
        self.materialize(storage_id, &input_path).await?;

        // Step 4: normalize to audio.
        let audio_path = if is_video_path(&input_path) {
            let target = ctx.scratch.register_file("audio", "wav");
            let extractor = &self.extractor;
            let input = input_path.clone();
            let out = target.clone();
            self.with_retries("extract-audio", || {
                let input = input.clone();
                let out = out.clone();
                async move { extractor.extract_audio(&input, &out).await }
            })
            .await?;
            target
        } else {
            input_path
        };

        // Steps 5 and 6: primary engine, fallback on any failure.
        self.transcribe_with_fallback(ctx, &audio_path).await
    }

    /// Stream or buffer the object into the scratch file. Assembled
    /// multipart results are retrieved streaming so large payloads never
    /// sit in memory whole.
    async fn materialize(&self, storage_id: Uuid, target: &PathBuf) -> Result<(), RunError> {
        let assembled = self.multipart.is_assembled_storage(storage_id).await;
        let objects = self.objects.clone();
        let target = target.clone();

        self.with_retries("materialize", || {
            let objects = objects.clone();
            let target = target.clone();
            async move {
                if assembled {
                    let mut stream = objects
                        .read_stream(storage_id)
                        .await
                        .map_err(|e| RunError::Download(e.to_string()))?;
                    let mut file = tokio::fs::File::create(&target)
                        .await
                        .map_err(RunError::Io)?;
                    while let Some(chunk) = stream.next().await {
                        let chunk = chunk.map_err(|e| RunError::Download(e.to_string()))?;
                        file.write_all(&chunk).await.map_err(RunError::Io)?;
                    }
                    file.sync_all().await.map_err(RunError::Io)?;
                } else {
                    let data = objects
                        .read(storage_id)
                        .await
                        .map_err(|e| RunError::Download(e.to_string()))?;
                    tokio::fs::write(&target, data).await.map_err(RunError::Io)?;
                }
                Ok(())
            }
        })
        .await
    }

    /// Primary once, fallback with bounded retry on any primary failure.
    ///
    /// The `primary_attempted` flag lives in the run context: once the
    /// primary has failed inside this run it is never re-invoked, and the
    /// fallback is never skipped.
    async fn transcribe_with_fallback(
        &self,
        ctx: &mut RunContext,
        audio: &PathBuf,
    ) -> Result<String, RunError> {
        if !ctx.primary_attempted {
            ctx.primary_attempted = true;
            match self.primary.transcribe(audio).await {
                Ok(text) => {
                    debug!("Engine {} produced the transcript", self.primary.name());
                    return Ok(text);
                }
                Err(e) => {
                    warn!(
                        "Engine {} failed ({}), falling back to {}",
                        self.primary.name(),
                        e,
                        self.fallback.name()
                    );
                }
            }
        }

        let fallback = self.fallback.clone();
        let audio = audio.clone();
        let text = self
            .with_retries("fallback-engine", || {
                let fallback = fallback.clone();
                let audio = audio.clone();
                async move { fallback.transcribe(&audio).await }
            })
            .await?;
        debug!("Engine {} produced the transcript", self.fallback.name());
        Ok(text)
    }

    /// Bounded retry with fixed backoff for one step. The last failure
    /// wins; intermediate failures are logged.
    async fn with_retries<T, E, F, Fut>(&self, step: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.config.step_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        "Step {} attempt {}/{} failed: {}",
                        step, attempt, attempts, e
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        sleep(self.config.step_backoff).await;
                    }
                }
            }
        }
        Err(last_error.expect("at least one attempt"))
    }
}

/// Fire-and-forget trigger surface backed by a channel into the
/// dispatcher task.
#[derive(Clone)]
pub struct OrchestratorHandle {
    job_tx: mpsc::Sender<TranscriptionRequest>,
}

impl OrchestratorHandle {
    /// Queue a transcription run. Returns false only if the dispatcher is
    /// gone, which means the process is shutting down.
    pub async fn trigger(&self, media_id: Uuid, storage_id: Uuid) -> bool {
        let request = TranscriptionRequest {
            media_id,
            storage_id,
        };
        match self.job_tx.send(request).await {
            Ok(()) => true,
            Err(e) => {
                error!("Transcription dispatcher is down: {}", e);
                false
            }
        }
    }
}

/// Start the background dispatcher: one task receives trigger events and
/// spawns a run per event, bounded by the orchestrator's permit pool.
pub fn spawn_dispatcher(orchestrator: Arc<TranscriptionOrchestrator>) -> OrchestratorHandle {
    let (job_tx, mut job_rx) = mpsc::channel::<TranscriptionRequest>(100);

    tokio::spawn(async move {
        info!("Transcription dispatcher started");
        while let Some(request) = job_rx.recv().await {
            let orchestrator = orchestrator.clone();
            let permits = orchestrator.run_permits.clone();
            tokio::spawn(async move {
                // Closed only at shutdown; holding the permit for the whole
                // run is what bounds concurrent engine processes.
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                orchestrator.run(request).await;
            });
        }
        info!("Transcription dispatcher stopped");
    });

    OrchestratorHandle { job_tx }
}
