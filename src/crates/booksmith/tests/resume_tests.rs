//! Resuming stored runs: failures, cancellation and finished books

mod common;

use booksmith::{
    ChapterStatus, ErrorKind, FrontierPolicy, PipelineOrchestrator, RunCheckpointer, RunState, ShutdownCoordinator,
    Stage,
};
use checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
use common::{orchestrator, settings, RecordingAssembler, ScriptedBackend};
use llm::ServiceError;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn strict(backend: &Arc<ScriptedBackend>, store: &Arc<dyn CheckpointStore>, assembler: &Arc<RecordingAssembler>) -> PipelineOrchestrator {
    orchestrator(
        backend.clone(),
        store.clone(),
        assembler.clone(),
        settings(2, FrontierPolicy::Strict),
    )
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_chapter_failure_retries_only_from_failed_chapter() {
    let backend = Arc::new(ScriptedBackend::new(5));
    backend.fail_always("chapter-3", ServiceError::from_status(400, "content rejected"));
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let assembler = Arc::new(RecordingAssembler::default());

    let err = strict(&backend, &store, &assembler)
        .start("A lighthouse keeper inherits a moving map")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PermanentService);
    assert_eq!(err.stage, Some(Stage::Chapters));
    assert_eq!(err.unit.as_deref(), Some("chapter-3"));

    let checkpointer = RunCheckpointer::new(store.clone());
    let stored = checkpointer.load(&err.run_id).await.unwrap().unwrap();
    assert_eq!(stored.state, RunState::Failed);
    assert_eq!(stored.failure.as_ref().unwrap().at_state, RunState::OutlineDone);
    let statuses: Vec<ChapterStatus> = stored.chapters.iter().map(|c| c.status).collect();
    assert_eq!(
        statuses,
        vec![
            ChapterStatus::Generated,
            ChapterStatus::Generated,
            ChapterStatus::Failed,
            ChapterStatus::Pending,
            ChapterStatus::Pending,
        ]
    );

    // Fix the service and resume with a fresh orchestrator
    backend.clear_script("chapter-3");
    backend.reset_calls();
    let report = strict(&backend, &store, &assembler).resume(&err.run_id).await.unwrap();

    assert_eq!(report.state, RunState::AssemblyDone);
    assert_eq!(report.run_id, err.run_id);
    assert_eq!(
        backend.tags(),
        vec![
            "chapter-3",
            "chapter-4",
            "chapter-5",
            "refine-1",
            "refine-2",
            "refine-3",
            "refine-4",
            "refine-5",
        ]
    );

    let stored = checkpointer.load(&err.run_id).await.unwrap().unwrap();
    assert!(stored.failure.is_none());
    assert_eq!(stored.chapter(3).unwrap().attempts, 1);
    assert!(stored.chapters.iter().all(|c| c.status == ChapterStatus::Refined));
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_refinement_failure_skips_refined_chapters() {
    let backend = Arc::new(ScriptedBackend::new(3));
    backend.fail_always("refine-2", ServiceError::from_status(422, "unprocessable"));
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let assembler = Arc::new(RecordingAssembler::default());

    let err = strict(&backend, &store, &assembler).start("A drowned bell tower").await.unwrap_err();
    assert_eq!(err.stage, Some(Stage::Refinement));

    backend.clear_script("refine-2");
    backend.reset_calls();
    let report = strict(&backend, &store, &assembler).resume(&err.run_id).await.unwrap();

    assert_eq!(report.state, RunState::AssemblyDone);
    assert_eq!(report.refined, 3);
    assert_eq!(backend.tags(), vec!["refine-2", "refine-3"]);
}

#[tokio::test(start_paused = true)]
async fn test_resume_of_assembled_run_makes_no_calls() {
    let backend = Arc::new(ScriptedBackend::new(2));
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let assembler = Arc::new(RecordingAssembler::default());

    let first = strict(&backend, &store, &assembler).start("A lighthouse story").await.unwrap();
    backend.reset_calls();

    let again = strict(&backend, &store, &assembler).resume(&first.run_id).await.unwrap();

    assert_eq!(again, first);
    assert!(backend.tags().is_empty());
    assert_eq!(assembler.count(), 1);
}

#[tokio::test]
async fn test_resume_of_unknown_run_is_config_error() {
    let backend = Arc::new(ScriptedBackend::new(2));
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let assembler = Arc::new(RecordingAssembler::default());

    let err = strict(&backend, &store, &assembler).resume("no-such-run").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(err.run_id, "no-such-run");
    assert!(backend.tags().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_resumes_where_it_stopped() {
    let backend = Arc::new(ScriptedBackend::new(3));
    backend.delay_tag("chapter-2", Duration::from_secs(30));
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let assembler = Arc::new(RecordingAssembler::default());
    let shutdown = ShutdownCoordinator::new();
    let interrupted = strict(&backend, &store, &assembler).with_shutdown(shutdown.clone());

    let (result, ()) = tokio::join!(interrupted.start("A lighthouse story"), async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        shutdown.request_shutdown();
    });
    let err = result.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.stage, Some(Stage::Chapters));

    let checkpointer = RunCheckpointer::new(store.clone());
    let stored = checkpointer.load(&err.run_id).await.unwrap().unwrap();
    assert_eq!(stored.state, RunState::Failed);
    assert_eq!(stored.chapter(1).unwrap().status, ChapterStatus::Generated);
    assert_eq!(stored.chapter(2).unwrap().status, ChapterStatus::Pending);

    backend.reset_calls();
    let report = strict(&backend, &store, &assembler).resume(&err.run_id).await.unwrap();

    assert_eq!(report.state, RunState::AssemblyDone);
    assert_eq!(backend.count_prefix("chapter-1"), 0);
    assert_eq!(backend.count_prefix("chapter-2"), 1);
    assert_eq!(backend.count_prefix("chapter-3"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_start_stops_at_first_stage() {
    let backend = Arc::new(ScriptedBackend::new(2));
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let assembler = Arc::new(RecordingAssembler::default());
    let shutdown = ShutdownCoordinator::new();
    shutdown.request_shutdown();

    let err = strict(&backend, &store, &assembler)
        .with_shutdown(shutdown)
        .start("A lighthouse story")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.stage, Some(Stage::Concept));
    assert!(backend.tags().is_empty());
}

#[tokio::test]
async fn test_resume_from_file_store_does_not_repeat_chapters() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new(4));
    backend.fail_always("chapter-3", ServiceError::from_status(400, "content rejected"));
    let assembler = Arc::new(RecordingAssembler::default());

    let store: Arc<dyn CheckpointStore> = Arc::new(FileCheckpointStore::new(dir.path()));
    let err = strict(&backend, &store, &assembler).start("A lighthouse story").await.unwrap_err();
    assert_eq!(err.unit.as_deref(), Some("chapter-3"));
    assert!(dir.path().join(format!("{}.json", err.run_id)).exists());

    // A new store over the same directory sees the stored run
    backend.clear_script("chapter-3");
    backend.reset_calls();
    let reopened: Arc<dyn CheckpointStore> = Arc::new(FileCheckpointStore::new(dir.path()));
    let report = strict(&backend, &reopened, &assembler).resume(&err.run_id).await.unwrap();

    assert_eq!(report.state, RunState::AssemblyDone);
    assert_eq!(backend.count_prefix("chapter-1"), 0);
    assert_eq!(backend.count_prefix("chapter-2"), 0);
    assert_eq!(backend.count_prefix("chapter-3"), 1);
    assert_eq!(backend.count_prefix("chapter-4"), 1);
    assert_eq!(backend.count_prefix("concept"), 0);

    let runs = RunCheckpointer::new(reopened).list_runs().await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, err.run_id);
}
