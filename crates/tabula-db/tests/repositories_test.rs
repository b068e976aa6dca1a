//! Integration tests for entity repositories.
//!
//! Requires a migrated PostgreSQL database; set DATABASE_URL to run.

use pgvector::Vector;
use tabula_db::test_fixtures::{seed_notebook, seed_source, TestDatabase};
use tabula_db::{
    Asset, CreateNoteRequest, CreateSourceRequest, ModelKind, ModelProvider, ModelRegistry,
    NewSourceEmbedding, NoteRepository, NotebookRepository, NoteType, SourceRepository,
};

async fn test_db() -> TestDatabase {
    dotenvy::dotenv().ok();
    TestDatabase::new().await
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_notebook_crud() {
    let test_db = test_db().await;
    let db = &test_db.db;

    let id = seed_notebook(db, "Research").await;

    let notebook = db.notebooks.get(id).await.unwrap().unwrap();
    assert_eq!(notebook.name, "Research");
    assert!(!notebook.archived);

    assert!(db.notebooks.set_archived(id, true).await.unwrap());
    let listed = db.notebooks.list(false).await.unwrap();
    assert!(listed.iter().all(|n| n.id != id));
    let listed = db.notebooks.list(true).await.unwrap();
    assert!(listed.iter().any(|n| n.id == id));

    assert!(db.notebooks.delete(id).await.unwrap());
    assert!(db.notebooks.get(id).await.unwrap().is_none());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_source_delete_removes_derived_rows() {
    let test_db = test_db().await;
    let db = &test_db.db;

    let notebook_id = seed_notebook(db, "Research").await;
    let source_id = seed_source(db, notebook_id, "Some document text.").await;

    db.sources
        .replace_embeddings(
            source_id,
            vec![NewSourceEmbedding {
                content: "Some document text.".to_string(),
                embedding: Vector::from(vec![0.1; 768]),
            }],
        )
        .await
        .unwrap();
    db.sources
        .add_insight(source_id, "summary", "A short summary.")
        .await
        .unwrap();

    assert_eq!(db.sources.embedded_chunk_count(source_id).await.unwrap(), 1);
    assert_eq!(db.sources.list_insights(source_id).await.unwrap().len(), 1);

    assert!(db.sources.delete(source_id).await.unwrap());

    assert_eq!(db.sources.embedded_chunk_count(source_id).await.unwrap(), 0);
    assert!(db.sources.list_insights(source_id).await.unwrap().is_empty());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_source_delete_removes_uploaded_file() {
    let test_db = test_db().await;
    let db = &test_db.db;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("upload.pdf");
    std::fs::write(&file, b"content").unwrap();

    let notebook_id = seed_notebook(db, "Research").await;
    let source = db
        .sources
        .create(CreateSourceRequest {
            notebook_id,
            asset: Some(Asset {
                file_path: Some(file.to_str().unwrap().to_string()),
                url: None,
            }),
            title: Some("Uploaded document".to_string()),
            topics: vec![],
            full_text: Some("text".to_string()),
        })
        .await
        .unwrap();

    assert!(db.sources.delete(source.id).await.unwrap());
    assert!(!file.exists());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_replace_embeddings_is_idempotent() {
    let test_db = test_db().await;
    let db = &test_db.db;

    let notebook_id = seed_notebook(db, "Research").await;
    let source_id = seed_source(db, notebook_id, "text").await;

    let chunks = |n: usize| {
        (0..n)
            .map(|i| NewSourceEmbedding {
                content: format!("chunk {}", i),
                embedding: Vector::from(vec![0.0; 768]),
            })
            .collect::<Vec<_>>()
    };

    db.sources.replace_embeddings(source_id, chunks(3)).await.unwrap();
    db.sources.replace_embeddings(source_id, chunks(2)).await.unwrap();

    assert_eq!(db.sources.embedded_chunk_count(source_id).await.unwrap(), 2);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_note_embedding_written_only_when_present() {
    let test_db = test_db().await;
    let db = &test_db.db;

    let notebook_id = seed_notebook(db, "Research").await;

    let note = db
        .notes
        .create(
            CreateNoteRequest {
                notebook_id,
                title: Some("Idea".to_string()),
                content: Some("Content".to_string()),
                note_type: Some(NoteType::Human),
            },
            None,
        )
        .await
        .unwrap();

    assert!(db
        .notes
        .save_embedding(note.id, Vector::from(vec![0.5; 768]))
        .await
        .unwrap());

    let ids = db.notes.all_ids().await.unwrap();
    assert!(ids.contains(&note.id));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_save_insight_as_note_copies_into_notebook() {
    let test_db = test_db().await;
    let db = &test_db.db;

    let notebook_id = seed_notebook(db, "Research").await;
    let source_id = seed_source(db, notebook_id, "Some document text.").await;
    let insight = db
        .sources
        .add_insight(source_id, "summary", "A short summary.")
        .await
        .unwrap();

    let note = db.save_insight_as_note(insight.id).await.unwrap();
    assert_eq!(note.notebook_id, notebook_id);
    assert_eq!(note.title.as_deref(), Some("summary"));
    assert_eq!(note.content.as_deref(), Some("A short summary."));
    assert_eq!(note.note_type, Some(NoteType::Ai));

    // The insight itself is untouched.
    assert!(db.sources.get_insight(insight.id).await.unwrap().is_some());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_model_registry_defaults_singleton() {
    let test_db = test_db().await;
    let db = &test_db.db;

    let model = db
        .models
        .register("nomic-embed-text", ModelProvider::Ollama, ModelKind::Embedding)
        .await
        .unwrap();

    let mut defaults = db.models.get_defaults().await.unwrap();
    assert!(defaults.default_embedding_model.is_none());

    defaults.default_embedding_model = Some(model.id);
    db.models.set_defaults(&defaults).await.unwrap();

    let fetched = db.models.get_defaults().await.unwrap();
    assert_eq!(fetched.default_embedding_model, Some(model.id));

    test_db.cleanup().await;
}
