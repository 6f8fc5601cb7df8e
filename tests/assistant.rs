//! End-to-end exchange flows through the assistant with a deterministic backend.

mod common;

use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::Ordering;

use common::{assistant, test_config, test_config_with, MockBackend};
use tempfile::TempDir;
use wallo::exchange::ExchangeEvent;
use wallo::Error;
use wallo_core::models::{AttachmentKind, ExchangeStatus};
use wallo_core::service::Role;

fn answers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn selection_prompt_sends_template_selection_and_footer() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    backend.fence_replies.store(true, Ordering::SeqCst);
    let app = assistant(test_config(dir.path()), backend.clone()).await;

    let id = app.add_exchange(None, "we did the thing and it kinda worked").unwrap();
    let status = app
        .submit_prompt(&id, "polish", BTreeMap::new(), None)
        .unwrap()
        .wait()
        .await;
    assert_eq!(status, ExchangeStatus::Done);

    let request = backend.chat_requests.lock().unwrap()[0].clone();
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[0].role, Role::System);
    assert_eq!(
        request.messages[1].content,
        "Polish this:\n\nwe did the thing and it kinda worked\n-- end"
    );

    let exchange = app.store().get(&id).unwrap();
    assert_eq!(exchange.reply_text, "reply to [Polish this:]");
    assert_eq!(exchange.task_text, "we did the thing and it kinda worked");
    assert!(exchange.stage.is_none());
}

#[tokio::test]
async fn inquiry_with_missing_answer_fails_before_any_call() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let app = assistant(test_config(dir.path()), backend.clone()).await;
    app.index()
        .ingest("notes.md", "short pieces for students")
        .await
        .unwrap();
    let embeds_after_ingest = backend.embed_calls.load(Ordering::SeqCst);
    backend.fail_embed.store(true, Ordering::SeqCst);

    let id = app.add_exchange(None, "").unwrap();
    app.toggle_rag(&id).unwrap();
    let status = app
        .submit_prompt(&id, "brief", answers(&[("length", "50 words")]), None)
        .unwrap()
        .wait()
        .await;

    let expected = Error::MissingInquiryAnswer {
        prompt: "brief".to_string(),
        field: "audience".to_string(),
    };
    assert_eq!(
        status,
        ExchangeStatus::Failed {
            detail: expected.to_string()
        }
    );
    assert_eq!(backend.chat_count(), 0);
    assert_eq!(backend.embed_calls.load(Ordering::SeqCst), embeds_after_ingest);
}

#[tokio::test]
async fn inquiry_answers_fill_the_template() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let app = assistant(test_config(dir.path()), backend.clone()).await;

    let id = app.add_exchange(None, "").unwrap();
    let status = app
        .submit_prompt(
            &id,
            "brief",
            answers(&[("length", " 50 words "), ("audience", "students")]),
            None,
        )
        .unwrap()
        .wait()
        .await;
    assert_eq!(status, ExchangeStatus::Done);
    assert_eq!(
        backend.last_user_message(),
        "Summarize in 50 words for students:\n-- end"
    );
    let exchange = app.store().get(&id).unwrap();
    assert!(exchange
        .attachments
        .iter()
        .any(|a| a.kind == AttachmentKind::InquiryAnswers));
}

#[tokio::test]
async fn unknown_prompt_is_rejected_at_submission() {
    let dir = TempDir::new().unwrap();
    let app = assistant(test_config(dir.path()), MockBackend::new()).await;

    let id = app.add_exchange(None, "text").unwrap();
    let err = app
        .submit_prompt(&id, "nope", BTreeMap::new(), None)
        .err()
        .unwrap();
    assert_eq!(err, Error::UnknownPrompt("nope".to_string()));
    assert_eq!(app.store().get(&id).unwrap().status, ExchangeStatus::Idle);
}

#[tokio::test]
async fn rag_enabled_exchange_gets_reference_material() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let app = assistant(test_config(dir.path()), backend.clone()).await;
    app.index()
        .ingest("otters.md", "Otters hold hands while sleeping.")
        .await
        .unwrap();

    let id = app.add_exchange(None, "otters sleeping").unwrap();
    assert!(app.toggle_rag(&id).unwrap());
    let mut events = app.store().subscribe();

    let status = app
        .submit_prompt(&id, "polish", BTreeMap::new(), None)
        .unwrap()
        .wait()
        .await;
    assert_eq!(status, ExchangeStatus::Done);

    let message = backend.last_user_message();
    assert!(message.starts_with("Polish this:\n\notters sleeping\n\n"));
    assert!(message.contains("Reference material:\n[1] (source: otters.md)\nOtters hold hands while sleeping."));
    assert!(message.ends_with("\n-- end"));

    let exchange = app.store().get(&id).unwrap();
    assert!(exchange
        .attachments
        .iter()
        .any(|a| a.kind == AttachmentKind::RagChunks));

    let mut stages = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExchangeEvent::Status {
            stage: Some(stage), ..
        } = event
        {
            stages.push(stage);
        }
    }
    assert_eq!(stages, vec!["querying index", "awaiting model"]);
}

#[tokio::test]
async fn rag_with_empty_index_sends_no_reference_section() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let app = assistant(test_config(dir.path()), backend.clone()).await;

    let id = app.add_exchange(None, "otters").unwrap();
    app.toggle_rag(&id).unwrap();
    let status = app.submit_chat(&id, None).unwrap().wait().await;
    assert_eq!(status, ExchangeStatus::Done);
    assert_eq!(backend.last_user_message(), "otters\n-- end");
}

#[tokio::test]
async fn document_prompt_reads_the_attached_file() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let app = assistant(test_config(dir.path()), backend.clone()).await;

    let id = app.add_exchange(None, "").unwrap();
    let status = app
        .submit_prompt(&id, "summarize_doc", BTreeMap::new(), None)
        .unwrap()
        .wait()
        .await;
    match status {
        ExchangeStatus::Failed { detail } => assert!(detail.contains("needs an attached document")),
        other => panic!("expected failure, got {:?}", other),
    }

    let file = dir.path().join("paper.md");
    fs::write(&file, "Results: otters are great.").unwrap();
    app.store().set_attached_file(&id, Some(file)).unwrap();
    let status = app
        .submit_prompt(&id, "summarize_doc", BTreeMap::new(), None)
        .unwrap()
        .wait()
        .await;
    assert_eq!(status, ExchangeStatus::Done);
    assert_eq!(
        backend.last_user_message(),
        "Summarize the document:\n\nResults: otters are great.\n-- end"
    );
}

#[tokio::test]
async fn backend_failure_becomes_failed_status() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    backend.fail_chat.store(true, Ordering::SeqCst);
    let app = assistant(test_config(dir.path()), backend.clone()).await;

    let id = app.add_exchange(None, "hello").unwrap();
    let status = app.submit_chat(&id, None).unwrap().wait().await;
    assert_eq!(
        status,
        ExchangeStatus::Failed {
            detail: "chat call to service 'mock-chat' failed: HTTP 500: upstream exploded"
                .to_string()
        }
    );
    let exchange = app.store().get(&id).unwrap();
    assert_eq!(exchange.reply_text, "");

    // A failed exchange can be resubmitted.
    backend.fail_chat.store(false, Ordering::SeqCst);
    let status = app.submit_chat(&id, None).unwrap().wait().await;
    assert_eq!(status, ExchangeStatus::Done);
}

#[tokio::test]
async fn unknown_service_name_fails_the_task() {
    let dir = TempDir::new().unwrap();
    let app = assistant(test_config(dir.path()), MockBackend::new()).await;

    let id = app.add_exchange(None, "hello").unwrap();
    let status = app
        .submit_chat(&id, Some("nope".to_string()))
        .unwrap()
        .wait()
        .await;
    assert_eq!(
        status,
        ExchangeStatus::Failed {
            detail: "no chat service configured (requested 'nope')".to_string()
        }
    );
}

#[tokio::test]
async fn history_includes_earlier_settled_exchanges() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let app = assistant(
        test_config_with(dir.path(), "include_history = true"),
        backend.clone(),
    )
    .await;

    let first = app.add_exchange(None, "first question").unwrap();
    app.submit_chat(&first, None).unwrap().wait().await;
    let second = app.add_exchange(Some(&first), "second question").unwrap();
    app.submit_chat(&second, None).unwrap().wait().await;

    let request = backend.chat_requests.lock().unwrap()[1].clone();
    let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
    assert_eq!(request.messages[1].content, "first question");
    assert_eq!(request.messages[2].content, "reply to [first question]");
    assert_eq!(request.messages[3].content, "second question\n-- end");
}

#[tokio::test]
async fn transcript_is_appended_to_task_text() {
    let dir = TempDir::new().unwrap();
    let app = assistant(test_config(dir.path()), MockBackend::new()).await;

    let id = app.add_exchange(None, "Intro").unwrap();
    let status = app
        .submit_transcription(&id, vec![1, 2, 3], "wav", None)
        .unwrap()
        .wait()
        .await;
    assert_eq!(status, ExchangeStatus::Done);
    assert_eq!(app.store().get(&id).unwrap().task_text, "Intro\nheard 3 bytes of wav");
}

#[tokio::test]
async fn synthesis_speaks_reply_or_task_text() {
    let dir = TempDir::new().unwrap();
    let app = assistant(test_config(dir.path()), MockBackend::new()).await;

    let id = app.add_exchange(None, "read me aloud").unwrap();
    app.submit_synthesis(&id, None).unwrap().wait().await;
    assert_eq!(
        app.store().get(&id).unwrap().synthesized_audio.as_deref(),
        Some(b"read me aloud".as_slice())
    );

    app.submit_chat(&id, None).unwrap().wait().await;
    app.submit_synthesis(&id, None).unwrap().wait().await;
    assert_eq!(
        app.store().get(&id).unwrap().synthesized_audio.as_deref(),
        Some(b"reply to [read me aloud]".as_slice())
    );

    let empty = app.add_exchange(None, "   ").unwrap();
    let status = app.submit_synthesis(&empty, None).unwrap().wait().await;
    assert!(matches!(status, ExchangeStatus::Failed { .. }));
}

#[tokio::test]
async fn corrupted_index_warning_is_kept_on_the_exchange() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("index.json"), "{ truncated").unwrap();
    let app = assistant(test_config(dir.path()), MockBackend::new()).await;

    let id = app.add_exchange(None, "otters").unwrap();
    app.toggle_rag(&id).unwrap();
    let status = app.submit_chat(&id, None).unwrap().wait().await;
    assert_eq!(status, ExchangeStatus::Done);

    let exchange = app.store().get(&id).unwrap();
    assert_eq!(exchange.reply_text, "reply to [otters]");
    assert_eq!(exchange.warnings.len(), 1);
    assert!(exchange.warnings[0].starts_with("index corrupted"), "{:?}", exchange.warnings);

    // Resubmitting without RAG clears the warning.
    app.toggle_rag(&id).unwrap();
    app.submit_chat(&id, None).unwrap().wait().await;
    assert!(app.store().get(&id).unwrap().warnings.is_empty());
}
