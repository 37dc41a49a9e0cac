//! Entry points used by the upload flow.

use tracing::info;
use uuid::Uuid;

use lexvault_core::{
    Document, DocumentStatus, Error, EventBus, NewDocument, Repositories, Result, ServerEvent,
    TaskKind, TaskPayload,
};
use lexvault_db::DocumentStore;

/// Store an uploaded file and register it as an `uploaded` document.
pub async fn register_upload(
    repos: &Repositories,
    store: &DocumentStore,
    case_id: Uuid,
    file_name: &str,
    data: &[u8],
    uploaded_by: Option<Uuid>,
) -> Result<Document> {
    let storage_path = store.put_upload(case_id, file_name, data).await?;
    let document = repos
        .documents
        .insert(NewDocument {
            case_id,
            file_name: file_name.to_string(),
            storage_path,
            uploaded_by,
        })
        .await?;
    info!(
        subsystem = "jobs",
        component = "submission",
        document_id = %document.id,
        case_id = %case_id,
        byte_len = data.len(),
        "Upload registered"
    );
    Ok(document)
}

/// Queue a document for processing.
///
/// Fails with `NotFound` for an unknown document. An `uploaded` document
/// moves to `queued`; other statuses are left alone. The queue does not
/// deduplicate, so calling this twice creates two tasks.
pub async fn enqueue_document_processing(
    repos: &Repositories,
    events: &EventBus,
    document_id: Uuid,
    kind: TaskKind,
    payload: TaskPayload,
) -> Result<Uuid> {
    if repos.documents.get(document_id).await?.is_none() {
        return Err(Error::NotFound(format!("document {}", document_id)));
    }

    let task_id = repos.tasks.enqueue(document_id, kind, payload).await?;
    repos
        .documents
        .transition(document_id, &[DocumentStatus::Uploaded], DocumentStatus::Queued)
        .await?;

    info!(
        subsystem = "jobs",
        component = "submission",
        task_id = %task_id,
        document_id = %document_id,
        task_kind = %kind,
        "Task queued"
    );
    events.emit(ServerEvent::TaskQueued {
        task_id,
        document_id,
        task_kind: kind.to_string(),
    });
    Ok(task_id)
}
