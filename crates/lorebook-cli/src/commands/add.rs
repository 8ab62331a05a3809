use std::path::Path;

use lorebook_core::DocumentDraft;

use crate::commands::common::{derive_title, open_engine, open_store, resolve_document_content};
use crate::error::CliError;

const UNTITLED: &str = "Untitled";

pub async fn run_add(
    content_parts: &[String],
    title: Option<&str>,
    tags: &[String],
    push: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let content = resolve_document_content(content_parts)?;
    let draft = build_draft(content, title, tags);

    if push {
        let engine = open_engine(db_path)?;
        let document = engine.store().save(draft).await?;
        engine.queue_change(document.id.clone()).await;
        let report = engine.flush_queue().await?;
        if report.requeued > 0 {
            eprintln!("Upload failed; run `lore sync` to retry");
        }
        println!("{}", document.id);
        return Ok(());
    }

    let store = open_store(db_path)?;
    let document = store.save(draft).await?;
    println!("{}", document.id);
    Ok(())
}

pub fn build_draft(content: String, title: Option<&str>, tags: &[String]) -> DocumentDraft {
    let title = title
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .or_else(|| derive_title(&content))
        .unwrap_or_else(|| UNTITLED.to_string());
    DocumentDraft::new(title, content).with_tags(tags.iter().cloned())
}
