use std::path::Path;

use crate::commands::common::{
    capture_editor_input_with_initial, normalize_document_identifier, open_engine, open_store,
    resolve_document,
};
use crate::error::CliError;

pub async fn run_edit(
    id: &str,
    title: Option<&str>,
    push: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let normalized_id = normalize_document_identifier(id)?;
    let engine = if push { Some(open_engine(db_path)?) } else { None };
    let store = match &engine {
        Some(engine) => engine.store().clone(),
        None => open_store(db_path)?,
    };
    let document = resolve_document(&normalized_id, &store).await?;

    let Some(edited_content) = capture_editor_input_with_initial(&document.content)? else {
        return Err(CliError::EmptyEditedContent);
    };

    let new_title = title.map(str::trim).filter(|title| !title.is_empty());
    if edited_content == document.content && new_title.map_or(true, |t| t == document.title) {
        println!("{}", document.id);
        return Ok(());
    }

    let mut draft = document.to_draft();
    draft.content = edited_content;
    if let Some(new_title) = new_title {
        draft.title = new_title.to_string();
    }
    let updated = store.save(draft).await?;

    if let Some(engine) = engine {
        engine.queue_change(updated.id.clone()).await;
        let report = engine.flush_queue().await?;
        if report.requeued > 0 {
            eprintln!("Upload failed; run `lore sync` to retry");
        }
    }

    println!("{}", updated.id);
    Ok(())
}
