use std::path::Path;

use crate::commands::common::{normalize_document_identifier, open_store, resolve_document};
use crate::error::CliError;

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_document_identifier(id)?;
    let store = open_store(db_path)?;
    let document = resolve_document(&normalized_id, &store).await?;

    store.delete(&document.id).await?;
    println!("{}", document.id);
    Ok(())
}
