use std::path::Path;

use crate::commands::common::{
    format_document_detail, normalize_document_identifier, open_store, resolve_document,
};
use crate::error::CliError;

pub async fn run_show(id: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_document_identifier(id)?;
    let store = open_store(db_path)?;
    let document = resolve_document(&normalized_id, &store).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        println!("{}", format_document_detail(&document));
    }
    Ok(())
}
