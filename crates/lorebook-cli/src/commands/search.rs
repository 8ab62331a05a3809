use std::path::Path;

use crate::commands::common::{
    document_to_list_item, format_document_lines, normalize_search_query, search_documents,
    DocumentListItem,
};
use crate::error::CliError;

pub async fn run_search(
    query: &str,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let query = normalize_search_query(query)?;
    let documents = search_documents(&query, limit, db_path).await?;

    if as_json {
        let json_items = documents
            .iter()
            .map(document_to_list_item)
            .collect::<Vec<DocumentListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if documents.is_empty() {
        println!("No documents match '{query}'.");
        return Ok(());
    }

    for line in format_document_lines(&documents) {
        println!("{line}");
    }
    Ok(())
}
