use std::path::Path;

use crate::commands::common::{
    document_to_list_item, format_document_lines, list_documents, DocumentListItem,
};
use crate::error::CliError;

pub async fn run_list(
    limit: usize,
    tag: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let documents = list_documents(limit, tag, db_path).await?;

    if as_json {
        let json_items = documents
            .iter()
            .map(document_to_list_item)
            .collect::<Vec<DocumentListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_document_lines(&documents) {
            println!("{line}");
        }
    }

    Ok(())
}
