use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use lorebook_core::config::{RemoteConfig, SyncOptions};
use lorebook_core::integrity::MAX_TITLE_LEN;
use lorebook_core::models::{ConflictKind, ConflictSummary};
use lorebook_core::services::DocumentStore;
use lorebook_core::sync::SyncEngine;
use lorebook_core::{Document, DocumentId};
use serde::Serialize;

use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct DocumentListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub created_at: i64,
    pub modified_at: i64,
    pub relative_time: String,
    pub tags: Vec<String>,
    pub synced: bool,
}

pub fn open_store(db_path: &Path) -> Result<DocumentStore, CliError> {
    if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(DocumentStore::open_path(db_path)?)
}

/// Sync engine for the store at `db_path`, configured from the environment
pub fn open_engine(db_path: &Path) -> Result<SyncEngine, CliError> {
    let config = RemoteConfig::from_env()?;
    open_engine_with(db_path, config.as_ref())
}

pub fn open_engine_with(
    db_path: &Path,
    config: Option<&RemoteConfig>,
) -> Result<SyncEngine, CliError> {
    if config.is_none() {
        return Err(CliError::SyncNotConfigured);
    }
    let store = open_store(db_path)?;
    Ok(SyncEngine::from_config(
        store,
        config,
        SyncOptions::default(),
    )?)
}

pub async fn list_documents(
    limit: usize,
    tag: Option<&str>,
    db_path: &Path,
) -> Result<Vec<Document>, CliError> {
    let store = open_store(db_path)?;
    let tag = tag.map(|tag| tag.trim().to_lowercase());
    Ok(store
        .get_all()
        .await?
        .into_iter()
        .filter(|doc| tag.as_ref().map_or(true, |tag| doc.tags.contains(tag)))
        .take(limit)
        .collect())
}

pub async fn search_documents(
    query: &str,
    limit: usize,
    db_path: &Path,
) -> Result<Vec<Document>, CliError> {
    let store = open_store(db_path)?;
    let mut documents = store.search(query).await?;
    documents.truncate(limit);
    Ok(documents)
}

/// Find a document by full id or unique id prefix
pub async fn resolve_document(query: &str, store: &DocumentStore) -> Result<Document, CliError> {
    if let Ok(id) = query.parse::<DocumentId>() {
        if let Some(document) = store.get(&id).await? {
            return Ok(document);
        }
    }

    let matching_ids = store.list_ids_by_prefix(query, 3).await?;

    match matching_ids.len() {
        0 => Err(CliError::DocumentNotFound(query.to_string())),
        1 => {
            let resolved_id = matching_ids[0]
                .parse::<DocumentId>()
                .map_err(|_| CliError::DocumentNotFound(query.to_string()))?;
            store
                .get(&resolved_id)
                .await?
                .ok_or_else(|| CliError::DocumentNotFound(query.to_string()))
        }
        _ => {
            let options = matching_ids
                .iter()
                .map(|id| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousDocumentId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

pub fn format_document_lines(documents: &[Document]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    documents
        .iter()
        .map(|doc| {
            let short_id = short_id(doc.id.as_str());
            let title = truncate(&doc.title, 40);
            let relative_time = format_relative_time(doc.modified_at, now_ms);
            let marker = if doc.is_synced() { ' ' } else { '*' };
            let tags = render_tags(doc);

            if tags.is_empty() {
                format!("{short_id:<13}{marker} {title:<40}  {relative_time}")
            } else {
                format!("{short_id:<13}{marker} {title:<40}  {relative_time:<10}  {tags}")
            }
        })
        .collect()
}

pub fn document_to_list_item(doc: &Document) -> DocumentListItem {
    let now_ms = Utc::now().timestamp_millis();
    DocumentListItem {
        id: doc.id.to_string(),
        title: doc.title.clone(),
        preview: truncate(&doc.preview(200), 80),
        created_at: doc.created_at,
        modified_at: doc.modified_at,
        relative_time: format_relative_time(doc.modified_at, now_ms),
        tags: doc.tags.clone(),
        synced: doc.is_synced(),
    }
}

pub fn format_document_detail(doc: &Document) -> String {
    let mut lines = vec![
        doc.title.clone(),
        format!("id:       {}", doc.id),
        format!("created:  {}", format_timestamp(doc.created_at)),
        format!("modified: {}", format_timestamp(doc.modified_at)),
        format!("checksum: {}", doc.checksum),
    ];
    if !doc.tags.is_empty() {
        lines.push(format!("tags:     {}", render_tags(doc)));
    }
    match &doc.remote {
        Some(remote) => lines.push(format!(
            "remote:   {} (synced {})",
            remote.path,
            format_timestamp(remote.last_synced_at)
        )),
        None => lines.push("remote:   not synced".to_string()),
    }
    lines.push(String::new());
    lines.push(doc.content.clone());
    lines.join("\n")
}

pub fn format_conflict_lines(conflicts: &[ConflictSummary]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{:<13}  {:<30}  local={} remote={}  {}",
                short_id(conflict.id.as_str()),
                truncate(&conflict.title, 30),
                format_timestamp(conflict.local_modified_at),
                format_timestamp(conflict.remote_modified_at),
                match conflict.kind {
                    ConflictKind::BothModified => "both modified",
                    ConflictKind::NoSyncMarker => "never synced",
                }
            )
        })
        .collect()
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags(doc: &Document) -> String {
    doc.tags
        .iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Title from the first non-blank body line, without heading markers
pub fn derive_title(content: &str) -> Option<String> {
    let line = content.lines().find(|line| !line.trim().is_empty())?;
    let title = line.trim().trim_start_matches('#').trim();
    if title.is_empty() {
        None
    } else {
        Some(title.chars().take(MAX_TITLE_LEN).collect())
    }
}

pub fn resolve_document_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptySearchQuery)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_document_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyDocumentId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_document_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            // EDITOR may carry arguments, e.g. "code --wait".
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let status = Command::new(program).args(parts).arg(file_path).status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_document_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("lorebook-{}-{now}.md", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("LOREBOOK_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("lorebook")
        .join("lorebook.db")
}
