//! Documents stored as files in a remote Git repository.

use std::sync::Arc;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::format::{format_document, parse_document, parse_header};
use super::transport::{RequestOptions, RequestTransport};
use crate::error::{Error, Result};
use crate::integrity::checksum;
use crate::models::{Document, DocumentId, RemoteRef};
use crate::util::now_ms;

const PLACEHOLDER_NAME: &str = "README.md";
const PLACEHOLDER_TEXT: &str =
    "# Lorebook documents\n\nThis directory is managed by Lorebook. Each `.md` file is one document.\n";

/// Listing entry for a remote document, read from its header only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: DocumentId,
    pub title: String,
    pub path: String,
    pub revision_token: String,
    pub size: u64,
    pub modified_at: i64,
    pub tags: Vec<String>,
    pub checksum: String,
}

/// A raw remote file
#[derive(Debug, Clone)]
struct RemoteFile {
    text: String,
    sha: String,
}

/// Remote document store over a [`RequestTransport`].
///
/// Every document lives at `<documents_dir>/<id>.md`, so renaming a
/// document never moves its file.
#[derive(Clone)]
pub struct RemoteDocumentStore {
    transport: Arc<dyn RequestTransport>,
    documents_dir: String,
    branch: Option<String>,
}

impl std::fmt::Debug for RemoteDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDocumentStore")
            .field("documents_dir", &self.documents_dir)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

impl RemoteDocumentStore {
    pub fn new(transport: Arc<dyn RequestTransport>, documents_dir: impl Into<String>) -> Self {
        Self {
            transport,
            documents_dir: documents_dir.into().trim_matches('/').to_string(),
            branch: None,
        }
    }

    #[must_use]
    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn documents_dir(&self) -> &str {
        &self.documents_dir
    }

    /// Remote path of a document; depends only on its id
    pub fn path_for(&self, id: &DocumentId) -> String {
        format!("{}/{}.md", self.documents_dir, id)
    }

    /// Write `document` to its remote path.
    ///
    /// A document without a remote reference is written unconditionally,
    /// overwriting any file already at its path. Otherwise the remote revision must still match the one recorded
    /// locally, or the write fails with [`Error::ConflictOnWrite`]. A remote
    /// file that has disappeared is recreated.
    pub async fn save(&self, document: &Document) -> Result<RemoteRef> {
        let path = self.path_for(&document.id);
        let text = format_document(document);
        let mut body = json!({
            "message": format!("Update {}", document.title),
            "content": base64::engine::general_purpose::STANDARD.encode(&text),
        });

        if let Some(remote) = &document.remote {
            match self.fetch(&path).await {
                Ok(current) if current.sha == remote.revision_token => {
                    body["sha"] = json!(current.sha);
                }
                Ok(current) => {
                    tracing::debug!(
                        %path,
                        expected = %remote.revision_token,
                        actual = %current.sha,
                        "remote revision moved"
                    );
                    return Err(Error::ConflictOnWrite { path });
                }
                Err(Error::NotFound(_)) => {
                    tracing::debug!(%path, "remote copy missing; recreating");
                }
                Err(error) => return Err(error),
            }
        } else {
            // The contents API only replaces an existing file when given its sha.
            match self.fetch(&path).await {
                Ok(current) => {
                    tracing::debug!(%path, "overwriting remote file of a never-synced document");
                    body["sha"] = json!(current.sha);
                }
                Err(Error::NotFound(_)) => {}
                Err(error) => return Err(error),
            }
        }
        self.attach_branch(&mut body);

        let response = self
            .transport
            .request(&contents_path(&path), RequestOptions::put(body))
            .await?;
        let revision_token = response["content"]["sha"]
            .as_str()
            .ok_or_else(|| Error::Transport(format!("write to {path} returned no revision")))?
            .to_string();

        tracing::debug!(%path, bytes = text.len(), "saved remote document");
        Ok(RemoteRef {
            path,
            revision_token,
            last_synced_at: now_ms(),
        })
    }

    /// Read and verify the document at `path`.
    ///
    /// The body must match the checksum recorded in the header, otherwise
    /// [`Error::Integrity`] is returned.
    pub async fn load(&self, path: &str) -> Result<Document> {
        let file = self.fetch(path).await?;
        let mut document = parse_document(&file.text)?;
        let actual = checksum(&document.content);
        if actual != document.checksum {
            return Err(Error::Integrity {
                id: document.id.to_string(),
                expected: document.checksum,
                actual,
            });
        }
        document.remote = Some(RemoteRef {
            path: path.to_string(),
            revision_token: file.sha,
            last_synced_at: now_ms(),
        });
        Ok(document)
    }

    /// List remote documents.
    ///
    /// Only `.md` files directly under the documents directory count;
    /// placeholders named `readme*` and files whose header cannot be parsed
    /// are skipped. A missing directory lists as empty.
    pub async fn list(&self) -> Result<Vec<RemoteEntry>> {
        let listing = match self
            .transport
            .request(&contents_path(&self.documents_dir), self.get_options())
            .await
        {
            Ok(listing) => listing,
            Err(Error::NotFound(_)) => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };

        let Value::Array(items) = listing else {
            return Err(Error::Transport(format!(
                "{} is not a directory",
                self.documents_dir
            )));
        };

        let mut entries = Vec::new();
        for item in &items {
            let (Some(name), Some(path)) = (item["name"].as_str(), item["path"].as_str()) else {
                continue;
            };
            if item["type"].as_str() != Some("file") || !is_document_name(name) {
                continue;
            }

            let file = match self.fetch(path).await {
                Ok(file) => file,
                Err(Error::NotFound(_)) => continue,
                Err(error) => return Err(error),
            };
            match parse_header(&file.text) {
                Ok(header) => entries.push(RemoteEntry {
                    id: header.id,
                    title: header.title,
                    path: path.to_string(),
                    revision_token: file.sha,
                    size: item["size"].as_u64().unwrap_or(file.text.len() as u64),
                    modified_at: header.modified_at,
                    tags: header.tags,
                    checksum: header.checksum,
                }),
                Err(error) => {
                    tracing::warn!(%path, %error, "skipping unreadable remote document");
                }
            }
        }

        tracing::debug!(count = entries.len(), "listed remote documents");
        Ok(entries)
    }

    /// Delete the file at `path` if it is still at `revision_token`
    pub async fn delete(&self, path: &str, revision_token: &str) -> Result<()> {
        let mut body = json!({
            "message": format!("Delete {path}"),
            "sha": revision_token,
        });
        self.attach_branch(&mut body);
        self.transport
            .request(&contents_path(path), RequestOptions::delete(body))
            .await?;
        tracing::debug!(%path, "deleted remote document");
        Ok(())
    }

    /// Make sure the documents directory exists, writing a placeholder
    /// file when it does not. Idempotent.
    pub async fn ensure_container(&self) -> Result<()> {
        match self
            .transport
            .request(&contents_path(&self.documents_dir), self.get_options())
            .await
        {
            Ok(_) => return Ok(()),
            Err(Error::NotFound(_)) => {}
            Err(error) => return Err(error),
        }

        let mut body = json!({
            "message": "Create documents directory",
            "content": base64::engine::general_purpose::STANDARD.encode(PLACEHOLDER_TEXT),
        });
        self.attach_branch(&mut body);
        let placeholder = format!("{}/{PLACEHOLDER_NAME}", self.documents_dir);
        match self
            .transport
            .request(&contents_path(&placeholder), RequestOptions::put(body))
            .await
        {
            // Another client created it first.
            Ok(_) | Err(Error::ConflictOnWrite { .. }) => {
                tracing::info!(dir = %self.documents_dir, "created remote documents directory");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn fetch(&self, path: &str) -> Result<RemoteFile> {
        let response = self
            .transport
            .request(&contents_path(path), self.get_options())
            .await?;

        let sha = response["sha"]
            .as_str()
            .ok_or_else(|| Error::Transport(format!("{path} returned no revision")))?
            .to_string();
        let encoded: String = response["content"]
            .as_str()
            .ok_or_else(|| Error::MalformedDocument(format!("{path} has no content")))?
            .chars()
            .filter(|ch| !ch.is_ascii_whitespace())
            .collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|error| Error::MalformedDocument(format!("{path}: {error}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|error| Error::MalformedDocument(format!("{path}: {error}")))?;

        Ok(RemoteFile { text, sha })
    }

    fn get_options(&self) -> RequestOptions {
        match &self.branch {
            Some(branch) => RequestOptions::get().with_query("ref", branch.clone()),
            None => RequestOptions::get(),
        }
    }

    fn attach_branch(&self, body: &mut Value) {
        if let Some(branch) = &self.branch {
            body["branch"] = json!(branch);
        }
    }
}

fn contents_path(path: &str) -> String {
    format!("contents/{}", path.trim_matches('/'))
}

fn is_document_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".md") && !lower.starts_with("readme")
}
