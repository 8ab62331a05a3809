//! In-process stand-in for the repository contents API.
//!
//! Behaves like the GitHub contents endpoints closely enough for the sync
//! engine: base64 file bodies, blob revisions, revision checks on update
//! and delete, and directory listings. Failures can be injected per path.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::transport::{Method, RequestOptions, RequestTransport};
use crate::error::{Error, Result};

const CONTENTS_PREFIX: &str = "contents/";

/// Failure kinds that can be injected into [`MemoryTransport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Transport,
    Auth,
    RateLimit,
    Conflict,
}

impl InjectedFailure {
    fn to_error(self, path: &str) -> Error {
        match self {
            Self::Transport => Error::Transport(format!("injected failure for {path}")),
            Self::Auth => Error::Auth("injected credentials failure".into()),
            Self::RateLimit => Error::RateLimit {
                retry_after: Some(Duration::ZERO),
            },
            Self::Conflict => Error::ConflictOnWrite {
                path: path.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct FailureRule {
    method: Method,
    path_fragment: String,
    failure: InjectedFailure,
    remaining: usize,
}

#[derive(Debug, Clone)]
struct StoredFile {
    content: String,
    sha: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, StoredFile>,
    failures: Vec<FailureRule>,
    requests: Vec<(Method, String)>,
}

/// Repository contents held in memory
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a file directly, bypassing revision checks
    pub fn insert_file(&self, path: &str, content: &str) -> String {
        let sha = blob_sha(content);
        self.state().files.insert(
            path.to_string(),
            StoredFile {
                content: content.to_string(),
                sha: sha.clone(),
            },
        );
        sha
    }

    /// Remove a file directly
    pub fn remove_file(&self, path: &str) -> bool {
        self.state().files.remove(path).is_some()
    }

    /// Current text of a file
    pub fn file(&self, path: &str) -> Option<String> {
        self.state().files.get(path).map(|file| file.content.clone())
    }

    /// Current revision of a file
    pub fn revision(&self, path: &str) -> Option<String> {
        self.state().files.get(path).map(|file| file.sha.clone())
    }

    /// All file paths, sorted
    pub fn paths(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }

    /// Fail the next `times` requests with `method` whose path contains
    /// `path_fragment`.
    pub fn fail_requests(
        &self,
        method: Method,
        path_fragment: &str,
        failure: InjectedFailure,
        times: usize,
    ) {
        self.state().failures.push(FailureRule {
            method,
            path_fragment: path_fragment.to_string(),
            failure,
            remaining: times,
        });
    }

    /// Number of requests served so far, including failed ones
    pub fn request_count(&self) -> usize {
        self.state().requests.len()
    }

    /// Number of requests with `method` served so far
    pub fn count_requests(&self, method: Method) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|(seen, _)| *seen == method)
            .count()
    }
}

#[async_trait]
impl RequestTransport for MemoryTransport {
    async fn request(&self, path: &str, options: RequestOptions) -> Result<Value> {
        let mut state = self.state();
        state.requests.push((options.method, path.to_string()));

        if let Some(rule) = state.failures.iter_mut().find(|rule| {
            rule.remaining > 0 && rule.method == options.method && path.contains(&rule.path_fragment)
        }) {
            rule.remaining -= 1;
            return Err(rule.failure.to_error(path));
        }

        let file_path = path
            .strip_prefix(CONTENTS_PREFIX)
            .ok_or_else(|| Error::NotFound(path.to_string()))?
            .trim_matches('/')
            .to_string();
        let body = options.body.unwrap_or(Value::Null);

        match options.method {
            Method::Get => get(&state, &file_path),
            Method::Put => put(&mut state, &file_path, &body),
            Method::Delete => delete(&mut state, &file_path, &body),
        }
    }
}

fn get(state: &MemoryState, path: &str) -> Result<Value> {
    if let Some(file) = state.files.get(path) {
        return Ok(json!({
            "type": "file",
            "name": file_name(path),
            "path": path,
            "sha": file.sha,
            "size": file.content.len(),
            "encoding": "base64",
            "content": base64::engine::general_purpose::STANDARD.encode(&file.content),
        }));
    }

    let prefix = format!("{path}/");
    let mut entries = Vec::new();
    let mut dirs = Vec::new();
    for (file_path, file) in state.files.range(prefix.clone()..) {
        let Some(rest) = file_path.strip_prefix(&prefix) else {
            break;
        };
        match rest.split_once('/') {
            Some((dir, _)) => {
                if !dirs.contains(&dir) {
                    dirs.push(dir);
                    entries.push(json!({
                        "type": "dir",
                        "name": dir,
                        "path": format!("{prefix}{dir}"),
                        "sha": blob_sha(dir),
                        "size": 0,
                    }));
                }
            }
            None => entries.push(json!({
                "type": "file",
                "name": rest,
                "path": file_path,
                "sha": file.sha,
                "size": file.content.len(),
            })),
        }
    }

    if entries.is_empty() {
        Err(Error::NotFound(format!("{CONTENTS_PREFIX}{path}")))
    } else {
        Ok(Value::Array(entries))
    }
}

fn put(state: &mut MemoryState, path: &str, body: &Value) -> Result<Value> {
    let encoded = body["content"]
        .as_str()
        .ok_or_else(|| Error::Transport("missing content".into()))?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|error| Error::Transport(format!("invalid base64: {error}")))?;
    let content = String::from_utf8(decoded)
        .map_err(|error| Error::Transport(format!("invalid utf-8: {error}")))?;

    let expected = body["sha"].as_str();
    match (state.files.get(path), expected) {
        (Some(existing), Some(sha)) if existing.sha == sha => {}
        (None, None) => {}
        _ => {
            return Err(Error::ConflictOnWrite {
                path: path.to_string(),
            });
        }
    }

    let sha = blob_sha(&content);
    let size = content.len();
    state.files.insert(
        path.to_string(),
        StoredFile {
            content,
            sha: sha.clone(),
        },
    );

    Ok(json!({
        "content": {
            "name": file_name(path),
            "path": path,
            "sha": sha,
            "size": size,
        },
        "commit": { "sha": blob_sha(&format!("commit {path} {sha}")) },
    }))
}

fn delete(state: &mut MemoryState, path: &str, body: &Value) -> Result<Value> {
    let existing = state
        .files
        .get(path)
        .ok_or_else(|| Error::NotFound(format!("{CONTENTS_PREFIX}{path}")))?;
    if body["sha"].as_str() != Some(existing.sha.as_str()) {
        return Err(Error::ConflictOnWrite {
            path: path.to_string(),
        });
    }
    state.files.remove(path);
    Ok(json!({ "content": null }))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn blob_sha(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("blob {}\0", content.len()));
    hasher.update(content.as_bytes());
    hasher.finalize()[..20]
        .iter()
        .fold(String::with_capacity(40), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
}
