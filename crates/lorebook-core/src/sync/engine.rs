//! Sync engine reconciling the local store with the remote repository.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::classify::{classify, Classification};
use super::merge::merge_documents;
use super::queue::{ChangeQueue, ConflictQueue};
use super::report::{FlushReport, ItemOutcome, ItemStatus, SyncReport};
use crate::auth::{AuthState, TokenAuth};
use crate::config::{RemoteConfig, SyncOptions};
use crate::error::{Error, Result};
use crate::models::{
    ConflictKind, ConflictRecord, ConflictSummary, Document, DocumentId, ResolutionPolicy,
};
use crate::remote::{GitHubTransport, RemoteDocumentStore, RemoteEntry};
use crate::services::DocumentStore;
use crate::util::now_ms;

/// Work decided for one pass
#[derive(Debug, Default)]
struct PassPlan {
    unchanged: Vec<DocumentId>,
    uploads: Vec<(Document, Classification)>,
    downloads: Vec<(RemoteEntry, Classification)>,
    conflicts: Vec<(Document, RemoteEntry, ConflictKind)>,
}

/// Clears the in-progress flag when a pass ends, however it ends
struct PassGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::SyncInProgress)?;
        Ok(Self { flag })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Keeps a [`DocumentStore`] and a [`RemoteDocumentStore`] in step.
///
/// All engine state (in-progress flag, re-authentication flag, last report,
/// conflict queue and change queue) lives on the instance.
pub struct SyncEngine {
    store: DocumentStore,
    remote: Option<RemoteDocumentStore>,
    auth: Arc<dyn AuthState>,
    options: SyncOptions,
    in_progress: AtomicBool,
    reauth_required: AtomicBool,
    last_report: Mutex<Option<SyncReport>>,
    conflicts: Mutex<ConflictQueue>,
    pending: Mutex<ChangeQueue>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("remote", &self.remote)
            .field("options", &self.options)
            .field("in_progress", &self.in_progress)
            .field("reauth_required", &self.reauth_required)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(
        store: DocumentStore,
        remote: Option<RemoteDocumentStore>,
        auth: Arc<dyn AuthState>,
    ) -> Self {
        Self {
            store,
            remote,
            auth,
            options: SyncOptions::default(),
            in_progress: AtomicBool::new(false),
            reauth_required: AtomicBool::new(false),
            last_report: Mutex::new(None),
            conflicts: Mutex::new(ConflictQueue::new()),
            pending: Mutex::new(ChangeQueue::new()),
        }
    }

    /// Engine talking to GitHub with the token from `config`.
    ///
    /// Without a config the engine still serves the local store, and every
    /// remote operation fails with [`Error::Configuration`].
    pub fn from_config(
        store: DocumentStore,
        config: Option<&RemoteConfig>,
        options: SyncOptions,
    ) -> Result<Self> {
        let remote = match config {
            Some(config) => {
                let transport = GitHubTransport::new(config, options.request_timeout)?;
                Some(
                    RemoteDocumentStore::new(Arc::new(transport), config.documents_dir.clone())
                        .with_branch(config.branch.clone()),
                )
            }
            None => None,
        };
        let auth = Arc::new(TokenAuth::from_config(config));
        Ok(Self::new(store, remote, auth).with_options(options))
    }

    #[must_use]
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub const fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub const fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub const fn is_configured(&self) -> bool {
        self.remote.is_some()
    }

    /// Whether a full pass is running right now
    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Whether the remote rejected the credentials and no new ones were
    /// supplied since
    pub fn requires_reauth(&self) -> bool {
        self.reauth_required.load(Ordering::Acquire)
    }

    /// Swap in fresh credentials and allow remote operations again
    pub fn set_auth(&mut self, auth: Arc<dyn AuthState>) {
        self.auth = auth;
        self.reauth_required.store(false, Ordering::Release);
    }

    /// Mark the current credentials as renewed, e.g. after the token
    /// behind the auth state was refreshed in place
    pub fn reauthenticated(&self) {
        self.reauth_required.store(false, Ordering::Release);
    }

    /// Report of the most recent pass, including one aborted part-way
    pub async fn last_report(&self) -> Option<SyncReport> {
        self.last_report.lock().await.clone()
    }

    /// Start time of the last completed pass (Unix ms)
    pub async fn last_synced_at(&self) -> Result<Option<i64>> {
        self.store.last_pass_at().await
    }

    fn remote(&self) -> Result<&RemoteDocumentStore> {
        self.remote
            .as_ref()
            .ok_or_else(|| Error::Configuration("no remote repository is configured".into()))
    }

    fn require_auth(&self) -> Result<()> {
        if self.requires_reauth() {
            return Err(Error::Auth(
                "credentials were rejected by the remote; re-authenticate before syncing".into(),
            ));
        }
        if self.auth.is_authenticated() {
            Ok(())
        } else {
            Err(Error::Auth("not signed in to the remote".into()))
        }
    }

    /// Remember a credentials rejection so later remote calls wait for re-auth
    fn track_auth<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(Error::Auth(reason)) = &result {
            tracing::warn!(%reason, "remote rejected credentials; re-authentication required");
            self.reauth_required.store(true, Ordering::Release);
        }
        result
    }

    /// Run one full reconciliation pass.
    ///
    /// Per-document failures are counted in the report. Configuration,
    /// authentication and concurrency failures abort the pass and are
    /// returned; the partial report stays available via [`Self::last_report`].
    pub async fn sync_with_remote(&self) -> Result<SyncReport> {
        let remote = self.remote()?;
        self.require_auth()?;
        let _guard = PassGuard::acquire(&self.in_progress)?;

        let mut report = SyncReport::begin(now_ms());
        let result = self.track_auth(self.run_pass(remote, &mut report).await);
        report.finish(now_ms());
        *self.last_report.lock().await = Some(report.clone());

        match result {
            Ok(()) => {
                self.store.set_last_pass_at(report.started_at).await?;
                tracing::info!(
                    uploaded = report.uploaded,
                    downloaded = report.downloaded,
                    conflicts = report.conflicts,
                    errors = report.errors,
                    "sync pass finished"
                );
                Ok(report)
            }
            Err(error) => {
                tracing::warn!(%error, "sync pass aborted");
                Err(error)
            }
        }
    }

    async fn run_pass(&self, remote: &RemoteDocumentStore, report: &mut SyncReport) -> Result<()> {
        remote.ensure_container().await?;
        let local = self.store.get_all_checked().await?;
        let remote_entries = remote.list().await?;
        let pass_marker = self.store.last_pass_at().await?;
        let unreadable: Vec<DocumentId> =
            local.corrupted.iter().map(|(id, _)| id.clone()).collect();
        let plan = self.plan(local.documents, remote_entries, &unreadable, pass_marker);

        // Corrupted rows are neither uploaded nor overwritten by a download.
        for (id, error) in local.corrupted {
            tracing::warn!(%id, %error, "local document failed verification");
            report.record(ItemOutcome {
                id,
                classification: Classification::LocalAhead,
                status: ItemStatus::Failed(error.to_string()),
            });
        }

        tracing::debug!(
            unchanged = plan.unchanged.len(),
            uploads = plan.uploads.len(),
            downloads = plan.downloads.len(),
            conflicts = plan.conflicts.len(),
            "planned sync pass"
        );

        for id in plan.unchanged {
            report.record(ItemOutcome {
                id,
                classification: Classification::InSync,
                status: ItemStatus::Unchanged,
            });
        }

        for (document, classification) in plan.uploads {
            let result = self.with_retry(|| self.upload(remote, &document)).await;
            let status = item_status(&document.id, result.map(|()| ItemStatus::Uploaded))?;
            report.record(ItemOutcome {
                id: document.id,
                classification,
                status,
            });
        }

        for (entry, classification) in plan.downloads {
            let result = self.with_retry(|| self.download(remote, &entry)).await;
            let status = item_status(&entry.id, result.map(|()| ItemStatus::Downloaded))?;
            report.record(ItemOutcome {
                id: entry.id,
                classification,
                status,
            });
        }

        for (local, entry, kind) in plan.conflicts {
            let id = local.id.clone();
            let result = self
                .with_retry(|| remote.load(&entry.path))
                .await
                .map(|remote_doc| ConflictRecord {
                    id: id.clone(),
                    local,
                    remote: remote_doc,
                    kind,
                    detected_at: now_ms(),
                });
            let status = match result {
                Ok(record) => {
                    tracing::info!(%id, ?kind, "conflict queued");
                    self.conflicts.lock().await.insert(record);
                    Ok(ItemStatus::Conflicted)
                }
                Err(error) => Err(error),
            };
            report.record(ItemOutcome {
                status: item_status(&id, status)?,
                id,
                classification: Classification::Conflicted(kind),
            });
        }

        Ok(())
    }

    fn plan(
        &self,
        local_docs: Vec<Document>,
        remote_entries: Vec<RemoteEntry>,
        unreadable: &[DocumentId],
        pass_marker: Option<i64>,
    ) -> PassPlan {
        let mut remote_by_id: HashMap<DocumentId, RemoteEntry> = HashMap::new();
        let mut remote_order = Vec::new();
        for entry in remote_entries {
            if unreadable.contains(&entry.id) {
                continue;
            }
            if remote_by_id.contains_key(&entry.id) {
                tracing::warn!(id = %entry.id, path = %entry.path, "duplicate remote document ignored");
                continue;
            }
            remote_order.push(entry.id.clone());
            remote_by_id.insert(entry.id.clone(), entry);
        }

        let tolerance = self.options.tolerance_ms();
        let mut plan = PassPlan::default();
        for local in local_docs {
            let Some(entry) = remote_by_id.remove(&local.id) else {
                plan.uploads.push((local, Classification::LocalAhead));
                continue;
            };

            let classification = classify(&local, &entry, pass_marker, tolerance);
            tracing::debug!(id = %local.id, ?classification, "classified document");
            match classification {
                Classification::InSync => plan.unchanged.push(local.id),
                Classification::LocalAhead => plan.uploads.push((local, classification)),
                Classification::RemoteAhead => plan.downloads.push((entry, classification)),
                Classification::Conflicted(kind) => plan.conflicts.push((local, entry, kind)),
            }
        }

        for id in remote_order {
            if let Some(entry) = remote_by_id.remove(&id) {
                plan.downloads.push((entry, Classification::RemoteAhead));
            }
        }
        plan
    }

    async fn upload(&self, remote: &RemoteDocumentStore, document: &Document) -> Result<()> {
        let remote_ref = remote.save(document).await?;
        self.store.mark_synced(&document.id, &remote_ref).await
    }

    async fn download(&self, remote: &RemoteDocumentStore, entry: &RemoteEntry) -> Result<()> {
        let document = remote.load(&entry.path).await?;
        self.store.put_synced(&document).await
    }

    /// Run `op`, retrying retryable failures with backoff
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(error) if error.is_retryable() && attempt < self.options.retry_attempts => {
                    let delay = match &error {
                        Error::RateLimit {
                            retry_after: Some(after),
                        } => *after,
                        _ => self
                            .options
                            .retry_backoff
                            .saturating_mul(1 << attempt.min(16)),
                    };
                    attempt += 1;
                    tracing::debug!(%error, attempt, ?delay, "retrying remote operation");
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    /// Summaries of conflicts awaiting resolution
    pub async fn pending_conflicts(&self) -> Vec<ConflictSummary> {
        self.conflicts.lock().await.summaries()
    }

    /// Settle the conflict for `id` and return the document now stored
    /// locally.
    ///
    /// The queue entry is removed only when the resolution succeeds.
    pub async fn resolve_conflict(
        &self,
        id: &DocumentId,
        policy: ResolutionPolicy,
    ) -> Result<Document> {
        let remote = self.remote()?;
        self.require_auth()?;
        let record = self
            .conflicts
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no pending conflict for {id}")))?;

        let resolved = self.track_auth(self.apply_resolution(remote, record, policy).await)?;

        self.conflicts.lock().await.remove(id);
        tracing::info!(%id, ?policy, "conflict resolved");
        Ok(resolved)
    }

    async fn apply_resolution(
        &self,
        remote: &RemoteDocumentStore,
        record: ConflictRecord,
        policy: ResolutionPolicy,
    ) -> Result<Document> {
        let id = &record.id;
        // The user may have edited the document after the conflict was found.
        let local = self.store.get(id).await?.unwrap_or(record.local);
        let resolved = match policy {
            ResolutionPolicy::TakeLocal => {
                let mut local = Document {
                    remote: record.remote.remote.clone(),
                    ..local
                };
                let remote_ref = remote.save(&local).await?;
                self.store.mark_synced(id, &remote_ref).await?;
                local.remote = Some(remote_ref);
                local
            }
            ResolutionPolicy::TakeRemote => {
                self.store.put_synced(&record.remote).await?;
                record.remote
            }
            ResolutionPolicy::Merge => {
                let mut merged = merge_documents(&local, &record.remote, now_ms());
                merged.remote = Some(remote.save(&merged).await?);
                self.store.put_synced(&merged).await?;
                merged
            }
        };
        Ok(resolved)
    }

    /// Queue a locally changed document for the next flush
    pub async fn queue_change(&self, id: DocumentId) {
        self.pending.lock().await.push(id);
    }

    /// Ids waiting in the change queue, oldest first
    pub async fn pending_changes(&self) -> Vec<DocumentId> {
        self.pending.lock().await.ids()
    }

    /// Upload every queued document. Failed entries go back on the queue.
    pub async fn flush_queue(&self) -> Result<FlushReport> {
        let remote = self.remote()?;
        self.require_auth()?;

        let ids = self.pending.lock().await.drain();
        let mut report = FlushReport::default();
        let mut failed = Vec::new();
        let mut remaining = ids.into_iter();

        while let Some(id) = remaining.next() {
            let result = match self.store.get(&id).await {
                Ok(Some(document)) => self.with_retry(|| self.upload(remote, &document)).await,
                Ok(None) => {
                    tracing::debug!(%id, "queued document no longer exists");
                    continue;
                }
                Err(error) => Err(error),
            };
            match self.track_auth(result) {
                Ok(()) => report.uploaded += 1,
                Err(error @ Error::Auth(_)) => {
                    failed.push(id);
                    failed.extend(remaining);
                    self.pending.lock().await.requeue(failed);
                    return Err(error);
                }
                Err(error) => {
                    tracing::warn!(%id, %error, "queued upload failed; requeued");
                    failed.push(id);
                }
            }
        }

        report.requeued = failed.len();
        if !failed.is_empty() {
            self.pending.lock().await.requeue(failed);
        }
        Ok(report)
    }
}

/// Fold one item's result into a status, letting pass-fatal errors escape
fn item_status(id: &DocumentId, result: Result<ItemStatus>) -> Result<ItemStatus> {
    match result {
        Ok(status) => Ok(status),
        Err(error) if error.is_pass_fatal() => Err(error),
        Err(error) => {
            tracing::warn!(%id, %error, "document failed to sync");
            Ok(ItemStatus::Failed(error.to_string()))
        }
    }
}
