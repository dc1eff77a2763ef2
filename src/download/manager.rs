//! Bounded-concurrency download manager.
//!
//! # Concurrency Model
//!
//! - Every file of a batch runs in its own task inside a [`JoinSet`]
//! - A task races semaphore acquisition against the caller's
//!   [`CancellationToken`] before doing any I/O
//! - The join loop is the only place results are collected, so no lock
//!   guards the failure list
//! - One file failing never cancels its siblings; only the caller's token does
//!
//! # On-disk protocol
//!
//! Bytes go to `<name>.part` next to the final path. The final name is only
//! produced by a rename after the copy, flush, fsync and checksum all
//! succeed. Every other exit path (including task abort) removes the
//! `.part` file through a drop guard.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Request, Response, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{
    HTML_PREVIEW_LIMIT, HTTP_ERROR_PREVIEW_LIMIT, MAX_CONCURRENCY, MIN_CONCURRENCY, PARTIAL_SUFFIX,
};
use super::descriptor::FileDescriptor;
use super::error::{BatchError, DownloadError, EngineError};
use super::progress::{ChecksumHasher, FileProgress, ProgressFn, ProgressWriter};
use crate::auth::{BasicAuth, Session, SsoLogin, SsoSettings};
use crate::storage::{CredentialBroker, StorageError, is_object_url};

/// Behaviour shared by every download of a manager.
#[derive(Clone)]
pub struct DownloadConfig {
    /// Concurrency override; `None` uses the per-operation default.
    pub concurrency: Option<usize>,
    /// Verify declared checksums.
    pub verify: bool,
    /// Progress callback.
    pub progress: Option<ProgressFn>,
    /// Credentials for identity-provider login on trusted hosts.
    pub basic_auth: Option<BasicAuth>,
    /// Identity-provider endpoints.
    pub sso: SsoSettings,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            verify: true,
            progress: None,
            basic_auth: None,
            sso: SsoSettings::default(),
        }
    }
}

impl fmt::Debug for DownloadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadConfig")
            .field("concurrency", &self.concurrency)
            .field("verify", &self.verify)
            .field("progress", &self.progress.is_some())
            .field("basic_auth", &self.basic_auth)
            .field("sso", &self.sso)
            .finish()
    }
}

impl DownloadConfig {
    /// Sets the concurrency override.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Enables or disables checksum verification.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Sets the progress callback.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Sets the identity-provider credentials.
    #[must_use]
    pub fn with_basic_auth(mut self, credentials: BasicAuth) -> Self {
        self.basic_auth = Some(credentials);
        self
    }

    /// Overrides the identity-provider endpoints.
    #[must_use]
    pub fn with_sso(mut self, sso: SsoSettings) -> Self {
        self.sso = sso;
        self
    }
}

/// One file of a batch.
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Product the file belongs to (empty for bare URLs).
    pub product_id: String,
    /// What to fetch.
    pub descriptor: FileDescriptor,
}

/// Input of [`DownloadManager::download_batch`].
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Directory the files land in.
    pub destination: PathBuf,
    /// Files to fetch, in input order.
    pub items: Vec<BatchItem>,
    /// Maximum number of files in flight.
    pub concurrency: usize,
    /// Drop items whose URL already appeared earlier in the batch.
    pub dedupe_urls: bool,
}

impl BatchRequest {
    /// Creates an empty batch.
    #[must_use]
    pub fn new(destination: impl Into<PathBuf>, concurrency: usize) -> Self {
        Self {
            destination: destination.into(),
            items: Vec::new(),
            concurrency,
            dedupe_urls: false,
        }
    }

    /// Appends a file.
    #[must_use]
    pub fn with_item(mut self, product_id: impl Into<String>, descriptor: FileDescriptor) -> Self {
        self.items.push(BatchItem {
            product_id: product_id.into(),
            descriptor,
        });
        self
    }

    /// Enables first-seen-wins URL deduplication.
    #[must_use]
    pub fn dedupe_urls(mut self, dedupe: bool) -> Self {
        self.dedupe_urls = dedupe;
        self
    }
}

/// A planned transfer with its destination already resolved.
#[derive(Debug)]
struct Job {
    product_id: String,
    descriptor: FileDescriptor,
    name: String,
    path: PathBuf,
}

struct Shared {
    session: Arc<Session>,
    broker: Option<Arc<CredentialBroker>>,
    config: DownloadConfig,
    login: Option<SsoLogin>,
}

/// Turns file descriptors into verified files on disk.
///
/// Cheap to clone; clones share the session, broker and configuration.
#[derive(Clone)]
pub struct DownloadManager {
    shared: Arc<Shared>,
}

impl fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadManager")
            .field("config", &self.shared.config)
            .field("broker", &self.shared.broker.is_some())
            .finish_non_exhaustive()
    }
}

impl DownloadManager {
    /// Creates a manager.
    ///
    /// SSO login is enabled when the config carries basic credentials with a
    /// non-empty username.
    #[must_use]
    pub fn new(
        session: Arc<Session>,
        config: DownloadConfig,
        broker: Option<Arc<CredentialBroker>>,
    ) -> Self {
        let login = config
            .basic_auth
            .as_ref()
            .filter(|credentials| !credentials.username().is_empty())
            .map(|credentials| SsoLogin::new(config.sso.clone(), credentials.clone()));
        Self {
            shared: Arc::new(Shared {
                session,
                broker,
                config,
                login,
            }),
        }
    }

    /// Returns the manager configuration.
    #[must_use]
    pub fn config(&self) -> &DownloadConfig {
        &self.shared.config
    }

    /// Returns the shared session.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.shared.session
    }

    /// Downloads every item of `request`, at most `request.concurrency` at a time.
    ///
    /// Returns the final paths of the files that succeeded.
    ///
    /// # Errors
    ///
    /// Configuration problems ([`EngineError::InvalidConcurrency`],
    /// [`EngineError::MissingDestination`], [`EngineError::NoFiles`],
    /// [`EngineError::CreateDirectory`], [`EngineError::Cancelled`]) stop the
    /// batch before any file starts. Otherwise every per-file failure is
    /// collected into [`EngineError::Batch`] after all files finish.
    #[instrument(
        skip(self, request, cancel),
        fields(destination = %request.destination.display(), files = request.items.len())
    )]
    pub async fn download_batch(
        &self,
        request: BatchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, EngineError> {
        let BatchRequest {
            destination,
            items,
            concurrency,
            dedupe_urls,
        } = request;

        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }
        if destination.as_os_str().is_empty() {
            return Err(EngineError::MissingDestination);
        }
        if items.is_empty() {
            return Err(EngineError::NoFiles);
        }

        create_destination(&destination, cancel).await?;

        let (jobs, mut failures) = plan_jobs(&destination, items, dedupe_urls);
        info!(
            scheduled = jobs.len(),
            rejected = failures.len(),
            concurrency,
            "starting batch"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();
        for job in jobs {
            let manager = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        return Err(DownloadError::cancelled(&job.descriptor.url));
                    }
                    permit = semaphore.acquire_owned() => permit,
                };
                // Held until the job finishes (RAII)
                let _permit = permit.map_err(|_| DownloadError::TaskFailed {
                    message: "concurrency limiter closed".to_string(),
                })?;
                manager.run_job(&job, &cancel).await
            });
        }

        let mut completed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(path)) => completed.push(path),
                Ok(Err(error)) => {
                    warn!(error = %error, "file failed");
                    failures.push(error);
                }
                Err(join_error) => {
                    warn!(error = %join_error, "download task panicked");
                    failures.push(DownloadError::TaskFailed {
                        message: join_error.to_string(),
                    });
                }
            }
        }

        info!(
            completed = completed.len(),
            failed = failures.len(),
            "batch complete"
        );

        if failures.is_empty() {
            Ok(completed)
        } else {
            Err(BatchError::new(failures).into())
        }
    }

    /// Downloads one file to exactly `dest_path`.
    ///
    /// The parent directory is created if missing.
    ///
    /// # Errors
    ///
    /// Returns the file's [`DownloadError`] directly.
    #[instrument(skip(self, descriptor, cancel), fields(url = %descriptor.url, path = %dest_path.display()))]
    pub async fn download_file(
        &self,
        descriptor: &FileDescriptor,
        dest_path: &Path,
        product_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        if descriptor.url.trim().is_empty() {
            return Err(DownloadError::MissingUrl);
        }
        let name = match dest_path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => descriptor.resolve_filename()?,
        };
        let path = if dest_path.file_name().is_some() {
            dest_path.to_path_buf()
        } else {
            dest_path.join(&name)
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DownloadError::io(parent, source))?;
        }

        let job = Job {
            product_id: product_id.to_string(),
            descriptor: descriptor.clone(),
            name,
            path,
        };
        self.run_job(&job, cancel).await
    }

    async fn run_job(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        if cancel.is_cancelled() {
            return Err(DownloadError::cancelled(&job.descriptor.url));
        }
        if is_object_url(&job.descriptor.url) {
            self.fetch_object(job, cancel).await
        } else {
            self.fetch_http(job, cancel).await
        }
    }

    #[instrument(skip(self, job, cancel), fields(url = %job.descriptor.url, name = %job.name))]
    async fn fetch_http(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let url_text = job.descriptor.url.as_str();
        let url = Url::parse(url_text).map_err(|_| DownloadError::invalid_url(url_text))?;
        let session = &self.shared.session;
        let request = Request::new(Method::GET, url.clone());

        let login = self
            .shared
            .login
            .as_ref()
            .filter(|_| session.trusted_domains().is_trusted_url(&url));
        let response = if let Some(login) = login {
            login.ensure_login(session, cancel).await.map_err(|source| {
                if source.is_cancelled() {
                    DownloadError::cancelled(url_text)
                } else {
                    DownloadError::Login {
                        url: url_text.to_string(),
                        source,
                    }
                }
            })?;
            session
                .execute_as(request, login.credentials(), cancel)
                .await
        } else {
            session.execute(request, cancel).await
        }
        .map_err(|source| DownloadError::session(url_text, source))?;

        let status = response.status();
        if status != StatusCode::OK {
            let preview = read_preview(response, HTTP_ERROR_PREVIEW_LIMIT, cancel).await;
            return Err(DownloadError::http_status(url_text, status.as_u16(), preview));
        }
        if is_html(&response) {
            let preview = read_preview(response, HTML_PREVIEW_LIMIT, cancel).await;
            return Err(DownloadError::HtmlResponse {
                url: url_text.to_string(),
                preview,
            });
        }

        let total = response
            .content_length()
            .or_else(|| job.descriptor.declared_size());
        let (partial, mut writer) = self.open_partial(job, total).await?;

        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(DownloadError::cancelled(url_text)),
                next = stream.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|source| DownloadError::network(url_text, source))?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|source| DownloadError::io(partial.path(), source))?;
        }

        self.finish(job, writer, partial).await
    }

    #[instrument(skip(self, job, cancel), fields(url = %job.descriptor.url, name = %job.name))]
    async fn fetch_object(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let url = job.descriptor.url.as_str();
        let Some(broker) = self.shared.broker.as_ref() else {
            return Err(DownloadError::storage(
                url,
                StorageError::BrokerUnavailable {
                    url: url.to_string(),
                },
            ));
        };

        let mut refreshed = false;
        loop {
            let (partial, mut writer) = self
                .open_partial(job, job.descriptor.declared_size())
                .await?;
            match broker.download_object(url, &mut writer, cancel).await {
                Ok(bytes) => {
                    debug!(bytes, "object streamed");
                    return self.finish(job, writer, partial).await;
                }
                // The broker already dropped the rejected credentials.
                Err(error) if error.is_auth_rejection() && !refreshed => {
                    warn!(error = %error, "storage rejected cached credentials, retrying");
                    refreshed = true;
                    drop(writer);
                    drop(partial);
                }
                Err(error) => return Err(DownloadError::storage(url, error)),
            }
        }
    }

    async fn open_partial(
        &self,
        job: &Job,
        total: Option<u64>,
    ) -> Result<(PartialFile, ProgressWriter<BufWriter<File>>), DownloadError> {
        let partial_path = partial_path(&job.path);
        let file = File::create(&partial_path)
            .await
            .map_err(|source| DownloadError::io(&partial_path, source))?;
        let partial = PartialFile::new(partial_path);

        let hasher = if self.shared.config.verify {
            ChecksumHasher::new(job.descriptor.effective_algorithm())
        } else {
            None
        };
        let snapshot = FileProgress {
            id: job.product_id.clone(),
            name: job.name.clone(),
            url: job.descriptor.url.clone(),
            downloaded: 0,
            total,
        };
        let writer = ProgressWriter::new(BufWriter::new(file), snapshot)
            .with_hasher(hasher)
            .with_progress(self.shared.config.progress.clone());
        Ok((partial, writer))
    }

    async fn finish(
        &self,
        job: &Job,
        mut writer: ProgressWriter<BufWriter<File>>,
        partial: PartialFile,
    ) -> Result<PathBuf, DownloadError> {
        writer
            .flush()
            .await
            .map_err(|source| DownloadError::io(partial.path(), source))?;
        let bytes = writer.downloaded();
        let (buffered, digest) = writer.into_parts();
        let file = buffered.into_inner();
        file.sync_all()
            .await
            .map_err(|source| DownloadError::io(partial.path(), source))?;
        drop(file);

        if let (Some(expected), Some(actual)) = (job.descriptor.expected_checksum(), digest) {
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(DownloadError::ChecksumMismatch {
                    name: job.name.clone(),
                    expected: expected.to_string(),
                    actual,
                });
            }
            debug!(checksum = %actual, "checksum verified");
        }

        partial
            .promote(&job.path)
            .await
            .map_err(|source| DownloadError::io(&job.path, source))?;
        info!(path = %job.path.display(), bytes, "download complete");
        Ok(job.path.clone())
    }
}

/// Resolves names and rejects duplicates before any I/O happens.
fn plan_jobs(
    destination: &Path,
    items: Vec<BatchItem>,
    dedupe_urls: bool,
) -> (Vec<Job>, Vec<DownloadError>) {
    let mut seen_urls = HashSet::new();
    let mut claimed_names = HashSet::new();
    let mut jobs = Vec::with_capacity(items.len());
    let mut failures = Vec::new();

    for BatchItem {
        product_id,
        descriptor,
    } in items
    {
        if dedupe_urls && !seen_urls.insert(descriptor.url.clone()) {
            debug!(url = %descriptor.url, "skipping duplicate URL");
            continue;
        }
        let name = match descriptor.resolve_filename() {
            Ok(name) => name,
            Err(error) => {
                failures.push(error);
                continue;
            }
        };
        if !claimed_names.insert(name.clone()) {
            failures.push(DownloadError::FilenameCollision {
                url: descriptor.url.clone(),
                name,
            });
            continue;
        }
        jobs.push(Job {
            product_id,
            path: destination.join(&name),
            descriptor,
            name,
        });
    }

    (jobs, failures)
}

async fn create_destination(path: &Path, cancel: &CancellationToken) -> Result<(), EngineError> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o755);

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(EngineError::Cancelled),
        result = builder.create(path) => result.map_err(|source| EngineError::CreateDirectory {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_ascii_lowercase)
        .is_some_and(|content_type| {
            content_type.contains("text/html") || content_type.contains("application/xhtml")
        })
}

/// Reads at most `limit` bytes of the body for an error message.
async fn read_preview(mut response: Response, limit: usize, cancel: &CancellationToken) -> String {
    let mut buffer = Vec::new();
    while buffer.len() < limit {
        let chunk = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            chunk = response.chunk() => chunk,
        };
        match chunk {
            Ok(Some(bytes)) => buffer.extend_from_slice(&bytes),
            _ => break,
        }
    }
    buffer.truncate(limit);
    String::from_utf8_lossy(&buffer).trim().to_string()
}

/// Removes an in-flight `.part` file unless it was promoted.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn promote(mut self, final_path: &Path) -> std::io::Result<()> {
        tokio::fs::rename(&self.path, final_path).await?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!(path = %self.path.display(), "cleaning up partial file");
        if let Err(error) = std::fs::remove_file(&self.path)
            && error.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %error, "failed to remove partial file");
        }
    }
}
