//! Server-side chunk reassembly.
//!
//! Chunks of one upload arrive in any order and are stored as independent
//! files keyed by `(upload_id, index)`:
//!
//! ```text
//! <staging_root>/<upload_id>/0
//! <staging_root>/<upload_id>/1
//! ...
//! ```
//!
//! `merge` concatenates them in index order into
//! `<merge_root>/<upload_id>-<file_name>` once every index is present.
//! Every file is written under a temporary name and renamed into place, so
//! readers never observe a partial chunk or a partial merged file.
//!
//! The session table lock is only held for bookkeeping, never across I/O.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};

use assetpack_common::{validate_component, DEFAULT_SESSION_TTL_SECS};
use parking_lot::Mutex;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::task::JoinHandle;

use crate::error::UploadError;
use crate::session::{SessionState, SessionStatus, UploadSession};

/// Suffix of in-progress chunk and merge files.
const PART_SUFFIX: &str = ".part";

/// Default interval between background reaper sweeps (1 hour).
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Options for the chunk reassembler.
#[derive(Debug, Clone)]
pub struct ReassemblerOptions {
    /// Directory holding one subdirectory of chunks per upload id.
    pub staging_root: PathBuf,
    /// Directory receiving merged files.
    pub merge_root: PathBuf,
    /// Idle time after which a receiving session is abandoned.
    pub session_ttl: Duration,
    /// Interval between background reaper sweeps.
    pub reaper_interval: Duration,
}

impl Default for ReassemblerOptions {
    fn default() -> Self {
        Self::new("uploads")
    }
}

impl ReassemblerOptions {
    /// Options rooted at `root`: chunks under `root/temp`, merged files in `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        Self {
            staging_root: root.join("temp"),
            merge_root: root,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            reaper_interval: DEFAULT_REAPER_INTERVAL,
        }
    }

    /// Set the chunk staging directory.
    pub fn with_staging_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_root = dir.into();
        self
    }

    /// Set the merged output directory.
    pub fn with_merge_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.merge_root = dir.into();
        self
    }

    /// Set the idle time after which sessions are abandoned.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Set the background reaper interval.
    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }
}

/// A fully merged upload on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedUpload {
    pub upload_id: String,
    pub file_name: String,
    /// Location of the merged file.
    pub path: PathBuf,
    /// Size of the merged file in bytes.
    pub size: u64,
}

impl MergedUpload {
    /// Open the merged file as an async byte stream.
    pub async fn open(&self) -> Result<BufReader<File>, UploadError> {
        let file: File = File::open(&self.path)
            .await
            .map_err(|e| UploadError::io(self.path.display().to_string(), e))?;
        Ok(BufReader::new(file))
    }
}

/// Result of a reaper sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Tracked sessions dropped from the table.
    pub sessions_reaped: usize,
    /// Untracked staging directories removed from disk.
    pub orphan_dirs_removed: usize,
}

/// Receives upload chunks and merges them into files.
pub struct ChunkReassembler {
    options: ReassemblerOptions,
    sessions: Mutex<HashMap<String, UploadSession>>,
    nonce: AtomicU64,
}

impl ChunkReassembler {
    /// Create a reassembler. Directories are created on first use.
    pub fn new(options: ReassemblerOptions) -> Self {
        Self {
            options,
            sessions: Mutex::new(HashMap::new()),
            nonce: AtomicU64::new(0),
        }
    }

    /// Options in use.
    pub fn options(&self) -> &ReassemblerOptions {
        &self.options
    }

    /// Store one chunk of an upload.
    ///
    /// Chunks may arrive in any order. Re-receiving an index replaces the
    /// stored chunk atomically.
    ///
    /// # Arguments
    /// * `upload_id` - Upload the chunk belongs to
    /// * `index` - Zero-based chunk index
    /// * `bytes` - Chunk contents
    ///
    /// # Errors
    /// Returns `SessionClosed` once the upload is merging, merged or abandoned,
    /// and `Io` if the chunk cannot be stored.
    pub async fn receive_chunk(
        &self,
        upload_id: &str,
        index: u32,
        bytes: &[u8],
    ) -> Result<(), UploadError> {
        validate_upload_id(upload_id)?;

        {
            let mut sessions = self.sessions.lock();
            let session: &mut UploadSession = sessions.entry(upload_id.to_string()).or_default();
            if !session.state.accepts_chunks() {
                return Err(UploadError::SessionClosed {
                    upload_id: upload_id.to_string(),
                    state: session.state.to_string(),
                });
            }
            session.touch();
        }

        let dir: PathBuf = self.chunk_dir(upload_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| UploadError::io(dir.display().to_string(), e))?;

        let final_path: PathBuf = dir.join(index.to_string());
        let tmp_path: PathBuf = dir.join(format!(".{}.{}{}", index, self.next_nonce(), PART_SUFFIX));
        write_and_rename(&tmp_path, &final_path, bytes).await?;

        // A merge, abandon or reap may have closed the session while we wrote.
        if let Err(state) = self.record_chunk(upload_id, index, bytes.len() as u64) {
            return Err(self.discard_late_chunk(upload_id, &final_path, state).await);
        }

        log::debug!(
            "Stored chunk {} of upload {} ({} bytes)",
            index,
            upload_id,
            bytes.len()
        );
        Ok(())
    }

    /// Merge the chunks `0..total_chunks` of an upload into one file.
    ///
    /// Chunks staged on disk by an earlier process are merged as well.
    ///
    /// # Arguments
    /// * `upload_id` - Upload to merge
    /// * `file_name` - Original file name, used for the output name
    /// * `total_chunks` - Number of chunks the client sent
    ///
    /// # Errors
    /// Returns `IncompleteUpload` with the lowest missing index if any chunk
    /// is absent; no output is written and the session keeps receiving.
    pub async fn merge(
        &self,
        upload_id: &str,
        file_name: &str,
        total_chunks: u32,
    ) -> Result<MergedUpload, UploadError> {
        validate_upload_id(upload_id)?;
        validate_component(file_name).map_err(|source| UploadError::InvalidFileName {
            file_name: file_name.to_string(),
            source,
        })?;
        if total_chunks == 0 {
            return Err(UploadError::InvalidChunkCount {
                upload_id: upload_id.to_string(),
                total_chunks,
            });
        }

        {
            let mut sessions = self.sessions.lock();
            let session: &mut UploadSession = sessions.entry(upload_id.to_string()).or_default();
            if session.state != SessionState::Receiving {
                return Err(UploadError::SessionClosed {
                    upload_id: upload_id.to_string(),
                    state: session.state.to_string(),
                });
            }
            if let Some(&max) = session.received.last() {
                if max >= total_chunks {
                    log::warn!(
                        "Upload {} has chunk {} beyond total {}; it will be discarded",
                        upload_id,
                        max,
                        total_chunks
                    );
                }
            }
            session.state = SessionState::Merging;
            session.touch();
        }

        let guard: MergeGuard<'_> = MergeGuard {
            sessions: &self.sessions,
            upload_id,
            settled: false,
        };
        let result: Result<MergedUpload, UploadError> =
            self.merge_chunks(upload_id, file_name, total_chunks).await;
        guard.settle(if result.is_ok() {
            SessionState::Done
        } else {
            SessionState::Receiving
        });

        result
    }

    async fn merge_chunks(
        &self,
        upload_id: &str,
        file_name: &str,
        total_chunks: u32,
    ) -> Result<MergedUpload, UploadError> {
        let dir: PathBuf = self.chunk_dir(upload_id);

        // `total_chunks` is client input; grow only as chunks are found.
        let mut chunk_paths: Vec<PathBuf> = Vec::new();
        for index in 0..total_chunks {
            let path: PathBuf = dir.join(index.to_string());
            let present: bool = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.is_file(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => return Err(UploadError::io(path.display().to_string(), e)),
            };
            if !present {
                return Err(UploadError::IncompleteUpload {
                    upload_id: upload_id.to_string(),
                    missing_index: index,
                });
            }
            chunk_paths.push(path);
        }

        let merge_root: &Path = &self.options.merge_root;
        tokio::fs::create_dir_all(merge_root)
            .await
            .map_err(|e| UploadError::io(merge_root.display().to_string(), e))?;

        let output: PathBuf = merge_root.join(format!("{}-{}", upload_id, file_name));
        let tmp: PathBuf = merge_root.join(format!(
            ".{}-{}.{}{}",
            upload_id,
            file_name,
            self.next_nonce(),
            PART_SUFFIX
        ));

        let part: PartFile = PartFile {
            path: tmp,
            keep: false,
        };
        let size: u64 = concat_files(&chunk_paths, &part.path).await?;
        tokio::fs::rename(&part.path, &output)
            .await
            .map_err(|e| UploadError::io(output.display().to_string(), e))?;
        part.keep();

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            log::warn!("Failed to remove staging dir {}: {}", dir.display(), e);
        }

        log::info!(
            "Merged {} chunks of upload {} into {} ({} bytes)",
            total_chunks,
            upload_id,
            output.display(),
            size
        );

        Ok(MergedUpload {
            upload_id: upload_id.to_string(),
            file_name: file_name.to_string(),
            path: output,
            size,
        })
    }

    /// Abandon an upload and delete its staged chunks.
    ///
    /// Later chunks for the same id are rejected with `SessionClosed` until
    /// the session is reaped.
    ///
    /// # Returns
    /// `true` if a session or staged chunks existed.
    pub async fn abandon(&self, upload_id: &str) -> Result<bool, UploadError> {
        validate_upload_id(upload_id)?;

        let tracked: bool = {
            let mut sessions = self.sessions.lock();
            match sessions.get_mut(upload_id) {
                Some(session) => match session.state {
                    SessionState::Merging | SessionState::Done => {
                        return Err(UploadError::SessionClosed {
                            upload_id: upload_id.to_string(),
                            state: session.state.to_string(),
                        });
                    }
                    SessionState::Receiving | SessionState::Abandoned => {
                        session.state = SessionState::Abandoned;
                        session.touch();
                        true
                    }
                },
                None => {
                    let mut tombstone: UploadSession = UploadSession::new();
                    tombstone.state = SessionState::Abandoned;
                    sessions.insert(upload_id.to_string(), tombstone);
                    false
                }
            }
        };

        let removed: bool = remove_dir_if_exists(&self.chunk_dir(upload_id)).await?;
        if tracked || removed {
            log::info!("Abandoned upload {}", upload_id);
        }
        Ok(tracked || removed)
    }

    /// Drop sessions idle longer than the session TTL and remove staging
    /// directories nobody tracks whose modification time is older than the TTL.
    ///
    /// A session stuck merging past the TTL is dropped from the table, but its
    /// staging directory is left to a later orphan sweep.
    pub async fn reap_abandoned(&self) -> Result<ReapReport, UploadError> {
        let ttl: Duration = self.options.session_ttl;
        let now: Instant = Instant::now();
        let mut report: ReapReport = ReapReport::default();

        let (expired, live): (Vec<String>, HashSet<String>) = {
            let mut sessions = self.sessions.lock();
            let mut expired: Vec<String> = Vec::new();
            let mut merging: Vec<String> = Vec::new();
            sessions.retain(|id, session| {
                if !session.is_idle(now, ttl) {
                    return true;
                }
                match session.state {
                    SessionState::Receiving => expired.push(id.clone()),
                    SessionState::Merging => {
                        log::warn!("Dropping upload {} stuck merging past its TTL", id);
                        merging.push(id.clone());
                    }
                    SessionState::Done | SessionState::Abandoned => {}
                }
                report.sessions_reaped += 1;
                false
            });
            let live: HashSet<String> = sessions.keys().cloned().chain(merging).collect();
            (expired, live)
        };

        for upload_id in &expired {
            log::info!("Reaping idle upload {}", upload_id);
            if let Err(e) = remove_dir_if_exists(&self.chunk_dir(upload_id)).await {
                log::warn!("Failed to reap upload {}: {}", upload_id, e);
            }
        }

        let staging_root: &Path = &self.options.staging_root;
        let mut entries: tokio::fs::ReadDir = match tokio::fs::read_dir(staging_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(UploadError::io(staging_root.display().to_string(), e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| UploadError::io(staging_root.display().to_string(), e))?
        {
            let name: String = entry.file_name().to_string_lossy().into_owned();
            if live.contains(&name) {
                continue;
            }
            let meta: std::fs::Metadata = match entry.metadata().await {
                Ok(meta) if meta.is_dir() => meta,
                _ => continue,
            };
            let age: Duration = meta
                .modified()
                .ok()
                .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
                .unwrap_or_default();
            if age < ttl {
                continue;
            }
            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => {
                    log::info!("Removed orphan staging dir {}", entry.path().display());
                    report.orphan_dirs_removed += 1;
                }
                Err(e) => log::warn!(
                    "Failed to remove orphan staging dir {}: {}",
                    entry.path().display(),
                    e
                ),
            }
        }

        Ok(report)
    }

    /// Run `reap_abandoned` every `reaper_interval` on the current runtime.
    ///
    /// The task exits once the reassembler is dropped.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period: Duration = self.options.reaper_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker: tokio::time::Interval = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(reassembler) = weak.upgrade() else {
                    break;
                };
                match reassembler.reap_abandoned().await {
                    Ok(report) if report != ReapReport::default() => {
                        log::info!(
                            "Reaper dropped {} sessions and {} orphan dirs",
                            report.sessions_reaped,
                            report.orphan_dirs_removed
                        );
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("Reaper sweep failed: {}", e),
                }
            }
        })
    }

    /// Current state of an upload, if tracked.
    pub fn status(&self, upload_id: &str) -> Option<SessionStatus> {
        self.sessions.lock().get(upload_id).map(UploadSession::status)
    }

    /// Number of tracked sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Record a stored chunk, or return the state that closed the session.
    fn record_chunk(&self, upload_id: &str, index: u32, len: u64) -> Result<(), SessionState> {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(upload_id) {
            Some(session) if session.state.accepts_chunks() => {
                session.received.insert(index);
                session.bytes_received += len;
                session.touch();
                Ok(())
            }
            Some(session) => Err(session.state),
            // Reaped while the chunk was being written.
            None => Err(SessionState::Abandoned),
        }
    }

    /// Remove a chunk that landed after its session closed.
    async fn discard_late_chunk(
        &self,
        upload_id: &str,
        chunk: &Path,
        state: SessionState,
    ) -> UploadError {
        let dir: PathBuf = self.chunk_dir(upload_id);
        if state == SessionState::Merging {
            // The running merge still owns the other chunks.
            if let Err(e) = tokio::fs::remove_file(chunk).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to remove late chunk {}: {}", chunk.display(), e);
                }
            }
            let _ = tokio::fs::remove_dir(&dir).await;
        } else if let Err(e) = remove_dir_if_exists(&dir).await {
            log::warn!("Failed to remove staging dir {}: {}", dir.display(), e);
        }

        log::warn!(
            "Discarded chunk {} of upload {} ({})",
            chunk.display(),
            upload_id,
            state
        );
        UploadError::SessionClosed {
            upload_id: upload_id.to_string(),
            state: state.to_string(),
        }
    }

    fn chunk_dir(&self, upload_id: &str) -> PathBuf {
        self.options.staging_root.join(upload_id)
    }

    fn next_nonce(&self) -> u64 {
        self.nonce.fetch_add(1, Ordering::Relaxed)
    }
}

/// Settles a session's merge state. Dropped unsettled (the merge future was
/// cancelled), it puts the session back to `Receiving`.
struct MergeGuard<'a> {
    sessions: &'a Mutex<HashMap<String, UploadSession>>,
    upload_id: &'a str,
    settled: bool,
}

impl MergeGuard<'_> {
    fn settle(mut self, state: SessionState) {
        self.set_state(state);
        self.settled = true;
    }

    fn set_state(&self, state: SessionState) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(self.upload_id) {
            if session.state == SessionState::Merging {
                session.state = state;
                session.touch();
            }
        }
    }
}

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            log::warn!("Merge of upload {} was cancelled", self.upload_id);
            self.set_state(SessionState::Receiving);
        }
    }
}

/// Temporary merge output, removed on drop unless kept.
struct PartFile {
    path: PathBuf,
    keep: bool,
}

impl PartFile {
    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn validate_upload_id(upload_id: &str) -> Result<(), UploadError> {
    validate_component(upload_id).map_err(|source| UploadError::InvalidUploadId {
        upload_id: upload_id.to_string(),
        source,
    })
}

/// Write `bytes` to `tmp`, fsync, then rename over `target`.
async fn write_and_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> Result<(), UploadError> {
    let written: Result<(), std::io::Error> = async {
        let mut file: File = File::create(tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(())
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(tmp).await;
        return Err(UploadError::io(tmp.display().to_string(), e));
    }
    if let Err(e) = tokio::fs::rename(tmp, target).await {
        let _ = tokio::fs::remove_file(tmp).await;
        return Err(UploadError::io(target.display().to_string(), e));
    }
    Ok(())
}

/// Concatenate `sources` in order into a new file at `dest`.
async fn concat_files(sources: &[PathBuf], dest: &Path) -> Result<u64, UploadError> {
    let out: File = File::create(dest)
        .await
        .map_err(|e| UploadError::io(dest.display().to_string(), e))?;
    let mut writer: BufWriter<File> = BufWriter::new(out);
    let mut total: u64 = 0;

    for source in sources {
        let mut chunk: File = File::open(source)
            .await
            .map_err(|e| UploadError::io(source.display().to_string(), e))?;
        total += tokio::io::copy(&mut chunk, &mut writer)
            .await
            .map_err(|e| UploadError::io(dest.display().to_string(), e))?;
    }

    writer
        .flush()
        .await
        .map_err(|e| UploadError::io(dest.display().to_string(), e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| UploadError::io(dest.display().to_string(), e))?;
    Ok(total)
}

async fn remove_dir_if_exists(dir: &Path) -> Result<bool, UploadError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(UploadError::io(dir.display().to_string(), e)),
    }
}
