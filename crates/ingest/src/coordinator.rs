//! Turns a quiet-period notification into picture rows.
//!
//! A cycle enumerates the watched directory, prepares every new candidate
//! concurrently (containment, existence, probe, task resolution, optional
//! transcode) and then inserts the prepared rows one by one in file-name
//! order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use genpic_core::config::IngestConfig;
use genpic_core::fs_guard::{file_exists, is_inside};
use genpic_core::image_probe::{self, format_name, ImageMetadata, ProbeError};
use genpic_core::types::DbId;
use genpic_db::dao::{Dao, StripServerData};
use genpic_db::models::picture::{CreatePicture, Picture, PictureFilter};
use genpic_events::{EventBus, IngestEvent};
use image::ImageFormat;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::report::{FileFailure, IngestError, IngestFailure, IngestReport, IngestedFile};
use crate::resolver::TaskResolver;
use crate::watcher::NotificationHandler;

/// Result of the concurrent preparation phase for one candidate.
enum Prepared {
    /// `derived` is the copy written for this file, if any.
    Ready {
        input: CreatePicture,
        derived: Option<PathBuf>,
    },
    AlreadyIngested,
    Vanished,
    OutsideRoot,
    Failed(IngestFailure),
}

/// Where a picture's stored bytes live and what they are.
struct Materialized {
    link: PathBuf,
    metadata: ImageMetadata,
    derived: bool,
}

impl From<IngestFailure> for Prepared {
    fn from(failure: IngestFailure) -> Self {
        Self::Failed(failure)
    }
}

/// Ingests new files from one watched directory.
///
/// Cycles never overlap: [`run_cycle`](Self::run_cycle) holds a lock for its
/// whole duration, so the startup scan and watcher-driven cycles queue up
/// behind each other.
pub struct IngestionCoordinator {
    root: PathBuf,
    filter: Regex,
    concurrency: usize,
    canonical_format: Option<ImageFormat>,
    canonical_max_edge: Option<u32>,
    derived_dir: PathBuf,
    pictures: Arc<dyn Dao<Picture>>,
    resolver: Arc<dyn TaskResolver>,
    events: Option<Arc<EventBus>>,
    cycle_lock: Mutex<()>,
}

impl IngestionCoordinator {
    pub fn new(
        config: &IngestConfig,
        pictures: Arc<dyn Dao<Picture>>,
        resolver: Arc<dyn TaskResolver>,
    ) -> Self {
        Self {
            root: config.watch_dir.clone(),
            filter: config.file_filter.clone(),
            concurrency: config.concurrency.max(1),
            canonical_format: config.canonical_format,
            canonical_max_edge: config.canonical_max_edge,
            derived_dir: config.derived_dir.clone(),
            pictures,
            resolver,
            events: None,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Publish per-file outcomes on `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Run one full ingestion pass over the watched directory.
    ///
    /// Only failing to enumerate the directory is an error; everything that
    /// goes wrong with an individual file is recorded in the report.
    pub async fn run_cycle(&self) -> Result<IngestReport, IngestError> {
        let _guard = self.cycle_lock.lock().await;

        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|source| IngestError::Enumerate {
                dir: self.root.clone(),
                source,
            })?;
        let candidates = self.list_candidates(&root).await?;
        tracing::debug!(
            dir = %root.display(),
            candidates = candidates.len(),
            "Scanning watched directory"
        );

        let root = root.as_path();
        let jobs: Vec<_> = candidates
            .into_iter()
            .map(|name| async move {
                let outcome = self.prepare(root, &name).await;
                (name, outcome)
            })
            .collect();
        let prepared: Vec<(String, Prepared)> = stream::iter(jobs)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut report = IngestReport::default();
        for (file_name, outcome) in prepared {
            match outcome {
                Prepared::Ready { input, derived } => {
                    self.insert(file_name, &input, derived.as_deref(), &mut report)
                        .await
                }
                Prepared::AlreadyIngested => report.already_ingested.push(file_name),
                Prepared::Vanished => {
                    tracing::debug!(file_name = %file_name, "File vanished before ingestion");
                    report.vanished.push(file_name);
                }
                Prepared::OutsideRoot => {
                    tracing::warn!(file_name = %file_name, "File resolves outside watched directory, skipping");
                    report.outside_root.push(file_name);
                }
                Prepared::Failed(failure) => self.reject(file_name, failure, &mut report),
            }
        }

        Ok(report)
    }

    /// File names in `root` matching the filter, sorted.
    async fn list_candidates(&self, root: &Path) -> Result<Vec<String>, IngestError> {
        let enumerate_err = |source| IngestError::Enumerate {
            dir: root.to_path_buf(),
            source,
        };

        let mut entries = tokio::fs::read_dir(root).await.map_err(enumerate_err)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(enumerate_err)? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    tracing::debug!(file_name = ?raw, "Skipping non UTF-8 file name");
                    continue;
                }
            };
            if self.filter.is_match(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn prepare(&self, root: &Path, file_name: &str) -> Prepared {
        let path = match tokio::fs::canonicalize(root.join(file_name)).await {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Prepared::Vanished,
            Err(e) => return IngestFailure::Io(e.to_string()).into(),
        };
        if !is_inside(&path, root) {
            return Prepared::OutsideRoot;
        }

        match self.pictures.list(&PictureFilter::by_file_name(file_name)).await {
            Ok(existing) if !existing.is_empty() => return Prepared::AlreadyIngested,
            Ok(_) => {}
            Err(e) => return IngestFailure::from(e).into(),
        }

        match file_exists(&path).await {
            Ok(true) => {}
            Ok(false) => return Prepared::Vanished,
            Err(e) => return IngestFailure::from(e).into(),
        }

        let metadata = match image_probe::probe_file(path.clone()).await {
            Ok(metadata) => metadata,
            Err(e) => return IngestFailure::from(e).into(),
        };

        let generation_task_id = match self.resolver.resolve(file_name).await {
            Ok(Some(id)) => id,
            Ok(None) => return IngestFailure::OrphanFile.into(),
            Err(e) => return IngestFailure::from(e).into(),
        };

        match self.materialize(root, &path, file_name, &metadata).await {
            Ok(stored) => Prepared::Ready {
                input: CreatePicture {
                    generation_task_id,
                    direct_link: stored.link.to_string_lossy().into_owned(),
                    file_name: file_name.to_owned(),
                    width: i64::from(stored.metadata.width),
                    height: i64::from(stored.metadata.height),
                    format: format_name(stored.metadata.format).to_owned(),
                },
                derived: stored.derived.then_some(stored.link),
            },
            Err(failure) => failure.into(),
        }
    }

    /// What the picture row points at: the source itself, or a transcoded
    /// copy in the derived directory.
    async fn materialize(
        &self,
        root: &Path,
        source: &Path,
        file_name: &str,
        metadata: &ImageMetadata,
    ) -> Result<Materialized, IngestFailure> {
        let oversized = self
            .canonical_max_edge
            .is_some_and(|max| metadata.width > max || metadata.height > max);
        let target = match self.canonical_format {
            Some(target) if target != metadata.format => target,
            _ if oversized => metadata.format,
            _ => {
                return Ok(Materialized {
                    link: source.to_path_buf(),
                    metadata: *metadata,
                    derived: false,
                })
            }
        };

        let bytes = tokio::fs::read(source)
            .await
            .map_err(|e| IngestFailure::Io(e.to_string()))?;
        let max_edge = self.canonical_max_edge;
        let (encoded, derived_meta) = tokio::task::spawn_blocking(move || {
            let encoded = image_probe::transcode(&bytes, target, max_edge)?;
            let meta = image_probe::probe_bytes(&encoded, Some(target))?;
            Ok::<_, ProbeError>((encoded, meta))
        })
        .await
        .map_err(|e| IngestFailure::InvalidImage(format!("transcode task failed: {e}")))??;

        tokio::fs::create_dir_all(&self.derived_dir)
            .await
            .map_err(|e| IngestFailure::Io(e.to_string()))?;
        let dir = tokio::fs::canonicalize(&self.derived_dir)
            .await
            .map_err(|e| IngestFailure::Io(e.to_string()))?;
        if dir == root {
            return Err(IngestFailure::Io(format!(
                "derived directory {} is the watched directory",
                dir.display()
            )));
        }

        // Source names are unique within the watched directory, so keeping
        // the whole name keeps derived names unique too.
        let derived = dir.join(format!("{file_name}.{}", format_name(target)));
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&derived)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(IngestFailure::Io(format!(
                    "derived copy {} already exists",
                    derived.display()
                )))
            }
            Err(e) => return Err(IngestFailure::Io(e.to_string())),
        };
        let written = match file.write_all(&encoded).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            discard_derived(&derived).await;
            return Err(IngestFailure::Io(e.to_string()));
        }

        tracing::debug!(
            file_name = %file_name,
            from = format_name(metadata.format),
            to = format_name(target),
            width = derived_meta.width,
            height = derived_meta.height,
            derived = %derived.display(),
            "Wrote canonical copy"
        );
        Ok(Materialized {
            link: derived,
            metadata: derived_meta,
            derived: true,
        })
    }

    async fn insert(
        &self,
        file_name: String,
        input: &CreatePicture,
        derived: Option<&Path>,
        report: &mut IngestReport,
    ) {
        let picture_id = match self.pictures.insert(input).await {
            Ok(id) => id,
            Err(e) => {
                // No row references the copy; drop it so a retry can write it again.
                if let Some(path) = derived {
                    discard_derived(path).await;
                }
                return self.reject(file_name, IngestFailure::from(e), report);
            }
        };
        tracing::info!(
            file_name = %file_name,
            picture_id,
            generation_task_id = input.generation_task_id,
            "Picture ingested"
        );
        self.announce(picture_id).await;
        report.inserted.push(IngestedFile {
            file_name,
            picture_id,
        });
    }

    /// Publish the stripped form of a freshly inserted picture.
    async fn announce(&self, picture_id: DbId) {
        let Some(bus) = &self.events else {
            return;
        };
        match self.pictures.find(picture_id).await {
            Ok(Some(picture)) => bus.publish(IngestEvent::PictureCreated {
                picture: picture.strip_server_data(),
            }),
            Ok(None) => {
                tracing::warn!(picture_id, "Inserted picture not found, no event published");
            }
            Err(e) => {
                tracing::warn!(picture_id, error = %e, "Failed to reload inserted picture");
            }
        }
    }

    fn reject(&self, file_name: String, failure: IngestFailure, report: &mut IngestReport) {
        tracing::warn!(
            file_name = %file_name,
            reason = failure.kind(),
            error = %failure,
            "Skipping file"
        );
        if let Some(bus) = &self.events {
            bus.publish(IngestEvent::FileRejected {
                file_name: file_name.clone(),
                reason: failure.kind().to_owned(),
                detail: failure.to_string(),
            });
        }
        report.failures.push(FileFailure { file_name, failure });
    }
}

async fn discard_derived(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove derived copy");
    }
}

#[async_trait]
impl NotificationHandler for IngestionCoordinator {
    async fn notify(&self) {
        match self.run_cycle().await {
            Ok(report) => tracing::info!(
                inserted = report.inserted.len(),
                already_ingested = report.already_ingested.len(),
                vanished = report.vanished.len(),
                outside_root = report.outside_root.len(),
                failed = report.failures.len(),
                "Ingestion cycle complete"
            ),
            Err(e) => tracing::error!(error = %e, "Ingestion cycle failed"),
        }
    }
}
