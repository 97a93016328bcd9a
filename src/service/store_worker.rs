use crate::db::StorableStorage;
use crate::error::EdaPartsError;
use crate::library::{Library, LibraryError, LibraryParser};
use crate::service::duplication::DuplicationCheck;
use crate::service::files::{self, FileLock};
use crate::service::path_rules::StorageLayout;
use crate::types::{CadType, StorableKind, StorageStatus, StoreTask};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Moves an accepted upload into the storage tree and drives the record's
/// storage status to its terminal state.
#[derive(Clone)]
pub struct StoreWorker {
    storage: StorableStorage,
    layout: StorageLayout,
    parser: Arc<dyn LibraryParser>,
    lock_timeout: Duration,
}

impl StoreWorker {
    pub fn new(
        storage: StorableStorage,
        layout: StorageLayout,
        parser: Arc<dyn LibraryParser>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            layout,
            parser,
            lock_timeout,
        }
    }

    /// Final location of the file a task writes.
    pub fn target_of(&self, task: &StoreTask) -> PathBuf {
        self.layout
            .target_path(task.cad_type, task.file_type, &task.path)
    }

    /// Execute one task. Never fails: problems end up as `STORAGE_FAILED`
    /// on the record. The temporary upload is always removed.
    pub async fn run(&self, task: StoreTask) {
        if let Err(e) = self
            .storage
            .set_status(task.file_type, task.model_id, StorageStatus::Storing, None)
            .await
        {
            error!(
                "Cannot mark {} {} as storing: {}",
                task.file_type, task.model_id, e
            );
            files::discard_upload(&task.filename).await;
            self.record_failure(&task, &e).await;
            return;
        }

        let outcome = self.store(&task).await;
        files::discard_upload(&task.filename).await;

        match outcome {
            Ok(()) => info!(
                "Stored {} {} at {} [reference={}]",
                task.file_type, task.model_id, task.path, task.reference
            ),
            Err(err) => {
                match &err {
                    EdaPartsError::DatabaseError(_)
                    | EdaPartsError::Io(_)
                    | EdaPartsError::RactorError(_) => error!(
                        "Storing {} {} failed: {}",
                        task.file_type, task.model_id, err
                    ),
                    _ => debug!(
                        "Storing {} {} rejected: {}",
                        task.file_type, task.model_id, err
                    ),
                }
                self.record_failure(&task, &err).await;
            }
        }
    }

    async fn record_failure(&self, task: &StoreTask, err: &EdaPartsError) {
        if let Err(e) = self
            .storage
            .set_status(
                task.file_type,
                task.model_id,
                StorageStatus::StorageFailed,
                Some(&err.to_string()),
            )
            .await
        {
            error!(
                "Cannot record storage failure of {} {}: {}",
                task.file_type, task.model_id, e
            );
        }
    }

    async fn store(&self, task: &StoreTask) -> Result<(), EdaPartsError> {
        let target = self.target_of(task);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let _lock = FileLock::acquire(&StorageLayout::lock_path(&target), self.lock_timeout).await?;

        if !task.file_type.is_single_part_per_file(task.cad_type) {
            self.validate_kept_references(task).await?;
        }

        let mut conn = self.storage.pool().acquire().await?;
        DuplicationCheck {
            path: &task.path,
            reference: &task.reference,
            kind: task.file_type,
            cad_type: task.cad_type,
            exclude_id: Some(task.model_id),
        }
        .ensure_not_stored(&mut *conn)
        .await?;
        drop(conn);

        files::place_file(&task.filename, &target).await?;
        self.storage
            .mark_stored(task.file_type, task.model_id, &task.reference)
            .await
    }

    /// A multi-part library may be shared by several records. The new file
    /// must still contain every stored reference plus the task's own.
    async fn validate_kept_references(&self, task: &StoreTask) -> Result<(), EdaPartsError> {
        let library = parse_library(
            self.parser.clone(),
            task.filename.clone(),
            task.cad_type,
            task.file_type,
        )
        .await?;

        let mut references = self
            .storage
            .stored_references(task.file_type, task.cad_type, &task.path, task.model_id)
            .await?;
        references.push(task.reference.clone());

        match references.iter().find(|r| !library.is_present(r)) {
            Some(missing) => Err(task.file_type.invalid_format(format!(
                "update to {} will remove an existing reference {}",
                task.path, missing
            ))),
            None => Ok(()),
        }
    }
}

/// Parse a library off the async runtime and check it holds the expected kind.
pub(crate) async fn parse_library(
    parser: Arc<dyn LibraryParser>,
    file: PathBuf,
    cad_type: CadType,
    kind: StorableKind,
) -> Result<Library, EdaPartsError> {
    let parsed = tokio::task::spawn_blocking(move || parser.parse(&file, cad_type))
        .await
        .map_err(|e| EdaPartsError::Io(std::io::Error::other(e)))?;

    let library = match parsed {
        Ok(library) => library,
        Err(LibraryError::Io(e)) => return Err(EdaPartsError::Io(e)),
        Err(LibraryError::CorruptLibrary(msg)) => {
            return Err(kind.invalid_format(format!("the given file cannot be parsed: {msg}")));
        }
    };
    if library.library_type != kind {
        return Err(kind.invalid_format(format!(
            "the given file is a {} library, expected a {} one",
            library.library_type.as_str().to_lowercase(),
            kind.as_str().to_lowercase()
        )));
    }
    Ok(library)
}
