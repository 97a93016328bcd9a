use crate::db::{self, NewStorable, StorableRecord, StorableStorage};
use crate::error::EdaPartsError;
use crate::library::LibraryParser;
use crate::service::duplication::DuplicationCheck;
use crate::service::files;
use crate::service::path_rules::{self, StorageLayout};
use crate::service::store_actor::StoreQueue;
use crate::service::store_worker::parse_library;
use crate::types::{
    Page, StorableKind, StorableObjectDataUpdateRequest, StorableObjectRequest, StorageStatus,
    StoreTask,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Request-side half of the ingestion pipeline.
///
/// Validates uploads, commits records as `NOT_STORED` and hands the file over
/// to the store queue. On success the queue owns the temporary upload;
/// on error the caller still does.
#[derive(Clone)]
pub struct StorableService {
    storage: StorableStorage,
    layout: StorageLayout,
    parser: Arc<dyn LibraryParser>,
    queue: Arc<dyn StoreQueue>,
}

impl StorableService {
    pub fn new(
        storage: StorableStorage,
        layout: StorageLayout,
        parser: Arc<dyn LibraryParser>,
        queue: Arc<dyn StoreQueue>,
    ) -> Self {
        Self {
            storage,
            layout,
            parser,
            queue,
        }
    }

    pub async fn create(
        &self,
        request: StorableObjectRequest,
    ) -> Result<StorableRecord, EdaPartsError> {
        let kind = request.file_type;
        path_rules::validate_input_path(&request.path, request.cad_type, kind)?;

        let library = parse_library(
            self.parser.clone(),
            request.filename.clone(),
            request.cad_type,
            kind,
        )
        .await?;

        let reference = match non_blank(request.reference) {
            Some(reference) => reference,
            None => match library.single_model() {
                Some(model) => model.name.clone(),
                None => {
                    return Err(kind.invalid_format(format!(
                        "ambiguous reference: the given library holds {} parts, provide a reference",
                        library.count()
                    )));
                }
            },
        };
        if !library.is_present(&reference) {
            return Err(kind.invalid_format(format!(
                "the given reference {reference} does not exist in the given library"
            )));
        }
        let description = non_blank(request.description)
            .or_else(|| library.description_of(&reference).map(str::to_string));

        debug!(
            file_type = %kind,
            reference = %reference,
            path = %request.path,
            "Creating a new storable object"
        );

        let mut tx = self.storage.begin().await?;
        DuplicationCheck {
            path: &request.path,
            reference: &reference,
            kind,
            cad_type: request.cad_type,
            exclude_id: None,
        }
        .ensure_not_exists(&mut *tx)
        .await?;

        let record = db::sqlite::insert(
            &mut *tx,
            &NewStorable {
                kind,
                alias: path_rules::model_alias(&request.path, request.cad_type, kind),
                path: request.path,
                reference,
                cad_type: request.cad_type,
                description,
            },
        )
        .await?;
        tx.commit().await?;
        info!(model_id = record.id, file_type = %kind, "Storable object created");

        let task = StoreTask {
            model_id: record.id,
            filename: request.filename,
            path: record.path.clone(),
            file_type: kind,
            cad_type: record.cad_type,
            reference: record.reference.clone(),
        };
        self.hand_off(&record, task).await?;
        Ok(record)
    }

    /// Replace the file of an existing record. The path never changes; a new
    /// reference is only applied once the file is stored.
    pub async fn update_data(
        &self,
        request: StorableObjectDataUpdateRequest,
    ) -> Result<StorableRecord, EdaPartsError> {
        let kind = request.file_type;
        let requested_reference = non_blank(request.reference);

        let mut record = self
            .storage
            .get_by_id(kind, request.model_id)
            .await?
            .ok_or_else(|| EdaPartsError::not_found("storable object not found", request.model_id))?;

        if self
            .is_unchanged(&record, requested_reference.as_deref(), &request.filename)
            .await?
        {
            debug!(
                model_id = record.id,
                "Same content and reference as the stored object, skipping"
            );
            files::discard_upload(&request.filename).await;
            return Ok(record);
        }

        let library = parse_library(
            self.parser.clone(),
            request.filename.clone(),
            record.cad_type,
            kind,
        )
        .await?;
        match requested_reference.as_deref() {
            Some(reference) if !library.is_present(reference) => {
                return Err(kind.invalid_format(format!(
                    "the provided reference {reference} was not found in the given library"
                )));
            }
            None if !library.is_present(&record.reference) => {
                return Err(kind.invalid_format(format!(
                    "no reference provided and the current one {} is not present in the given library",
                    record.reference
                )));
            }
            _ => {}
        }

        let mut tx = self.storage.begin().await?;
        if let Some(reference) = requested_reference.as_deref() {
            DuplicationCheck {
                path: &record.path,
                reference,
                kind,
                cad_type: record.cad_type,
                exclude_id: Some(record.id),
            }
            .ensure_not_exists(&mut *tx)
            .await?;
        }

        db::sqlite::reset_storage(&mut *tx, kind, record.id).await?;
        tx.commit().await?;
        record.storage_status = StorageStatus::NotStored;
        record.storage_error = None;

        let task = StoreTask {
            model_id: record.id,
            filename: request.filename,
            path: record.path.clone(),
            file_type: kind,
            cad_type: record.cad_type,
            reference: requested_reference.unwrap_or_else(|| record.reference.clone()),
        };
        self.hand_off(&record, task).await?;
        Ok(record)
    }

    pub async fn get(&self, kind: StorableKind, id: i64) -> Result<StorableRecord, EdaPartsError> {
        debug!(file_type = %kind, model_id = id, "Retrieving a storable object");
        self.storage
            .get_by_id(kind, id)
            .await?
            .ok_or_else(|| EdaPartsError::not_found("storable object not found", id))
    }

    pub async fn list(
        &self,
        kind: StorableKind,
        page_number: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Page<StorableRecord>, EdaPartsError> {
        let (page_number, page_size) = normalize_page(page_number, page_size);
        let offset = i64::from(page_number - 1) * i64::from(page_size);
        let (elements, total_elements) = self
            .storage
            .list_page(kind, i64::from(page_size), offset)
            .await?;
        Ok(Page {
            page_number,
            page_size,
            total_elements,
            elements,
        })
    }

    /// Stored, same reference, and byte-identical target file.
    async fn is_unchanged(
        &self,
        record: &StorableRecord,
        requested_reference: Option<&str>,
        upload: &Path,
    ) -> Result<bool, EdaPartsError> {
        if record.storage_status != StorageStatus::Stored {
            return Ok(false);
        }
        if requested_reference.is_some_and(|r| r != record.reference) {
            return Ok(false);
        }
        let target = self
            .layout
            .target_path(record.cad_type, record.kind, &record.path);
        if !tokio::fs::try_exists(&target).await? {
            return Ok(false);
        }
        files::same_content(&target, upload).await
    }

    /// A record whose task never reached the queue would stay `NOT_STORED`
    /// forever, so it is failed right away.
    async fn hand_off(&self, record: &StorableRecord, task: StoreTask) -> Result<(), EdaPartsError> {
        let Err(e) = self.queue.enqueue(task) else {
            return Ok(());
        };
        error!(model_id = record.id, "Cannot enqueue store task: {}", e);
        if let Err(status_err) = self
            .storage
            .set_status(
                record.kind,
                record.id,
                StorageStatus::StorageFailed,
                Some(&e.to_string()),
            )
            .await
        {
            error!(model_id = record.id, "Cannot record storage failure: {}", status_err);
        }
        Err(e)
    }
}

/// Clamp paging parameters: pages start at 1, sizes within `1..=MAX_PAGE_SIZE`.
pub fn normalize_page(page_number: Option<u32>, page_size: Option<u32>) -> (u32, u32) {
    let page_number = page_number.unwrap_or(1).max(1);
    let page_size = page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    (page_number, page_size)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_defaults_and_bounds() {
        assert_eq!(normalize_page(None, None), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(normalize_page(Some(0), Some(0)), (1, 1));
        assert_eq!(normalize_page(Some(3), Some(5000)), (3, MAX_PAGE_SIZE));
    }

    #[test]
    fn blank_optionals_are_absent() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(Some("R1".into())).as_deref(), Some("R1"));
        assert_eq!(non_blank(None), None);
    }
}
