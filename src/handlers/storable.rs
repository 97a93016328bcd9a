use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::path::{Path as FsPath, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::db::StorableRecord;
use crate::service::files;
use crate::types::{
    CadType, Page, StorableKind, StorableObjectDataUpdateRequest, StorableObjectRequest,
};
use crate::{EdaPartsError, router::EdaPartsState};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page_number: Option<u32>,
    pub page_size: Option<u32>,
}

/// Text fields and the spooled file of a storable upload form.
#[derive(Debug, Default)]
struct UploadForm {
    path: Option<String>,
    cad_type: Option<String>,
    reference: Option<String>,
    description: Option<String>,
    file: Option<PathBuf>,
}

impl UploadForm {
    /// Read every part; the `file` part is streamed into `upload_dir`.
    async fn read(mut multipart: Multipart, upload_dir: &FsPath) -> Result<Self, EdaPartsError> {
        let mut form = UploadForm::default();
        let result = form.read_parts(&mut multipart, upload_dir).await;
        if let Err(e) = result {
            form.discard().await;
            return Err(e);
        }
        Ok(form)
    }

    async fn read_parts(
        &mut self,
        multipart: &mut Multipart,
        upload_dir: &FsPath,
    ) -> Result<(), EdaPartsError> {
        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    if self.file.is_some() {
                        return Err(EdaPartsError::InvalidRequest(
                            "only one file can be uploaded per request".into(),
                        ));
                    }
                    tokio::fs::create_dir_all(upload_dir).await?;
                    let (std_file, spooled) = tempfile::Builder::new()
                        .prefix("edaparts-upload-")
                        .tempfile_in(upload_dir)?
                        .keep()
                        .map_err(|e| EdaPartsError::Io(e.error))?;
                    self.file = Some(spooled);

                    let mut out = tokio::fs::File::from_std(std_file);
                    while let Some(chunk) = field.chunk().await? {
                        out.write_all(&chunk).await?;
                    }
                    out.flush().await?;
                }
                "path" => self.path = Some(field.text().await?),
                "cad_type" => self.cad_type = Some(field.text().await?),
                "reference" => self.reference = Some(field.text().await?),
                "description" => self.description = Some(field.text().await?),
                other => debug!("Ignoring unexpected multipart field `{other}`"),
            }
        }
        Ok(())
    }

    fn create_request(
        &mut self,
        file_type: StorableKind,
    ) -> Result<StorableObjectRequest, EdaPartsError> {
        Ok(StorableObjectRequest {
            path: required(self.path.take(), "path")?,
            cad_type: required(self.cad_type.take(), "cad_type")?.parse::<CadType>()?,
            file_type,
            filename: self.take_file()?,
            reference: self.reference.take(),
            description: self.description.take(),
        })
    }

    fn take_file(&mut self) -> Result<PathBuf, EdaPartsError> {
        self.file
            .take()
            .ok_or_else(|| EdaPartsError::InvalidRequest("missing `file` part".into()))
    }

    async fn discard(&mut self) {
        if let Some(file) = self.file.take() {
            files::discard_upload(&file).await;
        }
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, EdaPartsError> {
    value.ok_or_else(|| EdaPartsError::InvalidRequest(format!("missing `{name}` part")))
}

pub async fn create_handler(
    State(state): State<EdaPartsState>,
    Path(kind): Path<String>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<StorableRecord>), EdaPartsError> {
    let file_type: StorableKind = kind.parse()?;
    let mut form = UploadForm::read(multipart, &state.upload_dir).await?;

    let request = match form.create_request(file_type) {
        Ok(request) => request,
        Err(e) => {
            form.discard().await;
            return Err(e);
        }
    };

    let upload = request.filename.clone();
    match state.service.create(request).await {
        Ok(record) => Ok((StatusCode::CREATED, Json(record))),
        Err(e) => {
            files::discard_upload(&upload).await;
            Err(e)
        }
    }
}

pub async fn update_data_handler(
    State(state): State<EdaPartsState>,
    Path((kind, model_id)): Path<(String, i64)>,
    multipart: Multipart,
) -> Result<Json<StorableRecord>, EdaPartsError> {
    let file_type: StorableKind = kind.parse()?;
    let mut form = UploadForm::read(multipart, &state.upload_dir).await?;
    let filename = form.take_file()?;

    let request = StorableObjectDataUpdateRequest {
        model_id,
        file_type,
        filename: filename.clone(),
        reference: form.reference.take(),
    };
    match state.service.update_data(request).await {
        Ok(record) => Ok(Json(record)),
        Err(e) => {
            files::discard_upload(&filename).await;
            Err(e)
        }
    }
}

pub async fn get_handler(
    State(state): State<EdaPartsState>,
    Path((kind, model_id)): Path<(String, i64)>,
) -> Result<Json<StorableRecord>, EdaPartsError> {
    let kind: StorableKind = kind.parse()?;
    Ok(Json(state.service.get(kind, model_id).await?))
}

pub async fn list_handler(
    State(state): State<EdaPartsState>,
    Path(kind): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<StorableRecord>>, EdaPartsError> {
    let kind: StorableKind = kind.parse()?;
    Ok(Json(
        state
            .service
            .list(kind, params.page_number, params.page_size)
            .await?,
    ))
}
