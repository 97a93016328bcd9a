use crate::types::{CadType, StorableKind, StorageStatus};
use serde::{Deserialize, Serialize};

/// A footprint or symbol row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorableRecord {
    pub id: i64,
    #[serde(rename = "file_type")]
    pub kind: StorableKind,
    pub path: String,
    pub reference: String,
    pub cad_type: CadType,
    pub description: Option<String>,
    pub alias: Option<String>,
    pub storage_status: StorageStatus,
    pub storage_error: Option<String>,
}

/// Values for a row about to be inserted; always starts as `NOT_STORED`.
#[derive(Debug, Clone)]
pub struct NewStorable {
    pub kind: StorableKind,
    pub path: String,
    pub reference: String,
    pub cad_type: CadType,
    pub description: Option<String>,
    pub alias: Option<String>,
}
