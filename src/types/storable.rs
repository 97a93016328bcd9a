use crate::error::EdaPartsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// CAD tool family a library file belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum CadType {
    Kicad,
    Altium,
}

impl CadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CadType::Kicad => "KICAD",
            CadType::Altium => "ALTIUM",
        }
    }
}

impl fmt::Display for CadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CadType {
    type Err = EdaPartsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KICAD" => Ok(CadType::Kicad),
            "ALTIUM" => Ok(CadType::Altium),
            other => Err(EdaPartsError::InvalidRequest(format!(
                "unknown cad_type `{other}`, expected KICAD or ALTIUM"
            ))),
        }
    }
}

/// Kind of library resource a storable record points to.
///
/// Each kind lives in its own table and under its own storage root.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorableKind {
    Footprint,
    Symbol,
}

impl StorableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorableKind::Footprint => "FOOTPRINT",
            StorableKind::Symbol => "SYMBOL",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            StorableKind::Footprint => "footprint_references",
            StorableKind::Symbol => "library_references",
        }
    }

    /// Top-level directory under the models base dir. Reserved in logical paths.
    pub fn storage_root(&self) -> &'static str {
        match self {
            StorableKind::Footprint => "footprints",
            StorableKind::Symbol => "symbols",
        }
    }

    /// Expected library file extension, without the leading dot.
    pub fn extension(&self, cad_type: CadType) -> &'static str {
        match (cad_type, self) {
            (CadType::Kicad, StorableKind::Footprint) => "kicad_mod",
            (CadType::Kicad, StorableKind::Symbol) => "kicad_sym",
            (CadType::Altium, StorableKind::Footprint) => "pcblib",
            (CadType::Altium, StorableKind::Symbol) => "schlib",
        }
    }

    /// KiCad keeps exactly one footprint per file, grouped in `.pretty` directories.
    pub fn is_single_part_per_file(&self, cad_type: CadType) -> bool {
        matches!(
            (cad_type, self),
            (CadType::Kicad, StorableKind::Footprint)
        )
    }

    /// Kind-specific invalid format error.
    pub fn invalid_format(&self, message: impl Into<String>) -> EdaPartsError {
        match self {
            StorableKind::Footprint => EdaPartsError::InvalidFootprintFormat(message.into()),
            StorableKind::Symbol => EdaPartsError::InvalidSymbolFormat(message.into()),
        }
    }
}

impl fmt::Display for StorableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorableKind {
    type Err = EdaPartsError;

    /// Accepts `FOOTPRINT`/`SYMBOL` as well as the plural route segments.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "footprint" | "footprints" => Ok(StorableKind::Footprint),
            "symbol" | "symbols" => Ok(StorableKind::Symbol),
            _ => Err(EdaPartsError::InvalidStorableType(format!(
                "the given storable type was not expected [storable_type={s}]"
            ))),
        }
    }
}

/// Lifecycle of the file backing a storable record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageStatus {
    NotStored,
    Storing,
    Stored,
    StorageFailed,
}

impl StorageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageStatus::NotStored => "NOT_STORED",
            StorageStatus::Storing => "STORING",
            StorageStatus::Stored => "STORED",
            StorageStatus::StorageFailed => "STORAGE_FAILED",
        }
    }
}

impl fmt::Display for StorageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_STORED" => Ok(StorageStatus::NotStored),
            "STORING" => Ok(StorageStatus::Storing),
            "STORED" => Ok(StorageStatus::Stored),
            "STORAGE_FAILED" => Ok(StorageStatus::StorageFailed),
            other => Err(format!("unknown storage status `{other}`")),
        }
    }
}

/// Create a new storable record from an uploaded library file.
#[derive(Debug, Clone)]
pub struct StorableObjectRequest {
    pub path: String,
    pub cad_type: CadType,
    pub file_type: StorableKind,
    /// Temporary upload. Owned by the store worker once the request succeeds.
    pub filename: PathBuf,
    pub reference: Option<String>,
    pub description: Option<String>,
}

/// Replace the file (and optionally the reference) of an existing record.
#[derive(Debug, Clone)]
pub struct StorableObjectDataUpdateRequest {
    pub model_id: i64,
    pub file_type: StorableKind,
    pub filename: PathBuf,
    pub reference: Option<String>,
}

/// Unit of background work: persist one upload for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTask {
    pub model_id: i64,
    pub filename: PathBuf,
    pub path: String,
    pub file_type: StorableKind,
    pub cad_type: CadType,
    pub reference: String,
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub page_number: u32,
    pub page_size: u32,
    pub total_elements: i64,
    pub elements: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_route_segments_and_names() {
        assert_eq!("footprints".parse::<StorableKind>().unwrap(), StorableKind::Footprint);
        assert_eq!("SYMBOL".parse::<StorableKind>().unwrap(), StorableKind::Symbol);
        assert!(matches!(
            "capacitors".parse::<StorableKind>(),
            Err(EdaPartsError::InvalidStorableType(_))
        ));
    }
}
