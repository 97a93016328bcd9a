//! CAD library parsing.
//!
//! A [`Library`] is the list of named parts found in one library file. The
//! ingestion pipeline only needs the part names, their descriptions and the
//! kind of resource the file holds; it consumes parsers through
//! [`LibraryParser`].

pub mod altium;
pub mod kicad;
pub mod sexp;

use crate::types::{CadType, StorableKind};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("cannot read library file: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt library: {0}")]
    CorruptLibrary(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryModel {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub library_type: StorableKind,
    pub models: BTreeMap<String, LibraryModel>,
}

impl Library {
    pub fn new(library_type: StorableKind) -> Self {
        Self {
            library_type,
            models: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, name: impl Into<String>, description: Option<String>) -> Self {
        self.insert(name, description);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, description: Option<String>) {
        let name = name.into();
        let description = description.filter(|d| !d.trim().is_empty());
        self.models
            .insert(name.clone(), LibraryModel { name, description });
    }

    pub fn count(&self) -> usize {
        self.models.len()
    }

    pub fn is_present(&self, reference: &str) -> bool {
        self.models.contains_key(reference)
    }

    /// The only part of a single-part library.
    pub fn single_model(&self) -> Option<&LibraryModel> {
        match self.count() {
            1 => self.models.values().next(),
            _ => None,
        }
    }

    pub fn description_of(&self, reference: &str) -> Option<&str> {
        self.models.get(reference)?.description.as_deref()
    }
}

/// Reads a library file of a given CAD dialect.
pub trait LibraryParser: Send + Sync {
    fn parse(&self, file: &Path, cad_type: CadType) -> Result<Library, LibraryError>;
}

/// Default parser: S-expressions for KiCad, compound documents for Altium.
#[derive(Debug, Default, Clone, Copy)]
pub struct CadLibraryParser;

impl LibraryParser for CadLibraryParser {
    fn parse(&self, file: &Path, cad_type: CadType) -> Result<Library, LibraryError> {
        match cad_type {
            CadType::Kicad => kicad::parse_file(file),
            CadType::Altium => altium::parse_file(file),
        }
    }
}
