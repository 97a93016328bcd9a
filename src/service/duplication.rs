use crate::db::sqlite::{self, DuplicateQuery, DuplicateScope};
use crate::error::EdaPartsError;
use crate::types::{CadType, StorableKind};
use sqlx::SqliteConnection;
use std::path::Path;

/// Namespace a (path, reference) pair must be unique in.
///
/// KiCad footprints hold one part per file, so the whole `.pretty` directory
/// is the namespace; everything else is unique per exact path.
pub fn duplicate_scope(path: &str, cad_type: CadType, kind: StorableKind) -> OwnedScope {
    if kind.is_single_part_per_file(cad_type) {
        let dir = Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        OwnedScope::Directory(format!("{dir}/"))
    } else {
        OwnedScope::ExactPath(path.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedScope {
    Directory(String),
    ExactPath(String),
}

impl OwnedScope {
    fn as_scope(&self) -> DuplicateScope<'_> {
        match self {
            OwnedScope::Directory(prefix) => DuplicateScope::Directory(prefix),
            OwnedScope::ExactPath(path) => DuplicateScope::ExactPath(path),
        }
    }
}

/// A pending duplication check for one (path, reference) pair.
#[derive(Debug, Clone)]
pub struct DuplicationCheck<'a> {
    pub path: &'a str,
    pub reference: &'a str,
    pub kind: StorableKind,
    pub cad_type: CadType,
    /// Record being updated; never collides with itself.
    pub exclude_id: Option<i64>,
}

impl DuplicationCheck<'_> {
    /// Request-time check against every record, whatever its storage status.
    pub async fn ensure_not_exists(&self, conn: &mut SqliteConnection) -> Result<(), EdaPartsError> {
        self.run(conn, false).await
    }

    /// Store-time check, run under the file lock, against records whose file
    /// is already stored. Of two racing creations only the first to store wins.
    pub async fn ensure_not_stored(&self, conn: &mut SqliteConnection) -> Result<(), EdaPartsError> {
        self.run(conn, true).await
    }

    async fn run(&self, conn: &mut SqliteConnection, stored_only: bool) -> Result<(), EdaPartsError> {
        let scope = duplicate_scope(self.path, self.cad_type, self.kind);
        let query = DuplicateQuery {
            kind: self.kind,
            cad_type: self.cad_type,
            scope: scope.as_scope(),
            reference: self.reference,
            exclude_id: self.exclude_id,
            stored_only,
        };
        match sqlite::find_duplicate(conn, &query).await? {
            Some(conflicting_id) => Err(EdaPartsError::already_exists(
                match scope {
                    OwnedScope::Directory(_) => format!(
                        "the given {} duplicates the already existing one in the same library directory",
                        self.kind.as_str().to_lowercase()
                    ),
                    OwnedScope::ExactPath(_) => format!(
                        "cannot create the requested {} because it already exists",
                        self.kind.as_str().to_lowercase()
                    ),
                },
                conflicting_id,
            )),
            None => Ok(()),
        }
    }
}
