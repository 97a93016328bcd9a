//! Logical-path rules and the on-disk layout of stored library files.

use crate::error::EdaPartsError;
use crate::types::{CadType, StorableKind};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

const KICAD_FOOTPRINT_DIR_SUFFIX: &str = ".pretty";
const ALIAS_PREFIX: &str = "EDAPARTS_";

static NON_ALNUM_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^0-9a-z]+").expect("static regex"));

/// Check a client supplied logical path against the rules of its dialect and kind.
pub fn validate_input_path(
    path: &str,
    cad_type: CadType,
    kind: StorableKind,
) -> Result<(), EdaPartsError> {
    let logical = Path::new(path);

    if path.is_empty() {
        return Err(EdaPartsError::InvalidPath("the given path is empty".into()));
    }
    if logical.is_absolute() || path.starts_with('/') || path.starts_with('\\') {
        return Err(EdaPartsError::InvalidPath(format!(
            "the given path {path} must be relative"
        )));
    }

    if let Some(Component::Normal(first)) = logical.components().next() {
        let first = first.to_string_lossy();
        if [StorableKind::Footprint, StorableKind::Symbol]
            .iter()
            .any(|k| first.eq_ignore_ascii_case(k.storage_root()))
        {
            return Err(EdaPartsError::InvalidPath(format!(
                "the given path {path} must not start by the reserved prefix: {first}"
            )));
        }
    }

    if logical
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(EdaPartsError::InvalidPath(format!(
            "the given path {path} must not leave the library root"
        )));
    }

    if kind.is_single_part_per_file(cad_type) {
        let in_pretty_dir = logical
            .parent()
            .and_then(Path::file_name)
            .map(|dir| dir.to_string_lossy().ends_with(KICAD_FOOTPRINT_DIR_SUFFIX))
            .unwrap_or(false);
        if !in_pretty_dir {
            return Err(EdaPartsError::InvalidPath(format!(
                "KiCAD footprint files must be stored in a directory suffixed with `{KICAD_FOOTPRINT_DIR_SUFFIX}`"
            )));
        }
    }

    let expected = kind.extension(cad_type);
    let extension_matches = logical
        .extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(expected))
        .unwrap_or(false);
    if !extension_matches {
        return Err(EdaPartsError::InvalidPath(format!(
            "the given path {path} must end with .{expected}"
        )));
    }
    Ok(())
}

/// Symbolic library name KiCad projects use to reference the stored file.
///
/// Footprints are named after their `.pretty` directory, symbols after the
/// library file. Other dialects have no alias.
pub fn model_alias(path: &str, cad_type: CadType, kind: StorableKind) -> Option<String> {
    if cad_type != CadType::Kicad {
        return None;
    }

    let lib_path_name = match kind {
        StorableKind::Footprint => {
            let dir = Path::new(path)
                .parent()
                .and_then(Path::file_name)
                .map(|d| d.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            dir.strip_suffix(KICAD_FOOTPRINT_DIR_SUFFIX)
                .map(str::to_string)
                .unwrap_or(dir)
        }
        StorableKind::Symbol => Path::new(path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_lowercase())
            .unwrap_or_default(),
    };

    let sanitized = NON_ALNUM_RUNS
        .replace_all(&lib_path_name, "_")
        .trim_matches('_')
        .to_uppercase();
    Some(format!("{ALIAS_PREFIX}{sanitized}"))
}

/// Immutable mapping of (dialect, kind) to storage directories.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `<base>/<footprints|symbols>/<KICAD|ALTIUM>`
    pub fn root(&self, cad_type: CadType, kind: StorableKind) -> PathBuf {
        self.base_dir
            .join(kind.storage_root())
            .join(cad_type.as_str())
    }

    /// Where the file for a validated logical path lives.
    pub fn target_path(&self, cad_type: CadType, kind: StorableKind, path: &str) -> PathBuf {
        self.root(cad_type, kind).join(path)
    }

    /// Sibling lock marker: the target file name with `.lock` appended.
    pub fn lock_path(target: &Path) -> PathBuf {
        let mut name = target.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        target.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid(path: &str, cad: CadType, kind: StorableKind) -> bool {
        matches!(
            validate_input_path(path, cad, kind),
            Err(EdaPartsError::InvalidPath(_))
        )
    }

    #[test]
    fn accepts_paths_matching_dialect_and_kind() {
        validate_input_path("foo.pretty/R0805.kicad_mod", CadType::Kicad, StorableKind::Footprint)
            .unwrap();
        validate_input_path("libs/Device.KICAD_SYM", CadType::Kicad, StorableKind::Symbol).unwrap();
        validate_input_path("passives/Resistors.PcbLib", CadType::Altium, StorableKind::Footprint)
            .unwrap();
        validate_input_path("Opamps.SchLib", CadType::Altium, StorableKind::Symbol).unwrap();
    }

    #[test]
    fn rejects_absolute_and_escaping_paths() {
        assert!(invalid("/etc/x.kicad_mod", CadType::Kicad, StorableKind::Footprint));
        assert!(invalid("/lib/x.schlib", CadType::Altium, StorableKind::Symbol));
        assert!(invalid("../x.schlib", CadType::Altium, StorableKind::Symbol));
        assert!(invalid("a/../../x.pretty/y.kicad_mod", CadType::Kicad, StorableKind::Footprint));
        assert!(invalid("", CadType::Altium, StorableKind::Symbol));
    }

    #[test]
    fn rejects_reserved_storage_roots() {
        assert!(invalid("footprints/a.pretty/x.kicad_mod", CadType::Kicad, StorableKind::Footprint));
        assert!(invalid("Symbols/x.kicad_sym", CadType::Kicad, StorableKind::Symbol));
        validate_input_path("footprints_extra/x.pcblib", CadType::Altium, StorableKind::Footprint)
            .unwrap();
    }

    #[test]
    fn kicad_footprints_need_a_pretty_directory() {
        assert!(invalid("foo/R0805.kicad_mod", CadType::Kicad, StorableKind::Footprint));
        assert!(invalid("R0805.kicad_mod", CadType::Kicad, StorableKind::Footprint));
        assert!(invalid("foo.pretty.bak/R0805.kicad_mod", CadType::Kicad, StorableKind::Footprint));
        // Only KiCad footprints follow the directory convention.
        validate_input_path("Device.kicad_sym", CadType::Kicad, StorableKind::Symbol).unwrap();
        validate_input_path("Resistors.pcblib", CadType::Altium, StorableKind::Footprint).unwrap();
    }

    #[test]
    fn rejects_extensions_of_the_wrong_pair() {
        assert!(invalid("foo.pretty/R0805.kicad_sym", CadType::Kicad, StorableKind::Footprint));
        assert!(invalid("Device.kicad_mod", CadType::Kicad, StorableKind::Symbol));
        assert!(invalid("Resistors.schlib", CadType::Altium, StorableKind::Footprint));
        assert!(invalid("Opamps", CadType::Altium, StorableKind::Symbol));
    }

    #[test]
    fn alias_is_derived_from_the_library_name() {
        assert_eq!(
            model_alias("foo.pretty/R0805.kicad_mod", CadType::Kicad, StorableKind::Footprint)
                .as_deref(),
            Some("EDAPARTS_FOO")
        );
        assert_eq!(
            model_alias(
                "vendor/Package_SO.pretty/SOIC-8.kicad_mod",
                CadType::Kicad,
                StorableKind::Footprint
            )
            .as_deref(),
            Some("EDAPARTS_PACKAGE_SO")
        );
        assert_eq!(
            model_alias("libs/My Lib--v2.kicad_sym", CadType::Kicad, StorableKind::Symbol)
                .as_deref(),
            Some("EDAPARTS_MY_LIB_V2")
        );
        assert_eq!(
            model_alias("Opamps.schlib", CadType::Altium, StorableKind::Symbol),
            None
        );
    }

    #[test]
    fn layout_maps_dialect_and_kind_to_roots() {
        let layout = StorageLayout::new("/data");
        let target = layout.target_path(
            CadType::Kicad,
            StorableKind::Footprint,
            "foo.pretty/R0805.kicad_mod",
        );
        assert_eq!(
            target,
            PathBuf::from("/data/footprints/KICAD/foo.pretty/R0805.kicad_mod")
        );
        assert_eq!(
            StorageLayout::lock_path(&target),
            PathBuf::from("/data/footprints/KICAD/foo.pretty/R0805.kicad_mod.lock")
        );
        assert_eq!(
            layout.root(CadType::Altium, StorableKind::Symbol),
            PathBuf::from("/data/symbols/ALTIUM")
        );
    }
}
