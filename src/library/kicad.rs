//! KiCad `.kicad_mod` footprints and `.kicad_sym` symbol libraries.

use super::sexp::{self, Sexp};
use super::{Library, LibraryError};
use crate::types::StorableKind;
use std::fs;
use std::path::Path;

pub fn parse_file(file: &Path) -> Result<Library, LibraryError> {
    let bytes = fs::read(file)?;
    let text = String::from_utf8(bytes)
        .map_err(|_| LibraryError::CorruptLibrary("KiCad library is not valid UTF-8".into()))?;
    parse_str(&text)
}

pub fn parse_str(text: &str) -> Result<Library, LibraryError> {
    let root = sexp::parse(text).map_err(|e| LibraryError::CorruptLibrary(e.to_string()))?;
    match root.head() {
        // `module` is the pre-6.0 spelling of `footprint`.
        Some("footprint") | Some("module") => parse_footprint(&root),
        Some("kicad_symbol_lib") => Ok(parse_symbol_lib(&root)),
        Some(other) => Err(LibraryError::CorruptLibrary(format!(
            "unexpected KiCad root element `{other}`"
        ))),
        None => Err(LibraryError::CorruptLibrary(
            "KiCad library has no root element".into(),
        )),
    }
}

fn parse_footprint(root: &Sexp) -> Result<Library, LibraryError> {
    let name = root
        .atom_at(1)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| LibraryError::CorruptLibrary("footprint without a name".into()))?;
    let description = root
        .child("descr")
        .and_then(|d| d.atom_at(1))
        .map(str::to_string);
    Ok(Library::new(StorableKind::Footprint).with_model(name, description))
}

fn parse_symbol_lib(root: &Sexp) -> Library {
    let mut library = Library::new(StorableKind::Symbol);
    // Units are nested inside their parent symbol, so only direct children count.
    for symbol in root.children("symbol") {
        let Some(name) = symbol.atom_at(1).filter(|n| !n.is_empty()) else {
            continue;
        };
        library.insert(name, symbol_description(symbol));
    }
    library
}

fn symbol_description(symbol: &Sexp) -> Option<String> {
    symbol
        .children("property")
        .find(|p| matches!(p.atom_at(1), Some("Description") | Some("ki_description")))
        .and_then(|p| p.atom_at(2))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footprint_file_holds_a_single_part() {
        let lib = parse_str(
            r#"(footprint "R0805" (version 20221018) (generator pcbnew) (layer "F.Cu")
                (descr "Resistor SMD 0805 (2012 Metric)")
                (pad "1" smd roundrect (at -0.9125 0) (size 1.025 1.4) (layers "F.Cu")))"#,
        )
        .unwrap();
        assert_eq!(lib.library_type, StorableKind::Footprint);
        assert_eq!(lib.count(), 1);
        assert_eq!(lib.single_model().unwrap().name, "R0805");
        assert_eq!(
            lib.description_of("R0805"),
            Some("Resistor SMD 0805 (2012 Metric)")
        );
    }

    #[test]
    fn legacy_module_root_is_a_footprint() {
        let lib = parse_str("(module C0603 (layer F.Cu) (tedit 5F68FEEE))").unwrap();
        assert_eq!(lib.library_type, StorableKind::Footprint);
        assert!(lib.is_present("C0603"));
        assert_eq!(lib.description_of("C0603"), None);
    }

    #[test]
    fn symbol_library_lists_top_level_symbols_only() {
        let lib = parse_str(
            r#"(kicad_symbol_lib (version 20231120) (generator "kicad_symbol_editor")
                (symbol "R" (property "Reference" "R" (at 0 0 0))
                    (property "Description" "Resistor" (at 0 0 0))
                    (symbol "R_0_1" (polyline (pts (xy 0 0) (xy 1 1)))))
                (symbol "C" (property "ki_description" "Unpolarized capacitor" (at 0 0 0)))
                (symbol "L"))"#,
        )
        .unwrap();
        assert_eq!(lib.library_type, StorableKind::Symbol);
        assert_eq!(lib.count(), 3);
        assert!(!lib.is_present("R_0_1"));
        assert_eq!(lib.description_of("R"), Some("Resistor"));
        assert_eq!(lib.description_of("C"), Some("Unpolarized capacitor"));
        assert_eq!(lib.description_of("L"), None);
        assert!(lib.single_model().is_none());
    }

    #[test]
    fn unknown_or_broken_content_is_corrupt() {
        assert!(matches!(
            parse_str("(kicad_pcb (version 20221018))"),
            Err(LibraryError::CorruptLibrary(_))
        ));
        assert!(matches!(
            parse_str("(footprint \"R0805\""),
            Err(LibraryError::CorruptLibrary(_))
        ));
        assert!(matches!(
            parse_str("not a library"),
            Err(LibraryError::CorruptLibrary(_))
        ));
    }

    #[test]
    fn pathologically_nested_footprint_is_corrupt() {
        let nested = format!("(footprint \"R\" {}", "(".repeat(1_000_000));
        let handle = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || parse_str(&nested))
            .unwrap();
        assert!(matches!(
            handle.join().unwrap(),
            Err(LibraryError::CorruptLibrary(_))
        ));
    }
}
