//! Altium `.SchLib` / `.PcbLib` libraries.
//!
//! Both are OLE compound documents. Parameters are stored as length-prefixed
//! `|KEY=VALUE|KEY=VALUE` records.

use super::{Library, LibraryError};
use crate::types::StorableKind;
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;

const FILE_HEADER: &str = "/FileHeader";
/// Root storages of a PcbLib that hold library metadata rather than footprints.
const PCBLIB_RESERVED_STORAGES: [&str; 3] = ["Library", "FileVersionInfo", "Models"];

pub fn parse_file(file: &Path) -> Result<Library, LibraryError> {
    let mut comp = cfb::open(file).map_err(|e| {
        LibraryError::CorruptLibrary(format!("not an Altium compound document: {e}"))
    })?;
    parse_compound(&mut comp)
}

pub fn parse_compound<F: Read + Seek>(
    comp: &mut cfb::CompoundFile<F>,
) -> Result<Library, LibraryError> {
    if !comp.is_stream(FILE_HEADER) {
        return Err(LibraryError::CorruptLibrary(
            "Altium library has no FileHeader stream".into(),
        ));
    }
    let header = read_stream(comp, FILE_HEADER)?;
    let header_text = String::from_utf8_lossy(&header);

    if header_text.contains("Schematic Library") {
        parse_schlib(&parse_parameters(&header))
    } else if header_text.contains("PCB") {
        parse_pcblib(comp)
    } else {
        Err(LibraryError::CorruptLibrary(
            "unrecognised Altium library header".into(),
        ))
    }
}

fn parse_schlib(header: &HashMap<String, String>) -> Result<Library, LibraryError> {
    let mut library = Library::new(StorableKind::Symbol);
    let count = header
        .get("COMPCOUNT")
        .and_then(|c| c.trim().parse::<usize>().ok())
        .unwrap_or(0);
    // Every component needs its own LIBREF field in the header.
    if count > header.len() {
        return Err(LibraryError::CorruptLibrary(format!(
            "COMPCOUNT={count} exceeds the {} header fields",
            header.len()
        )));
    }
    for index in 0..count {
        let Some(name) = header.get(&format!("LIBREF{index}")) else {
            continue;
        };
        library.insert(name.clone(), header.get(&format!("COMPDESCR{index}")).cloned());
    }
    Ok(library)
}

fn parse_pcblib<F: Read + Seek>(comp: &mut cfb::CompoundFile<F>) -> Result<Library, LibraryError> {
    let storages: Vec<String> = comp
        .read_root_storage()
        .filter(|entry| entry.is_storage())
        .map(|entry| entry.name().to_string())
        .filter(|name| !PCBLIB_RESERVED_STORAGES.contains(&name.as_str()))
        .collect();

    let mut library = Library::new(StorableKind::Footprint);
    for storage in storages {
        let params_path = format!("/{storage}/Parameters");
        // Storage names are truncated to 31 chars; PATTERN has the full name.
        let params = if comp.is_stream(&params_path) {
            parse_parameters(&read_stream(comp, &params_path)?)
        } else {
            HashMap::new()
        };
        let name = params
            .get("PATTERN")
            .filter(|p| !p.is_empty())
            .cloned()
            .unwrap_or(storage);
        library.insert(name, params.get("DESCRIPTION").cloned());
    }
    Ok(library)
}

fn read_stream<F: Read + Seek>(
    comp: &mut cfb::CompoundFile<F>,
    path: &str,
) -> Result<Vec<u8>, LibraryError> {
    let mut stream = comp.open_stream(path)?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Collect `KEY=VALUE` pairs from a parameter record. Keys are upper-cased.
fn parse_parameters(raw: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(raw)
        .split(['|', '\0'])
        .filter_map(|field| field.split_once('='))
        .filter(|(key, _)| !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric()))
        .map(|(key, value)| (key.to_ascii_uppercase(), value.to_string()))
        .collect()
}
