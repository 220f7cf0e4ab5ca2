//! Loading payload variants from a directory of JSON files.
//!
//! Files are processed in byte-wise filename order so a given directory
//! always yields the same variant indices. A file whose top level is an
//! object with a `"payloads"` array contributes one variant per element,
//! named `<file>[<i>]`; any other JSON file is a single variant named after
//! the file. Unreadable or malformed files are skipped with a warning.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;

use super::PayloadVariant;
use crate::error::{PolyglotError, Result};

#[derive(Deserialize)]
struct PayloadBundle {
    payloads: Vec<Box<RawValue>>,
}

/// Sorted names of the `.json` regular files directly inside `dir`.
pub fn list_payload_files(dir: &Path) -> Result<Vec<String>> {
    let unreadable = |source| PolyglotError::PayloadDirUnreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let Ok(name) = entry.file_name().into_string() else {
            tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 file name");
            continue;
        };
        if !name.ends_with(".json") {
            continue;
        }
        // Follows symlinks, so a link to a regular file counts.
        match std::fs::metadata(entry.path()) {
            Ok(meta) if meta.is_file() => names.push(name),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "skipping payload entry");
            }
        }
    }
    names.sort_unstable();
    Ok(names)
}

/// Turn one file's content into variants. Errors only if `content` is not JSON.
pub fn parse_payload_file(file_name: &str, content: String) -> Result<Vec<PayloadVariant>> {
    let parsed: Value = serde_json::from_str(&content)?;

    let is_bundle = parsed
        .get("payloads")
        .map(Value::is_array)
        .unwrap_or(false);
    if !is_bundle {
        return Ok(vec![PayloadVariant::from_json(file_name, content)?]);
    }

    let bundle: PayloadBundle = serde_json::from_str(&content)?;
    Ok(bundle
        .payloads
        .into_iter()
        .enumerate()
        .map(|(i, raw)| PayloadVariant::new(format!("{file_name}[{i}]"), raw))
        .collect())
}

/// Load every variant under `dir`, in stable order. The result may be empty;
/// [`PayloadStore::build`](super::PayloadStore::build) rejects that.
pub fn load_dir(dir: &Path) -> Result<Vec<PayloadVariant>> {
    let mut variants = Vec::new();

    for name in list_payload_files(dir)? {
        let path: PathBuf = dir.join(&name);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(source) => {
                let e = PolyglotError::PayloadFile { path, source };
                tracing::warn!(error = %e, "skipping payload file");
                continue;
            }
        };
        let bytes = content.len();

        match parse_payload_file(&name, content) {
            Ok(loaded) => {
                tracing::info!(file = %name, variants = loaded.len(), bytes, "loaded payload file");
                variants.extend(loaded);
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "payload file is not valid JSON, skipping");
            }
        }
    }

    tracing::info!(dir = %dir.display(), total = variants.len(), "payload loading finished");
    Ok(variants)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_single_document_file() {
        let variants = parse_payload_file("en.json", r#"{"greeting":"hello"}"#.into()).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].name(), "en.json");
        assert_eq!(variants[0].content().get(), r#"{"greeting":"hello"}"#);
    }

    #[test]
    fn test_bundle_is_exploded_in_order() {
        let content = r#"{"payloads":[{"z":1,"a":2},[1,2],"three"],"meta":"x"}"#;
        let variants = parse_payload_file("bundle.json", content.into()).unwrap();
        let names: Vec<_> = variants.iter().map(|v| v.name()).collect();
        assert_eq!(names, ["bundle.json[0]", "bundle.json[1]", "bundle.json[2]"]);
        // Element key order survives.
        assert_eq!(variants[0].content().get(), r#"{"z":1,"a":2}"#);
        assert_eq!(variants[2].content().get(), r#""three""#);
    }

    #[test]
    fn test_payloads_key_that_is_not_array_is_whole_file() {
        let content = r#"{"payloads":{"not":"an array"}}"#;
        let variants = parse_payload_file("odd.json", content.into()).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].name(), "odd.json");
    }

    #[test]
    fn test_empty_bundle_yields_nothing() {
        let variants = parse_payload_file("empty.json", r#"{"payloads":[]}"#.into()).unwrap();
        assert!(variants.is_empty());
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(parse_payload_file("bad.json", "{oops".into()).is_err());
    }

    #[test]
    fn test_listing_filters_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "b.json", "{}");
        write(tmp.path(), "a.json", "{}");
        write(tmp.path(), "B.json", "{}");
        write(tmp.path(), "notes.txt", "hi");
        std::fs::create_dir(tmp.path().join("dir.json")).unwrap();

        let names = list_payload_files(tmp.path()).unwrap();
        // Byte order: uppercase sorts before lowercase.
        assert_eq!(names, ["B.json", "a.json", "b.json"]);
    }

    #[test]
    fn test_load_dir_skips_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "1-good.json", r#"{"k":"v"}"#);
        write(tmp.path(), "2-bad.json", "{not json");
        write(tmp.path(), "3-bundle.json", r#"{"payloads":[1,2]}"#);

        let variants = load_dir(tmp.path()).unwrap();
        let names: Vec<_> = variants.iter().map(|v| v.name()).collect();
        assert_eq!(names, ["1-good.json", "3-bundle.json[0]", "3-bundle.json[1]"]);
    }

    #[test]
    fn test_missing_dir_is_unreadable() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_dir(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, PolyglotError::PayloadDirUnreadable { .. }));
    }
}
