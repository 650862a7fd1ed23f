//! File-level conversions
//!
//! Thin orchestration over [`container`](crate::container), [`Encoder`] and
//! [`Decoder`]. Every function takes explicit paths and configuration and
//! returns where it wrote its output.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::info;

use crate::config::ExtractConfig;
use crate::container;
use crate::decoder::{Decoder, ReconstructReport};
use crate::document::{Document, EditSet};
use crate::encoder::Encoder;

/// Suffix appended to the stem of rebuilt documents
pub const RECONSTRUCTED_SUFFIX: &str = "_reconstructed";

fn file_stem(path: &Path) -> Result<&str> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("Cannot derive a file name from {}", path.display()))
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))
}

/// Extract `input` into `<output_dir>/<stem>.json`
pub fn docx_to_json(input: &Path, output_dir: &Path, config: &ExtractConfig) -> Result<PathBuf> {
    let entries = container::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;

    let encoder = Encoder::with_config(config.clone());
    let document = encoder.extract(&entries);

    ensure_dir(output_dir)?;
    let json_path = output_dir.join(format!("{}.json", file_stem(input)?));
    encoder.encode_to_file(&document, &json_path)?;

    info!(
        "{} -> {} ({} entries, {} editable)",
        input.display(),
        json_path.display(),
        document.entries.len(),
        document.editable_entries().count()
    );
    Ok(json_path)
}

/// Rebuild a DOCX from a JSON document, applying its staged edits
///
/// The output is `<output_dir>/<out_name>` or, without a name,
/// `<output_dir>/<stem>_reconstructed.docx`.
pub fn json_to_docx(
    json: &Path,
    output_dir: &Path,
    out_name: Option<&str>,
) -> Result<(PathBuf, ReconstructReport)> {
    let decoder = Decoder::new();
    let document = decoder.decode_file(json)?;
    let rebuilt = decoder
        .reconstruct(&document)
        .with_context(|| format!("Failed to reconstruct {}", json.display()))?;

    ensure_dir(output_dir)?;
    let docx_path = match out_name {
        Some(name) => output_dir.join(name),
        None => output_dir.join(format!("{}{RECONSTRUCTED_SUFFIX}.docx", file_stem(json)?)),
    };
    container::save(&rebuilt.entries, &docx_path)
        .with_context(|| format!("Failed to write {}", docx_path.display()))?;

    info!("{} -> {}", json.display(), docx_path.display());
    Ok((docx_path, rebuilt.report))
}

/// DOCX -> JSON -> DOCX with no edits
pub fn roundtrip(input: &Path, output_dir: &Path, config: &ExtractConfig) -> Result<PathBuf> {
    let json_path = docx_to_json(input, output_dir, config)?;
    let (docx_path, _) = json_to_docx(&json_path, output_dir, None)?;
    Ok(docx_path)
}

/// Apply `edits` to `input` and save the result to `output` without writing JSON
pub fn fill(
    input: &Path,
    edits: &EditSet,
    output: &Path,
    config: &ExtractConfig,
) -> Result<ReconstructReport> {
    let entries = container::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let document = Encoder::with_config(config.clone()).extract(&entries);
    let rebuilt = Decoder::new()
        .reconstruct_with(&document, edits)
        .with_context(|| format!("Failed to fill {}", input.display()))?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    container::save(&rebuilt.entries, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        "{} -> {} ({} placeholders replaced)",
        input.display(),
        output.display(),
        rebuilt.report.applied
    );
    Ok(rebuilt.report)
}

/// Build an edit set that replaces each token in every entry where it occurs
pub fn edits_for_tokens<'a, I>(input: &Path, config: &ExtractConfig, pairs: I) -> Result<EditSet>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let entries = container::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let document = Encoder::with_config(config.clone()).extract(&entries);

    let mut edits = EditSet::new();
    for (token, value) in pairs {
        for entry in document.editable_entries() {
            if document.tokens(&entry.name).contains(&token) {
                edits.set(entry.name.as_str(), token, value);
            }
        }
    }
    Ok(edits)
}

/// Merge `edits` into the document at `json` and save it in place
///
/// The previous file is kept as `<json>.bak`; its path is returned.
pub fn stage_edits(json: &Path, edits: &EditSet) -> Result<PathBuf> {
    let decoder = Decoder::new();
    let mut document = decoder.decode_file(json)?;
    document.edits.merge(edits.clone());
    write_document_with_backup(json, &document)
}

/// Save `document` over `json`, keeping the previous file as `<json>.bak`
pub fn write_document_with_backup(json: &Path, document: &Document) -> Result<PathBuf> {
    let mut backup = json.as_os_str().to_owned();
    backup.push(".bak");
    let backup = PathBuf::from(backup);
    std::fs::copy(json, &backup)
        .with_context(|| format!("Failed to back up {}", json.display()))?;

    Encoder::new().encode_to_file(document, json)?;
    info!("saved {} edits to {}", document.edits.len(), json.display());
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ArchiveEntry;

    const XML: &str = r#"<w:document><w:body><w:p><w:r><w:t>Dear {</w:t></w:r><w:r><w:t>Name</w:t></w:r><w:r><w:t>},</w:t></w:r></w:p></w:body></w:document>"#;

    fn write_docx(dir: &Path) -> PathBuf {
        let path = dir.join("Letter.docx");
        let entries = vec![
            ArchiveEntry::new("[Content_Types].xml", "<Types/>"),
            ArchiveEntry::new("word/document.xml", XML),
            ArchiveEntry::new("word/header1.xml", "<w:hdr><w:t>{Name}</w:t></w:hdr>"),
            ArchiveEntry::new("word/media/image1.png", vec![0x89, b'P', b'N', b'G', 0, 0xFF]),
        ];
        container::save(&entries, &path).unwrap();
        path
    }

    #[test]
    fn test_docx_to_json_names_output_after_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_docx(dir.path());
        let out = dir.path().join("out");

        let json = docx_to_json(&input, &out, &ExtractConfig::default()).unwrap();
        assert_eq!(json, out.join("Letter.json"));
        let document = Decoder::new().decode_file(&json).unwrap();
        assert_eq!(document.entries.len(), 4);
        assert_eq!(document.tokens("word/document.xml"), vec!["{Name}"]);
    }

    #[test]
    fn test_roundtrip_is_byte_identical_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_docx(dir.path());
        let out = dir.path().join("out");

        let rebuilt = roundtrip(&input, &out, &ExtractConfig::default()).unwrap();
        assert_eq!(rebuilt, out.join("Letter_reconstructed.docx"));

        let before = container::open(&input).unwrap();
        let after = container::open(&rebuilt).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_stage_edits_then_build() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_docx(dir.path());
        let json = docx_to_json(&input, dir.path(), &ExtractConfig::default()).unwrap();

        let mut edits = EditSet::new();
        edits.set("word/document.xml", "{Name}", "Aditya");
        let backup = stage_edits(&json, &edits).unwrap();
        assert!(backup.ends_with("Letter.json.bak"));
        assert!(Decoder::new().decode_file(&backup).unwrap().edits.is_empty());

        let (docx, report) = json_to_docx(&json, dir.path(), Some("filled.docx")).unwrap();
        assert_eq!(report.applied, 1);

        let entries = container::open(&docx).unwrap();
        let xml = String::from_utf8(entries[1].data.clone()).unwrap();
        assert!(xml.contains("<w:t>Dear Aditya</w:t>"));
        assert!(xml.contains("<w:t></w:t>"));
        assert!(xml.contains("<w:t>,</w:t>"));
        // Header was not edited
        assert_eq!(entries[2].data, b"<w:hdr><w:t>{Name}</w:t></w:hdr>");
    }

    #[test]
    fn test_fill_with_token_wide_edits() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_docx(dir.path());
        let output = dir.path().join("nested").join("filled.docx");
        let config = ExtractConfig::default();

        let edits = edits_for_tokens(&input, &config, [("{Name}", "Ann")]).unwrap();
        assert_eq!(edits.len(), 2);

        let report = fill(&input, &edits, &output, &config).unwrap();
        assert_eq!(report.applied, 2);
        assert!(report.is_clean());

        let entries = container::open(&output).unwrap();
        assert_eq!(entries[2].data, b"<w:hdr><w:t>Ann</w:t></w:hdr>");
        assert_eq!(entries[3].data, vec![0x89, b'P', b'N', b'G', 0, 0xFF]);
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = docx_to_json(&dir.path().join("nope.docx"), dir.path(), &ExtractConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }
}
