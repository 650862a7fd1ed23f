//! Run flattening through an external office converter
//!
//! Word splits text into many runs as it tracks edits and spell checking,
//! which fragments placeholders. Converting DOCX -> DOC -> DOCX with
//! LibreOffice (`soffice`) merges most of those runs. The input is never
//! touched; the conversion runs on a copy named `<stem> - cleaned.docx`.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};

use crate::config::FlattenConfig;
use crate::error::FlattenError;

/// Runs the converter configured in [`FlattenConfig`]
#[derive(Debug)]
pub struct Flattener {
    config: FlattenConfig,
}

impl Flattener {
    /// Fails with [`FlattenError::ConverterMissing`] if the converter does not exist
    pub fn new(config: FlattenConfig) -> Result<Self, FlattenError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Flatten a copy of `input` and return the copy's path
    ///
    /// Output goes to `output_dir`, or next to `input` when `None`.
    pub fn flatten_copy(
        &self,
        input: &Path,
        output_dir: Option<&Path>,
    ) -> Result<PathBuf, FlattenError> {
        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => match input.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        };
        std::fs::create_dir_all(&output_dir)?;

        let cleaned = unique_cleaned_path(input, &output_dir);
        std::fs::copy(input, &cleaned)?;
        debug!("copied {} to {}", input.display(), cleaned.display());

        let intermediate = IntermediateFile(cleaned.with_extension("doc"));
        self.convert(&cleaned, "doc", &output_dir)?;
        self.convert(&intermediate.0, "docx", &output_dir)?;
        drop(intermediate);

        if !cleaned.is_file() {
            return Err(FlattenError::MissingOutput(cleaned));
        }
        info!("flattened {} -> {}", input.display(), cleaned.display());
        Ok(cleaned)
    }

    fn convert(&self, file: &Path, step: &'static str, outdir: &Path) -> Result<(), FlattenError> {
        let output = Command::new(&self.config.converter)
            .arg("--headless")
            .arg("--convert-to")
            .arg(step)
            .arg(file)
            .arg("--outdir")
            .arg(outdir)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    FlattenError::ConverterMissing(self.config.converter.clone())
                }
                _ => FlattenError::Io(e),
            })?;

        if !output.status.success() {
            warn!(
                "converter failed on {}: {}",
                file.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(FlattenError::ConversionFailed {
                step,
                status: output.status,
            });
        }
        Ok(())
    }
}

/// Removes the intermediate `.doc` however the conversion ends
struct IntermediateFile(PathBuf);

impl Drop for IntermediateFile {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = std::fs::remove_file(&self.0) {
                warn!("could not remove {}: {e}", self.0.display());
            }
        }
    }
}

/// `<stem> - cleaned.docx`, or `<stem> - cleaned (N).docx` for the first free N
pub fn unique_cleaned_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let candidate = output_dir.join(format!("{stem} - cleaned.docx"));
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|i| output_dir.join(format!("{stem} - cleaned ({i}).docx")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
