use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Rows of a dataset file that may fail to parse before the load is aborted.
pub const MAX_PARSE_ERRORS: usize = 5;

/// File extensions picked up from a training data folder.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// One dataset entry. `input` is absent when the input is synthesized from
/// the target.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePathPair {
    pub input: Option<PathBuf>,
    pub target: PathBuf,
}

/// Reads `input,target` path pairs from a headerless two-column CSV file.
pub fn read_pairs_csv(path: &Path) -> Result<Vec<ImagePathPair>> {
    let file = fs::File::open(path).map_err(|e| {
        Error::TrainingData(format!("failed to open {}: {e}", path.display()))
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    read_pairs(file, base)
}

/// Parses path pairs, relative paths being resolved against `base`.
///
/// Malformed rows are logged and skipped; more than [`MAX_PARSE_ERRORS`] of
/// them abort with a `TrainingData` error.
pub fn read_pairs<R: Read>(reader: R, base: &Path) -> Result<Vec<ImagePathPair>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut pairs = Vec::new();
    let mut errors = 0;
    for (line, record) in csv_reader.records().enumerate() {
        let line = line + 1;
        let failure = match record {
            Ok(record) if record.iter().all(str::is_empty) => continue,
            Ok(record) if record.len() == 2 && !record[0].is_empty() && !record[1].is_empty() => {
                pairs.push(ImagePathPair {
                    input: Some(resolve(base, &record[0])),
                    target: resolve(base, &record[1]),
                });
                continue;
            }
            Ok(record) => format!("expected 2 columns, found {}", record.len()),
            Err(e) => e.to_string(),
        };

        errors += 1;
        log::warn!("dataset line {line} skipped: {failure}");
        if errors > MAX_PARSE_ERRORS {
            return Err(Error::TrainingData(format!(
                "too many malformed dataset lines ({errors}), last at line {line}"
            )));
        }
    }
    Ok(pairs)
}

/// Lists the images of a folder as target-only entries, sorted by path.
pub fn read_folder(folder: &Path) -> Result<Vec<ImagePathPair>> {
    let entries = fs::read_dir(folder).map_err(|e| {
        Error::TrainingData(format!("failed to read folder {}: {e}", folder.display()))
    })?;

    let mut targets = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            targets.push(path);
        }
    }
    targets.sort();
    Ok(targets
        .into_iter()
        .map(|target| ImagePathPair {
            input: None,
            target,
        })
        .collect())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn resolve(base: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_relative() {
        base.join(path)
    } else {
        path
    }
}
