use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::prelude::{CoreError, CoreResult};
use crate::table::{Column, DetectionTable};

/// One selectable log file within a test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_name: Option<String>,
}

impl FileDescriptor {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            cache_name: None,
        }
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.name)
    }

    pub fn source_path(&self) -> PathBuf {
        Path::new(&self.path).join(&self.name)
    }

    /// Columnar cache file materialized next to the source.
    pub fn cache_path(&self) -> PathBuf {
        let cache_name = self
            .cache_name
            .clone()
            .unwrap_or_else(|| format!("{}.columnar.json", self.stem()));
        Path::new(&self.path).join(cache_name)
    }
}

/// Loads one file's detection table, preferring the columnar cache and
/// materializing it after a raw CSV parse so subsequent loads skip the
/// parse entirely.
pub fn load(descriptor: &FileDescriptor) -> CoreResult<DetectionTable> {
    let cache_path = descriptor.cache_path();
    if cache_path.exists() {
        let bytes = fs::read(&cache_path).map_err(|err| {
            CoreError::Dataset(format!("reading {}: {}", cache_path.display(), err))
        })?;
        return serde_json::from_slice(&bytes).map_err(|err| {
            CoreError::Dataset(format!("parsing {}: {}", cache_path.display(), err))
        });
    }

    let table = read_csv(&descriptor.source_path())?;
    match serde_json::to_vec(&table) {
        Ok(bytes) => {
            if let Err(err) = fs::write(&cache_path, bytes) {
                log::warn!(
                    "could not materialize columnar cache {}: {}",
                    cache_path.display(),
                    err
                );
            }
        }
        Err(err) => log::warn!("could not encode columnar cache: {}", err),
    }
    Ok(table)
}

/// Loads and concatenates several files into one table.
pub fn load_many(descriptors: &[FileDescriptor]) -> CoreResult<DetectionTable> {
    let mut tables = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        tables.push(load(descriptor)?);
    }
    DetectionTable::concat(&tables)
}

/// Parses a raw CSV log. A column where every field parses as a number
/// becomes numerical, anything else categorical.
fn read_csv(path: &Path) -> CoreResult<DetectionTable> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|err| CoreError::Dataset(format!("reading {}: {}", path.display(), err)))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| CoreError::Dataset(format!("reading {}: {}", path.display(), err)))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record
            .map_err(|err| CoreError::Dataset(format!("reading {}: {}", path.display(), err)))?;
        for (idx, field) in record.iter().enumerate() {
            if idx < raw.len() {
                raw[idx].push(field.to_string());
            }
        }
    }

    let mut table = DetectionTable::new();
    for (header, values) in headers.iter().zip(raw) {
        let numeric: Option<Vec<f64>> = values
            .iter()
            .map(|value| value.trim().parse::<f64>().ok())
            .collect();
        let column = match numeric {
            Some(parsed) => Column::Numerical(parsed),
            None => Column::Categorical(values),
        };
        table.insert_column(header, column)?;
    }
    Ok(table)
}

/// Writes a (filtered) table back out as CSV, the export side-channel's
/// terminal consumer.
pub fn write_csv(table: &DetectionTable, path: &Path) -> CoreResult<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|err| CoreError::Dataset(format!("writing {}: {}", path.display(), err)))?;
    writer
        .write_record(table.column_names())
        .map_err(|err| CoreError::Dataset(format!("writing {}: {}", path.display(), err)))?;
    for row in 0..table.len() {
        let record: Vec<String> = table
            .column_names()
            .iter()
            .map(|name| match table.column(name) {
                Some(Column::Numerical(values)) => format!("{}", values[row]),
                Some(Column::Categorical(values)) => values[row].clone(),
                None => String::new(),
            })
            .collect();
        writer
            .write_record(&record)
            .map_err(|err| CoreError::Dataset(format!("writing {}: {}", path.display(), err)))?;
    }
    writer
        .flush()
        .map_err(|err| CoreError::Dataset(format!("writing {}: {}", path.display(), err)))?;
    Ok(())
}

/// Background image convention: `<path>/<file stem>/<position>.jpg`.
pub fn image_path(descriptor: &FileDescriptor, position: usize) -> PathBuf {
    Path::new(&descriptor.path)
        .join(descriptor.stem())
        .join(format!("{}.jpg", position))
}

/// Reads a frame's background image as a JPEG data URI. A missing or
/// unreadable file is non-fatal; the figure simply omits the image layer.
pub fn load_image(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => Some(format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes))),
        Err(err) => {
            log::debug!("background image {} unavailable: {}", path.display(), err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const SAMPLE_CSV: &str = "Frame,Speed,LookName\n0,-3.5,MRLL\n0,12,LRLL\n1,8.25,MRLL\n";

    fn write_sample(dir: &Path) -> FileDescriptor {
        let mut file = fs::File::create(dir.join("run1.csv")).unwrap();
        file.write_all(SAMPLE_CSV.as_bytes()).unwrap();
        FileDescriptor::new(dir.to_string_lossy(), "run1.csv")
    }

    #[test]
    fn csv_parse_sniffs_column_types() {
        let dir = tempdir().unwrap();
        let descriptor = write_sample(dir.path());
        let table = load(&descriptor).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.numeric("Speed").unwrap(), &[-3.5, 12.0, 8.25]);
        assert_eq!(table.categorical("LookName").unwrap().len(), 3);
    }

    #[test]
    fn load_materializes_and_reuses_columnar_cache() {
        let dir = tempdir().unwrap();
        let descriptor = write_sample(dir.path());
        let first = load(&descriptor).unwrap();
        assert!(descriptor.cache_path().exists());

        // remove the source; the cache alone must now serve the load
        fs::remove_file(descriptor.source_path()).unwrap();
        let second = load(&descriptor).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn load_many_concatenates_files() {
        let dir = tempdir().unwrap();
        let descriptor = write_sample(dir.path());
        let combined = load_many(&[descriptor.clone(), descriptor]).unwrap();
        assert_eq!(combined.len(), 6);
        assert_eq!(combined.row_ids()[5], 5);
    }

    #[test]
    fn missing_source_is_a_dataset_error() {
        let dir = tempdir().unwrap();
        let descriptor = FileDescriptor::new(dir.path().to_string_lossy(), "ghost.csv");
        assert!(load(&descriptor).is_err());
    }

    #[test]
    fn image_path_follows_convention() {
        let descriptor = FileDescriptor::new("/data/case1", "run1.csv");
        assert_eq!(
            image_path(&descriptor, 7),
            PathBuf::from("/data/case1/run1/7.jpg")
        );
    }

    #[test]
    fn missing_image_is_non_fatal() {
        assert!(load_image(Path::new("/nonexistent/0.jpg")).is_none());
    }

    #[test]
    fn image_loads_as_data_uri() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.jpg");
        fs::write(&path, b"jpegbytes").unwrap();
        let uri = load_image(&path).unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn csv_export_round_trips() {
        let dir = tempdir().unwrap();
        let descriptor = write_sample(dir.path());
        let table = load(&descriptor).unwrap();

        let out = dir.path().join("export.csv");
        write_csv(&table, &out).unwrap();
        let exported = FileDescriptor::new(dir.path().to_string_lossy(), "export.csv");
        assert_eq!(load(&exported).unwrap(), table);
    }
}
