//! Directory of uploaded extractor output as a live source

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rayon::prelude::*;
use serde_json::Value;

use super::LiveSource;
use crate::services::normalizer::normalize_record;
use crate::types::{EsgError, Result};

pub const FILE_SOURCE_NAME: &str = "files";

/// Metrics payload file inside the input directory
pub const METRICS_FILE: &str = "metrics.json";

/// Reads `*.json` invoice files from a directory (or one file)
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Invoice files, excluding the metrics payload
    pub fn collect_files(&self) -> Vec<PathBuf> {
        if self.root.is_file() {
            return vec![self.root.clone()];
        }

        let pattern = self.root.join("*.json");
        glob::glob(&pattern.to_string_lossy())
            .map(|paths| {
                paths
                    .filter_map(|e| e.ok())
                    .filter(|p| p.file_name().map_or(true, |name| name != METRICS_FILE))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parse one file into raw invoice objects.
    ///
    /// A file holds a single invoice object, an array of them, or an
    /// `invoices`/`items` envelope.
    pub fn parse_file(path: &Path) -> Result<Vec<Value>> {
        let value = read_json(path)?;
        match value {
            Value::Array(items) => Ok(items),
            Value::Object(mut map) => {
                for key in ["invoices", "items"] {
                    if let Some(Value::Array(items)) = map.remove(key) {
                        return Ok(items);
                    }
                }
                Ok(vec![Value::Object(map)])
            }
            _ => Err(EsgError::Shape(format!("{:?} holds no invoice object", path))),
        }
    }

    /// Parse all files in parallel, then upsert by invoice identity.
    ///
    /// A later file replaces an earlier invoice with the same key while
    /// keeping its position.
    pub fn load_invoices(&self) -> Result<Value> {
        if !self.root.exists() {
            return Err(EsgError::Transport(format!(
                "input path {:?} does not exist",
                self.root
            )));
        }

        let files = self.collect_files();
        let parsed: Vec<Value> = files
            .par_iter()
            .flat_map(|f| match Self::parse_file(f) {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(file = ?f, error = %e, "skipping unreadable invoice file");
                    Vec::new()
                }
            })
            .collect();

        let mut position: HashMap<String, usize> = HashMap::new();
        let mut upserted: Vec<Value> = Vec::with_capacity(parsed.len());
        for raw in parsed {
            if !raw.is_object() {
                // Left in place so payload validation reports the shape error
                upserted.push(raw);
                continue;
            }
            let key = normalize_record(&raw).dedup_key();
            match position.get(&key) {
                Some(&index) => upserted[index] = raw,
                None => {
                    position.insert(key, upserted.len());
                    upserted.push(raw);
                }
            }
        }

        tracing::debug!(files = files.len(), invoices = upserted.len(), "loaded invoice files");
        Ok(Value::Array(upserted))
    }

    pub fn load_metrics(&self) -> Result<Value> {
        let path = if self.root.is_dir() {
            self.root.join(METRICS_FILE)
        } else {
            self.root.with_file_name(METRICS_FILE)
        };
        if !path.exists() {
            return Err(EsgError::Transport(format!("no metrics file at {:?}", path)));
        }
        read_json(&path)
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let mut bytes = fs::read(path)?;
    simd_json::serde::from_slice(&mut bytes)
        .map_err(|e| EsgError::Shape(format!("{:?} is not valid JSON: {}", path, e)))
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| EsgError::Transport(format!("file source task failed: {}", e)))?
}

#[async_trait]
impl LiveSource for FileSource {
    fn name(&self) -> &str {
        FILE_SOURCE_NAME
    }

    async fn fetch_metrics(&self) -> Result<Value> {
        let source = self.clone();
        blocking(move || source.load_metrics()).await
    }

    async fn fetch_invoices(&self) -> Result<Value> {
        let source = self.clone();
        blocking(move || source.load_invoices()).await
    }

    async fn fetch_derived_insights(&self, _payload: &Value) -> Result<Value> {
        Err(EsgError::Transport(
            "file source cannot derive insights".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, value: &Value) {
        fs::write(dir.join(name), serde_json::to_string(value).unwrap()).unwrap();
    }

    #[test]
    fn test_collect_files_skips_metrics() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.json", &json!({}));
        write(temp.path(), "b.json", &json!({}));
        write(temp.path(), METRICS_FILE, &json!({}));
        fs::write(temp.path().join("notes.txt"), "x").unwrap();

        let files = FileSource::new(temp.path()).collect_files();

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == "json"));
    }

    #[test]
    fn test_parse_file_shapes() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "one.json", &json!({"company_name": "A"}));
        write(temp.path(), "many.json", &json!([{"company_name": "A"}, {"company_name": "B"}]));
        write(temp.path(), "wrapped.json", &json!({"invoices": [{}, {}, {}]}));
        write(temp.path(), "bad.json", &json!(42));

        assert_eq!(FileSource::parse_file(&temp.path().join("one.json")).unwrap().len(), 1);
        assert_eq!(FileSource::parse_file(&temp.path().join("many.json")).unwrap().len(), 2);
        assert_eq!(FileSource::parse_file(&temp.path().join("wrapped.json")).unwrap().len(), 3);
        assert!(matches!(
            FileSource::parse_file(&temp.path().join("bad.json")),
            Err(EsgError::Shape(_))
        ));
    }

    #[test]
    fn test_load_invoices_upserts_by_tax_invoice_number() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "01.json",
            &json!({"tax_invoice_number": "TI-1", "invoice_date": "2026-03-01", "total_energy_kwh": 1}),
        );
        write(
            temp.path(),
            "02.json",
            &json!({"tax_invoice_number": "TI-2", "invoice_date": "2026-03-01"}),
        );
        write(
            temp.path(),
            "03.json",
            &json!({"tax_invoice_number": "TI-1", "invoice_date": "2026-03-01", "total_energy_kwh": 2}),
        );

        let loaded = FileSource::new(temp.path()).load_invoices().unwrap();
        let items = loaded.as_array().unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["total_energy_kwh"], json!(2));
        assert_eq!(items[1]["tax_invoice_number"], json!("TI-2"));
    }

    #[test]
    fn test_load_invoices_skips_unreadable_file() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "good.json", &json!({"company_name": "A"}));
        fs::write(temp.path().join("broken.json"), "{ nope").unwrap();

        let loaded = FileSource::new(temp.path()).load_invoices().unwrap();

        assert_eq!(loaded.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_root_is_transport_error() {
        let source = FileSource::new("/definitely/not/here");
        assert!(matches!(source.load_invoices(), Err(EsgError::Transport(_))));
        assert!(matches!(source.load_metrics(), Err(EsgError::Transport(_))));
    }

    #[tokio::test]
    async fn test_fetch_metrics_reads_metrics_file() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), METRICS_FILE, &json!({"metrics": {"wasteGenerated": 9}}));

        let value = FileSource::new(temp.path()).fetch_metrics().await.unwrap();

        assert_eq!(value["metrics"]["wasteGenerated"], json!(9));
    }

    #[tokio::test]
    async fn test_fetch_derived_insights_unsupported() {
        let source = FileSource::new(".");
        assert!(matches!(
            source.fetch_derived_insights(&json!({})).await,
            Err(EsgError::Transport(_))
        ));
    }
}
