//! Run output persistence

use std::path::PathBuf;

use crate::model::StructuredDocument;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum OutputError {
    #[error("Failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Writes each run's structured document under a results directory
#[derive(Debug, Clone)]
pub struct ResultsWriter {
    results_dir: PathBuf,
}

impl ResultsWriter {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    /// `<results_dir>/<run_name>_structured_output.json`
    pub fn output_path(&self, run_name: &str) -> PathBuf {
        self.results_dir
            .join(format!("{}_structured_output.json", sanitize(run_name)))
    }

    pub async fn write(
        &self,
        run_name: &str,
        document: &StructuredDocument,
    ) -> Result<PathBuf, OutputError> {
        let path = self.output_path(run_name);
        let json = serde_json::to_string_pretty(document)?;

        tokio::fs::create_dir_all(&self.results_dir)
            .await
            .map_err(|source| OutputError::Io {
                path: self.results_dir.display().to_string(),
                source,
            })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| OutputError::Io {
                path: path.display().to_string(),
                source,
            })?;

        tracing::info!(
            run = %run_name,
            path = %path.display(),
            version = %document.version(),
            title = %document.body().title,
            topics = document.topics().len(),
            "Structured output written"
        );
        Ok(path)
    }
}

/// Keep run names from escaping the results directory
fn sanitize(run_name: &str) -> String {
    let cleaned: String = run_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "run".to_string()
    } else {
        cleaned.to_string()
    }
}
