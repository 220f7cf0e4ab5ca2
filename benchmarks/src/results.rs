//! JSON envelope shared by every scenario's output.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct BenchResult<T: Serialize> {
    pub timestamp: String,
    pub target: String,
    pub scenario: String,
    pub results: T,
}

impl<T: Serialize> BenchResult<T> {
    pub fn new(target: &str, scenario: &str, results: T) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            target: target.to_string(),
            scenario: scenario.to_string(),
            results,
        }
    }

    /// Pretty JSON to `path`, or to stdout when there is none.
    pub fn emit(&self, path: Option<&str>) -> anyhow::Result<()> {
        let output = serde_json::to_string_pretty(self)?;
        if let Some(path) = path {
            std::fs::write(path, &output)?;
            eprintln!("Results written to {path}");
        } else {
            println!("{output}");
        }
        Ok(())
    }
}
