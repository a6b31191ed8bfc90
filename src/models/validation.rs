use serde::{Deserialize, Serialize};

/// Expected embedding dimensionality for the configured model.
pub const EXPECTED_DIMENSIONS: usize = 1536;

/// Result of structurally validating one stored embedding. Computed on
/// demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub product_id: String,
    pub is_valid: bool,
    pub has_embedding: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    pub expected_dimensions: usize,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub issues: Vec<String>,
}

/// Corpus-wide embedding coverage (capped scan).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CoverageReport {
    pub total_products: u64,
    pub with_embedding: u64,
    pub coverage_percent: f64,
}

/// A stored embedding whose dimension count differs from the expected
/// constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionMismatch {
    pub product_id: String,
    pub dimensions: usize,
    pub expected_dimensions: usize,
}
