use std::sync::Arc;

use crate::db::products::ProductStore;
use crate::models::job::MAX_VALIDATE_SCAN;
use crate::models::validation::{
    CoverageReport, DimensionMismatch, ValidationResult, EXPECTED_DIMENSIONS,
};

/// Tolerance for the self-similarity sanity check: cosine(v, v) must be
/// within this epsilon of 1.0.
const SELF_SIMILARITY_EPSILON: f64 = 0.0001;

/// Structural validation of stored embeddings: presence, dimensionality,
/// degenerate zero vectors, NaN components, and a self-similarity sanity
/// check. Mismatches are findings, not errors.
pub struct ValidationService {
    store: Arc<dyn ProductStore>,
}

impl ValidationService {
    pub fn new(store: Arc<dyn ProductStore>) -> Self {
        Self { store }
    }

    /// Inspect one vector (or its absence). Pure; the async wrappers below
    /// fetch from the store.
    pub fn inspect(product_id: &str, embedding: Option<&[f32]>) -> ValidationResult {
        let Some(vector) = embedding else {
            return ValidationResult {
                product_id: product_id.to_string(),
                is_valid: false,
                has_embedding: false,
                dimensions: None,
                expected_dimensions: EXPECTED_DIMENSIONS,
                issues: vec!["no embedding stored".to_string()],
            };
        };

        let mut issues = Vec::new();

        if vector.len() != EXPECTED_DIMENSIONS {
            issues.push(format!(
                "dimension mismatch: expected {}, found {}",
                EXPECTED_DIMENSIONS,
                vector.len()
            ));
        }

        if vector.iter().all(|c| *c == 0.0) {
            issues.push("embedding is an all-zero vector".to_string());
        }

        // The storage engine currently guarantees finite components; kept as
        // a safeguard for future storage changes.
        if vector.iter().any(|c| c.is_nan()) {
            issues.push("embedding contains NaN components".to_string());
        }

        if let Some(similarity) = Self::self_similarity(vector) {
            // Written so a NaN similarity also fails the check.
            if !((similarity - 1.0).abs() <= SELF_SIMILARITY_EPSILON) {
                issues.push(format!(
                    "self-similarity {similarity:.6} outside tolerance of 1.0"
                ));
            }
        }

        ValidationResult {
            product_id: product_id.to_string(),
            is_valid: issues.is_empty(),
            has_embedding: true,
            dimensions: Some(vector.len()),
            expected_dimensions: EXPECTED_DIMENSIONS,
            issues,
        }
    }

    /// cosine(v, v); None for zero vectors, where the check is meaningless
    /// (the zero-vector finding already covers them).
    fn self_similarity(vector: &[f32]) -> Option<f64> {
        let dot: f64 = vector.iter().map(|c| *c as f64 * *c as f64).sum();
        if dot == 0.0 {
            return None;
        }
        let norm = dot.sqrt();
        Some(dot / (norm * norm))
    }

    pub async fn validate_product(&self, product_id: &str) -> Result<ValidationResult, sqlx::Error> {
        let embedding = self.store.fetch_embedding(product_id).await?;
        Ok(Self::inspect(product_id, embedding.as_deref()))
    }

    pub async fn validate_products(
        &self,
        product_ids: &[String],
    ) -> Result<Vec<ValidationResult>, sqlx::Error> {
        let mut results = Vec::with_capacity(product_ids.len());
        for id in product_ids {
            results.push(self.validate_product(id).await?);
        }
        Ok(results)
    }

    /// Validate the corpus, bounded to the first `MAX_VALIDATE_SCAN` rows
    /// with embeddings for cost control.
    pub async fn validate_corpus(&self) -> Result<Vec<ValidationResult>, sqlx::Error> {
        let ids = self
            .store
            .ids_with_embeddings(MAX_VALIDATE_SCAN as i64)
            .await?;
        self.validate_products(&ids).await
    }

    /// Percentage of records with an embedding (capped scan).
    pub async fn coverage(&self) -> Result<CoverageReport, sqlx::Error> {
        let (total, with_embedding) = self
            .store
            .embedding_coverage(MAX_VALIDATE_SCAN as i64)
            .await?;
        let coverage_percent = if total == 0 {
            0.0
        } else {
            with_embedding as f64 / total as f64 * 100.0
        };
        Ok(CoverageReport {
            total_products: total,
            with_embedding,
            coverage_percent,
        })
    }

    /// Stored embeddings whose dimension count differs from the expected
    /// constant.
    pub async fn dimension_mismatches(&self) -> Result<Vec<DimensionMismatch>, sqlx::Error> {
        self.store
            .dimension_mismatches(EXPECTED_DIMENSIONS as i32, MAX_VALIDATE_SCAN as i64)
            .await
    }
}
