use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{PgPool, Row};

use crate::models::product::Product;
use crate::models::validation::DimensionMismatch;

/// Product catalog access needed by the pipeline: embedding reads/writes,
/// missing-embedding selection, and coverage aggregation. Abstracted so the
/// processor and validator can run against an in-memory store in tests.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get_product(&self, id: &str) -> Result<Option<Product>, sqlx::Error>;
    async fn get_products(&self, ids: &[String]) -> Result<Vec<Product>, sqlx::Error>;
    async fn products_missing_embeddings(&self, limit: i64) -> Result<Vec<Product>, sqlx::Error>;
    async fn store_embedding(&self, id: &str, embedding: &[f32]) -> Result<(), sqlx::Error>;
    async fn fetch_embedding(&self, id: &str) -> Result<Option<Vec<f32>>, sqlx::Error>;
    /// (total rows scanned, rows with an embedding), scan capped at `limit`.
    async fn embedding_coverage(&self, limit: i64) -> Result<(u64, u64), sqlx::Error>;
    async fn dimension_mismatches(
        &self,
        expected: i32,
        limit: i64,
    ) -> Result<Vec<DimensionMismatch>, sqlx::Error>;
    async fn ids_with_embeddings(&self, limit: i64) -> Result<Vec<String>, sqlx::Error>;
}

/// PostgreSQL implementation over the `products` table (pgvector column).
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_product(row: sqlx::postgres::PgRow) -> Result<Product, sqlx::Error> {
        Ok(Product {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            category: row.try_get("category")?,
        })
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn get_product(&self, id: &str) -> Result<Option<Product>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, title, description, category
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn get_products(&self, ids: &[String]) -> Result<Vec<Product>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, description, category
            FROM products
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn products_missing_embeddings(&self, limit: i64) -> Result<Vec<Product>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, description, category
            FROM products
            WHERE embedding IS NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn store_embedding(&self, id: &str, embedding: &[f32]) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE products
            SET embedding = $2,
                embedding_updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Vector::from(embedding.to_vec()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_embedding(&self, id: &str) -> Result<Option<Vec<f32>>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT embedding
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .and_then(|r| r.try_get::<Option<Vector>, _>("embedding").ok().flatten())
            .map(|v| v.to_vec()))
    }

    async fn embedding_coverage(&self, limit: i64) -> Result<(u64, u64), sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total, COUNT(embedding) AS with_embedding
            FROM (SELECT embedding FROM products LIMIT $1) scan
            "#,
        )
        .bind(limit)
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.try_get("total")?;
        let with_embedding: i64 = row.try_get("with_embedding")?;
        Ok((total.max(0) as u64, with_embedding.max(0) as u64))
    }

    async fn dimension_mismatches(
        &self,
        expected: i32,
        limit: i64,
    ) -> Result<Vec<DimensionMismatch>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, vector_dims(embedding) AS dims
            FROM products
            WHERE embedding IS NOT NULL
              AND vector_dims(embedding) <> $1
            LIMIT $2
            "#,
        )
        .bind(expected)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let dims: i32 = r.try_get("dims")?;
                Ok(DimensionMismatch {
                    product_id: r.try_get("id")?,
                    dimensions: dims.max(0) as usize,
                    expected_dimensions: expected.max(0) as usize,
                })
            })
            .collect()
    }

    async fn ids_with_embeddings(&self, limit: i64) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id
            FROM products
            WHERE embedding IS NOT NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_get("id")).collect()
    }
}
