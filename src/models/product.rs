use serde::{Deserialize, Serialize};

/// Catalog product fields relevant to embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
}

impl Product {
    /// Text fed to the embedding model. Regenerated from current fields on
    /// every update, so stale cached vectors never leak through.
    pub fn embedding_text(&self) -> String {
        match &self.category {
            Some(category) => format!("{}\n{}\n{}", self.title, category, self.description),
            None => format!("{}\n{}", self.title, self.description),
        }
    }
}
