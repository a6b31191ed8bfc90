use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for job queue and durable cache
    pub redis_url: String,

    /// Embedding API key (OpenAI-compatible endpoint)
    pub embedding_api_key: String,

    /// Embedding API base URL
    #[serde(default = "default_embedding_api_base")]
    pub embedding_api_base: String,

    /// Embedding model identifier
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Price in USD per one million tokens
    #[serde(default = "default_price_per_million_tokens")]
    pub price_per_million_tokens: f64,

    /// Average tokens consumed per product, used for pre-enqueue estimates
    #[serde(default = "default_avg_tokens_per_product")]
    pub avg_tokens_per_product: u64,

    /// Daily spending ceiling in USD
    #[serde(default = "default_daily_budget")]
    pub daily_budget: f64,

    /// Monthly spending ceiling in USD
    #[serde(default = "default_monthly_budget")]
    pub monthly_budget: f64,

    /// Number of concurrent dequeue loops in the worker process. Kept low
    /// to respect the embedding API's rate limits.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_embedding_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_price_per_million_tokens() -> f64 {
    0.02
}

fn default_avg_tokens_per_product() -> u64 {
    120
}

fn default_daily_budget() -> f64 {
    1.0
}

fn default_monthly_budget() -> f64 {
    20.0
}

fn default_worker_concurrency() -> usize {
    5
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
