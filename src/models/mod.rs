pub mod cost;
pub mod job;
pub mod metrics;
pub mod product;
pub mod validation;
