//! Embedding Job Pipeline
//!
//! This library provides the core functionality for the embedding pipeline
//! behind the gift-recommendation storefront: a Redis-backed priority job
//! queue, batched embedding generation with cost tracking and budget
//! enforcement, health monitoring, and structural validation of stored
//! vectors.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
