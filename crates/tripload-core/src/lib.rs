pub mod config;
pub mod error;
pub mod logging;

// Pipeline stages, leaves first.
pub mod batch;
pub mod dataset;
pub mod http;
pub mod loader;
pub mod locator;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod retrieval;
pub mod retry;
pub mod staging;
pub mod store;
pub mod warehouse;
