pub mod error;
pub mod models;
pub mod config;
pub mod dataset;
pub mod preprocessing;
pub mod sift;
pub mod features;
pub mod cache;
pub mod ann;
pub mod vote;
pub mod knn;
pub mod classifier;
pub mod evaluation;
