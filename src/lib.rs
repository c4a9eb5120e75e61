//! S3 REST API - JSON REST facade over S3-compatible object storage
//!
//! Exposes bucket and object management as plain JSON/multipart HTTP
//! endpoints and translates each call into requests against AWS S3, an
//! S3-compatible endpoint, or an in-process store.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod routes;
pub mod s3;
pub mod server;
pub mod storage;
