//! Integration tests for TKR resolution
//!
//! Tests tell the story of how clusters are resolved against a catalog that
//! keeps changing underneath them.
//!
//! # Test Organization
//!
//! - `fixtures`: Builders for TKRs, OSImages, clusters and ClusterClasses
//!
//! - `scenarios`: Stories about first resolution: stable channel picks,
//!   explicit pre-release requests, missing images, and already-resolved
//!   clusters
//!
//! - `properties`: Stories about the guarantees that hold across calls:
//!   ordering, idempotence, stability under catalog growth, determinism, and
//!   concurrent catalog updates

mod fixtures;
mod properties;
mod scenarios;
