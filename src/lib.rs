//! treevault - hierarchical path-addressed attachment store
//!
//! Nodes form a single-rooted tree addressed by normalized slash paths. Each
//! node carries scoped string properties and binary files with SHA-256
//! integrity metadata and optional per-file encryption. The whole tree can be
//! backed up to, and restored from, a portable optionally-encrypted archive.
//!
//! # Design Principles
//!
//! - Checksums are always computed over plaintext, never ciphertext
//! - Size limits are enforced before any persistence I/O
//! - Data absence and credential failures are sentinel outcomes, not errors
//! - Bulk operations (backup, restore, integrity check) aggregate and continue
//! - Deterministic traversal ordering

pub mod archive;
pub mod backup;
pub mod config;
pub mod integrity;
pub mod repo;
pub mod store;
