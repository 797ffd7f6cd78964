//! Sift Core - Sensitive-data detection and shared domain types
//!
//! This crate holds the pure parts of the scanner:
//! - The pattern detector (regex family, Luhn validation, masking, context)
//! - The wire and state types shared by the lister, worker, and API

pub mod detector;
pub mod types;

pub use detector::{Detector, DetectorKind, Match, DEFAULT_CONTEXT_CHARS, DEFAULT_MAX_PER_KIND};
pub use types::{ListBatchOutput, ListBatchState, ListedObject, ObjectStatus, ScanEnvelope};
