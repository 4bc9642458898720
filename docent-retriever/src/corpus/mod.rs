//! Corpus access: discovery, fingerprints and text loading.

pub mod hasher;
pub mod loader;
pub mod scanner;

pub use hasher::{Fingerprint, FingerprintMode, fingerprint, fingerprint_with};
pub use loader::{DocumentLoader, LoadReport};
pub use scanner::{ROOT_CATEGORY, SourceFile, SourceKind, scan};
