//! Connect secrets: where they come from and how fresh ones are made.

use crate::config::SecretSource;
use bunker_core::SecretProvider;
use rand::RngCore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// A secret read from disk at every connect, so it can be rotated by
/// rewriting the file.
#[derive(Debug, Clone)]
pub struct FileSecret {
    path: PathBuf,
}

impl FileSecret {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SecretProvider for FileSecret {
    fn secret(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Some(content.trim().to_string()).filter(|s| !s.is_empty()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read connect secret");
                None
            }
        }
    }
}

/// A random 32-character hex secret.
pub fn generate() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Build the provider for a configured source.
pub fn provider(source: &SecretSource) -> Arc<dyn SecretProvider> {
    match source {
        SecretSource::Inline(secret) => Arc::new(secret.clone()),
        SecretSource::File(path) => Arc::new(FileSecret::new(path.clone())),
    }
}

/// The secret's current value, for display in a connection URL.
pub fn current(source: &SecretSource) -> Option<String> {
    provider(source).secret()
}
