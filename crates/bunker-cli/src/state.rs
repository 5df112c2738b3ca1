//! Persistence of the authorized client identity between runs.
//!
//! The file holds one hex public key. A missing or unreadable file simply
//! means nobody is authorized yet.

use anyhow::{Context, Result};
use bunker_core::Identity;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub fn load(path: &Path) -> Option<Identity> {
    let content = std::fs::read_to_string(path).ok()?;
    let identity = Identity::new(content.trim());
    if identity.is_hex_key() {
        Some(identity)
    } else {
        warn!(path = %path.display(), "ignoring malformed authorization state");
        None
    }
}

pub fn save(path: &Path, identity: &Identity) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, format!("{identity}\n"))
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Write every new authorization to `path` until the sender goes away.
pub fn persist(mut authorizations: watch::Receiver<Option<Identity>>, path: PathBuf) -> JoinHandle<()> {
    tokio::spawn(async move {
        while authorizations.changed().await.is_ok() {
            let current = authorizations.borrow_and_update().clone();
            let Some(identity) = current else { continue };
            match save(&path, &identity) {
                Ok(()) => info!(caller = %identity, path = %path.display(), "authorization saved"),
                Err(e) => warn!(error = %e, "failed to save authorization"),
            }
        }
    })
}
