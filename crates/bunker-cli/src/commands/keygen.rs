//! `bunker keygen`: create the signing key file.

use anyhow::{Context, Result};
use bunker_signer::keystore;
use std::path::Path;
use tracing::info;

pub async fn run(path: &Path, force: bool) -> Result<()> {
    let keys = keystore::generate(path, force)
        .with_context(|| format!("failed to generate key at {}", path.display()))?;

    let identity = keys.identity();
    info!(identity = %identity, path = %path.display(), "key generated");

    println!("{identity}");
    eprintln!("Secret key written to {}", path.display());
    Ok(())
}
