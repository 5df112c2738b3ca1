//! `bunker url`: print the connection string for clients.

use crate::config::BunkerConfig;
use crate::{secret, uri};
use anyhow::{bail, Context, Result};
use bunker_signer::keystore;

pub async fn run(config: &BunkerConfig) -> Result<()> {
    if config.relays.is_empty() {
        bail!("no relays configured; pass --relay or set [bunker] relays");
    }
    let Some(source) = &config.secret else {
        bail!("no connect secret configured; pass --secret or set [bunker] secret");
    };
    let secret = secret::current(source).context("connect secret is empty or unreadable")?;

    let keys = keystore::load(&config.key_file)
        .context("failed to load signing key")?;

    println!("{}", uri::bunker_url(&keys.identity(), &config.relays, Some(&secret))?);
    Ok(())
}
