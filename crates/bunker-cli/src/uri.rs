//! `bunker://` connection strings handed to clients.
//!
//! `bunker://<pubkey-hex>?relay=<url>&relay=<url>&secret=<secret>`

use anyhow::Result;
use bunker_core::Identity;
use url::Url;

pub fn bunker_url(identity: &Identity, relays: &[String], secret: Option<&str>) -> Result<String> {
    let mut url = Url::parse(&format!("bunker://{identity}"))?;
    {
        let mut query = url.query_pairs_mut();
        for relay in relays {
            query.append_pair("relay", relay);
        }
        if let Some(secret) = secret {
            query.append_pair("secret", secret);
        }
    }
    Ok(url.to_string())
}
