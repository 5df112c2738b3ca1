//! `bunker serve`: run the responder until interrupted.
//!
//! Connects to the configured relays and serves requests. When every relay
//! connection drops, the pool is rebuilt after a backoff; the authorized
//! client carries over. A request the signer cannot serve (undecryptable
//! ciphertext, a suite it lacks) restarts the responder right away instead
//! of stopping the daemon. Shutdown waits for the request in flight.

use crate::config::BunkerConfig;
use crate::{secret, state, uri};
use anyhow::{bail, Context, Result};
use bunker_core::{BunkerError, BunkerResult, Identity, Responder, ResponderOptions, SecretProvider};
use bunker_relay::RelayPool;
use bunker_signer::{keystore, Keys, LocalSigner};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub async fn run(config: &BunkerConfig, shutdown: impl Future<Output = ()>) -> Result<()> {
    if config.relays.is_empty() {
        bail!("no relays configured; pass --relay or set [bunker] relays");
    }
    let keys = load_keys(config)?;
    let identity = keys.identity();

    let secret: Arc<dyn SecretProvider> = match &config.secret {
        Some(source) => secret::provider(source),
        None => {
            let generated = secret::generate();
            warn!("no connect secret configured; using a one-off secret for this run");
            Arc::new(generated)
        }
    };
    let current = secret.secret();
    if current.is_none() {
        warn!("connect secret is empty or unreadable; every connect will be rejected");
    }
    let url = uri::bunker_url(&identity, &config.relays, current.as_deref())?;
    println!("{url}");

    let mut authorized = state::load(&config.state_file);
    if let Some(client) = &authorized {
        info!(caller = %client, "resuming authorization");
    }

    info!(
        identity = %identity,
        relays = config.relays.len(),
        policy = ?config.policy,
        forced_suite = ?config.suite,
        "starting bunker"
    );

    tokio::pin!(shutdown);
    let mut backoff = INITIAL_BACKOFF;
    let mut keys = Some(keys);

    loop {
        let pool = tokio::select! {
            pool = RelayPool::connect(&config.relays) => pool,
            _ = &mut shutdown => {
                info!("received shutdown signal");
                return Ok(());
            }
        };

        match pool {
            Ok(pool) => {
                backoff = INITIAL_BACKOFF;
                info!(relays = ?pool.urls(), "serving");
                let keys = match keys.take() {
                    Some(keys) => keys,
                    None => load_keys(config)?,
                };
                let signer = LocalSigner::new(keys).with_relays(config.relays.clone());
                let options = ResponderOptions {
                    secret: secret.clone(),
                    authorized: authorized.clone(),
                    policy: config.policy,
                    suite: config.suite,
                };

                let (outcome, stopped, last) =
                    serve_once(signer, pool, options, config, &mut shutdown).await;
                authorized = last;
                match outcome {
                    Ok(()) if stopped => return Ok(()),
                    Ok(()) => warn!("lost all relay connections"),
                    Err(e) => match recovery(&e) {
                        Recovery::Reconnect => warn!(error = %e, "relay transport failed"),
                        Recovery::Restart if stopped => return Ok(()),
                        Recovery::Restart => {
                            warn!(error = %e, "request failed; restarting responder");
                            continue;
                        }
                        Recovery::Fatal => return Err(e).context("responder stopped with an error"),
                    },
                }
            }
            Err(e) => warn!(error = %e, "cannot reach any relay"),
        }

        info!(delay_secs = backoff.as_secs(), "reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = &mut shutdown => {
                info!("received shutdown signal");
                return Ok(());
            }
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// What the serve loop does after the responder fails.
#[derive(Debug, PartialEq, Eq)]
enum Recovery {
    /// Back off, then rebuild the relay pool.
    Reconnect,
    /// Start a fresh responder immediately.
    Restart,
    /// Give up.
    Fatal,
}

fn recovery(error: &BunkerError) -> Recovery {
    match error {
        BunkerError::Transport(_) => Recovery::Reconnect,
        BunkerError::Signer(_)
        | BunkerError::UnsupportedSuite(_)
        | BunkerError::InvalidRequest(_)
        | BunkerError::Codec(_)
        | BunkerError::Json(_) => Recovery::Restart,
        BunkerError::Config(_) | BunkerError::Io(_) | BunkerError::Other(_) => Recovery::Fatal,
    }
}

fn load_keys(config: &BunkerConfig) -> Result<Keys> {
    keystore::load(&config.key_file)
        .with_context(|| format!("failed to load signing key from {}", config.key_file.display()))
}

/// Run one responder over one pool. Returns the run's outcome, whether a
/// shutdown was requested, and the authorization at the end.
async fn serve_once<F>(
    signer: LocalSigner,
    pool: RelayPool,
    options: ResponderOptions,
    config: &BunkerConfig,
    shutdown: &mut std::pin::Pin<&mut F>,
) -> (BunkerResult<()>, bool, Option<Identity>)
where
    F: Future<Output = ()>,
{
    let mut responder = Responder::new(signer, pool, options);
    let persistence = state::persist(responder.authorizations(), config.state_file.clone());
    let handle = responder.close_handle();

    let (outcome, stopped) = {
        let run = responder.run();
        tokio::pin!(run);
        tokio::select! {
            outcome = &mut run => (outcome, false),
            _ = shutdown.as_mut() => {
                info!("received shutdown signal; finishing current request");
                handle.close();
                (run.await, true)
            }
        }
    };

    let last = responder.authorized();
    responder.transport().close().await;
    drop(responder);
    let _ = persistence.await;
    (outcome, stopped, last)
}
