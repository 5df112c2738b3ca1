//! Configuration: `~/.bunker/config.toml` plus CLI overrides.
//!
//! ```toml
//! [signer]
//! key_file = "~/.bunker/signer.key"
//!
//! [bunker]
//! relays = ["wss://relay.example"]
//! secret = "s3cr3t"            # or secret_file = "~/.bunker/secret"
//! policy = "rebind"            # or "exclusive"
//! suite = "nip44"              # outbound suite, or "nip04"
//! state_file = "~/.bunker/authorized"
//! ```

use anyhow::{Context, Result};
use bunker_core::{CipherSuite, ConnectPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub signer: SignerSection,
    #[serde(default)]
    pub bunker: BunkerSection,
}

/// `[signer]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignerSection {
    #[serde(default = "default_key_file")]
    pub key_file: String,
}

impl Default for SignerSection {
    fn default() -> Self {
        Self {
            key_file: default_key_file(),
        }
    }
}

/// `[bunker]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BunkerSection {
    #[serde(default)]
    pub relays: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub secret_file: Option<String>,
    #[serde(default)]
    pub policy: ConnectPolicy,
    /// Forces one suite on every response; unset mirrors each request.
    #[serde(default)]
    pub suite: Option<CipherSuite>,
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

impl Default for BunkerSection {
    fn default() -> Self {
        Self {
            relays: Vec::new(),
            secret: None,
            secret_file: None,
            policy: ConnectPolicy::default(),
            suite: None,
            state_file: default_state_file(),
        }
    }
}

fn default_key_file() -> String {
    "~/.bunker/signer.key".to_string()
}
fn default_state_file() -> String {
    "~/.bunker/authorized".to_string()
}

/// Where the connect secret comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    Inline(String),
    /// Re-read at every connect attempt.
    File(PathBuf),
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub key_file: Option<String>,
    pub relays: Vec<String>,
    pub secret: Option<String>,
    pub secret_file: Option<String>,
    pub exclusive: bool,
    pub suite: Option<CipherSuite>,
    pub state_file: Option<String>,
}

/// Resolved configuration (paths expanded, overrides applied).
#[derive(Debug, Clone)]
pub struct BunkerConfig {
    pub key_file: PathBuf,
    pub relays: Vec<String>,
    pub secret: Option<SecretSource>,
    pub policy: ConnectPolicy,
    pub suite: Option<CipherSuite>,
    pub state_file: PathBuf,
}

impl BunkerConfig {
    /// Load the file at `path` (missing file means defaults), then apply
    /// `overrides`.
    pub fn load(path: &Path, overrides: Overrides) -> Result<Self> {
        let file = ConfigFile::load(path)?;
        Ok(Self::resolve(file, overrides))
    }

    pub fn resolve(file: ConfigFile, overrides: Overrides) -> Self {
        let relays = if overrides.relays.is_empty() {
            file.bunker.relays
        } else {
            overrides.relays
        };

        // A secret given on the command line beats any secret in the file.
        let secret = match (overrides.secret, overrides.secret_file) {
            (Some(secret), _) => Some(SecretSource::Inline(secret)),
            (None, Some(path)) => Some(SecretSource::File(expand_tilde(&path))),
            (None, None) => match (file.bunker.secret, file.bunker.secret_file) {
                (Some(secret), _) => Some(SecretSource::Inline(secret)),
                (None, Some(path)) => Some(SecretSource::File(expand_tilde(&path))),
                (None, None) => None,
            },
        };

        let policy = if overrides.exclusive {
            ConnectPolicy::Exclusive
        } else {
            file.bunker.policy
        };

        Self {
            key_file: expand_tilde(overrides.key_file.as_deref().unwrap_or(&file.signer.key_file)),
            relays,
            secret,
            policy,
            suite: overrides.suite.or(file.bunker.suite),
            state_file: expand_tilde(
                overrides
                    .state_file
                    .as_deref()
                    .unwrap_or(&file.bunker.state_file),
            ),
        }
    }
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> ConfigFile {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = BunkerConfig::resolve(parse(""), Overrides::default());
        assert!(config.relays.is_empty());
        assert_eq!(config.secret, None);
        assert_eq!(config.policy, ConnectPolicy::Rebind);
        assert_eq!(config.suite, None);
        assert!(config.key_file.ends_with(".bunker/signer.key"));
        assert!(config.state_file.ends_with(".bunker/authorized"));
    }

    #[test]
    fn full_file_is_read() {
        let file = parse(
            r#"
            [signer]
            key_file = "/etc/bunker/key"

            [bunker]
            relays = ["wss://a.example", "wss://b.example"]
            secret_file = "/etc/bunker/secret"
            policy = "exclusive"
            suite = "nip04"
            state_file = "/var/lib/bunker/authorized"
            "#,
        );
        let config = BunkerConfig::resolve(file, Overrides::default());
        assert_eq!(config.key_file, PathBuf::from("/etc/bunker/key"));
        assert_eq!(config.relays.len(), 2);
        assert_eq!(
            config.secret,
            Some(SecretSource::File(PathBuf::from("/etc/bunker/secret")))
        );
        assert_eq!(config.policy, ConnectPolicy::Exclusive);
        assert_eq!(config.suite, Some(CipherSuite::Nip04));
        assert_eq!(config.state_file, PathBuf::from("/var/lib/bunker/authorized"));
    }

    #[test]
    fn cli_overrides_win() {
        let file = parse(
            r#"
            [bunker]
            relays = ["wss://file.example"]
            secret = "from-file"
            "#,
        );
        let overrides = Overrides {
            relays: vec!["wss://cli.example".into()],
            secret: Some("from-cli".into()),
            exclusive: true,
            suite: Some(CipherSuite::Nip04),
            key_file: Some("/tmp/k".into()),
            ..Default::default()
        };
        let config = BunkerConfig::resolve(file, overrides);
        assert_eq!(config.relays, vec!["wss://cli.example".to_string()]);
        assert_eq!(config.secret, Some(SecretSource::Inline("from-cli".into())));
        assert_eq!(config.policy, ConnectPolicy::Exclusive);
        assert_eq!(config.suite, Some(CipherSuite::Nip04));
        assert_eq!(config.key_file, PathBuf::from("/tmp/k"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<ConfigFile>("[bunker]\nrelay = \"x\"").is_err());
        assert!(toml::from_str::<ConfigFile>("[bunker]\npolicy = \"sometimes\"").is_err());
    }

    #[test]
    fn missing_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BunkerConfig::load(&dir.path().join("none.toml"), Overrides::default()).unwrap();
        assert!(config.relays.is_empty());
    }

    #[test]
    fn tilde_expansion() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/x"), home.join("x"));
        }
    }
}
