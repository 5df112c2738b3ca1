//! Secret key file storage.
//!
//! The file holds the 32-byte secret key as 64 hex characters and a
//! trailing newline. It is written with mode 0600 inside a 0700 directory.

use crate::keys::Keys;
use bunker_core::{BunkerError, BunkerResult};
use std::fs;
use std::io::Write;
use std::path::Path;
use zeroize::Zeroizing;

/// Load the key stored at `path`.
pub fn load(path: &Path) -> BunkerResult<Keys> {
    if !path.exists() {
        return Err(BunkerError::Config(format!(
            "no key file at {} (run `bunker keygen`)",
            path.display()
        )));
    }
    let contents = Zeroizing::new(fs::read_to_string(path)?);
    Keys::from_hex(contents.trim())
}

/// Generate a key and store it at `path`.
///
/// An existing file is only replaced when `force` is set.
pub fn generate(path: &Path, force: bool) -> BunkerResult<Keys> {
    if path.exists() && !force {
        return Err(BunkerError::Config(format!(
            "key file {} already exists",
            path.display()
        )));
    }
    let keys = Keys::generate();
    save(path, &keys)?;
    Ok(keys)
}

/// Write `keys` to `path`, creating parent directories.
pub fn save(path: &Path, keys: &Keys) -> BunkerResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
            }
        }
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    let secret = keys.secret_hex();
    file.write_all(secret.as_bytes())?;
    file.write_all(b"\n")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
