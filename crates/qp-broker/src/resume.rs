//! On-disk resume-token cache (§3 `ResumeTokenStore`, §5, §8 "resume token
//! safe-fail"). Grounded on the owner-only-permissions pattern this corpus
//! uses for other sensitive local files (restrictive `0600`/`0700` modes
//! set explicitly rather than trusted to the process umask).
//!
//! The store fails *safe-closed*, never safe-open: any permission or size
//! mismatch on the directory or file is treated as "no token", and the
//! offending file is deleted rather than trusted.

use std::fs;
use std::path::{Path, PathBuf};

use qp_arena::fnv1a64;

const TOKEN_LEN: usize = 32;

pub struct ResumeTokenStore {
    dir: PathBuf,
    socket_hash: u64,
    /// Set once at construction; `true` means the directory wasn't (and
    /// couldn't be made) owner-only, so every operation becomes a no-op.
    disabled: bool,
}

impl ResumeTokenStore {
    /// `dir` is the broker's private runtime directory; `socket_path`
    /// identifies which listen socket this cache entry belongs to (a
    /// broker may serve more than one socket per runtime dir over its
    /// lifetime).
    pub fn open(dir: impl Into<PathBuf>, socket_path: &str) -> Self {
        let dir = dir.into();
        let disabled = !ensure_private_dir(&dir);
        if disabled {
            tracing::warn!(dir = %dir.display(), "resume token dir is not owner-only; disabling resume cache");
        }
        Self {
            dir,
            socket_hash: fnv1a64(socket_path.as_bytes()),
            disabled,
        }
    }

    fn token_path(&self) -> PathBuf {
        self.dir.join(format!("resume-{:016x}", self.socket_hash))
    }

    /// `None` on any failure or safety-check mismatch, never an error:
    /// a missing/invalid token is indistinguishable from "never issued".
    pub fn load(&self) -> Option<[u8; TOKEN_LEN]> {
        if self.disabled {
            return None;
        }
        let path = self.token_path();
        let meta = fs::metadata(&path).ok()?;
        if meta.len() != TOKEN_LEN as u64 || !file_mode_is(&meta, 0o600) {
            let _ = fs::remove_file(&path);
            return None;
        }
        let bytes = fs::read(&path).ok()?;
        if bytes.len() != TOKEN_LEN {
            return None;
        }
        let mut token = [0u8; TOKEN_LEN];
        token.copy_from_slice(&bytes);
        Some(token)
    }

    /// Always succeeds from the caller's point of view (§5: "store/delete
    /// are no-ops returning OK" when the store is disabled).
    pub fn store(&self, token: &[u8; TOKEN_LEN]) {
        if self.disabled {
            return;
        }
        let path = self.token_path();
        if fs::write(&path, token).is_err() {
            return;
        }
        set_mode(&path, 0o600);
    }

    pub fn delete(&self) {
        if self.disabled {
            return;
        }
        let _ = fs::remove_file(self.token_path());
    }
}

/// Read the broker's shared handshake secret from its private dir,
/// generating and persisting a fresh one on first run.
pub fn read_or_create_secret(dir: &Path) -> std::io::Result<[u8; TOKEN_LEN]> {
    ensure_private_dir(dir);
    let path = dir.join("secret");
    if let Ok(bytes) = fs::read(&path) {
        if bytes.len() == TOKEN_LEN {
            let mut secret = [0u8; TOKEN_LEN];
            secret.copy_from_slice(&bytes);
            return Ok(secret);
        }
    }
    let mut secret = [0u8; TOKEN_LEN];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut secret);
    fs::write(&path, secret)?;
    set_mode(&path, 0o600);
    Ok(secret)
}

#[cfg(unix)]
fn ensure_private_dir(dir: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    if !dir.exists() {
        if fs::create_dir_all(dir).is_err() {
            return false;
        }
        return fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).is_ok();
    }
    fs::metadata(dir)
        .map(|m| m.permissions().mode() & 0o777 == 0o700)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn ensure_private_dir(dir: &Path) -> bool {
    fs::create_dir_all(dir).is_ok()
}

#[cfg(unix)]
fn file_mode_is(meta: &fs::Metadata, mode: u32) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777 == mode
}

#[cfg(not(unix))]
fn file_mode_is(_meta: &fs::Metadata, _mode: u32) -> bool {
    true
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load_round_trips_within_an_owner_only_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("private");
        let store = ResumeTokenStore::open(&dir, "/run/qp.sock");
        let token = [42u8; TOKEN_LEN];
        store.store(&token);
        assert_eq!(store.load(), Some(token));
    }

    #[test]
    #[cfg(unix)]
    fn a_permissive_directory_disables_the_store() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("shared");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        let store = ResumeTokenStore::open(&dir, "/run/qp.sock");
        assert_eq!(store.load(), None);
        store.store(&[1u8; TOKEN_LEN]);
        assert_eq!(store.load(), None);
    }

    #[test]
    #[cfg(unix)]
    fn a_tampered_file_permission_is_rejected_and_deleted() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("private");
        let store = ResumeTokenStore::open(&dir, "/run/qp.sock");
        store.store(&[9u8; TOKEN_LEN]);
        let path = store.token_path();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(store.load(), None);
        assert!(!path.exists());
    }

    #[test]
    fn different_socket_paths_use_different_cache_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("private");
        let a = ResumeTokenStore::open(&dir, "/run/a.sock");
        let b = ResumeTokenStore::open(&dir, "/run/b.sock");
        a.store(&[1u8; TOKEN_LEN]);
        assert_eq!(b.load(), None);
        assert_eq!(a.load(), Some([1u8; TOKEN_LEN]));
    }
}
