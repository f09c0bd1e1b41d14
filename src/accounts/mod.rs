//! User directory projection
//!
//! Read-only view over the system passwd database, plus the two mutable
//! fields the daemon owns (preferred language and session), persisted as
//! per-user state files under the run directory. Lookups return `Option`;
//! accessors on a resolved user never fail.

use log::warn;
use pgs_files::passwd;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserState {
    language: Option<String>,
    session: Option<String>,
}

/// The user directory; one per daemon context.
pub struct Accounts {
    state_dir: PathBuf,
}

impl Accounts {
    pub fn new(run_directory: &Path) -> Self {
        Self {
            state_dir: run_directory.join("users"),
        }
    }

    /// Look up a user by name.
    pub fn user_by_name(&self, name: &str) -> Option<User> {
        passwd::get_entry_by_name(name).map(|entry| self.project(entry))
    }

    /// The user this process runs as, by effective uid.
    pub fn current_user(&self) -> Option<User> {
        let uid = nix::unistd::geteuid().as_raw();
        passwd::get_entry_by_uid(uid).map(|entry| self.project(entry))
    }

    fn project(&self, entry: passwd::PasswdEntry) -> User {
        let state_path = self.state_dir.join(format!("{}.toml", entry.name));
        let state = load_state(&state_path);
        User {
            name: entry.name,
            uid: entry.uid,
            gid: entry.gid,
            home: PathBuf::from(entry.dir),
            shell: PathBuf::from(entry.shell),
            state,
            state_path,
        }
    }
}

/// One resolved user record.
#[derive(Debug, Clone)]
pub struct User {
    name: String,
    uid: u32,
    gid: u32,
    home: PathBuf,
    shell: PathBuf,
    state: UserState,
    state_path: PathBuf,
}

impl User {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn home_directory(&self) -> &Path {
        &self.home
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }

    pub fn language(&self) -> Option<&str> {
        self.state.language.as_deref()
    }

    pub fn set_language(&mut self, language: &str) {
        self.state.language = Some(language.to_string());
        store_state(&self.state_path, &self.state);
    }

    pub fn session(&self) -> Option<&str> {
        self.state.session.as_deref()
    }

    pub fn set_session(&mut self, session: &str) {
        self.state.session = Some(session.to_string());
        store_state(&self.state_path, &self.state);
    }
}

fn load_state(path: &Path) -> UserState {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return UserState::default();
    };
    toml::from_str(&contents).unwrap_or_else(|e| {
        warn!("Ignoring malformed user state {}: {}", path.display(), e);
        UserState::default()
    })
}

fn store_state(path: &Path, state: &UserState) {
    if let Some(dir) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Failed to create user state directory {}: {}", dir.display(), e);
        }
    }
    match toml::to_string(state) {
        Ok(contents) => {
            if let Err(e) = std::fs::write(path, contents) {
                warn!("Failed to write user state {}: {}", path.display(), e);
            }
        }
        Err(e) => warn!("Failed to serialise user state: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::{load_state, store_state, UserState};

    #[test]
    fn state_round_trips_through_the_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users").join("alice.toml");

        let state = UserState {
            language: Some("en_GB.UTF-8".to_string()),
            session: Some("xfce".to_string()),
        };
        store_state(&path, &state);

        let loaded = load_state(&path);
        assert_eq!(loaded.language.as_deref(), Some("en_GB.UTF-8"));
        assert_eq!(loaded.session.as_deref(), Some("xfce"));
    }

    #[test]
    fn missing_or_malformed_state_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nobody.toml");
        assert!(load_state(&missing).language.is_none());

        let malformed = dir.path().join("broken.toml");
        std::fs::write(&malformed, "language = [not toml").unwrap();
        let loaded = load_state(&malformed);
        assert!(loaded.language.is_none());
        assert!(loaded.session.is_none());
    }
}
