//! Session state persisted between CLI invocations.
//!
//! Stored as `<data_dir>/identity.yaml`:
//!
//! ```yaml
//! user_id: alice
//! selected_list: 6f1c...
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SESSION_FILE: &str = "identity.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_list: Option<Uuid>,
}

/// Errors reading or writing the session file.
#[derive(Debug)]
pub enum SessionError {
    Io(PathBuf, io::Error),
    Parse(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Io(path, e) => write!(f, "I/O error for {}: {}", path.display(), e),
            SessionError::Parse(path, e) => {
                write!(f, "Failed to parse session file {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Io(_, e) => Some(e),
            SessionError::Parse(_, e) => Some(e),
        }
    }
}

impl Session {
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(SESSION_FILE)
    }

    /// Loads the session; a missing file is an empty session.
    pub fn load(data_dir: &Path) -> Result<Self, SessionError> {
        let path = Self::path(data_dir);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                serde_yaml::from_str(&contents).map_err(|e| SessionError::Parse(path, e))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(SessionError::Io(path, e)),
        }
    }

    pub fn save(&self, data_dir: &Path) -> Result<(), SessionError> {
        fs::create_dir_all(data_dir).map_err(|e| SessionError::Io(data_dir.to_path_buf(), e))?;
        let path = Self::path(data_dir);
        let contents = serde_yaml::to_string(self).map_err(|e| SessionError::Parse(path.clone(), e))?;
        fs::write(&path, contents).map_err(|e| SessionError::Io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty_session() {
        let temp_dir = tempdir().unwrap();
        let session = Session::load(temp_dir.path()).unwrap();
        assert_eq!(session, Session::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempdir().unwrap();
        let data_dir = temp_dir.path().join("nested");
        let session = Session {
            user_id: Some("alice".to_string()),
            selected_list: Some(Uuid::new_v4()),
        };

        session.save(&data_dir).unwrap();
        assert_eq!(Session::load(&data_dir).unwrap(), session);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = tempdir().unwrap();
        fs::write(Session::path(temp_dir.path()), "user_id: [").unwrap();
        assert!(matches!(
            Session::load(temp_dir.path()),
            Err(SessionError::Parse(_, _))
        ));
    }
}
