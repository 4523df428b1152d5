//! Encrypted local persistence for the auth session.
//!
//! Keeps the signed-in session across restarts (so `get_session` on launch
//! finds it) and the PKCE verifier of an OAuth flow that is waiting for its
//! callback. Session JSON is AES-256-GCM encrypted before it reaches SQLite,
//! under a random per-install key kept in `session.key` next to the database
//! (owner read/write only on Unix).

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::params;
use zeroize::Zeroize;

use crate::database::connection::Database;
use crate::services::crypto_service::{CryptoService, CryptoServiceTrait};
use crate::types::credential::EncryptedData;
use crate::types::errors::StoreError;
use crate::types::session::AuthSession;

/// File name of the session database inside the data directory.
pub const SESSION_DB_FILE: &str = "session.db";

/// File name of the session encryption key inside the data directory.
pub const SESSION_KEY_FILE: &str = "session.key";

/// AES-256 key length in bytes.
const SESSION_KEY_LENGTH: usize = 32;

/// The store keeps at most one session and one pending flow.
const SINGLETON_ID: &str = "default";

/// Trait defining session persistence operations.
pub trait SessionStoreTrait {
    fn save_session(&self, session: &AuthSession) -> Result<(), StoreError>;
    fn load_session(&self) -> Result<Option<AuthSession>, StoreError>;
    fn clear_session(&self) -> Result<(), StoreError>;
    fn save_verifier(&self, verifier: &str) -> Result<(), StoreError>;
    /// Returns and forgets the pending PKCE verifier.
    fn take_verifier(&self) -> Result<Option<String>, StoreError>;
}

/// Session store backed by SQLite + CryptoService.
pub struct SessionStore {
    db: Mutex<Database>,
    crypto: CryptoService,
    encryption_key: Vec<u8>,
}

impl SessionStore {
    /// Store over `db`, encrypting with `encryption_key` (32 bytes).
    pub fn new(db: Database, mut encryption_key: Vec<u8>) -> Result<Self, StoreError> {
        if encryption_key.len() != SESSION_KEY_LENGTH {
            let len = encryption_key.len();
            encryption_key.zeroize();
            return Err(StoreError::KeyFileError(format!(
                "expected a {}-byte key, got {} bytes",
                SESSION_KEY_LENGTH, len
            )));
        }
        Ok(Self {
            db: Mutex::new(db),
            crypto: CryptoService::new(),
            encryption_key,
        })
    }

    /// Opens `session.db` under `data_dir`, creating the key file on first use.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir).map_err(|e| StoreError::KeyFileError(e.to_string()))?;
        let key = load_or_create_key(&data_dir.join(SESSION_KEY_FILE))?;
        let db = Database::open(&data_dir.join(SESSION_DB_FILE))
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Self::new(db, key)
    }

    /// Store over a throwaway in-memory database with a fresh random key.
    pub fn in_memory() -> Result<Self, StoreError> {
        let key = CryptoService::new()
            .generate_random_bytes(SESSION_KEY_LENGTH)
            .map_err(|e| StoreError::CryptoError(e.to_string()))?;
        let db = Database::open_in_memory().map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Self::new(db, key)
    }

    fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StoreError> {
        let db = self
            .db
            .lock()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        f(&db).map_err(|e| StoreError::DatabaseError(e.to_string()))
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

/// Reads the key at `path`, or writes a fresh random one if it does not exist.
pub fn load_or_create_key(path: &Path) -> Result<Vec<u8>, StoreError> {
    match fs::read(path) {
        Ok(key) => return Ok(key),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(StoreError::KeyFileError(format!("{}: {}", path.display(), e))),
    }

    let mut key = CryptoService::new()
        .generate_random_bytes(SESSION_KEY_LENGTH)
        .map_err(|e| StoreError::CryptoError(e.to_string()))?;
    if let Err(e) = write_owner_only(path, &key) {
        key.zeroize();
        return Err(StoreError::KeyFileError(format!("{}: {}", path.display(), e)));
    }
    tracing::info!(path = %path.display(), "created session key");
    Ok(key)
}

fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.encryption_key.zeroize();
    }
}

impl SessionStoreTrait for SessionStore {
    fn save_session(&self, session: &AuthSession) -> Result<(), StoreError> {
        let mut json = serde_json::to_vec(session)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        let encrypted = self
            .crypto
            .encrypt_aes256gcm(&json, &self.encryption_key)
            .map_err(|e| StoreError::CryptoError(e.to_string()));
        json.zeroize();
        let encrypted = encrypted?;

        let now = Self::now();
        self.with_db(|db| {
            db.connection().execute(
                "INSERT OR REPLACE INTO auth_sessions \
                 (id, user_id, encrypted_data, iv, auth_tag, expires_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    SINGLETON_ID,
                    session.user.id,
                    encrypted.ciphertext,
                    encrypted.iv,
                    encrypted.auth_tag,
                    session.expires_at,
                    now
                ],
            )
        })?;
        Ok(())
    }

    fn load_session(&self) -> Result<Option<AuthSession>, StoreError> {
        let row = self.with_db(|db| {
            let result = db.connection().query_row(
                "SELECT encrypted_data, iv, auth_tag FROM auth_sessions WHERE id = ?1",
                params![SINGLETON_ID],
                |row| {
                    Ok(EncryptedData {
                        ciphertext: row.get(0)?,
                        iv: row.get(1)?,
                        auth_tag: row.get(2)?,
                    })
                },
            );
            match result {
                Ok(encrypted) => Ok(Some(encrypted)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })?;

        let Some(encrypted) = row else {
            return Ok(None);
        };

        let mut json = self
            .crypto
            .decrypt_aes256gcm(&encrypted, &self.encryption_key)
            .map_err(|e| StoreError::CryptoError(e.to_string()))?;
        let session = serde_json::from_slice::<AuthSession>(&json)
            .map_err(|e| StoreError::SerializationError(e.to_string()));
        json.zeroize();
        session.map(Some)
    }

    fn clear_session(&self) -> Result<(), StoreError> {
        self.with_db(|db| db.connection().execute("DELETE FROM auth_sessions", []))?;
        Ok(())
    }

    fn save_verifier(&self, verifier: &str) -> Result<(), StoreError> {
        let now = Self::now();
        self.with_db(|db| {
            db.connection().execute(
                "INSERT OR REPLACE INTO auth_flow (id, code_verifier, created_at) VALUES (?1, ?2, ?3)",
                params![SINGLETON_ID, verifier, now],
            )
        })?;
        Ok(())
    }

    fn take_verifier(&self) -> Result<Option<String>, StoreError> {
        self.with_db(|db| {
            let conn = db.connection();
            let result = conn.query_row(
                "SELECT code_verifier FROM auth_flow WHERE id = ?1",
                params![SINGLETON_ID],
                |row| row.get::<_, String>(0),
            );
            let verifier = match result {
                Ok(v) => Some(v),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e),
            };
            conn.execute("DELETE FROM auth_flow", [])?;
            Ok(verifier)
        })
    }
}
