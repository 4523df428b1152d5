use std::fmt;

// === AuthError ===

/// Errors related to authentication and session handling.
#[derive(Debug)]
pub enum AuthError {
    /// No signed-in session is available.
    NotAuthenticated,
    /// The OAuth callback did not carry an authorization code.
    MissingCode(String),
    /// The provider or auth service rejected the request.
    Rejected(String),
    /// A network error occurred while talking to the auth service.
    NetworkError(String),
    /// Local session persistence failed.
    StorageError(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::NotAuthenticated => write!(f, "Not signed in"),
            AuthError::MissingCode(msg) => write!(f, "Missing authorization code: {}", msg),
            AuthError::Rejected(msg) => write!(f, "Authentication rejected: {}", msg),
            AuthError::NetworkError(msg) => write!(f, "Auth network error: {}", msg),
            AuthError::StorageError(msg) => write!(f, "Session storage error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

// === BookmarkError ===

/// Errors related to bookmark table operations.
#[derive(Debug)]
pub enum BookmarkError {
    /// Bookmark with the given ID was not found for this owner.
    NotFound(String),
    /// The request was denied by the backend's access policy.
    Unauthorized(String),
    /// The caller has no signed-in identity.
    NotAuthenticated,
    /// A network error occurred.
    NetworkError(String),
    /// The backend returned an error response.
    ApiError { status: u16, message: String },
    /// The backend response could not be decoded.
    DecodeError(String),
}

impl fmt::Display for BookmarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookmarkError::NotFound(id) => write!(f, "Bookmark not found: {}", id),
            BookmarkError::Unauthorized(msg) => write!(f, "Bookmark access denied: {}", msg),
            BookmarkError::NotAuthenticated => write!(f, "Sign in to manage bookmarks"),
            BookmarkError::NetworkError(msg) => write!(f, "Bookmark network error: {}", msg),
            BookmarkError::ApiError { status, message } => {
                write!(f, "Bookmark API error ({}): {}", status, message)
            }
            BookmarkError::DecodeError(msg) => {
                write!(f, "Bookmark response decode error: {}", msg)
            }
        }
    }
}

impl std::error::Error for BookmarkError {}

// === RealtimeError ===

/// Errors related to the push-change feed.
#[derive(Debug)]
pub enum RealtimeError {
    /// The websocket connection could not be established or was lost.
    ConnectionFailed(String),
    /// The server refused the channel join.
    JoinRejected(String),
    /// A frame could not be parsed.
    ProtocolError(String),
    /// The caller has no signed-in identity.
    NotAuthenticated,
}

impl fmt::Display for RealtimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RealtimeError::ConnectionFailed(msg) => {
                write!(f, "Realtime connection failed: {}", msg)
            }
            RealtimeError::JoinRejected(msg) => write!(f, "Realtime join rejected: {}", msg),
            RealtimeError::ProtocolError(msg) => write!(f, "Realtime protocol error: {}", msg),
            RealtimeError::NotAuthenticated => write!(f, "Realtime requires a signed-in session"),
        }
    }
}

impl std::error::Error for RealtimeError {}

// === ValidationError ===

/// Client-side validation failures for the bookmark form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The title is empty.
    EmptyTitle,
    /// The url is empty.
    EmptyUrl,
    /// The url is not an absolute http(s) URL.
    InvalidUrl(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyTitle => write!(f, "Title is required"),
            ValidationError::EmptyUrl => write!(f, "URL is required"),
            ValidationError::InvalidUrl(url) => write!(f, "Invalid URL: {}", url),
        }
    }
}

impl std::error::Error for ValidationError {}

// === FormError ===

/// Errors related to edit-mode transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// Another bookmark is already being edited.
    EditInProgress(String),
    /// The bookmark to edit is not in the list.
    UnknownBookmark(String),
    /// A create or update is already in flight.
    Busy,
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormError::EditInProgress(id) => write!(f, "Already editing bookmark: {}", id),
            FormError::UnknownBookmark(id) => write!(f, "Unknown bookmark: {}", id),
            FormError::Busy => write!(f, "A save is already in progress"),
        }
    }
}

impl std::error::Error for FormError {}

// === CryptoError ===

/// Errors related to cryptographic operations.
#[derive(Debug)]
pub enum CryptoError {
    /// Failed to derive encryption key.
    KeyDerivation(String),
    /// Encryption operation failed.
    Encryption(String),
    /// Decryption operation failed.
    Decryption(String),
    /// Failed to generate random bytes.
    RandomGeneration(String),
    /// The provided key is invalid.
    InvalidKey(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::KeyDerivation(msg) => write!(f, "Key derivation failed: {}", msg),
            CryptoError::Encryption(msg) => write!(f, "Encryption failed: {}", msg),
            CryptoError::Decryption(msg) => write!(f, "Decryption failed: {}", msg),
            CryptoError::RandomGeneration(msg) => {
                write!(f, "Random generation failed: {}", msg)
            }
            CryptoError::InvalidKey(msg) => write!(f, "Invalid key: {}", msg),
        }
    }
}

impl std::error::Error for CryptoError {}

// === StoreError ===

/// Errors related to the local encrypted session store.
#[derive(Debug)]
pub enum StoreError {
    /// Failed to serialize or deserialize stored data.
    SerializationError(String),
    /// Database operation failed.
    DatabaseError(String),
    /// Cryptographic operation failed during encryption/decryption.
    CryptoError(String),
    /// The session key file could not be read or created.
    KeyFileError(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::SerializationError(msg) => {
                write!(f, "Store serialization error: {}", msg)
            }
            StoreError::DatabaseError(msg) => write!(f, "Store database error: {}", msg),
            StoreError::CryptoError(msg) => write!(f, "Store crypto error: {}", msg),
            StoreError::KeyFileError(msg) => write!(f, "Store key file error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    IoError(String),
    /// Failed to serialize or deserialize settings.
    SerializationError(String),
    /// The provided settings key is invalid.
    InvalidKey(String),
    /// The provided settings value is invalid.
    InvalidValue(String),
    /// A required setting is missing.
    Missing(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::IoError(msg) => write!(f, "Settings I/O error: {}", msg),
            SettingsError::SerializationError(msg) => {
                write!(f, "Settings serialization error: {}", msg)
            }
            SettingsError::InvalidKey(key) => write!(f, "Invalid settings key: {}", key),
            SettingsError::InvalidValue(msg) => {
                write!(f, "Invalid settings value: {}", msg)
            }
            SettingsError::Missing(key) => write!(f, "Missing required setting: {}", key),
        }
    }
}

impl std::error::Error for SettingsError {}

// === SyncError ===

/// Errors raised while (re)loading the live bookmark list.
#[derive(Debug)]
pub enum SyncError {
    /// The push subscription could not be opened.
    Subscribe(String),
    /// The owned bookmarks could not be fetched.
    Fetch(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Subscribe(msg) => write!(f, "Live updates unavailable: {}", msg),
            SyncError::Fetch(msg) => write!(f, "Could not load bookmarks: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {}

// === CommandError ===

/// Errors returned by create/update/delete commands.
#[derive(Debug)]
pub enum CommandError {
    /// No user is signed in.
    NotSignedIn,
    /// The form contents are invalid; nothing was sent.
    Validation(ValidationError),
    /// The form is in a state that does not allow the command.
    Form(FormError),
    /// The backend rejected or failed the request.
    Backend(BookmarkError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::NotSignedIn => write!(f, "Sign in to manage bookmarks"),
            CommandError::Validation(e) => write!(f, "{}", e),
            CommandError::Form(e) => write!(f, "{}", e),
            CommandError::Backend(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<ValidationError> for CommandError {
    fn from(e: ValidationError) -> Self {
        CommandError::Validation(e)
    }
}

impl From<FormError> for CommandError {
    fn from(e: FormError) -> Self {
        CommandError::Form(e)
    }
}

impl From<BookmarkError> for CommandError {
    fn from(e: BookmarkError) -> Self {
        CommandError::Backend(e)
    }
}
