//! SmartMarks local database layer.
//!
//! Provides SQLite connection management and schema migrations for the
//! client-side state that must survive a restart (the signed-in session and
//! a pending OAuth flow). Bookmarks themselves live on the backend.
//!
//! # Usage
//!
//! ```no_run
//! use smartmarks::database::Database;
//!
//! // Open a persistent database
//! let db = Database::open("smartmarks.db").expect("failed to open database");
//!
//! // Or use an in-memory database for testing
//! let db = Database::open_in_memory().expect("failed to open in-memory database");
//!
//! let conn = db.connection();
//! ```

pub mod connection;
pub mod migrations;

pub use connection::Database;
