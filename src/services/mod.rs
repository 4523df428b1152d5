// SmartMarks services
// Protocol clients for the hosted backend, the OAuth loopback listener, local crypto, session storage and settings.

pub mod auth_service;
pub mod crypto_service;
pub mod oauth_callback;
pub mod realtime_client;
pub mod rest_client;
pub mod session_store;
pub mod settings_engine;
