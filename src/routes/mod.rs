//! Router Module Index
//!
//! Splits the HTTP surface by the guard applied at the router level. The same
//! decisions are made again by the guarded `Library` for every operation.

/// Routes open to anonymous callers (`/health`).
pub mod public;

/// Every GET on the API resources, behind `auth_middleware`.
pub mod read;

/// Account mutations, behind `auth_middleware`.
pub mod authenticated;

/// Book and author mutations, behind `admin_middleware`.
pub mod admin;
