//! Google Sheets v4 REST binding.
//!
//! Authentication is the caller's concern: the client is handed a bearer
//! token and never refreshes it.

pub mod client;
pub mod source;
pub mod types;

pub use client::GoogleSheetsClient;
