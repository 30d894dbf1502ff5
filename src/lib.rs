//! navcharts - chart provider login and enroute chart tiles
//!
//! This library provides the OAuth2 + PKCE login against the chart
//! provider, persistence of the resulting refresh token, and a tile source
//! that addresses and downloads enroute chart tiles with the session's
//! signed access.

pub mod auth;
pub mod cancel;
pub mod config;
pub mod error;
pub mod http;
pub mod tiles;
pub mod ui;

pub use error::{Error, Result};
