//! Client core for Piccolo Admin.
//!
//! Turns listing state (filters, ordering, pagination) into REST requests,
//! coerces raw form input per column schema, and normalizes the server's
//! error payloads into messages a user can read.

pub mod api;
pub mod coercion;
pub mod config;
pub mod error;
pub mod models;
pub mod preferences;
pub mod query;
pub mod response;
pub mod schema;
pub mod store;
pub mod translations;

pub use api::{AdminApi, AdminClient};
pub use config::AdminConfig;
pub use error::{AdminError, AdminResult};
pub use store::{Action, ListingState, ListingStore};
