//! # Route Modules
//!
//! Each module defines an Axum Router for one surface area; `assemble`
//! merges them into the application served by `meshnode-cli`.

pub mod health;
pub mod rest;
pub mod ws;

use crate::state::AppState;

pub fn assemble() -> axum::Router<AppState> {
    axum::Router::new().merge(health::router()).merge(rest::router()).merge(ws::router())
}
