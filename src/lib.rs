// SPDX-License-Identifier: MIT

//! Peloplan: keep a Peloton class stack in sync with a locally planned
//! workout schedule.
//!
//! This crate provides the backend that manages encrypted Peloton session
//! credentials, reconstructs FTP test history, and synchronizes planned
//! workouts to the remote class stack on demand and on a nightly schedule.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use services::{ScheduledRunner, SyncService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub sync_service: SyncService,
    pub runner: ScheduledRunner,
}
