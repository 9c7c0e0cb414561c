// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! VidTube accounts: registration, sessions and profile media
//!
//! This crate provides the backend API for user accounts of a video
//! sharing platform: password credentials, rotating refresh-token sessions
//! and avatar/cover images kept on a remote media host.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::UserStore;
use services::{
    AccountService, CredentialStore, MediaHost, MediaService, SessionService, TokenService,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub sessions: SessionService,
    pub accounts: AccountService,
}

impl AppState {
    /// Wire the services together over the given storage and media backends.
    pub fn new(config: Config, store: Arc<dyn UserStore>, media_host: Arc<dyn MediaHost>) -> Self {
        let credentials = CredentialStore::new(store, config.bcrypt_cost);
        let tokens = TokenService::new(&config);
        let media = MediaService::new(media_host, credentials.clone());

        Self {
            sessions: SessionService::new(credentials.clone(), tokens),
            accounts: AccountService::new(credentials, media),
            config,
        }
    }
}
