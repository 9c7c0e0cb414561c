// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod account;
pub mod cloudinary;
pub mod credentials;
pub mod media;
pub mod media_memory;
pub mod password;
pub mod session;
pub mod tokens;

pub use account::{AccountService, Registration, RegistrationFiles};
pub use cloudinary::CloudinaryClient;
pub use credentials::CredentialStore;
pub use media::{MediaHost, MediaService, TempUpload, UploadedAsset};
pub use media_memory::MemoryMediaHost;
pub use session::{LoginCredentials, LoginOutcome, SessionService};
pub use tokens::{AccessClaims, RefreshClaims, TokenClass, TokenError, TokenPair, TokenService};
