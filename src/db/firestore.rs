// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Layout:
//! - `users/{id}`: the user record
//! - `usernames/{username}`, `emails/{email}`: reservations pointing at a
//!   user id, written in the same transaction as the record they guard
//!
//! All read-modify-write paths run inside `run_transaction`, so Firestore
//! retries them when another writer touched the same documents.

use crate::db::{collections, refresh_token_matches, UserStore, UserUpdate, DUPLICATE_USER};
use crate::error::AppError;
use crate::models::User;
use crate::time_utils::now_rfc3339;
use async_trait::async_trait;
use firestore::errors::{BackoffError, FirestoreError};
use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

type TxResult<T> = Result<T, BackoffError<FirestoreError>>;

/// Uniqueness reservation document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Reservation {
    user_id: String,
}

/// What a transaction body decided.
enum TxOutcome<T> {
    Done(T),
    Missing,
    Taken,
}

/// Document IDs may not contain `/`, so reservation keys are percent-encoded.
fn doc_key(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn db_err(e: FirestoreError) -> AppError {
    AppError::Database(e.to_string())
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    async fn user_by_reservation(
        &self,
        collection: &str,
        value: &str,
    ) -> Result<Option<User>, AppError> {
        let reservation: Option<Reservation> = self
            .client
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(&doc_key(value))
            .await
            .map_err(db_err)?;

        match reservation {
            Some(r) => self.get_user(&r.user_id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UserStore for FirestoreDb {
    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        let outcome = self
            .client
            .run_transaction(|db, transaction| {
                let user = user.clone();
                let fut: BoxFuture<'_, TxResult<TxOutcome<()>>> = async move {
                    let username_key = doc_key(&user.username);
                    let email_key = doc_key(&user.email);

                    let by_name: Option<Reservation> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::USERNAMES)
                        .obj()
                        .one(&username_key)
                        .await
                        .map_err(BackoffError::Permanent)?;
                    let by_email: Option<Reservation> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::EMAILS)
                        .obj()
                        .one(&email_key)
                        .await
                        .map_err(BackoffError::Permanent)?;
                    if by_name.is_some() || by_email.is_some() {
                        return Ok(TxOutcome::Taken);
                    }

                    let reservation = Reservation {
                        user_id: user.id.clone(),
                    };
                    db.fluent()
                        .update()
                        .in_col(collections::USERNAMES)
                        .document_id(&username_key)
                        .object(&reservation)
                        .add_to_transaction(&mut *transaction)
                        .map_err(BackoffError::Permanent)?;
                    db.fluent()
                        .update()
                        .in_col(collections::EMAILS)
                        .document_id(&email_key)
                        .object(&reservation)
                        .add_to_transaction(&mut *transaction)
                        .map_err(BackoffError::Permanent)?;
                    db.fluent()
                        .update()
                        .in_col(collections::USERS)
                        .document_id(&user.id)
                        .object(&user)
                        .add_to_transaction(&mut *transaction)
                        .map_err(BackoffError::Permanent)?;

                    Ok(TxOutcome::Done(()))
                }
                .boxed();
                fut
            })
            .await
            .map_err(db_err)?;

        match outcome {
            TxOutcome::Done(()) => {
                tracing::debug!(user_id = %user.id, "User document created");
                Ok(())
            }
            TxOutcome::Taken | TxOutcome::Missing => {
                Err(AppError::Conflict(DUPLICATE_USER.to_string()))
            }
        }
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(id)
            .await
            .map_err(db_err)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.user_by_reservation(collections::USERNAMES, username)
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.user_by_reservation(collections::EMAILS, email).await
    }

    async fn update_user(&self, id: &str, update: UserUpdate) -> Result<Option<User>, AppError> {
        let outcome = self
            .client
            .run_transaction(|db, transaction| {
                let id = id.to_string();
                let update = update.clone();
                let fut: BoxFuture<'_, TxResult<TxOutcome<User>>> = async move {
                    let current: Option<User> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::USERS)
                        .obj()
                        .one(&id)
                        .await
                        .map_err(BackoffError::Permanent)?;
                    let Some(mut user) = current else {
                        return Ok(TxOutcome::Missing);
                    };

                    if let Some(email) = update.claimed_email(&user.email) {
                        let new_key = doc_key(email);
                        let owner: Option<Reservation> = db
                            .fluent()
                            .select()
                            .by_id_in(collections::EMAILS)
                            .obj()
                            .one(&new_key)
                            .await
                            .map_err(BackoffError::Permanent)?;
                        if owner.is_some_and(|r| r.user_id != id) {
                            return Ok(TxOutcome::Taken);
                        }

                        db.fluent()
                            .update()
                            .in_col(collections::EMAILS)
                            .document_id(&new_key)
                            .object(&Reservation {
                                user_id: id.clone(),
                            })
                            .add_to_transaction(&mut *transaction)
                            .map_err(BackoffError::Permanent)?;
                        db.fluent()
                            .delete()
                            .from(collections::EMAILS)
                            .document_id(doc_key(&user.email))
                            .add_to_transaction(&mut *transaction)
                            .map_err(BackoffError::Permanent)?;
                    }

                    update.apply(&mut user, &now_rfc3339());

                    db.fluent()
                        .update()
                        .in_col(collections::USERS)
                        .document_id(&id)
                        .object(&user)
                        .add_to_transaction(&mut *transaction)
                        .map_err(BackoffError::Permanent)?;

                    Ok(TxOutcome::Done(user))
                }
                .boxed();
                fut
            })
            .await
            .map_err(db_err)?;

        match outcome {
            TxOutcome::Done(user) => Ok(Some(user)),
            TxOutcome::Missing => Ok(None),
            TxOutcome::Taken => Err(AppError::Conflict(DUPLICATE_USER.to_string())),
        }
    }

    async fn rotate_refresh_token(
        &self,
        id: &str,
        presented: &str,
        next: &str,
    ) -> Result<bool, AppError> {
        let outcome = self
            .client
            .run_transaction(|db, transaction| {
                let id = id.to_string();
                let presented = presented.to_string();
                let next = next.to_string();
                let fut: BoxFuture<'_, TxResult<TxOutcome<bool>>> = async move {
                    let current: Option<User> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::USERS)
                        .obj()
                        .one(&id)
                        .await
                        .map_err(BackoffError::Permanent)?;
                    let Some(mut user) = current else {
                        return Ok(TxOutcome::Missing);
                    };

                    if !refresh_token_matches(user.refresh_token.as_deref(), &presented) {
                        return Ok(TxOutcome::Done(false));
                    }

                    UserUpdate::RefreshToken(Some(next)).apply(&mut user, &now_rfc3339());
                    db.fluent()
                        .update()
                        .in_col(collections::USERS)
                        .document_id(&id)
                        .object(&user)
                        .add_to_transaction(&mut *transaction)
                        .map_err(BackoffError::Permanent)?;

                    Ok(TxOutcome::Done(true))
                }
                .boxed();
                fut
            })
            .await
            .map_err(db_err)?;

        Ok(matches!(outcome, TxOutcome::Done(true)))
    }
}
