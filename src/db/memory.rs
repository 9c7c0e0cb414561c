//! In-process user store.
//!
//! Used for local development (`USER_STORE=memory`) and tests. DashMap shard
//! locks give the same per-document atomicity the Firestore store gets from
//! transactions.

use crate::db::{refresh_token_matches, UserStore, UserUpdate, DUPLICATE_USER};
use crate::error::AppError;
use crate::models::User;
use crate::time_utils::now_rfc3339;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// DashMap-backed user store with username/email reservation indexes.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<DashMap<String, User>>,
    /// username -> user id
    usernames: Arc<DashMap<String, String>>,
    /// email -> user id
    emails: Arc<DashMap<String, String>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn lookup(&self, index: &DashMap<String, String>, key: &str) -> Option<User> {
        let id = index.get(key).map(|id| id.value().clone())?;
        self.users.get(&id).map(|user| user.value().clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        match self.usernames.entry(user.username.clone()) {
            Entry::Occupied(_) => return Err(AppError::Conflict(DUPLICATE_USER.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(user.id.clone());
            }
        }

        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => {
                self.usernames.remove(&user.username);
                return Err(AppError::Conflict(DUPLICATE_USER.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(user.id.clone());
            }
        }

        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(id).map(|user| user.value().clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self.lookup(&self.usernames, username))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.lookup(&self.emails, email))
    }

    async fn update_user(&self, id: &str, update: UserUpdate) -> Result<Option<User>, AppError> {
        // The user's shard lock is held across the email claim, so concurrent
        // email changes for one user serialize. Lock order is users -> emails.
        let Some(mut user) = self.users.get_mut(id) else {
            return Ok(None);
        };

        let current_email = user.email.clone();
        let claimed = update.claimed_email(&current_email).map(str::to_string);
        if let Some(email) = &claimed {
            match self.emails.entry(email.clone()) {
                Entry::Occupied(owner) if owner.get() != id => {
                    return Err(AppError::Conflict(DUPLICATE_USER.to_string()));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(id.to_string());
                }
            }
            self.emails.remove_if(&current_email, |_, owner| owner == id);
        }

        update.apply(user.value_mut(), &now_rfc3339());
        Ok(Some(user.value().clone()))
    }

    async fn rotate_refresh_token(
        &self,
        id: &str,
        presented: &str,
        next: &str,
    ) -> Result<bool, AppError> {
        // The shard write lock is held across compare and swap.
        let Some(mut user) = self.users.get_mut(id) else {
            return Ok(false);
        };

        if !refresh_token_matches(user.refresh_token.as_deref(), presented) {
            return Ok(false);
        }

        user.refresh_token = Some(next.to_string());
        user.updated_at = now_rfc3339();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaField;

    fn user(id: &str, username: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            full_name: "Test User".to_string(),
            password_hash: "hash".to_string(),
            avatar: "https://media.example/avatar.png".to_string(),
            cover_image: None,
            refresh_token: None,
            created_at: now_rfc3339(),
            updated_at: now_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_username_and_email() {
        let store = MemoryUserStore::new();
        store.insert_user(&user("1", "ada", "ada@x.com")).await.unwrap();

        let dup_name = store.insert_user(&user("2", "ada", "other@x.com")).await;
        assert!(matches!(dup_name, Err(AppError::Conflict(_))));

        let dup_email = store.insert_user(&user("3", "bob", "ada@x.com")).await;
        assert!(matches!(dup_email, Err(AppError::Conflict(_))));

        // The failed email insert must not leave "bob" reserved.
        store.insert_user(&user("4", "bob", "bob@x.com")).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_by_username_and_email() {
        let store = MemoryUserStore::new();
        store.insert_user(&user("1", "ada", "ada@x.com")).await.unwrap();

        assert_eq!(store.find_by_username("ada").await.unwrap().unwrap().id, "1");
        assert_eq!(store.find_by_email("ada@x.com").await.unwrap().unwrap().id, "1");
        assert!(store.find_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_email_change_moves_reservation() {
        let store = MemoryUserStore::new();
        store.insert_user(&user("1", "ada", "ada@x.com")).await.unwrap();
        store.insert_user(&user("2", "bob", "bob@x.com")).await.unwrap();

        let taken = store
            .update_user(
                "1",
                UserUpdate::Details {
                    full_name: None,
                    email: Some("bob@x.com".to_string()),
                },
            )
            .await;
        assert!(matches!(taken, Err(AppError::Conflict(_))));

        let updated = store
            .update_user(
                "1",
                UserUpdate::Details {
                    full_name: Some("Ada King".to_string()),
                    email: Some("ada@king.com".to_string()),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.email, "ada@king.com");
        assert_eq!(updated.full_name, "Ada King");

        assert!(store.find_by_email("ada@x.com").await.unwrap().is_none());
        assert_eq!(store.find_by_email("ada@king.com").await.unwrap().unwrap().id, "1");
    }

    #[tokio::test]
    async fn test_update_missing_user_returns_none() {
        let store = MemoryUserStore::new();
        let result = store
            .update_user(
                "ghost",
                UserUpdate::Media {
                    field: MediaField::Avatar,
                    url: "x".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_rotate_requires_current_value() {
        let store = MemoryUserStore::new();
        store.insert_user(&user("1", "ada", "ada@x.com")).await.unwrap();
        store
            .update_user("1", UserUpdate::RefreshToken(Some("t1".to_string())))
            .await
            .unwrap();

        assert!(store.rotate_refresh_token("1", "t1", "t2").await.unwrap());
        assert!(!store.rotate_refresh_token("1", "t1", "t3").await.unwrap());

        let stored = store.get_user("1").await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("t2"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_email_changes_leave_one_reservation() {
        let store = MemoryUserStore::new();
        store.insert_user(&user("1", "ada", "ada@x.com")).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .update_user(
                            "1",
                            UserUpdate::Details {
                                full_name: None,
                                email: Some(format!("ada{i}@x.com")),
                            },
                        )
                        .await
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = store.get_user("1").await.unwrap().unwrap();
        assert_eq!(store.emails.len(), 1);
        assert_eq!(
            store.emails.get(&stored.email).map(|owner| owner.value().clone()),
            Some("1".to_string())
        );
        assert!(store.find_by_email("ada@x.com").await.unwrap().is_none());
    }
}
