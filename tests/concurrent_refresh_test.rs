// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Concurrent refresh with the same token: exactly one request may win.

use std::sync::Arc;
use vidtube_accounts::config::Config;
use vidtube_accounts::db::{MemoryUserStore, UserStore};
use vidtube_accounts::models::NewUser;
use vidtube_accounts::services::{
    CredentialStore, LoginCredentials, SessionService, TokenService,
};

async fn session_with_user() -> (Arc<SessionService>, Arc<MemoryUserStore>, String) {
    let store = Arc::new(MemoryUserStore::new());
    let credentials = CredentialStore::new(store.clone(), 4);
    let user = credentials
        .create(NewUser {
            username: "ada".to_string(),
            email: "ada@x.com".to_string(),
            full_name: "Ada Lovelace".to_string(),
            password: "s3cret".to_string(),
            avatar: "https://media.local/a.png".to_string(),
            cover_image: None,
        })
        .await
        .unwrap();
    let sessions = Arc::new(SessionService::new(
        credentials,
        TokenService::new(&Config::test_default()),
    ));
    (sessions, store, user.id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_single_winner() {
    let (sessions, store, user_id) = session_with_user().await;
    let refresh = sessions
        .login(LoginCredentials {
            username: Some("ada".to_string()),
            email: None,
            password: "s3cret".to_string(),
        })
        .await
        .unwrap()
        .tokens
        .refresh_token;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let sessions = sessions.clone();
        let token = refresh.clone();
        handles.push(tokio::spawn(async move {
            sessions.refresh(Some(&token)).await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        if let Ok(pair) = handle.await.unwrap() {
            winners.push(pair);
        }
    }

    assert_eq!(winners.len(), 1, "exactly one refresh must succeed");

    // The stored token is the winner's, and only it still works.
    let stored = store.get_user(&user_id).await.unwrap().unwrap();
    assert_eq!(
        stored.refresh_token.as_deref(),
        Some(winners[0].refresh_token.as_str())
    );
    assert!(sessions.refresh(Some(&refresh)).await.is_err());
    assert!(sessions
        .refresh(Some(&winners[0].refresh_token))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_new_login_supersedes_previous_refresh_token() {
    let (sessions, _, _) = session_with_user().await;
    let creds = || LoginCredentials {
        username: Some("ada".to_string()),
        email: None,
        password: "s3cret".to_string(),
    };

    let first = sessions.login(creds()).await.unwrap().tokens;
    let second = sessions.login(creds()).await.unwrap().tokens;

    assert!(sessions.refresh(Some(&first.refresh_token)).await.is_err());
    assert!(sessions.refresh(Some(&second.refresh_token)).await.is_ok());
}
