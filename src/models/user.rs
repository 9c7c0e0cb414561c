//! User model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// User record stored in Firestore (document ID is `id`).
///
/// Holds secrets, so it is never serialized into an API response; handlers
/// project it through [`UserProfile`] first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    /// Lowercase, unique
    pub username: String,
    /// Lowercase, unique
    pub email: String,
    pub full_name: String,
    /// bcrypt hash, never the plaintext
    #[serde(rename = "password")]
    pub password_hash: String,
    /// Media host URL of the avatar (always set)
    pub avatar: String,
    /// Media host URL of the cover image
    pub cover_image: Option<String>,
    /// The single live refresh token for this user's session lineage
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Current URL stored in a media field.
    pub fn media_url(&self, field: MediaField) -> Option<&str> {
        match field {
            MediaField::Avatar => Some(self.avatar.as_str()),
            MediaField::CoverImage => self.cover_image.as_deref(),
        }
        .filter(|url| !url.is_empty())
    }
}

/// Fields needed to create a user; the password is still plaintext here and
/// gets hashed by the credential store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub avatar: String,
    pub cover_image: Option<String>,
}

/// User fields that point at hosted media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaField {
    Avatar,
    CoverImage,
}

impl MediaField {
    /// Human-readable label used in response messages.
    pub fn label(self) -> &'static str {
        match self {
            MediaField::Avatar => "avatar",
            MediaField::CoverImage => "cover image",
        }
    }
}

/// Sanitized user projection: everything except the password hash and the
/// refresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            avatar: user.avatar.clone(),
            cover_image: user.cover_image.clone(),
            created_at: user.created_at.clone(),
            updated_at: user.updated_at.clone(),
        }
    }
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile::from(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: "u1".to_string(),
            username: "ada".to_string(),
            email: "ada@x.com".to_string(),
            full_name: "Ada Lovelace".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            avatar: "https://res.cloudinary.com/demo/image/upload/v1/abc.png".to_string(),
            cover_image: Some(String::new()),
            refresh_token: Some("token".to_string()),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_profile_strips_secrets() {
        let json = serde_json::to_value(UserProfile::from(sample_user())).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("password"));
        assert!(!obj.contains_key("refreshToken"));
        assert_eq!(obj["_id"], "u1");
        assert_eq!(obj["fullName"], "Ada Lovelace");
    }

    #[test]
    fn test_media_url_treats_empty_as_absent() {
        let user = sample_user();
        assert!(user.media_url(MediaField::Avatar).is_some());
        assert_eq!(user.media_url(MediaField::CoverImage), None);
    }
}
