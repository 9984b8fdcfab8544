use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::query::{Field, FieldKind};
use crate::resources::{Input, NotCreatable, Resource, Violations};

use super::is_valid_email;

pub const ROLES: &[&str] = &["user", "guide", "lead-guide", "admin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub photo: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// True when the password was changed after a token issued at `iat`
    /// (unix seconds) was signed.
    pub fn changed_password_after(&self, iat: i64) -> bool {
        match self.password_changed_at {
            Some(changed) => iat < changed.unix_timestamp(),
            None => false,
        }
    }
}

/// Row to persist for a freshly registered user. The hash is already computed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Partial update of a user's public profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub photo: Option<String>,
}

impl Input for UserPatch {
    fn normalize(&mut self) {
        if let Some(name) = self.name.as_mut() {
            *name = name.trim().to_string();
        }
        if let Some(email) = self.email.as_mut() {
            *email = email.trim().to_lowercase();
        }
    }

    fn validate(&self, v: &mut Violations) {
        if matches!(self.name.as_deref(), Some("")) {
            v.push("Please tell us your name!");
        }
        if let Some(email) = self.email.as_deref() {
            if !is_valid_email(email) {
                v.push("Please provide a valid email");
            }
        }
    }
}

pub static USER_FIELDS: &[Field] = &[
    Field::new("id", "id", FieldKind::Uuid),
    Field::new("name", "name", FieldKind::Text),
    Field::new("email", "email", FieldKind::Text),
    Field::new("role", "role", FieldKind::Choice(ROLES)),
    Field::new("photo", "photo", FieldKind::Text),
    Field::new("createdAt", "created_at", FieldKind::Timestamp),
];

impl Resource for User {
    type Create = NotCreatable;
    type Patch = UserPatch;

    const NAME: &'static str = "user";
    const FIELDS: &'static [Field] = USER_FIELDS;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            role: Role::LeadGuide,
            photo: "default.jpg".into(),
            password_hash: "$argon2id$secret".into(),
            password_changed_at: None,
            password_reset_token: Some("abc".into()),
            password_reset_expires: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn serialization_hides_credentials() {
        let json = serde_json::to_value(user()).unwrap();
        assert_eq!(json["role"], "lead-guide");
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("passwordResetToken").is_none());
        assert!(json.get("active").is_none());
        assert!(json["createdAt"].is_string());
    }

    #[test]
    fn freshness_compares_whole_seconds() {
        let mut u = user();
        assert!(!u.changed_password_after(0));

        let changed = OffsetDateTime::now_utc();
        u.password_changed_at = Some(changed);
        let before = (changed - Duration::seconds(5)).unix_timestamp();
        assert!(u.changed_password_after(before));
        assert!(!u.changed_password_after(changed.unix_timestamp()));
    }

    #[test]
    fn patch_normalizes_and_validates() {
        let mut patch = UserPatch {
            name: Some("  ".into()),
            email: Some(" NOT-AN-EMAIL ".into()),
            ..Default::default()
        };
        patch.normalize();
        assert_eq!(patch.email.as_deref(), Some("not-an-email"));

        let mut v = Violations::default();
        patch.validate(&mut v);
        assert_eq!(v.len(), 2);
    }
}
