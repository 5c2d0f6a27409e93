//! Account management: password storage, authentication and superuser bootstrap.
//!
//! Passwords never enter the `User` body. The salted hash lives in its own column, written in
//! the same transaction as the user row, and is stored as
//! `pbkdf2_sha256$<iterations>$<salt hex>$<base64 digest>`.

use crate::access::{Access, Actor, Capability};
use crate::audit::{self, AuditAction, AuditChanges};
use crate::config::CoreConfig;
use crate::constants::PASSWORD_HASH_SCHEME;
use crate::entity::{Entity, Stored};
use crate::error::FieldErrors;
use crate::models::users::User;
use crate::repository::Repository;
use crate::store::Database;
use crate::validation;
use crate::{CoreError, CoreResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use opencare_uuid::RecordId;
use rand::RngCore;
use rusqlite::{params, OptionalExtension};
use serde_json::{json, Value as Json};
use sha2::Sha256;
use subtle::ConstantTimeEq;

const MIN_PASSWORD_LEN: usize = 8;
const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

#[derive(Clone)]
pub struct AccountService {
    db: Database,
    cfg: CoreConfig,
    users: Repository<User>,
}

impl AccountService {
    pub fn new(db: Database, cfg: CoreConfig) -> Self {
        let users = Repository::new(db.clone(), cfg.clone());
        Self { db, cfg, users }
    }

    pub fn users(&self) -> &Repository<User> {
        &self.users
    }

    /// Create a user from client JSON. An optional write-only `password` key sets the
    /// initial password in the same transaction.
    pub fn create_user(&self, actor: &Actor, input: Json) -> CoreResult<Stored<User>> {
        User::schema().write.check(actor, "create", User::LABEL)?;
        let mut input = input;
        let password = match input.as_object_mut().and_then(|map| map.remove("password")) {
            None | Some(Json::Null) => None,
            Some(Json::String(password)) => Some(password),
            Some(_) => return Err(CoreError::field("password", "Not a valid string.")),
        };
        let user: User = validation::decode(input)?;
        if let Some(password) = &password {
            check_password(password, user.username.as_str())?;
        }
        let hash = password
            .map(|p| hash_password(&p, self.cfg.password_iterations()))
            .transpose()?;

        self.db.write(|tx| {
            let stored = self.users.insert_in(tx, actor, user)?;
            if let Some(hash) = &hash {
                tx.execute(
                    "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                    params![hash, stored.id.to_string()],
                )?;
            }
            Ok(stored)
        })
    }

    /// Replace a user's password. Administrators only.
    pub fn set_password(&self, actor: &Actor, id: &RecordId, password: &str) -> CoreResult<()> {
        Access::Requires(Capability::Administer).check(actor, "update", User::LABEL)?;
        let username = self
            .db
            .read(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT username FROM users WHERE id = ?1",
                        params![id.to_string()],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?)
            })?
            .ok_or_else(|| CoreError::not_found(User::LABEL, id))?;
        check_password(password, &username)?;
        let hash = hash_password(password, self.cfg.password_iterations())?;

        self.db.write(|tx| {
            let updated = tx.execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                params![hash, id.to_string()],
            )?;
            if updated == 0 {
                return Err(CoreError::not_found(User::LABEL, id));
            }
            audit::record(
                tx,
                actor,
                AuditAction::Update,
                User::LABEL,
                &id.to_string(),
                AuditChanges {
                    summary: Some("Password changed".into()),
                    fields: vec!["password".into()],
                    ..AuditChanges::default()
                },
            )?;
            Ok(())
        })
    }

    /// Check credentials, returning the matching active user.
    ///
    /// # Errors
    ///
    /// [`CoreError::Unauthenticated`] for unknown users, wrong passwords and inactive accounts
    /// alike.
    pub fn authenticate(&self, username: &str, password: &str) -> CoreResult<Stored<User>> {
        let row = self.db.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, password_hash FROM users WHERE username = ?1",
                    params![username],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
                )
                .optional()?)
        })?;
        let Some((id, Some(hash))) = row else {
            return Err(CoreError::Unauthenticated);
        };
        if !verify_password(password, &hash)? {
            return Err(CoreError::Unauthenticated);
        }
        let id = RecordId::parse(&id).map_err(|_| CoreError::Unauthenticated)?;
        self.active_user(&id)
    }

    /// The actor behind an authenticated user id. Fails if the user is gone or inactive.
    pub fn actor_for(&self, id: &RecordId) -> CoreResult<Actor> {
        let user = self.active_user(id)?;
        Ok(user.record.actor(user.id))
    }

    fn active_user(&self, id: &RecordId) -> CoreResult<Stored<User>> {
        let user = self
            .db
            .read(|conn| self.users.load_in(conn, id))?
            .ok_or(CoreError::Unauthenticated)?;
        if !user.record.is_active {
            return Err(CoreError::Unauthenticated);
        }
        Ok(user)
    }

    /// Create an active superuser, as the operator rather than any account.
    pub fn create_superuser(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str,
    ) -> CoreResult<Stored<User>> {
        self.create_user(
            &Actor::system(),
            json!({
                "username": username,
                "email": email.unwrap_or_default(),
                "role": "admin",
                "is_superuser": true,
                "is_active": true,
                "password": password,
            }),
        )
    }
}

/// Password strength rules applied on every change.
pub fn check_password(password: &str, username: &str) -> CoreResult<()> {
    let mut errors = FieldErrors::new();
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!(
                "This password is too short. It must contain at least {} characters.",
                MIN_PASSWORD_LEN
            ),
        );
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.add("password", "This password is entirely numeric.");
    }
    if password.eq_ignore_ascii_case(username) {
        errors.add("password", "The password is too similar to the username.");
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Validation(errors))
    }
}

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str, iterations: u32) -> CoreResult<String> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = pbkdf2_sha256(password.as_bytes(), &salt, iterations)?;
    Ok(format!(
        "{}${}${}${}",
        PASSWORD_HASH_SCHEME,
        iterations,
        hex::encode(salt),
        STANDARD.encode(digest)
    ))
}

/// Verify `password` against a stored hash in constant time.
pub fn verify_password(password: &str, stored: &str) -> CoreResult<bool> {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(CoreError::PasswordHash("malformed password hash".into()));
    };
    if scheme != PASSWORD_HASH_SCHEME {
        return Err(CoreError::PasswordHash(format!("unknown scheme {}", scheme)));
    }
    let iterations: u32 = iterations
        .parse()
        .map_err(|_| CoreError::PasswordHash("bad iteration count".into()))?;
    let salt = hex::decode(salt).map_err(|e| CoreError::PasswordHash(e.to_string()))?;
    let expected = STANDARD
        .decode(expected)
        .map_err(|e| CoreError::PasswordHash(e.to_string()))?;

    let actual = pbkdf2_sha256(password.as_bytes(), &salt, iterations)?;
    Ok(actual.as_slice().ct_eq(expected.as_slice()).into())
}

/// PBKDF2 with HMAC-SHA256, producing one 32-byte block.
fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> CoreResult<[u8; DIGEST_LEN]> {
    if iterations == 0 {
        return Err(CoreError::PasswordHash("iteration count must be positive".into()));
    }
    let mut digest = [0u8; DIGEST_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut digest);
    Ok(digest)
}
