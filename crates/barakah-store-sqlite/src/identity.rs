use barakah_storage::{IdentityError, IdentityProvider, IdentityUser, Session, UserId};
use chrono::Utc;
use rand::RngCore;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::{from_millis, to_millis, SqliteStore};

const MIB: u32 = 1024;
const MEMORY_COST_KIB: u32 = 19 * MIB;
const SALT_LEN: usize = 16;

fn id_err(e: impl std::fmt::Display) -> IdentityError {
    IdentityError::Backend(e.to_string())
}

/// Argon2id(password, salt) -> 32 bytes.
fn hash_password(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, IdentityError> {
    let params = argon2::Params::new(MEMORY_COST_KIB, 2, 1, Some(32)).map_err(id_err)?;
    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut hash = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, hash.as_mut())
        .map_err(id_err)?;
    Ok(hash)
}

fn new_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

fn new_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

type IdentityRow = (String, String, Option<String>, i64);

fn user_from_row(row: IdentityRow) -> Result<IdentityUser, IdentityError> {
    let (id, email, display_name, created_at) = row;
    Ok(IdentityUser {
        id: UserId(Uuid::try_parse(&id).map_err(id_err)?),
        email,
        display_name,
        created_at: from_millis(created_at).map_err(id_err)?,
    })
}

#[async_trait::async_trait]
impl IdentityProvider for SqliteStore {
    async fn create_user(&self, email: &str, password: &str) -> Result<IdentityUser, IdentityError> {
        let id = Uuid::now_v7();
        let salt = new_salt();
        let hash = hash_password(password, &salt)?;
        let created_at = Utc::now();

        sqlx::query(
            "INSERT INTO identities(id,email,password_salt,password_hash,display_name,created_at)
             VALUES(?,?,?,?,NULL,?)",
        )
        .bind(id.to_string())
        .bind(email)
        .bind(&salt[..])
        .bind(&hash[..])
        .bind(to_millis(created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let s = e.to_string();
            if s.contains("UNIQUE") {
                IdentityError::EmailInUse
            } else {
                IdentityError::Backend(s)
            }
        })?;

        Ok(IdentityUser {
            id: UserId(id),
            email: email.to_string(),
            display_name: None,
            created_at: from_millis(to_millis(created_at)).map_err(id_err)?,
        })
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityUser, IdentityError> {
        let row = sqlx::query_as::<_, (String, Option<String>, i64, Vec<u8>, Vec<u8>)>(
            "SELECT id,display_name,created_at,password_salt,password_hash
             FROM identities WHERE email=?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(id_err)?;

        let (id, display_name, created_at, salt, stored) =
            row.ok_or(IdentityError::InvalidCredentials)?;
        let candidate = hash_password(password, &salt)?;
        if !bool::from(candidate.as_ref().ct_eq(stored.as_slice())) {
            return Err(IdentityError::InvalidCredentials);
        }
        user_from_row((id, email.to_string(), display_name, created_at))
    }

    async fn open_session(&self, user_id: &UserId) -> Result<Session, IdentityError> {
        let token = new_session_token();
        let created_at = Utc::now();
        // Inserting through a SELECT refuses sessions for deleted accounts.
        let res = sqlx::query(
            "INSERT INTO identity_sessions(token,user_id,created_at)
             SELECT ?, id, ? FROM identities WHERE id=?",
        )
        .bind(&token)
        .bind(to_millis(created_at))
        .bind(user_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(id_err)?;
        if res.rows_affected() == 0 {
            return Err(IdentityError::NotFound);
        }

        Ok(Session {
            token,
            user_id: user_id.clone(),
            created_at,
        })
    }

    async fn sign_out(&self, session_token: &str) -> Result<(), IdentityError> {
        sqlx::query("DELETE FROM identity_sessions WHERE token=?")
            .bind(session_token)
            .execute(&self.pool)
            .await
            .map_err(id_err)?;
        Ok(())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<IdentityUser, IdentityError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            "SELECT id,email,display_name,created_at FROM identities WHERE email=?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(id_err)?;
        row.ok_or(IdentityError::NotFound).and_then(user_from_row)
    }

    async fn update_display_name(&self, user_id: &UserId, name: &str) -> Result<(), IdentityError> {
        let res = sqlx::query("UPDATE identities SET display_name=? WHERE id=?")
            .bind(name)
            .bind(user_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(id_err)?;
        if res.rows_affected() == 0 {
            return Err(IdentityError::NotFound);
        }
        Ok(())
    }

    async fn admin_update_password(
        &self,
        user_id: &UserId,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let salt = new_salt();
        let hash = hash_password(new_password, &salt)?;
        let mut tx = self.pool.begin().await.map_err(id_err)?;

        let res = sqlx::query("UPDATE identities SET password_salt=?, password_hash=? WHERE id=?")
            .bind(&salt[..])
            .bind(&hash[..])
            .bind(user_id.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(id_err)?;
        if res.rows_affected() == 0 {
            return Err(IdentityError::NotFound);
        }
        // A new password invalidates every open session.
        sqlx::query("DELETE FROM identity_sessions WHERE user_id=?")
            .bind(user_id.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(id_err)?;

        tx.commit().await.map_err(id_err)?;
        Ok(())
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<(), IdentityError> {
        let mut tx = self.pool.begin().await.map_err(id_err)?;
        sqlx::query("DELETE FROM identity_sessions WHERE user_id=?")
            .bind(user_id.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(id_err)?;
        let res = sqlx::query("DELETE FROM identities WHERE id=?")
            .bind(user_id.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(id_err)?;
        if res.rows_affected() == 0 {
            return Err(IdentityError::NotFound);
        }
        tx.commit().await.map_err(id_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_is_deterministic_per_salt() {
        let salt = [7u8; SALT_LEN];
        let a = hash_password("hunter22", &salt).unwrap();
        let b = hash_password("hunter22", &salt).unwrap();
        let c = hash_password("hunter23", &salt).unwrap();
        assert_eq!(a.as_ref(), b.as_ref());
        assert_ne!(a.as_ref(), c.as_ref());
    }

    #[test]
    fn test_session_token_format() {
        let token = new_session_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
