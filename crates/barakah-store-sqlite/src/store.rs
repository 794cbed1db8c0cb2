use barakah_storage::{
    ComplianceStatus, CreateProfileParams, CreateTransactionParams, OtpPurpose, OtpRecord,
    PasswordResetToken, Store, StoreError, TransactionId, TransactionRecord, UpsertOtpParams,
    UserId, UserProfile,
};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::{backend, from_millis, map_write_err, to_millis, SqliteStore};

type ProfileRow = (String, String, String, i64, bool, bool);
type OtpRow = (String, String, String, i64, i64, i64, bool);
type TransactionRow = (
    String,
    String,
    String,
    String,
    String,
    f64,
    i64,
    String,
    String,
    i64,
);

fn profile_from_row(row: ProfileRow) -> Result<UserProfile, StoreError> {
    let (id, full_name, email, created_at, email_verified, profile_complete) = row;
    Ok(UserProfile {
        id: UserId(Uuid::try_parse(&id).map_err(backend)?),
        full_name,
        email,
        created_at: from_millis(created_at)?,
        email_verified,
        profile_complete,
    })
}

fn otp_from_row(row: OtpRow) -> Result<OtpRecord, StoreError> {
    let (email, code, purpose, created_at, expires_at, attempt_count, verified) = row;
    Ok(OtpRecord {
        email,
        code,
        purpose: purpose.parse::<OtpPurpose>().map_err(backend)?,
        created_at: from_millis(created_at)?,
        expires_at: from_millis(expires_at)?,
        attempt_count: u32::try_from(attempt_count).map_err(backend)?,
        verified,
    })
}

fn transaction_from_row(row: TransactionRow) -> Result<TransactionRecord, StoreError> {
    let (
        id,
        user_id,
        source_transaction_id,
        merchant_name,
        category,
        amount,
        timestamp,
        display_date,
        compliance_status,
        created_at,
    ) = row;
    Ok(TransactionRecord {
        id: TransactionId(Uuid::try_parse(&id).map_err(backend)?),
        user_id: UserId(Uuid::try_parse(&user_id).map_err(backend)?),
        source_transaction_id,
        merchant_name,
        category,
        amount,
        timestamp: from_millis(timestamp)?,
        display_date,
        compliance_status: compliance_status
            .parse::<ComplianceStatus>()
            .map_err(backend)?,
        created_at: from_millis(created_at)?,
    })
}

impl SqliteStore {
    async fn delete_by_email(&self, table: &str, emails: &[String]) -> Result<u64, StoreError> {
        if emails.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("DELETE FROM {} WHERE email IN (", table));
        let mut sep = qb.separated(", ");
        for email in emails {
            sep.push_bind(email);
        }
        sep.push_unseparated(")");
        let res = qb.build().execute(&self.pool).await.map_err(backend)?;
        Ok(res.rows_affected())
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Users ──────────────────────────────────

    async fn create_profile(&self, p: &CreateProfileParams) -> Result<UserProfile, StoreError> {
        let created_at = Utc::now();
        sqlx::query(
            "INSERT INTO users(id,full_name,email,created_at,email_verified,profile_complete)
             VALUES(?,?,?,?,0,1)",
        )
        .bind(p.user_id.0.to_string())
        .bind(&p.full_name)
        .bind(&p.email)
        .bind(to_millis(created_at))
        .execute(&self.pool)
        .await
        .map_err(map_write_err)?;

        Ok(UserProfile {
            id: p.user_id.clone(),
            full_name: p.full_name.clone(),
            email: p.email.clone(),
            created_at: from_millis(to_millis(created_at))?,
            email_verified: false,
            profile_complete: true,
        })
    }

    async fn get_profile(&self, user_id: &UserId) -> Result<UserProfile, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id,full_name,email,created_at,email_verified,profile_complete
             FROM users WHERE id=?",
        )
        .bind(user_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.ok_or(StoreError::NotFound).and_then(profile_from_row)
    }

    async fn get_profile_by_email(&self, email: &str) -> Result<UserProfile, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id,full_name,email,created_at,email_verified,profile_complete
             FROM users WHERE email=?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.ok_or(StoreError::NotFound).and_then(profile_from_row)
    }

    async fn mark_email_verified(&self, user_id: &UserId) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE users SET email_verified=1 WHERE id=?")
            .bind(user_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ───────────────────────────── OTP Verifications ──────────────────────

    async fn upsert_otp(&self, p: &UpsertOtpParams) -> Result<OtpRecord, StoreError> {
        sqlx::query(
            "INSERT INTO otp_verifications(email,code,purpose,created_at,expires_at,attempt_count,verified)
             VALUES(?,?,?,?,?,0,0)
             ON CONFLICT(email) DO UPDATE SET
                code=excluded.code,
                purpose=excluded.purpose,
                created_at=excluded.created_at,
                expires_at=excluded.expires_at,
                attempt_count=0,
                verified=0",
        )
        .bind(&p.email)
        .bind(&p.code)
        .bind(p.purpose.as_str())
        .bind(to_millis(p.created_at))
        .bind(to_millis(p.expires_at))
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(OtpRecord {
            email: p.email.clone(),
            code: p.code.clone(),
            purpose: p.purpose,
            created_at: p.created_at,
            expires_at: p.expires_at,
            attempt_count: 0,
            verified: false,
        })
    }

    async fn get_otp(&self, email: &str) -> Result<OtpRecord, StoreError> {
        let row = sqlx::query_as::<_, OtpRow>(
            "SELECT email,code,purpose,created_at,expires_at,attempt_count,verified
             FROM otp_verifications WHERE email=?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.ok_or(StoreError::NotFound).and_then(otp_from_row)
    }

    async fn mark_otp_verified(
        &self,
        email: &str,
        code: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let res = sqlx::query(
            "UPDATE otp_verifications SET verified=1
             WHERE email=? AND code=? AND verified=0 AND attempt_count < ? AND expires_at >= ?",
        )
        .bind(email)
        .bind(code)
        .bind(i64::from(max_attempts))
        .bind(to_millis(now))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if res.rows_affected() == 1 {
            return Ok(());
        }
        // Nothing changed: the record is gone, or it was verified, replaced,
        // expired or locked after the caller read it.
        match self.get_otp(email).await {
            Ok(_) => Err(StoreError::Conflict),
            Err(e) => Err(e),
        }
    }

    async fn increment_otp_attempts(
        &self,
        email: &str,
        max_attempts: u32,
    ) -> Result<u32, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>(
            "UPDATE otp_verifications SET attempt_count = attempt_count + 1
             WHERE email=? AND verified=0 AND attempt_count < ?
             RETURNING attempt_count",
        )
        .bind(email)
        .bind(i64::from(max_attempts))
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        match row {
            Some((count,)) => u32::try_from(count).map_err(backend),
            None => match self.get_otp(email).await {
                Ok(_) => Err(StoreError::Conflict),
                Err(e) => Err(e),
            },
        }
    }

    async fn delete_otp(&self, email: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM otp_verifications WHERE email=?")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_otps_created_before(
        &self,
        created_before: DateTime<Utc>,
        after: Option<String>,
        limit: u32,
    ) -> Result<Vec<OtpRecord>, StoreError> {
        let rows = sqlx::query_as::<_, OtpRow>(
            "SELECT email,code,purpose,created_at,expires_at,attempt_count,verified
             FROM otp_verifications
             WHERE created_at < ? AND email > ?
             ORDER BY email
             LIMIT ?",
        )
        .bind(to_millis(created_before))
        .bind(after.unwrap_or_default())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(otp_from_row).collect()
    }

    async fn delete_otps(&self, emails: &[String]) -> Result<u64, StoreError> {
        self.delete_by_email("otp_verifications", emails).await
    }

    // ───────────────────────────── Password Reset Tokens ──────────────────

    async fn upsert_reset_token(&self, t: &PasswordResetToken) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO password_reset_tokens(email,token,created_at) VALUES(?,?,?)
             ON CONFLICT(email) DO UPDATE SET token=excluded.token, created_at=excluded.created_at",
        )
        .bind(&t.email)
        .bind(&t.token)
        .bind(to_millis(t.created_at))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_reset_token(&self, email: &str) -> Result<PasswordResetToken, StoreError> {
        let row = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT email,token,created_at FROM password_reset_tokens WHERE email=?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        match row {
            None => Err(StoreError::NotFound),
            Some((email, token, created_at)) => Ok(PasswordResetToken {
                email,
                token,
                created_at: from_millis(created_at)?,
            }),
        }
    }

    async fn delete_reset_token(&self, email: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM password_reset_tokens WHERE email=?")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_reset_tokens_created_before(
        &self,
        created_before: DateTime<Utc>,
        after: Option<String>,
        limit: u32,
    ) -> Result<Vec<PasswordResetToken>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT email,token,created_at FROM password_reset_tokens
             WHERE created_at < ? AND email > ?
             ORDER BY email
             LIMIT ?",
        )
        .bind(to_millis(created_before))
        .bind(after.unwrap_or_default())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter()
            .map(|(email, token, created_at)| {
                Ok(PasswordResetToken {
                    email,
                    token,
                    created_at: from_millis(created_at)?,
                })
            })
            .collect()
    }

    async fn delete_reset_tokens(&self, emails: &[String]) -> Result<u64, StoreError> {
        self.delete_by_email("password_reset_tokens", emails).await
    }

    // ───────────────────────────── Transactions ───────────────────────────

    async fn transaction_exists(
        &self,
        user_id: &UserId,
        source_transaction_id: &str,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT 1 FROM transactions WHERE user_id=? AND source_transaction_id=? LIMIT 1",
        )
        .bind(user_id.0.to_string())
        .bind(source_transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.is_some())
    }

    async fn insert_transaction(
        &self,
        p: &CreateTransactionParams,
    ) -> Result<TransactionRecord, StoreError> {
        let id = Uuid::now_v7();
        let created_at = from_millis(to_millis(Utc::now()))?;
        sqlx::query(
            "INSERT INTO transactions(id,user_id,source_transaction_id,merchant_name,category,
                amount,timestamp,display_date,compliance_status,created_at)
             VALUES(?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(p.user_id.0.to_string())
        .bind(&p.source_transaction_id)
        .bind(&p.merchant_name)
        .bind(&p.category)
        .bind(p.amount)
        .bind(to_millis(p.timestamp))
        .bind(&p.display_date)
        .bind(p.compliance_status.as_str())
        .bind(to_millis(created_at))
        .execute(&self.pool)
        .await
        .map_err(map_write_err)?;

        Ok(TransactionRecord {
            id: TransactionId(id),
            user_id: p.user_id.clone(),
            source_transaction_id: p.source_transaction_id.clone(),
            merchant_name: p.merchant_name.clone(),
            category: p.category.clone(),
            amount: p.amount,
            timestamp: p.timestamp,
            display_date: p.display_date.clone(),
            compliance_status: p.compliance_status,
            created_at,
        })
    }

    async fn list_transactions(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT id,user_id,source_transaction_id,merchant_name,category,amount,timestamp,
                display_date,compliance_status,created_at
             FROM transactions WHERE user_id=?
             ORDER BY timestamp DESC, id DESC",
        )
        .bind(user_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(transaction_from_row).collect()
    }
}
