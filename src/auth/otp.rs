use anyhow::Context;
use rand::Rng;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Six-digit numeric one-time code.
pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

#[derive(Debug, Clone, FromRow)]
pub struct OtpSession {
    pub session: Uuid,
    pub phone_number: String,
    pub otp_code: String,
    pub expires_at: OffsetDateTime,
    pub is_verified: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OtpError {
    #[error("OTP expired")]
    Expired,
    #[error("Invalid OTP")]
    Mismatch,
}

impl OtpSession {
    pub async fn create(
        db: &PgPool,
        phone_number: &str,
        otp_code: &str,
        ttl_seconds: i64,
    ) -> anyhow::Result<OtpSession> {
        let expires_at = OffsetDateTime::now_utc() + Duration::seconds(ttl_seconds);
        let row = sqlx::query_as::<_, OtpSession>(
            r#"
            INSERT INTO otp_sessions (session, phone_number, otp_code, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING session, phone_number, otp_code, expires_at, is_verified, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(phone_number)
        .bind(otp_code)
        .bind(expires_at)
        .fetch_one(db)
        .await
        .context("insert otp session")?;
        Ok(row)
    }

    /// Unverified session issued to `phone_number`, if any.
    pub async fn find_pending(
        db: &PgPool,
        session: Uuid,
        phone_number: &str,
    ) -> anyhow::Result<Option<OtpSession>> {
        let row = sqlx::query_as::<_, OtpSession>(
            r#"
            SELECT session, phone_number, otp_code, expires_at, is_verified, created_at
            FROM otp_sessions
            WHERE session = $1 AND phone_number = $2 AND is_verified = FALSE
            "#,
        )
        .bind(session)
        .bind(phone_number)
        .fetch_optional(db)
        .await
        .context("find otp session")?;
        Ok(row)
    }

    /// Flips the session to verified. Returns `false` when another request
    /// got there first, so each code logs in at most once.
    pub async fn claim(db: &PgPool, session: Uuid) -> anyhow::Result<bool> {
        let done = sqlx::query(
            "UPDATE otp_sessions SET is_verified = TRUE WHERE session = $1 AND is_verified = FALSE",
        )
        .bind(session)
        .execute(db)
        .await
        .context("claim otp session")?;
        Ok(done.rows_affected() == 1)
    }

    /// Whole seconds until expiry, never negative.
    pub fn expiry_seconds(&self, now: OffsetDateTime) -> i64 {
        (self.expires_at - now).whole_seconds().max(0)
    }

    /// Expiry is checked before the code itself.
    pub fn check(&self, code: &str, now: OffsetDateTime) -> Result<(), OtpError> {
        if now > self.expires_at {
            return Err(OtpError::Expired);
        }
        if self.otp_code != code {
            return Err(OtpError::Mismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(code: &str, ttl: i64) -> (OtpSession, OffsetDateTime) {
        let now = OffsetDateTime::now_utc();
        let s = OtpSession {
            session: Uuid::new_v4(),
            phone_number: "+998901234567".into(),
            otp_code: code.into(),
            expires_at: now + Duration::seconds(ttl),
            is_verified: false,
            created_at: now,
        };
        (s, now)
    }

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..50 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn matching_code_within_ttl() {
        let (s, now) = session("123456", 120);
        assert_eq!(s.check("123456", now), Ok(()));
        assert_eq!(s.check("654321", now), Err(OtpError::Mismatch));
        assert_eq!(s.expiry_seconds(now), 120);
    }

    #[test]
    fn expiry_wins_over_mismatch() {
        let (s, now) = session("123456", 120);
        let later = now + Duration::seconds(121);
        assert_eq!(s.check("000000", later), Err(OtpError::Expired));
        assert_eq!(s.check("123456", later), Err(OtpError::Expired));
        assert_eq!(s.expiry_seconds(later), 0);
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL pointing at a scratch postgres"]
    async fn concurrent_claims_succeed_once() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&db).await.unwrap();

        let s = OtpSession::create(&db, "+998901234567", "123456", 120).await.unwrap();
        let (a, b) = tokio::join!(
            OtpSession::claim(&db, s.session),
            OtpSession::claim(&db, s.session)
        );
        let wins = [a.unwrap(), b.unwrap()].into_iter().filter(|w| *w).count();
        assert_eq!(wins, 1);
        assert!(!OtpSession::claim(&db, s.session).await.unwrap());
        assert!(OtpSession::find_pending(&db, s.session, "+998901234567")
            .await
            .unwrap()
            .is_none());
    }
}
