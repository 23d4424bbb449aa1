use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::dto::ProfileInput;

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    #[serde(skip_serializing)]
    pub google_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    #[serde(with = "crate::dates::iso_date::option")]
    pub date_of_birth: Option<Date>,
    pub height: Option<f64>,
    pub current_weight: Option<f64>,
    pub target_weight: Option<f64>,
    #[serde(with = "crate::dates::iso_date::option")]
    pub target_date: Option<Date>,
    pub activeness_level: Option<String>,
    pub goal: Option<String>,
    pub motivation: Option<String>,
    pub preferred_diet: Option<String>,
    pub diet_restrictions: Option<String>,
    pub profile_completed: bool,
    #[serde(skip_serializing)]
    pub fcm_token: Option<String>,
    #[serde(skip_serializing)]
    pub created_at: OffsetDateTime,
}

pub(crate) const USER_COLUMNS: &str = "id, email, phone_number, google_id, first_name, last_name, \
     gender, date_of_birth, height, current_weight, target_weight, target_date, \
     activeness_level, goal, motivation, preferred_diet, diet_restrictions, \
     profile_completed, fcm_token, created_at";

/// Identity confirmed by Google sign-in.
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleIdentity {
    pub google_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    /// Returns the user owning `phone`, creating an empty one on first login.
    pub async fn get_or_create_by_phone(db: &PgPool, phone: &str) -> anyhow::Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (phone_number)
            VALUES ($1)
            ON CONFLICT (phone_number) DO UPDATE SET phone_number = EXCLUDED.phone_number
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(phone)
            .fetch_one(db)
            .await
            .context("get or create user by phone")?;
        Ok(user)
    }

    /// Returns the user linked to a Google account, creating it with the
    /// Google profile as defaults and filling a missing email.
    pub async fn get_or_create_by_google(
        db: &PgPool,
        identity: &GoogleIdentity,
    ) -> anyhow::Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (google_id, email, first_name, last_name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (google_id) DO UPDATE
               SET email = COALESCE(NULLIF(users.email, ''), EXCLUDED.email)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&identity.google_id)
            .bind(&identity.email)
            .bind(&identity.first_name)
            .bind(&identity.last_name)
            .fetch_one(db)
            .await
            .context("get or create user by google id")?;
        Ok(user)
    }

    pub async fn set_fcm_token(db: &PgPool, id: Uuid, fcm_token: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET fcm_token = $2 WHERE id = $1")
            .bind(id)
            .bind(fcm_token)
            .execute(db)
            .await
            .context("set fcm token")?;
        Ok(())
    }

    /// Applies every provided profile field; `complete` also marks the
    /// profile as completed.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        input: &ProfileInput,
        complete: bool,
    ) -> anyhow::Result<User> {
        let sql = format!(
            r#"
            UPDATE users SET
                first_name        = COALESCE($2, first_name),
                last_name         = COALESCE($3, last_name),
                gender            = COALESCE($4, gender),
                date_of_birth     = COALESCE($5, date_of_birth),
                height            = COALESCE($6, height),
                current_weight    = COALESCE($7, current_weight),
                target_weight     = COALESCE($8, target_weight),
                target_date       = COALESCE($9, target_date),
                activeness_level  = COALESCE($10, activeness_level),
                goal              = COALESCE($11, goal),
                motivation        = COALESCE($12, motivation),
                preferred_diet    = COALESCE($13, preferred_diet),
                diet_restrictions = COALESCE($14, diet_restrictions),
                profile_completed = profile_completed OR $15
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(&input.first_name)
            .bind(&input.last_name)
            .bind(&input.gender)
            .bind(input.date_of_birth)
            .bind(input.height)
            .bind(input.current_weight)
            .bind(input.target_weight)
            .bind(input.target_date)
            .bind(&input.activeness_level)
            .bind(&input.goal)
            .bind(&input.motivation)
            .bind(&input.preferred_diet)
            .bind(&input.diet_restrictions)
            .bind(complete)
            .fetch_one(db)
            .await
            .context("update profile")?;
        Ok(user)
    }
}
