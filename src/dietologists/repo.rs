use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::repo::{User, USER_COLUMNS};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Dietologist {
    pub id: Uuid,
    pub phone_number: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Group {
    pub id: Uuid,
    pub dietologist_id: Uuid,
    pub name: String,
    pub code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Outcome of a pending request; new requests start as `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

/// Pending request joined with the requesting user and target group.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ClientRequestView {
    pub id: Uuid,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub group_id: Uuid,
    pub group_name: String,
    pub user_id: Uuid,
    pub user_first_name: Option<String>,
    pub user_last_name: Option<String>,
    pub user_phone_number: Option<String>,
}

const DIETOLOGIST_COLUMNS: &str =
    "id, phone_number, first_name, last_name, password_hash, is_active, created_at";

impl Dietologist {
    pub async fn find_active(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Dietologist>> {
        let sql = format!("SELECT {DIETOLOGIST_COLUMNS} FROM dietologists WHERE id = $1 AND is_active");
        let row = sqlx::query_as::<_, Dietologist>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find dietologist by id")?;
        Ok(row)
    }

    pub async fn find_active_by_phone(
        db: &PgPool,
        phone_number: &str,
    ) -> anyhow::Result<Option<Dietologist>> {
        let sql = format!(
            "SELECT {DIETOLOGIST_COLUMNS} FROM dietologists WHERE phone_number = $1 AND is_active"
        );
        let row = sqlx::query_as::<_, Dietologist>(&sql)
            .bind(phone_number)
            .fetch_optional(db)
            .await
            .context("find dietologist by phone")?;
        Ok(row)
    }

    pub async fn create(
        db: &PgPool,
        phone_number: &str,
        first_name: &str,
        last_name: &str,
        password_hash: &str,
    ) -> anyhow::Result<Dietologist> {
        let sql = format!(
            r#"
            INSERT INTO dietologists (phone_number, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {DIETOLOGIST_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Dietologist>(&sql)
            .bind(phone_number)
            .bind(first_name)
            .bind(last_name)
            .bind(password_hash)
            .fetch_one(db)
            .await
            .context("insert dietologist")?;
        Ok(row)
    }
}

impl Group {
    pub async fn create(
        db: &PgPool,
        dietologist_id: Uuid,
        name: &str,
        code: &str,
    ) -> anyhow::Result<Group> {
        let row = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (dietologist_id, name, code)
            VALUES ($1, $2, $3)
            RETURNING id, dietologist_id, name, code, created_at
            "#,
        )
        .bind(dietologist_id)
        .bind(name)
        .bind(code)
        .fetch_one(db)
        .await
        .context("insert group")?;
        Ok(row)
    }

    pub async fn list_for(db: &PgPool, dietologist_id: Uuid) -> anyhow::Result<Vec<Group>> {
        let rows = sqlx::query_as::<_, Group>(
            r#"
            SELECT id, dietologist_id, name, code, created_at
            FROM groups
            WHERE dietologist_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(dietologist_id)
        .fetch_all(db)
        .await
        .context("list groups")?;
        Ok(rows)
    }

    pub async fn find_owned(
        db: &PgPool,
        id: Uuid,
        dietologist_id: Uuid,
    ) -> anyhow::Result<Option<Group>> {
        let row = sqlx::query_as::<_, Group>(
            r#"
            SELECT id, dietologist_id, name, code, created_at
            FROM groups
            WHERE id = $1 AND dietologist_id = $2
            "#,
        )
        .bind(id)
        .bind(dietologist_id)
        .fetch_optional(db)
        .await
        .context("find owned group")?;
        Ok(row)
    }

    pub async fn find_by_code(db: &PgPool, code: &str) -> anyhow::Result<Option<Group>> {
        let row = sqlx::query_as::<_, Group>(
            "SELECT id, dietologist_id, name, code, created_at FROM groups WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(db)
        .await
        .context("find group by code")?;
        Ok(row)
    }

    /// Whether a group other than `except` already uses `code`.
    pub async fn code_taken(db: &PgPool, code: &str, except: Option<Uuid>) -> anyhow::Result<bool> {
        let (taken,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM groups WHERE code = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(code)
        .bind(except)
        .fetch_one(db)
        .await
        .context("check group code")?;
        Ok(taken)
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        code: Option<&str>,
    ) -> anyhow::Result<Group> {
        let row = sqlx::query_as::<_, Group>(
            r#"
            UPDATE groups
               SET name = COALESCE($2, name),
                   code = COALESCE($3, code)
             WHERE id = $1
            RETURNING id, dietologist_id, name, code, created_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(code)
        .fetch_one(db)
        .await
        .context("update group")?;
        Ok(row)
    }
}

pub struct ClientRequests;

impl ClientRequests {
    pub async fn pending_for(
        db: &PgPool,
        dietologist_id: Uuid,
    ) -> anyhow::Result<Vec<ClientRequestView>> {
        let rows = sqlx::query_as::<_, ClientRequestView>(
            r#"
            SELECT cr.id, cr.status, cr.created_at,
                   g.id AS group_id, g.name AS group_name,
                   u.id AS user_id, u.first_name AS user_first_name,
                   u.last_name AS user_last_name, u.phone_number AS user_phone_number
            FROM client_requests cr
            JOIN groups g ON g.id = cr.group_id
            JOIN users u ON u.id = cr.user_id
            WHERE g.dietologist_id = $1 AND cr.status = 'pending'
            ORDER BY cr.created_at DESC
            "#,
        )
        .bind(dietologist_id)
        .fetch_all(db)
        .await
        .context("list pending requests")?;
        Ok(rows)
    }

    /// Moves a pending request of one of the dietologist's groups to
    /// `status`. Returns false when no such request exists.
    pub async fn respond(
        db: &PgPool,
        request_id: Uuid,
        dietologist_id: Uuid,
        status: RequestStatus,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE client_requests cr
               SET status = $3, responded_at = now()
              FROM groups g
             WHERE cr.id = $1
               AND cr.group_id = g.id
               AND g.dietologist_id = $2
               AND cr.status = 'pending'
            "#,
        )
        .bind(request_id)
        .bind(dietologist_id)
        .bind(status.as_str())
        .execute(db)
        .await
        .context("respond to client request")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn clients_of(db: &PgPool, dietologist_id: Uuid) -> anyhow::Result<Vec<User>> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE id IN (
                SELECT cr.user_id
                FROM client_requests cr
                JOIN groups g ON g.id = cr.group_id
                WHERE g.dietologist_id = $1 AND cr.status = 'approved'
            )
            ORDER BY created_at DESC
            "#
        );
        let rows = sqlx::query_as::<_, User>(&sql)
            .bind(dietologist_id)
            .fetch_all(db)
            .await
            .context("list clients")?;
        Ok(rows)
    }

    pub async fn is_client(db: &PgPool, dietologist_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let (found,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM client_requests cr
                JOIN groups g ON g.id = cr.group_id
                WHERE g.dietologist_id = $1 AND cr.user_id = $2 AND cr.status = 'approved'
            )
            "#,
        )
        .bind(dietologist_id)
        .bind(user_id)
        .fetch_one(db)
        .await
        .context("check client")?;
        Ok(found)
    }

    pub async fn has_approved(db: &PgPool, user_id: Uuid) -> anyhow::Result<bool> {
        let (found,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM client_requests WHERE user_id = $1 AND status = 'approved')",
        )
        .bind(user_id)
        .fetch_one(db)
        .await
        .context("check approved request")?;
        Ok(found)
    }

    pub async fn has_pending(db: &PgPool, user_id: Uuid, group_id: Uuid) -> anyhow::Result<bool> {
        let (found,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM client_requests
                WHERE user_id = $1 AND group_id = $2 AND status = 'pending'
            )
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .fetch_one(db)
        .await
        .context("check pending request")?;
        Ok(found)
    }

    pub async fn create(db: &PgPool, user_id: Uuid, group_id: Uuid) -> anyhow::Result<Uuid> {
        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO client_requests (user_id, group_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(user_id)
        .bind(group_id)
        .fetch_one(db)
        .await
        .context("insert client request")?;
        Ok(id)
    }
}
