use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::dto::{MealChanges, MealListItem, NewMeal};
use crate::nutrition::FoodsPayload;

/// A logged meal and its analyzed food items.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Meal {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub image_url: String,
    #[serde(with = "crate::dates::iso_date")]
    pub meal_date: Date,
    pub meal_time: Option<String>,
    pub foods_data: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FoodsPayload for Meal {
    fn payload_id(&self) -> Uuid {
        self.id
    }

    fn foods_data(&self) -> Option<&Value> {
        Some(&self.foods_data)
    }
}

const MEAL_COLUMNS: &str =
    "id, user_id, image_url, meal_date, meal_time, foods_data, created_at, updated_at";

impl Meal {
    pub async fn create(db: &PgPool, user_id: Uuid, meal: &NewMeal) -> anyhow::Result<Meal> {
        let sql = format!(
            r#"
            INSERT INTO meals (user_id, image_url, meal_date, meal_time, foods_data)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {MEAL_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Meal>(&sql)
            .bind(user_id)
            .bind(&meal.image_url)
            .bind(meal.meal_date)
            .bind(meal.meal_time.map(|s| s.as_str()))
            .bind(&meal.foods_data)
            .fetch_one(db)
            .await
            .context("insert meal")?;
        Ok(row)
    }

    pub async fn find_owned(db: &PgPool, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Meal>> {
        let sql = format!("SELECT {MEAL_COLUMNS} FROM meals WHERE id = $1 AND user_id = $2");
        let row = sqlx::query_as::<_, Meal>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(db)
            .await
            .context("find meal")?;
        Ok(row)
    }

    /// `None` when the meal does not exist or belongs to someone else.
    pub async fn update(
        db: &PgPool,
        id: Uuid,
        user_id: Uuid,
        changes: &MealChanges,
    ) -> anyhow::Result<Option<Meal>> {
        let sql = format!(
            r#"
            UPDATE meals SET
                image_url  = COALESCE($3, image_url),
                meal_date  = COALESCE($4, meal_date),
                meal_time  = COALESCE($5, meal_time),
                foods_data = COALESCE($6, foods_data),
                updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING {MEAL_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Meal>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(&changes.image_url)
            .bind(changes.meal_date)
            .bind(changes.meal_time.map(|s| s.as_str()))
            .bind(&changes.foods_data)
            .fetch_optional(db)
            .await
            .context("update meal")?;
        Ok(row)
    }

    pub async fn delete(db: &PgPool, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM meals WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(db)
            .await
            .context("delete meal")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn list_page(
        db: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<MealListItem>> {
        let rows = sqlx::query_as::<_, MealListItem>(
            r#"
            SELECT id, image_url, meal_date, meal_time, created_at
            FROM meals
            WHERE user_id = $1
            ORDER BY meal_date DESC, created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("list meals")?;
        Ok(rows)
    }

    pub async fn count_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM meals WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(db)
            .await
            .context("count meals")?;
        Ok(count)
    }

    /// Meals logged for one calendar date, oldest first.
    pub async fn list_by_date(db: &PgPool, user_id: Uuid, date: Date) -> anyhow::Result<Vec<Meal>> {
        let sql = format!(
            r#"
            SELECT {MEAL_COLUMNS}
            FROM meals
            WHERE user_id = $1 AND meal_date = $2
            ORDER BY created_at
            "#
        );
        let rows = sqlx::query_as::<_, Meal>(&sql)
            .bind(user_id)
            .bind(date)
            .fetch_all(db)
            .await
            .context("list meals by date")?;
        Ok(rows)
    }

    /// Every meal of a user, newest date first.
    pub async fn list_all_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Meal>> {
        let sql = format!(
            r#"
            SELECT {MEAL_COLUMNS}
            FROM meals
            WHERE user_id = $1
            ORDER BY meal_date DESC, created_at DESC
            "#
        );
        let rows = sqlx::query_as::<_, Meal>(&sql)
            .bind(user_id)
            .fetch_all(db)
            .await
            .context("list meals for user")?;
        Ok(rows)
    }
}
