use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{
    error::FieldErrors,
    nutrition::{validate_foods_data, NutrientRecord},
};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;
const IMAGE_URL_MAX: usize = 500;

/// Slot of the day a meal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealSlot {
    pub fn parse(s: &str) -> Option<MealSlot> {
        match s {
            "breakfast" => Some(MealSlot::Breakfast),
            "lunch" => Some(MealSlot::Lunch),
            "dinner" => Some(MealSlot::Dinner),
            "snack" => Some(MealSlot::Snack),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "breakfast",
            MealSlot::Lunch => "lunch",
            MealSlot::Dinner => "dinner",
            MealSlot::Snack => "snack",
        }
    }
}

pub(crate) fn check_meal_time(errors: &mut FieldErrors, raw: Option<&str>) -> Option<MealSlot> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let slot = MealSlot::parse(raw);
    if slot.is_none() {
        errors.add("meal_time", format!("\"{raw}\" is not a valid choice."));
    }
    slot
}

fn check_image_url(errors: &mut FieldErrors, url: &str) {
    if url.len() > IMAGE_URL_MAX {
        errors.add("image_url", "Ensure this field has no more than 500 characters.");
    } else if !(url.starts_with("http://") || url.starts_with("https://")) || url.contains(char::is_whitespace) {
        errors.add("image_url", "Enter a valid URL.");
    }
}

fn check_foods(errors: &mut FieldErrors, foods_data: &Value) {
    if let Err(e) = validate_foods_data(foods_data) {
        errors.add("foods_data", e.to_string());
    }
}

/// `?page=&page_size=`; page numbers start at 1.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl Pagination {
    /// `(page, page_size)` with defaults and the size cap applied.
    pub fn resolve(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let size = self
            .page_size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        (page, size)
    }
}

#[derive(Debug, Serialize)]
pub struct MealPage<T> {
    pub count: i64,
    pub page: u32,
    pub page_size: u32,
    pub results: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct DailySummaryQuery {
    pub date: Option<String>,
}

/// Validated fields of a new meal.
#[derive(Debug, Clone)]
pub struct NewMeal {
    pub image_url: String,
    pub meal_date: Date,
    pub meal_time: Option<MealSlot>,
    pub foods_data: Value,
}

/// Body of `POST /meals` and `PUT|PATCH /meals/:id`.
#[derive(Debug, Default, Deserialize)]
pub struct MealInput {
    pub image_url: Option<String>,
    #[serde(default, with = "crate::dates::iso_date::option")]
    pub meal_date: Option<Date>,
    pub meal_time: Option<String>,
    pub foods_data: Option<Value>,
}

/// Fields to change on an existing meal; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct MealChanges {
    pub image_url: Option<String>,
    pub meal_date: Option<Date>,
    pub meal_time: Option<MealSlot>,
    pub foods_data: Option<Value>,
}

impl MealInput {
    pub fn validate_new(self, today: Date) -> Result<NewMeal, FieldErrors> {
        let mut errors = FieldErrors::default();

        let image_url = self.image_url.unwrap_or_default().trim().to_string();
        if image_url.is_empty() {
            errors.add("image_url", "This field is required.");
        } else {
            check_image_url(&mut errors, &image_url);
        }
        let meal_time = check_meal_time(&mut errors, self.meal_time.as_deref());
        let foods_data = match self.foods_data {
            Some(v) => {
                check_foods(&mut errors, &v);
                v
            }
            None => {
                errors.add("foods_data", "This field is required.");
                Value::Null
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(NewMeal {
            image_url,
            meal_date: self.meal_date.unwrap_or(today),
            meal_time,
            foods_data,
        })
    }

    /// `partial` is PATCH semantics; a full update needs `image_url` and
    /// `foods_data`.
    pub fn validate_changes(self, partial: bool) -> Result<MealChanges, FieldErrors> {
        let mut errors = FieldErrors::default();

        let image_url = self.image_url.map(|u| u.trim().to_string());
        match &image_url {
            Some(url) => check_image_url(&mut errors, url),
            None if !partial => errors.add("image_url", "This field is required."),
            None => {}
        }
        let meal_time = check_meal_time(&mut errors, self.meal_time.as_deref());
        match &self.foods_data {
            Some(v) => check_foods(&mut errors, v),
            None if !partial => errors.add("foods_data", "This field is required."),
            None => {}
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(MealChanges {
            image_url,
            meal_date: self.meal_date,
            meal_time,
            foods_data: self.foods_data,
        })
    }
}

/// Multipart fields shared by the analyze endpoints.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub meal_date: Option<Date>,
    pub meal_time: Option<MealSlot>,
    pub language: Option<String>,
}

#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: bytes::Bytes,
}

#[derive(Debug, Serialize)]
pub struct ImageAnalysis {
    pub image_url: String,
    pub foods: Vec<NutrientRecord>,
}

#[derive(Debug, Serialize)]
pub struct VoiceAnalysis {
    pub transcription: String,
    pub audio_url: String,
    pub foods: Vec<NutrientRecord>,
}

/// Row of `GET /meals`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MealListItem {
    pub id: Uuid,
    pub image_url: String,
    #[serde(with = "crate::dates::iso_date")]
    pub meal_date: Date,
    pub meal_time: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
