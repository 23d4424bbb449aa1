use serde::Deserialize;
use time::Date;

use crate::error::FieldErrors;

/// Profile fields accepted by create and update; all optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    #[serde(default, with = "crate::dates::iso_date::option")]
    pub date_of_birth: Option<Date>,
    pub height: Option<f64>,
    pub current_weight: Option<f64>,
    pub target_weight: Option<f64>,
    #[serde(default, with = "crate::dates::iso_date::option")]
    pub target_date: Option<Date>,
    pub activeness_level: Option<String>,
    pub goal: Option<String>,
    pub motivation: Option<String>,
    pub preferred_diet: Option<String>,
    pub diet_restrictions: Option<String>,
}

const MIN_AGE_YEARS: i32 = 13;

fn age_on(today: Date, born: Date) -> i32 {
    let before_birthday = (today.month() as u8, today.day()) < (born.month() as u8, born.day());
    today.year() - born.year() - i32::from(before_birthday)
}

impl ProfileInput {
    /// Field checks shared by create and update. `require_all` enforces the
    /// fields a first profile submission must carry.
    pub fn validate(&self, today: Date, require_all: bool) -> FieldErrors {
        let mut errors = FieldErrors::default();

        if require_all {
            let present = [
                ("first_name", self.first_name.is_some()),
                ("last_name", self.last_name.is_some()),
                ("gender", self.gender.is_some()),
                ("date_of_birth", self.date_of_birth.is_some()),
                ("height", self.height.is_some()),
                ("current_weight", self.current_weight.is_some()),
                ("target_weight", self.target_weight.is_some()),
                ("target_date", self.target_date.is_some()),
                ("activeness_level", self.activeness_level.is_some()),
                ("goal", self.goal.is_some()),
            ];
            for (field, ok) in present {
                if !ok {
                    errors.add(field, "This field is required.");
                }
            }
        }

        if let Some(born) = self.date_of_birth {
            if age_on(today, born) < MIN_AGE_YEARS {
                errors.add("date_of_birth", "User must be at least 13 years old.");
            }
        }
        if let Some(target) = self.target_date {
            if target <= today {
                errors.add("target_date", "Target date must be in the future.");
            }
        }
        let weights = [self.current_weight, self.target_weight];
        if weights.iter().flatten().any(|w| *w <= 0.0) {
            errors.add("non_field_errors", "Weight values must be positive.");
        }
        if matches!(self.height, Some(h) if h <= 0.0) {
            errors.add("non_field_errors", "Height must be positive.");
        }

        errors
    }
}
