//! Nutrient records produced by meal analysis and their daily aggregation.

mod aggregate;
mod nutrients;
mod record;

pub use aggregate::{DailySummary, FoodsPayload};
pub use nutrients::NutrientGroup;
pub use record::{validate_foods_data, MealAnalysis, NutrientRecord};

#[cfg(test)]
pub use nutrients::{Nutrient, NUTRIENT_COUNT};
