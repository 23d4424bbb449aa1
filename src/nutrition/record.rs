use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::nutrients::NutrientGroup;

/// Nutrient key -> free-text quantity, e.g. `"protein" -> "12.5 g"`.
pub type NutrientGroupValues = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// One food item identified by the analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutrientRecord {
    pub name: String,
    #[serde(default)]
    pub portion_size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, alias = "macronutrients")]
    pub nutritions: NutrientGroupValues,
    #[serde(default)]
    pub minerals: NutrientGroupValues,
    #[serde(default)]
    pub vitamins: NutrientGroupValues,
    #[serde(default)]
    pub additional: NutrientGroupValues,
}

/// Structured result of one image or voice analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MealAnalysis {
    #[serde(default = "default_is_food")]
    pub is_food: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub foods: Vec<NutrientRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
}

fn default_is_food() -> bool {
    true
}

/// Leading number of a free-text quantity: `"12.5 g per serving"` gives
/// `12.5`. `None` when the first whitespace-delimited token is not a
/// finite number.
pub fn parse_leading_number(text: &str) -> Option<f64> {
    let head = text.split_whitespace().next()?;
    head.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Largest magnitude accepted for a single quantity.
pub const MAX_QUANTITY: f64 = 1.0e6;

/// A single nutrient quantity as found in a stored payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NutrientValue<'a> {
    Missing,
    Malformed(&'a Value),
    OutOfRange(&'a Value),
    Numeric(f64),
}

impl<'a> NutrientValue<'a> {
    pub fn classify(raw: Option<&'a Value>) -> Self {
        match raw {
            None | Some(Value::Null) => NutrientValue::Missing,
            Some(Value::String(s)) if s.trim().is_empty() => NutrientValue::Missing,
            Some(v @ Value::String(s)) => match parse_leading_number(s) {
                Some(value) => Self::bounded(v, value),
                None => NutrientValue::Malformed(v),
            },
            Some(v @ Value::Number(n)) => match n.as_f64().filter(|f| f.is_finite()) {
                Some(value) => Self::bounded(v, value),
                None => NutrientValue::Malformed(v),
            },
            Some(other) => NutrientValue::Malformed(other),
        }
    }

    fn bounded(raw: &'a Value, value: f64) -> Self {
        if value.abs() > MAX_QUANTITY {
            NutrientValue::OutOfRange(raw)
        } else {
            NutrientValue::Numeric(value)
        }
    }

    /// Contribution to a running total; anything but a number counts as zero.
    pub fn amount(&self) -> f64 {
        match self {
            NutrientValue::Numeric(value) => *value,
            NutrientValue::Missing
            | NutrientValue::Malformed(_)
            | NutrientValue::OutOfRange(_) => 0.0,
        }
    }
}

/// A nutrient group as found in a stored food item.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupValue<'a> {
    Missing,
    Malformed(&'a Value),
    Present(&'a Map<String, Value>),
}

impl<'a> GroupValue<'a> {
    pub fn lookup(food: &'a Map<String, Value>, group: NutrientGroup) -> Self {
        let raw = std::iter::once(group.key())
            .chain(group.aliases().iter().copied())
            .find_map(|key| food.get(key));
        match raw {
            None | Some(Value::Null) => GroupValue::Missing,
            Some(Value::Object(map)) => GroupValue::Present(map),
            Some(other) => GroupValue::Malformed(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FoodsDataError {
    #[error("foods_data must contain a 'foods' array")]
    MissingFoods,
    #[error("'foods' must be an array")]
    FoodsNotArray,
}

/// Write-time contract for a meal payload: an object holding a `foods` array.
///
/// Individual food items and nutrient keys are not checked here.
pub fn validate_foods_data(payload: &Value) -> Result<(), FoodsDataError> {
    let foods = payload
        .as_object()
        .and_then(|obj| obj.get("foods"))
        .ok_or(FoodsDataError::MissingFoods)?;
    if !foods.is_array() {
        return Err(FoodsDataError::FoodsNotArray);
    }
    Ok(())
}
