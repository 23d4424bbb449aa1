use std::fmt;
use std::ops::Index;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use time::Date;
use tracing::warn;
use uuid::Uuid;

use super::nutrients::{Nutrient, NutrientGroup, NUTRIENT_COUNT};
use super::record::{GroupValue, NutrientValue};

/// Anything carrying a persisted `foods_data` payload.
pub trait FoodsPayload {
    fn payload_id(&self) -> Uuid;
    fn foods_data(&self) -> Option<&Value>;
}

/// One running total per nutrient.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NutrientTotals([f64; NUTRIENT_COUNT]);

impl NutrientTotals {
    pub fn get(&self, nutrient: Nutrient) -> f64 {
        self.0[nutrient.index()]
    }

    /// Adds `amount` unless the total would stop being finite, in which
    /// case the total is left as it was and `false` is returned.
    fn add(&mut self, nutrient: Nutrient, amount: f64) -> bool {
        let slot = &mut self.0[nutrient.index()];
        let next = *slot + amount;
        if !next.is_finite() {
            return false;
        }
        *slot = next;
        true
    }

    pub fn formatted(&self) -> FormattedTotals {
        FormattedTotals(*self)
    }
}

impl Index<Nutrient> for NutrientTotals {
    type Output = f64;

    fn index(&self, nutrient: Nutrient) -> &f64 {
        &self.0[nutrient.index()]
    }
}

pub fn format_total(nutrient: Nutrient, value: f64) -> String {
    format!("{:.1} {}", value, nutrient.unit())
}

/// Totals rendered as `total_<nutrient>: "<value> <unit>"` fields.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FormattedTotals(NutrientTotals);

impl FormattedTotals {
    pub fn get(&self, nutrient: Nutrient) -> String {
        format_total(nutrient, self.0.get(nutrient))
    }
}

impl Serialize for FormattedTotals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(NUTRIENT_COUNT))?;
        for nutrient in Nutrient::ALL {
            map.serialize_entry(&nutrient.total_field(), &self.get(nutrient))?;
        }
        map.end()
    }
}

/// Why part of a meal payload was left out of the totals.
#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    PayloadNotObject,
    FoodsMissing,
    FoodsNotArray,
    FoodNotObject { food: usize },
    GroupNotObject { food: usize, group: NutrientGroup, raw: String },
    UnparsableQuantity { food: usize, nutrient: Nutrient, raw: String },
    QuantityOutOfRange { food: usize, nutrient: Nutrient, raw: String },
    TotalOverflow { food: usize, nutrient: Nutrient },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::PayloadNotObject => f.write_str("foods_data is not an object"),
            Reason::FoodsMissing => f.write_str("foods_data has no 'foods' key"),
            Reason::FoodsNotArray => f.write_str("'foods' is not an array"),
            Reason::FoodNotObject { food } => write!(f, "food #{food} is not an object"),
            Reason::GroupNotObject { food, group, raw } => {
                write!(f, "food #{food}: '{group}' is not an object: {raw}")
            }
            Reason::UnparsableQuantity { food, nutrient, raw } => {
                write!(f, "food #{food}: cannot parse {nutrient} from {raw}")
            }
            Reason::QuantityOutOfRange { food, nutrient, raw } => {
                write!(f, "food #{food}: {nutrient} {raw} is out of range")
            }
            Reason::TotalOverflow { food, nutrient } => {
                write!(f, "food #{food}: {nutrient} total would overflow")
            }
        }
    }
}

/// A skipped part of one meal, kept for debugging.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub meal_id: Uuid,
    pub reason: Reason,
}

/// Result of summing a set of meals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyTotals {
    pub totals: NutrientTotals,
    pub meal_count: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Sums every nutrient of every food across `meals`.
///
/// Never fails: structurally wrong data at any level contributes zero and
/// is reported in [`DailyTotals::diagnostics`]. Absent data is not reported.
pub fn aggregate<'a, I, M>(meals: I) -> DailyTotals
where
    I: IntoIterator<Item = &'a M>,
    M: FoodsPayload + 'a,
{
    let mut out = DailyTotals::default();
    for meal in meals {
        out.meal_count += 1;
        let meal_id = meal.payload_id();
        let mut notes = Vec::new();
        match foods_of(meal.foods_data()) {
            Ok(foods) => {
                for (idx, food) in foods.iter().enumerate() {
                    add_food(&mut out.totals, idx, food, &mut notes);
                }
            }
            Err(reason) => notes.push(reason),
        }
        out.diagnostics
            .extend(notes.into_iter().map(|reason| Diagnostic { meal_id, reason }));
    }
    out
}

fn foods_of(payload: Option<&Value>) -> Result<&[Value], Reason> {
    let obj = match payload {
        None | Some(Value::Null) => return Ok(&[]),
        Some(Value::Object(obj)) if obj.is_empty() => return Ok(&[]),
        Some(Value::Object(obj)) => obj,
        Some(_) => return Err(Reason::PayloadNotObject),
    };
    match obj.get("foods") {
        Some(Value::Array(foods)) => Ok(foods),
        Some(_) => Err(Reason::FoodsNotArray),
        None => Err(Reason::FoodsMissing),
    }
}

fn add_food(totals: &mut NutrientTotals, idx: usize, food: &Value, notes: &mut Vec<Reason>) {
    let Some(food) = food.as_object() else {
        notes.push(Reason::FoodNotObject { food: idx });
        return;
    };
    for group in NutrientGroup::ALL {
        match GroupValue::lookup(food, group) {
            GroupValue::Present(values) => add_group(totals, idx, group, values, notes),
            GroupValue::Malformed(raw) => notes.push(Reason::GroupNotObject {
                food: idx,
                group,
                raw: raw.to_string(),
            }),
            GroupValue::Missing => {}
        }
    }
}

fn add_group(
    totals: &mut NutrientTotals,
    idx: usize,
    group: NutrientGroup,
    values: &Map<String, Value>,
    notes: &mut Vec<Reason>,
) {
    for nutrient in group.nutrients() {
        let value = NutrientValue::classify(values.get(nutrient.key()));
        match &value {
            NutrientValue::Malformed(raw) => notes.push(Reason::UnparsableQuantity {
                food: idx,
                nutrient,
                raw: raw.to_string(),
            }),
            NutrientValue::OutOfRange(raw) => notes.push(Reason::QuantityOutOfRange {
                food: idx,
                nutrient,
                raw: raw.to_string(),
            }),
            NutrientValue::Missing | NutrientValue::Numeric(_) => {}
        }
        if !totals.add(nutrient, value.amount()) {
            notes.push(Reason::TotalOverflow { food: idx, nutrient });
        }
    }
}

/// Daily summary payload: the meals themselves plus their formatted totals.
#[derive(Debug, serde::Serialize)]
pub struct DailySummary<M> {
    #[serde(with = "crate::dates::iso_date")]
    pub date: Date,
    pub meals: Vec<M>,
    pub total_meals: usize,
    #[serde(flatten)]
    pub totals: FormattedTotals,
}

impl<M: FoodsPayload> DailySummary<M> {
    pub fn build(date: Date, meals: Vec<M>) -> Self {
        let daily = aggregate(&meals);
        for d in &daily.diagnostics {
            warn!(meal_id = %d.meal_id, reason = %d.reason, "nutrient data skipped");
        }
        Self {
            date,
            total_meals: daily.meal_count,
            totals: daily.totals.formatted(),
            meals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::date;

    struct TestMeal {
        id: Uuid,
        foods_data: Option<Value>,
    }

    impl TestMeal {
        fn new(foods_data: Value) -> Self {
            Self {
                id: Uuid::new_v4(),
                foods_data: Some(foods_data),
            }
        }
    }

    impl FoodsPayload for TestMeal {
        fn payload_id(&self) -> Uuid {
            self.id
        }
        fn foods_data(&self) -> Option<&Value> {
            self.foods_data.as_ref()
        }
    }

    impl serde::Serialize for TestMeal {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.foods_data.serialize(serializer)
        }
    }

    fn food(nutritions: Value) -> Value {
        json!({"foods": [{"name": "x", "portion_size": "1", "nutritions": nutritions}]})
    }

    #[test]
    fn empty_input_is_all_zero() {
        let daily = aggregate::<_, TestMeal>(&[]);
        assert_eq!(daily.meal_count, 0);
        assert!(daily.diagnostics.is_empty());
        let formatted = daily.totals.formatted();
        assert_eq!(formatted.get(Nutrient::Calories), "0.0 kcal");
        assert_eq!(formatted.get(Nutrient::Iron), "0.0 mg");
        assert_eq!(formatted.get(Nutrient::VitaminD), "0.0 mcg");
        assert_eq!(formatted.get(Nutrient::Fiber), "0.0 g");
    }

    #[test]
    fn order_does_not_change_totals() {
        let a = TestMeal::new(food(json!({"calories": "120.3 kcal", "fat": "3 g"})));
        let b = TestMeal::new(food(json!({"calories": "80.9 kcal", "carbs": "10 g"})));
        let ab = aggregate([&a, &b]);
        let ba = aggregate([&b, &a]);
        assert_eq!(ab.totals, ba.totals);
        assert_eq!(ab.totals.formatted().get(Nutrient::Calories), "201.2 kcal");
    }

    #[test]
    fn unparsable_quantity_counts_as_zero() {
        let meal = TestMeal::new(food(json!({"calories": "not-a-number", "protein": "4 g"})));
        let daily = aggregate([&meal]);
        assert_eq!(daily.totals[Nutrient::Calories], 0.0);
        assert_eq!(daily.totals[Nutrient::Protein], 4.0);
        assert_eq!(
            daily.diagnostics,
            vec![Diagnostic {
                meal_id: meal.id,
                reason: Reason::UnparsableQuantity {
                    food: 0,
                    nutrient: Nutrient::Calories,
                    raw: "\"not-a-number\"".into(),
                },
            }]
        );
    }

    #[test]
    fn food_without_groups_contributes_nothing() {
        let meal = TestMeal::new(json!({"foods": [{"name": "Apple"}]}));
        let daily = aggregate([&meal]);
        assert_eq!(daily.totals, NutrientTotals::default());
        assert_eq!(daily.meal_count, 1);
        assert!(daily.diagnostics.is_empty());
    }

    #[test]
    fn sums_unit_suffixed_values() {
        let a = TestMeal::new(food(json!({"calories": "100 kcal"})));
        let b = TestMeal::new(food(json!({"calories": "50.5 kcal"})));
        let daily = aggregate([&a, &b]);
        assert_eq!(daily.totals.formatted().get(Nutrient::Calories), "150.5 kcal");
    }

    #[test]
    fn string_payload_is_skipped_without_aborting_siblings() {
        let bad = TestMeal::new(json!("{\"foods\": []}"));
        let good = TestMeal::new(food(json!({"calories": "42 kcal"})));
        let daily = aggregate([&bad, &good]);
        assert_eq!(daily.meal_count, 2);
        assert_eq!(daily.totals[Nutrient::Calories], 42.0);
        assert_eq!(
            daily.diagnostics,
            vec![Diagnostic { meal_id: bad.id, reason: Reason::PayloadNotObject }]
        );
    }

    #[test]
    fn structural_faults_at_every_level() {
        let meal = TestMeal::new(json!({"foods": [
            "burger",
            {"name": "a", "nutritions": ["100 kcal"], "minerals": {"iron": "2 mg"}},
            {"name": "b", "vitamins": {"vitamin_c": 12, "vitamin_a": null}},
        ]}));
        let no_foods = TestMeal::new(json!({"items": []}));
        let foods_obj = TestMeal::new(json!({"foods": {"name": "c"}}));
        let absent = TestMeal { id: Uuid::new_v4(), foods_data: None };

        let daily = aggregate([&meal, &no_foods, &foods_obj, &absent]);
        assert_eq!(daily.meal_count, 4);
        assert_eq!(daily.totals[Nutrient::Iron], 2.0);
        assert_eq!(daily.totals[Nutrient::VitaminC], 12.0);
        assert_eq!(daily.totals[Nutrient::Calories], 0.0);

        let reasons: Vec<Reason> = daily.diagnostics.into_iter().map(|d| d.reason).collect();
        assert_eq!(
            reasons,
            vec![
                Reason::FoodNotObject { food: 0 },
                Reason::GroupNotObject {
                    food: 1,
                    group: NutrientGroup::Macronutrients,
                    raw: "[\"100 kcal\"]".into(),
                },
                Reason::FoodsMissing,
                Reason::FoodsNotArray,
            ]
        );
    }

    #[test]
    fn huge_quantities_never_reach_the_summary() {
        let a = TestMeal::new(food(json!({"calories": "1e308 kcal", "protein": "4 g"})));
        let b = TestMeal::new(food(json!({"calories": "1e308 kcal"})));
        let daily = aggregate([&a, &b]);

        assert_eq!(daily.totals[Nutrient::Calories], 0.0);
        assert_eq!(daily.totals.formatted().get(Nutrient::Calories), "0.0 kcal");
        assert_eq!(daily.totals.formatted().get(Nutrient::Protein), "4.0 g");
        assert_eq!(daily.diagnostics.len(), 2);
        assert_eq!(
            daily.diagnostics[0],
            Diagnostic {
                meal_id: a.id,
                reason: Reason::QuantityOutOfRange {
                    food: 0,
                    nutrient: Nutrient::Calories,
                    raw: "\"1e308 kcal\"".into(),
                },
            }
        );
    }

    #[test]
    fn running_total_stays_finite() {
        let mut totals = NutrientTotals::default();
        assert!(totals.add(Nutrient::Sodium, f64::MAX));
        assert!(!totals.add(Nutrient::Sodium, f64::MAX));
        assert_eq!(totals[Nutrient::Sodium], f64::MAX);
        assert!(totals.add(Nutrient::Sodium, -1.0e300));
        assert!(totals[Nutrient::Sodium].is_finite());
    }

    #[test]
    fn aggregation_is_repeatable() {
        let meal = TestMeal::new(food(json!({"calories": "33.33 kcal"})));
        let first = aggregate([&meal]);
        let second = aggregate([&meal]);
        assert_eq!(first, second);
    }

    #[test]
    fn daily_summary_serializes_flat_totals() {
        let a = TestMeal::new(food(json!({"calories": "200 kcal", "protein": "10 g"})));
        let b = TestMeal::new(food(json!({"calories": "150.5 kcal", "fat": "5 g"})));
        let summary = DailySummary::build(date!(2024 - 03 - 15), vec![a, b]);
        let out = serde_json::to_value(&summary).unwrap();

        assert_eq!(out["date"], "2024-03-15");
        assert_eq!(out["total_meals"], 2);
        assert_eq!(out["meals"].as_array().unwrap().len(), 2);
        assert_eq!(out["total_calories"], "350.5 kcal");
        assert_eq!(out["total_protein"], "10.0 g");
        assert_eq!(out["total_fat"], "5.0 g");
        assert_eq!(out["total_carbs"], "0.0 g");
        assert_eq!(out["total_sodium"], "0.0 mg");
        assert_eq!(out["total_vitamin_b12"], "0.0 mcg");

        let totals = out
            .as_object()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with("total_") && *k != "total_meals")
            .count();
        assert_eq!(totals, NUTRIENT_COUNT);
    }
}
