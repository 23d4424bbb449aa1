use std::fmt;

/// Display unit attached to a nutrient total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Kcal,
    Gram,
    Milligram,
    Microgram,
}

impl Unit {
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Kcal => "kcal",
            Unit::Gram => "g",
            Unit::Milligram => "mg",
            Unit::Microgram => "mcg",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The four groupings a food record splits its nutrients into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NutrientGroup {
    Macronutrients,
    Minerals,
    Vitamins,
    Additional,
}

impl NutrientGroup {
    pub const ALL: [NutrientGroup; 4] = [
        NutrientGroup::Macronutrients,
        NutrientGroup::Minerals,
        NutrientGroup::Vitamins,
        NutrientGroup::Additional,
    ];

    /// Field name of the group inside a stored food record.
    pub fn key(self) -> &'static str {
        match self {
            NutrientGroup::Macronutrients => "nutritions",
            NutrientGroup::Minerals => "minerals",
            NutrientGroup::Vitamins => "vitamins",
            NutrientGroup::Additional => "additional",
        }
    }

    /// Alternative field names accepted when reading records.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            NutrientGroup::Macronutrients => &["macronutrients"],
            _ => &[],
        }
    }

    pub fn nutrients(self) -> impl Iterator<Item = Nutrient> {
        Nutrient::ALL.into_iter().filter(move |n| n.group() == self)
    }
}

impl fmt::Display for NutrientGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

pub const NUTRIENT_COUNT: usize = 19;

/// Every nutrient tracked in a daily summary.
///
/// Declaration order is the display order of the summary fields and the
/// index into [`super::aggregate::NutrientTotals`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Nutrient {
    Calories,
    Carbs,
    Fat,
    Protein,
    Calcium,
    Iron,
    Magnesium,
    Potassium,
    Zinc,
    VitaminA,
    VitaminB12,
    VitaminB9,
    VitaminC,
    VitaminD,
    Cholesterol,
    Fiber,
    Omega3,
    SaturatedFat,
    Sodium,
}

impl Nutrient {
    pub const ALL: [Nutrient; NUTRIENT_COUNT] = [
        Nutrient::Calories,
        Nutrient::Carbs,
        Nutrient::Fat,
        Nutrient::Protein,
        Nutrient::Calcium,
        Nutrient::Iron,
        Nutrient::Magnesium,
        Nutrient::Potassium,
        Nutrient::Zinc,
        Nutrient::VitaminA,
        Nutrient::VitaminB12,
        Nutrient::VitaminB9,
        Nutrient::VitaminC,
        Nutrient::VitaminD,
        Nutrient::Cholesterol,
        Nutrient::Fiber,
        Nutrient::Omega3,
        Nutrient::SaturatedFat,
        Nutrient::Sodium,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Key of the nutrient inside its group mapping.
    pub fn key(self) -> &'static str {
        match self {
            Nutrient::Calories => "calories",
            Nutrient::Carbs => "carbs",
            Nutrient::Fat => "fat",
            Nutrient::Protein => "protein",
            Nutrient::Calcium => "calcium",
            Nutrient::Iron => "iron",
            Nutrient::Magnesium => "magnesium",
            Nutrient::Potassium => "potassium",
            Nutrient::Zinc => "zinc",
            Nutrient::VitaminA => "vitamin_a",
            Nutrient::VitaminB12 => "vitamin_b12",
            Nutrient::VitaminB9 => "vitamin_b9",
            Nutrient::VitaminC => "vitamin_c",
            Nutrient::VitaminD => "vitamin_d",
            Nutrient::Cholesterol => "cholesterol",
            Nutrient::Fiber => "fiber",
            Nutrient::Omega3 => "omega_3",
            Nutrient::SaturatedFat => "saturated_fat",
            Nutrient::Sodium => "sodium",
        }
    }

    pub fn group(self) -> NutrientGroup {
        use Nutrient::*;
        match self {
            Calories | Carbs | Fat | Protein => NutrientGroup::Macronutrients,
            Calcium | Iron | Magnesium | Potassium | Zinc => NutrientGroup::Minerals,
            VitaminA | VitaminB12 | VitaminB9 | VitaminC | VitaminD => NutrientGroup::Vitamins,
            Cholesterol | Fiber | Omega3 | SaturatedFat | Sodium => NutrientGroup::Additional,
        }
    }

    pub fn unit(self) -> Unit {
        use Nutrient::*;
        match self {
            Calories => Unit::Kcal,
            Carbs | Fat | Protein | Fiber | Omega3 | SaturatedFat => Unit::Gram,
            Calcium | Iron | Magnesium | Potassium | Zinc | VitaminC | Cholesterol | Sodium => {
                Unit::Milligram
            }
            VitaminA | VitaminB12 | VitaminB9 | VitaminD => Unit::Microgram,
        }
    }

    /// Name of the field carrying this nutrient in the daily summary.
    pub fn total_field(self) -> String {
        format!("total_{}", self.key())
    }
}

impl fmt::Display for Nutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_declaration_order() {
        for (i, n) in Nutrient::ALL.iter().enumerate() {
            assert_eq!(n.index(), i);
        }
    }

    #[test]
    fn groups_partition_all_nutrients() {
        let sizes: Vec<usize> = NutrientGroup::ALL
            .iter()
            .map(|g| g.nutrients().count())
            .collect();
        assert_eq!(sizes, vec![4, 5, 5, 5]);
        assert_eq!(sizes.iter().sum::<usize>(), NUTRIENT_COUNT);
    }

    #[test]
    fn unit_table() {
        assert_eq!(Nutrient::Calories.unit().symbol(), "kcal");
        assert_eq!(Nutrient::Omega3.unit(), Unit::Gram);
        assert_eq!(Nutrient::SaturatedFat.unit(), Unit::Gram);
        assert_eq!(Nutrient::VitaminC.unit(), Unit::Milligram);
        assert_eq!(Nutrient::Cholesterol.unit(), Unit::Milligram);
        assert_eq!(Nutrient::VitaminB9.unit().symbol(), "mcg");
        assert_eq!(Nutrient::VitaminD.unit(), Unit::Microgram);
    }

    #[test]
    fn keys_are_unique() {
        let keys: std::collections::HashSet<&str> = Nutrient::ALL.iter().map(|n| n.key()).collect();
        assert_eq!(keys.len(), NUTRIENT_COUNT);
        assert_eq!(Nutrient::Omega3.total_field(), "total_omega_3");
    }
}
