//! Derived clinical metrics computed from body-measurement answers.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::answers::AnswerValue;

pub const WEIGHT_KEY: &str = "weight";
pub const HEIGHT_FEET_KEY: &str = "heightFeet";
pub const HEIGHT_INCHES_KEY: &str = "heightInches";
/// Composite `{feet, inches}` answer used when separate feet/inches keys are absent.
pub const HEIGHT_KEY: &str = "height";

pub const BMI_KEY: &str = "bmi";
pub const BMI_CATEGORY_KEY: &str = "bmiCategory";
pub const HEIGHT_AND_WEIGHT_KEY: &str = "heightAndWeight";

/// Answer keys whose mutation triggers a metric recompute.
pub const METRIC_INPUT_KEYS: &[&str] = &[WEIGHT_KEY, HEIGHT_FEET_KEY, HEIGHT_INCHES_KEY, HEIGHT_KEY];
/// Keys owned by the calculator; never written by callers.
pub const DERIVED_KEYS: &[&str] = &[BMI_KEY, BMI_CATEGORY_KEY, HEIGHT_AND_WEIGHT_KEY];

const INCHES_TO_METERS: f64 = 0.0254;
const POUNDS_TO_KILOGRAMS: f64 = 0.453592;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 18.5 {
            BmiCategory::Underweight
        } else if bmi < 25.0 {
            BmiCategory::Normal
        } else if bmi < 30.0 {
            BmiCategory::Overweight
        } else {
            BmiCategory::Obese
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BmiCategory::Underweight => "Underweight",
            BmiCategory::Normal => "Normal",
            BmiCategory::Overweight => "Overweight",
            BmiCategory::Obese => "Obese",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BmiReading {
    pub bmi: f64,
    pub category: BmiCategory,
}

impl BmiReading {
    /// BMI rounded to one decimal place, as shown to patients.
    pub fn rounded(&self) -> f64 {
        (self.bmi * 10.0).round() / 10.0
    }
}

/// Computes BMI from imperial measurements.
///
/// Returns `None` when the inputs cannot describe a real body: non-positive
/// weight, negative or NaN dimensions, or a zero total height.
pub fn compute_bmi(weight_lbs: f64, feet: f64, inches: f64) -> Option<BmiReading> {
    if !weight_lbs.is_finite() || weight_lbs <= 0.0 {
        return None;
    }
    if !feet.is_finite() || !inches.is_finite() || feet < 0.0 || inches < 0.0 {
        return None;
    }
    let total_inches = feet * 12.0 + inches;
    if total_inches == 0.0 {
        return None;
    }
    let height_m = total_inches * INCHES_TO_METERS;
    let weight_kg = weight_lbs * POUNDS_TO_KILOGRAMS;
    let bmi = weight_kg / (height_m * height_m);
    Some(BmiReading {
        bmi,
        category: BmiCategory::from_bmi(bmi),
    })
}

/// Full set of derived values for the current answers.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMetrics {
    pub reading: BmiReading,
    pub weight_lbs: f64,
    pub feet: f64,
    pub inches: f64,
}

impl DerivedMetrics {
    /// Synthetic answer entries in store form.
    pub fn entries(&self) -> [(&'static str, AnswerValue); 3] {
        [
            (
                BMI_KEY,
                AnswerValue::Text(format!("{:.1}", self.reading.bmi)),
            ),
            (
                BMI_CATEGORY_KEY,
                AnswerValue::Text(self.reading.category.as_str().to_string()),
            ),
            (
                HEIGHT_AND_WEIGHT_KEY,
                AnswerValue::Text(format!(
                    "{}'{}\", {} lbs",
                    self.feet, self.inches, self.weight_lbs
                )),
            ),
        ]
    }
}

/// Reads metric inputs from an answer map and computes BMI when all are usable.
pub fn derive_metrics(answers: &BTreeMap<String, AnswerValue>) -> Option<DerivedMetrics> {
    let weight_lbs = answers.get(WEIGHT_KEY)?.as_number()?;
    let (feet, inches) = match (
        answers.get(HEIGHT_FEET_KEY).and_then(AnswerValue::as_number),
        answers.get(HEIGHT_INCHES_KEY).and_then(AnswerValue::as_number),
    ) {
        (Some(feet), Some(inches)) => (feet, inches),
        _ => match answers.get(HEIGHT_KEY)? {
            AnswerValue::Height { feet, inches } => (*feet, *inches),
            _ => return None,
        },
    };
    let reading = compute_bmi(weight_lbs, feet, inches)?;
    Some(DerivedMetrics {
        reading,
        weight_lbs,
        feet,
        inches,
    })
}
