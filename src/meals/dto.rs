use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// When in the day a meal is eaten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MealCategory {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            MealCategory::Breakfast => "breakfast",
            MealCategory::Lunch => "lunch",
            MealCategory::Dinner => "dinner",
            MealCategory::Snack => "snack",
        }
    }
}

impl fmt::Display for MealCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "breakfast" => Ok(MealCategory::Breakfast),
            "lunch" => Ok(MealCategory::Lunch),
            "dinner" => Ok(MealCategory::Dinner),
            "snack" => Ok(MealCategory::Snack),
            other => Err(format!("unknown meal type: {other}")),
        }
    }
}

/// Dietary context the client sends along with an analysis request.
/// Only the fields that end up in the prompt are read; the rest of the
/// onboarding payload is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserProfile {
    #[serde(default, rename = "primaryGoal", alias = "goal", alias = "primary_goal")]
    pub goal: Option<String>,
    #[serde(default, rename = "dietPattern", alias = "diet_pattern")]
    pub diet_pattern: Option<String>,
    #[serde(default)]
    pub exclusions: Vec<String>,
}

/// Decoded image bytes plus the mime type they were sent with.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub body: Bytes,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image: ImagePayload,
    pub category: MealCategory,
    pub profile: Option<UserProfile>,
}

/// Tags one upstream model session. Minted per request, never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(format!("meal_analysis_{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structured outcome of a meal-image analysis.
///
/// Numeric fields are never negative and `rating` is always 1, 2 or 3,
/// whether the record was decoded from the model output or built as a
/// fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionRecord {
    pub foods: Vec<String>,
    pub total_calories: u32,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fats_g: f64,
    /// 1 = needs improvement, 2 = okay, 3 = excellent
    pub rating: u8,
    pub suggestions: String,
    pub detailed_analysis: String,
}

/// POST /meals/analyze
#[derive(Debug, Deserialize)]
pub struct AnalyzeMealRequest {
    pub image_base64: String,
    pub meal_type: String,
    #[serde(default)]
    pub user_profile: Option<UserProfile>,
    #[serde(default)]
    pub content_type: Option<String>, // overrides a data: URL prefix; default image/jpeg
}

#[derive(Debug, Serialize)]
pub struct AnalyzeMealResponse {
    pub success: bool,
    pub meal_type: MealCategory,
    pub analysis: NutritionRecord,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub detail: String,
}
