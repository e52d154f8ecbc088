use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use super::dto::NutritionRecord;

pub const FALLBACK_FOOD: &str = "Analysis in progress";
const NEUTRAL_RATING: u8 = 2;

lazy_static! {
    // first '{' through last '}', newlines included
    static ref JSON_OBJECT_RE: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
    // a whole number, thousands grouped with ',' or '_' allowed, then an optional unit
    static ref NUMBER_WITH_UNIT_RE: Regex =
        Regex::new(r"^\s*(-?(?:\d{1,3}(?:[,_]\d{3})+|\d+)(?:\.\d+)?)\s*[a-zA-Z%]*\s*$").unwrap();
}

/// Outcome of reading the model's text. Both variants hold a record that is
/// safe to hand to clients; `Fallback` means the structure could not be
/// recovered and the raw text was kept instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAnalysis {
    Parsed(NutritionRecord),
    Fallback(NutritionRecord),
}

impl ParsedAnalysis {
    pub fn record(&self) -> &NutritionRecord {
        match self {
            ParsedAnalysis::Parsed(r) | ParsedAnalysis::Fallback(r) => r,
        }
    }

    pub fn into_record(self) -> NutritionRecord {
        match self {
            ParsedAnalysis::Parsed(r) | ParsedAnalysis::Fallback(r) => r,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ParsedAnalysis::Fallback(_))
    }
}

/// Never fails: text without a decodable object becomes a fallback record.
pub fn parse_model_response(raw: &str) -> ParsedAnalysis {
    let Some(m) = JSON_OBJECT_RE.find(raw) else {
        debug!("no json object in model response; using fallback");
        return ParsedAnalysis::Fallback(fallback_record(raw));
    };

    let decoded = serde_json::from_str::<RawAnalysis>(m.as_str())
        .map_err(|e| e.to_string())
        .and_then(NutritionRecord::try_from);

    match decoded {
        Ok(record) => ParsedAnalysis::Parsed(record),
        Err(e) => {
            warn!(error = %e, "model response json did not decode; using fallback");
            ParsedAnalysis::Fallback(fallback_record(raw))
        }
    }
}

pub fn fallback_record(raw: &str) -> NutritionRecord {
    NutritionRecord {
        foods: vec![FALLBACK_FOOD.to_string()],
        total_calories: 0,
        protein_g: 0.0,
        carbs_g: 0.0,
        fats_g: 0.0,
        rating: NEUTRAL_RATING,
        suggestions: raw.to_string(),
        detailed_analysis: raw.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    foods: Vec<FoodEntry>,
    total_calories: Numeric,
    protein_g: Numeric,
    carbs_g: Numeric,
    fats_g: Numeric,
    rating: Numeric,
    #[serde(default)]
    suggestions: Option<Text>,
    #[serde(default)]
    detailed_analysis: Option<Text>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FoodEntry {
    Name(String),
    Item {
        name: Option<String>,
        item: Option<String>,
        food: Option<String>,
    },
}

impl FoodEntry {
    fn into_name(self) -> Option<String> {
        match self {
            FoodEntry::Name(n) => Some(n),
            FoodEntry::Item { name, item, food } => name.or(item).or(food),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    /// Accepts `12`, `12.5`, `"12"`, `"12 g"` and `"1,200 kcal"` style values.
    /// Ranges and prose (`"12-15g"`, `"about 300"`) are rejected.
    fn value(&self) -> Option<f64> {
        match self {
            Numeric::Number(n) => Some(*n),
            Numeric::Text(s) => NUMBER_WITH_UNIT_RE
                .captures(s)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().replace([',', '_'], "").parse::<f64>().ok()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Text {
    One(String),
    Many(Vec<String>),
}

impl Text {
    fn into_string(self) -> String {
        match self {
            Text::One(s) => s,
            Text::Many(lines) => lines.join("\n"),
        }
    }
}

impl TryFrom<RawAnalysis> for NutritionRecord {
    type Error = String;

    fn try_from(raw: RawAnalysis) -> Result<Self, Self::Error> {
        let foods = raw
            .foods
            .into_iter()
            .map(|f| f.into_name().ok_or_else(|| "food entry has no name".to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        let calories = non_negative("total_calories", number("total_calories", &raw.total_calories)?);

        Ok(NutritionRecord {
            foods,
            total_calories: calories.round() as u32,
            protein_g: non_negative("protein_g", number("protein_g", &raw.protein_g)?),
            carbs_g: non_negative("carbs_g", number("carbs_g", &raw.carbs_g)?),
            fats_g: non_negative("fats_g", number("fats_g", &raw.fats_g)?),
            rating: rating(number("rating", &raw.rating)?),
            suggestions: raw.suggestions.map(Text::into_string).unwrap_or_default(),
            detailed_analysis: raw
                .detailed_analysis
                .map(Text::into_string)
                .unwrap_or_default(),
        })
    }
}

fn number(field: &str, v: &Numeric) -> Result<f64, String> {
    v.value()
        .filter(|n| n.is_finite())
        .ok_or_else(|| format!("{field} is not numeric: {v:?}"))
}

fn non_negative(field: &str, v: f64) -> f64 {
    if v < 0.0 {
        warn!(field, value = v, "negative value from model; using 0");
        0.0
    } else {
        v
    }
}

fn rating(v: f64) -> u8 {
    let r = v.round();
    if (1.0..=3.0).contains(&r) {
        r as u8
    } else {
        let clamped = r.clamp(1.0, 3.0) as u8;
        warn!(value = v, clamped, "rating outside 1..=3 from model");
        clamped
    }
}

#[cfg(test)]
mod parser_tests {
    use super::*;

    const BREAKFAST: &str = r#"Here you go: {"foods": ["oatmeal","banana"], "total_calories": 350, "protein_g": 10, "carbs_g": 60, "fats_g": 5, "rating": 3, "suggestions": "add protein", "detailed_analysis": "balanced breakfast"}"#;

    fn assert_fallback(raw: &str, parsed: &ParsedAnalysis) {
        assert!(parsed.is_fallback());
        let r = parsed.record();
        assert_eq!(r.foods, vec![FALLBACK_FOOD.to_string()]);
        assert_eq!(r.total_calories, 0);
        assert_eq!(r.protein_g, 0.0);
        assert_eq!(r.carbs_g, 0.0);
        assert_eq!(r.fats_g, 0.0);
        assert_eq!(r.rating, 2);
        assert_eq!(r.suggestions, raw);
        assert_eq!(r.detailed_analysis, raw);
    }

    #[test]
    fn embedded_object_is_extracted() {
        let parsed = parse_model_response(BREAKFAST);
        assert!(!parsed.is_fallback());
        assert_eq!(
            parsed.into_record(),
            NutritionRecord {
                foods: vec!["oatmeal".into(), "banana".into()],
                total_calories: 350,
                protein_g: 10.0,
                carbs_g: 60.0,
                fats_g: 5.0,
                rating: 3,
                suggestions: "add protein".into(),
                detailed_analysis: "balanced breakfast".into(),
            }
        );
    }

    #[test]
    fn fenced_multiline_json_is_extracted() {
        let raw = "```json\n{\n  \"foods\": [\"salad\"],\n  \"total_calories\": 220,\n  \"protein_g\": 6.5,\n  \"carbs_g\": 18,\n  \"fats_g\": 14,\n  \"rating\": 3,\n  \"suggestions\": \"fine\",\n  \"detailed_analysis\": \"light\"\n}\n```";
        let r = parse_model_response(raw).into_record();
        assert_eq!(r.foods, vec!["salad"]);
        assert_eq!(r.protein_g, 6.5);
    }

    #[test]
    fn plain_prose_falls_back() {
        let raw = "This looks like a healthy bowl of oatmeal with fruit.";
        assert_fallback(raw, &parse_model_response(raw));
    }

    #[test]
    fn truncated_object_falls_back() {
        let raw = r#"Result: {"foods": ["toast"], "total_calories": 120, "rating": }"#;
        assert_fallback(raw, &parse_model_response(raw));
    }

    #[test]
    fn unbalanced_brace_falls_back() {
        let raw = r#"{"foods": ["toast"], "total_calories": 120"#;
        assert_fallback(raw, &parse_model_response(raw));
    }

    #[test]
    fn missing_required_field_falls_back() {
        let raw = r#"{"foods": ["toast"], "total_calories": 120, "protein_g": 4, "carbs_g": 20, "fats_g": 2}"#;
        assert_fallback(raw, &parse_model_response(raw));
    }

    #[test]
    fn non_numeric_value_falls_back() {
        let raw = r#"{"foods": [], "total_calories": "a lot", "protein_g": 4, "carbs_g": 20, "fats_g": 2, "rating": 2}"#;
        assert_fallback(raw, &parse_model_response(raw));
    }

    #[test]
    fn empty_text_falls_back() {
        assert_fallback("", &parse_model_response(""));
    }

    #[test]
    fn parsing_is_idempotent() {
        for raw in [BREAKFAST, "no json here", "{broken"] {
            assert_eq!(parse_model_response(raw), parse_model_response(raw));
        }
    }

    #[test]
    fn lenient_shapes_are_accepted() {
        let raw = r#"{
            "foods": [{"name": "chicken breast", "calories": 280}, {"item": "rice"}, "broccoli"],
            "total_calories": "612.6 kcal",
            "protein_g": "45g",
            "carbs_g": 70,
            "fats_g": 12.25,
            "rating": "3",
            "suggestions": ["more veg", "less rice"]
        }"#;
        let r = parse_model_response(raw).into_record();
        assert_eq!(r.foods, vec!["chicken breast", "rice", "broccoli"]);
        assert_eq!(r.total_calories, 613);
        assert_eq!(r.protein_g, 45.0);
        assert_eq!(r.fats_g, 12.25);
        assert_eq!(r.rating, 3);
        assert_eq!(r.suggestions, "more veg\nless rice");
        assert_eq!(r.detailed_analysis, "");
    }

    #[test]
    fn grouped_thousands_keep_their_value() {
        let raw = r#"{"foods": ["pizza"], "total_calories": "1,200 kcal", "protein_g": "1_050 mg", "carbs_g": "140 g", "fats_g": "48g", "rating": 1}"#;
        let parsed = parse_model_response(raw);
        assert!(!parsed.is_fallback());
        let r = parsed.record();
        assert_eq!(r.total_calories, 1200);
        assert_eq!(r.protein_g, 1050.0);
        assert_eq!(r.carbs_g, 140.0);
    }

    #[test]
    fn ranges_and_prose_numbers_fall_back() {
        for value in ["12-15g", "about 300", "12,5 g", "300 kcal (approx)"] {
            let raw = format!(
                r#"{{"foods": ["soup"], "total_calories": 300, "protein_g": "{value}", "carbs_g": 20, "fats_g": 5, "rating": 2}}"#
            );
            assert_fallback(&raw, &parse_model_response(&raw));
        }
    }

    #[test]
    fn food_objects_with_several_name_keys_are_accepted() {
        let raw = r#"{"foods": [{"name": "rice", "item": "rice"}, {"item": "beans", "food": "black beans"}], "total_calories": 200, "protein_g": 8, "carbs_g": 40, "fats_g": 1, "rating": 2}"#;
        let parsed = parse_model_response(raw);
        assert!(!parsed.is_fallback());
        assert_eq!(parsed.record().foods, vec!["rice", "beans"]);
    }

    #[test]
    fn food_object_without_a_name_falls_back() {
        let raw = r#"{"foods": [{"calories": 120}], "total_calories": 120, "protein_g": 1, "carbs_g": 30, "fats_g": 0, "rating": 2}"#;
        assert_fallback(raw, &parse_model_response(raw));
    }

    #[test]
    fn out_of_range_values_are_pulled_into_bounds() {
        let raw = r#"{"foods": ["cake"], "total_calories": -50, "protein_g": -1, "carbs_g": 80, "fats_g": 30, "rating": 5, "suggestions": null, "detailed_analysis": "dessert"}"#;
        let parsed = parse_model_response(raw);
        assert!(!parsed.is_fallback());
        let r = parsed.into_record();
        assert_eq!(r.total_calories, 0);
        assert_eq!(r.protein_g, 0.0);
        assert_eq!(r.rating, 3);
        assert_eq!(r.suggestions, "");

        let low = raw.replace("\"rating\": 5", "\"rating\": 0");
        assert_eq!(parse_model_response(&low).record().rating, 1);
    }
}
