use std::fmt::Write;

use super::dto::{MealCategory, UserProfile};

const SYSTEM_PREAMBLE: &str = "You are a nutrition expert analyzing meal images.
Provide detailed nutritional analysis including:
1. Food items identified
2. Estimated portion sizes
3. Calories (total and per item)
4. Macronutrients (protein, carbs, fats in grams)
5. Key micronutrients
6. Health rating (1-3): 1=needs improvement, 2=okay, 3=excellent
7. Suggestions for improvement
8. Alignment with user's dietary goals";

const RESPONSE_FORMAT: &str = "Return response in JSON format with keys: \
foods, total_calories, protein_g, carbs_g, fats_g, rating, suggestions, detailed_analysis";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub fn build_prompt(category: MealCategory, profile: Option<&UserProfile>) -> Prompt {
    let mut system = String::from(SYSTEM_PREAMBLE);
    system.push_str("\n\n");
    if let Some(ctx) = profile.and_then(profile_context) {
        system.push_str(&ctx);
        system.push('\n');
    }
    system.push_str(RESPONSE_FORMAT);

    Prompt {
        system,
        user: format!(
            "Analyze this {category} meal image. Provide comprehensive nutritional analysis in JSON format."
        ),
    }
}

/// `None` when the profile carries nothing worth telling the model.
fn profile_context(profile: &UserProfile) -> Option<String> {
    let goal = non_blank(profile.goal.as_deref());
    let diet = non_blank(profile.diet_pattern.as_deref());
    let exclusions: Vec<&str> = profile
        .exclusions
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if goal.is_none() && diet.is_none() && exclusions.is_empty() {
        return None;
    }

    let mut out = String::from("User Profile Context:\n");
    if let Some(goal) = goal {
        let _ = writeln!(out, "- Goal: {goal}");
    }
    if let Some(diet) = diet {
        let _ = writeln!(out, "- Diet Pattern: {diet}");
    }
    if !exclusions.is_empty() {
        let _ = writeln!(out, "- Exclusions: {}", exclusions.join(", "));
    }
    Some(out)
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}
