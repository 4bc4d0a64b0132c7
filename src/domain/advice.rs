//! Improvement advice attached to low scores.

use super::features::{FeaturePayload, FinancialAccess, PhoneType};

/// Scores below this value receive concrete advice.
pub const ADVICE_THRESHOLD: f64 = 60.0;

const KEEP_GOING: &str = "Keep up the good work!";

/// Actionable suggestions for an applicant with the given credit score.
///
/// Always returns at least one line.
#[must_use]
pub fn improvement_advice(payload: &FeaturePayload, credit_score: f64) -> Vec<String> {
    if credit_score >= ADVICE_THRESHOLD {
        return vec![KEEP_GOING.to_string()];
    }

    let mut advice = Vec::new();
    if payload.financial_access != FinancialAccess::Full {
        advice.push("Adopt mobile money or join a cooperative for better financial access.");
    }
    if payload.phone_type != PhoneType::Smartphone {
        advice.push("Use a smartphone for better access to markets and information.");
    }
    if payload.experience_years < 3 {
        advice.push("Seek mentorship or training to gain more experience.");
    }
    if !payload.extension_access {
        advice.push("Access extension services for up-to-date farming advice.");
    }
    if !payload.cooperative_member {
        advice.push("Join a farmers' cooperative for support and loans.");
    }
    if !payload.irrigation_access {
        advice.push("Consider irrigation solutions to boost yields.");
    }

    if advice.is_empty() {
        advice.push(KEEP_GOING);
    }
    advice.into_iter().map(String::from).collect()
}
