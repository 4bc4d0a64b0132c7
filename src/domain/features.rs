//! Applicant feature types for creditworthiness prediction.
//!
//! The eleven fields mirror the youth farmer survey columns the exported
//! scoring model was trained on. Raw request bodies are checked field by
//! field by [`validate`] before anything reaches the model.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A closed categorical field with a stable ordinal encoding.
///
/// The ordinal (position in `ALL`) is the numeric value fed to the model,
/// matching the label maps used at training time.
pub trait Category: Sized + Copy + 'static {
    /// Every variant, in encoding order.
    const ALL: &'static [Self];

    /// Wire name of the variant.
    fn as_str(&self) -> &'static str;

    /// Parse a wire name (case-insensitive, surrounding whitespace ignored).
    fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
    }

    /// Ordinal encoding used by the scoring model.
    fn code(&self) -> f64 {
        Self::ALL
            .iter()
            .position(|c| c.as_str() == self.as_str())
            .unwrap_or(0) as f64
    }
}

macro_rules! categorical {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl Category for $name {
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

categorical!(
    /// Highest completed level of schooling.
    EducationLevel {
        None => "none",
        Primary => "primary",
        Secondary => "secondary",
        Tertiary => "tertiary",
    }
);

categorical!(
    /// Type of mobile phone the applicant owns.
    PhoneType {
        None => "none",
        Basic => "basic",
        Smartphone => "smartphone",
    }
);

categorical!(
    /// Access to formal financial services (bank, mobile money, credit).
    FinancialAccess {
        None => "none",
        Partial => "partial",
        Full => "full",
    }
);

categorical!(
    Gender {
        Male => "male",
        Female => "female",
        Other => "other",
    }
);

/// Validated applicant features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePayload {
    /// Age in years
    pub age: u32,
    pub education_level: EducationLevel,
    /// Cultivated area in hectares
    pub farm_size: f64,
    pub phone_type: PhoneType,
    pub financial_access: FinancialAccess,
    /// Years of farming experience
    pub experience_years: u32,
    /// Receives agricultural extension services
    pub extension_access: bool,
    /// Member of a farmers' cooperative
    pub cooperative_member: bool,
    /// Has irrigation on the farm
    pub irrigation_access: bool,
    /// Number of dependents in the household
    pub dependents: u32,
    pub gender: Gender,
}

/// Feature names in model order.
pub const FEATURE_NAMES: [&str; 11] = [
    "age",
    "education_level",
    "farm_size",
    "phone_type",
    "financial_access",
    "experience_years",
    "extension_access",
    "cooperative_member",
    "irrigation_access",
    "dependents",
    "gender",
];

impl FeaturePayload {
    /// Encode the payload as the numeric vector the scoring model expects.
    ///
    /// Order matches [`FEATURE_NAMES`].
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            f64::from(self.age),
            self.education_level.code(),
            self.farm_size,
            self.phone_type.code(),
            self.financial_access.code(),
            f64::from(self.experience_years),
            flag_code(self.extension_access),
            flag_code(self.cooperative_member),
            flag_code(self.irrigation_access),
            f64::from(self.dependents),
            self.gender.code(),
        ]
    }
}

fn flag_code(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Why a field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    /// Field absent or null
    Missing,
    /// Field present with the wrong JSON type (or a fractional/non-finite number)
    WrongType,
    /// Numeric field below zero
    Negative,
    /// Categorical value outside the allowed set
    NotAllowed,
    /// Request body is not a JSON object
    NotAnObject,
}

impl ValidationReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::WrongType => "wrong_type",
            Self::Negative => "negative",
            Self::NotAllowed => "not_allowed",
            Self::NotAnObject => "not_an_object",
        }
    }
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid field `{field}`: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: ValidationReason,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: &'static str, reason: ValidationReason) -> Self {
        Self { field, reason }
    }
}

/// Validate a raw JSON body into a [`FeaturePayload`].
///
/// Fields are checked in declaration order and the first violation wins.
/// Unknown extra fields are ignored.
///
/// # Errors
/// Returns the first [`ValidationError`] encountered.
pub fn validate(raw: &Value) -> Result<FeaturePayload, ValidationError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| ValidationError::new("$", ValidationReason::NotAnObject))?;
    let fields = Fields(obj);

    Ok(FeaturePayload {
        age: fields.count("age")?,
        education_level: fields.category("education_level")?,
        farm_size: fields.amount("farm_size")?,
        phone_type: fields.category("phone_type")?,
        financial_access: fields.category("financial_access")?,
        experience_years: fields.count("experience_years")?,
        extension_access: fields.flag("extension_access")?,
        cooperative_member: fields.flag("cooperative_member")?,
        irrigation_access: fields.flag("irrigation_access")?,
        dependents: fields.count("dependents")?,
        gender: fields.category("gender")?,
    })
}

struct Fields<'a>(&'a Map<String, Value>);

impl Fields<'_> {
    fn get(&self, field: &'static str) -> Result<&Value, ValidationError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Err(ValidationError::new(field, ValidationReason::Missing)),
            Some(v) => Ok(v),
        }
    }

    /// Non-negative integer.
    fn count(&self, field: &'static str) -> Result<u32, ValidationError> {
        let n = match self.get(field)? {
            Value::Number(n) => n,
            _ => return Err(ValidationError::new(field, ValidationReason::WrongType)),
        };

        if let Some(u) = n.as_u64() {
            return u32::try_from(u)
                .map_err(|_| ValidationError::new(field, ValidationReason::WrongType));
        }
        if n.as_i64().is_some() {
            // Integral but not representable as u64: negative.
            return Err(ValidationError::new(field, ValidationReason::Negative));
        }

        let f = n
            .as_f64()
            .filter(|f| f.is_finite())
            .ok_or_else(|| ValidationError::new(field, ValidationReason::WrongType))?;
        if f < 0.0 {
            return Err(ValidationError::new(field, ValidationReason::Negative));
        }
        if f.fract() != 0.0 || f > f64::from(u32::MAX) {
            return Err(ValidationError::new(field, ValidationReason::WrongType));
        }
        Ok(f as u32)
    }

    /// Non-negative real number.
    fn amount(&self, field: &'static str) -> Result<f64, ValidationError> {
        let f = match self.get(field)? {
            Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
            _ => None,
        }
        .ok_or_else(|| ValidationError::new(field, ValidationReason::WrongType))?;

        if f < 0.0 {
            return Err(ValidationError::new(field, ValidationReason::Negative));
        }
        Ok(f)
    }

    /// Boolean; the dashboard form sends `"yes"` / `"no"`.
    fn flag(&self, field: &'static str) -> Result<bool, ValidationError> {
        match self.get(field)? {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" => Ok(true),
                "no" | "false" => Ok(false),
                _ => Err(ValidationError::new(field, ValidationReason::NotAllowed)),
            },
            _ => Err(ValidationError::new(field, ValidationReason::WrongType)),
        }
    }

    fn category<C: Category>(&self, field: &'static str) -> Result<C, ValidationError> {
        match self.get(field)? {
            Value::String(s) => {
                C::parse(s).ok_or_else(|| ValidationError::new(field, ValidationReason::NotAllowed))
            }
            _ => Err(ValidationError::new(field, ValidationReason::WrongType)),
        }
    }
}
