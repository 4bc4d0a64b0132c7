//! Aggregate statistics over evaluations.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::evaluation::{round1, Evaluation};
use super::features::{Category, EducationLevel, FinancialAccess, Gender, PhoneType};

/// Creditworthiness distribution, as drawn by the dashboard pie chart.
///
/// Invariants: `creditworthy + not_creditworthy == total`;
/// `percent_creditworthy == round1(100 * creditworthy / total)`, 0 when empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub total: u64,
    pub creditworthy: u64,
    pub not_creditworthy: u64,
    pub percent_creditworthy: f64,
}

impl Summary {
    /// Build a summary from raw counts.
    #[must_use]
    pub fn from_counts(total: u64, creditworthy: u64) -> Self {
        let creditworthy = creditworthy.min(total);
        let percent_creditworthy = if total == 0 {
            0.0
        } else {
            round1(100.0 * creditworthy as f64 / total as f64)
        };
        Self {
            total,
            creditworthy,
            not_creditworthy: total - creditworthy,
            percent_creditworthy,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::from_counts(0, 0)
    }
}

/// Running counts, folded one evaluation at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tally {
    total: u64,
    creditworthy: u64,
}

impl Tally {
    pub fn observe(&mut self, creditworthy: bool) {
        self.total += 1;
        if creditworthy {
            self.creditworthy += 1;
        }
    }

    #[must_use]
    pub fn summary(&self) -> Summary {
        Summary::from_counts(self.total, self.creditworthy)
    }
}

/// Categorical field an aggregate can be broken down by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    EducationLevel,
    PhoneType,
    FinancialAccess,
    Gender,
}

impl Dimension {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EducationLevel => "education_level",
            Self::PhoneType => "phone_type",
            Self::FinancialAccess => "financial_access",
            Self::Gender => "gender",
        }
    }

    /// All category names of this dimension, in encoding order.
    #[must_use]
    pub fn categories(&self) -> Vec<&'static str> {
        fn names<C: Category>() -> Vec<&'static str> {
            C::ALL.iter().map(Category::as_str).collect()
        }
        match self {
            Self::EducationLevel => names::<EducationLevel>(),
            Self::PhoneType => names::<PhoneType>(),
            Self::FinancialAccess => names::<FinancialAccess>(),
            Self::Gender => names::<Gender>(),
        }
    }

    /// The category an evaluation falls into.
    #[must_use]
    pub fn category_of(&self, evaluation: &Evaluation) -> &'static str {
        let p = &evaluation.payload;
        match self {
            Self::EducationLevel => p.education_level.as_str(),
            Self::PhoneType => p.phone_type.as_str(),
            Self::FinancialAccess => p.financial_access.as_str(),
            Self::Gender => p.gender.as_str(),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown breakdown dimension name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dimension `{0}`")]
pub struct UnknownDimension(pub String);

impl FromStr for Dimension {
    type Err = UnknownDimension;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "education_level" => Ok(Self::EducationLevel),
            "phone_type" => Ok(Self::PhoneType),
            "financial_access" => Ok(Self::FinancialAccess),
            "gender" => Ok(Self::Gender),
            other => Err(UnknownDimension(other.to_string())),
        }
    }
}

/// Summary for one category of a dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownRow {
    pub category: &'static str,
    pub summary: Summary,
}
