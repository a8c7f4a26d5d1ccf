// src/domain.rs
// Fixed taxonomies shared by the classification pipeline and the routing engine
// (see spec GLOSSARY: CategorySet, DepartmentSet).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed category enumeration. Order matters: it is the tie-break order
/// for the category predictor (spec §4.2) and the iteration order used
/// whenever all categories need to be scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    TechnicalSupport,
    Billing,
    Sales,
    Hr,
    Legal,
    ProductFeedback,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::TechnicalSupport,
        Category::Billing,
        Category::Sales,
        Category::Hr,
        Category::Legal,
        Category::ProductFeedback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::TechnicalSupport => "technical_support",
            Category::Billing => "billing",
            Category::Sales => "sales",
            Category::Hr => "hr",
            Category::Legal => "legal",
            Category::ProductFeedback => "product_feedback",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Default `category_to_department` mapping (spec §4.6).
    pub fn default_department(&self) -> Department {
        match self {
            Category::TechnicalSupport => Department::TechnicalSupport,
            Category::Billing => Department::Finance,
            Category::Sales => Department::Sales,
            Category::Hr => Department::Hr,
            Category::Legal => Department::Legal,
            Category::ProductFeedback => Department::ProductManagement,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Sentiment::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub const ALL: [Urgency; 4] = [Urgency::Low, Urgency::Medium, Urgency::High, Urgency::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Urgency::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The fixed department enumeration (spec GLOSSARY: DepartmentSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    TechnicalSupport,
    Finance,
    Sales,
    Hr,
    Legal,
    ProductManagement,
    Escalation,
    General,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::TechnicalSupport => "technical_support",
            Department::Finance => "finance",
            Department::Sales => "sales",
            Department::Hr => "hr",
            Department::Legal => "legal",
            Department::ProductManagement => "product_management",
            Department::Escalation => "escalation",
            Department::General => "general",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        [
            Department::TechnicalSupport,
            Department::Finance,
            Department::Sales,
            Department::Hr,
            Department::Legal,
            Department::ProductManagement,
            Department::Escalation,
            Department::General,
        ]
        .into_iter()
        .find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
