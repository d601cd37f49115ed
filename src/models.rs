use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Letter grades accepted on a result sheet. Anything else rejects the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "F")]
    F,
}

impl Grade {
    pub const ALL: [Grade; 10] = [
        Grade::APlus,
        Grade::A,
        Grade::AMinus,
        Grade::BPlus,
        Grade::B,
        Grade::BMinus,
        Grade::CPlus,
        Grade::C,
        Grade::CMinus,
        Grade::F,
    ];

    pub fn points(self) -> f64 {
        match self {
            Grade::APlus => 4.0,
            Grade::A => 3.7,
            Grade::AMinus => 3.3,
            Grade::BPlus => 3.0,
            Grade::B => 2.7,
            Grade::BMinus => 2.3,
            Grade::CPlus => 2.0,
            Grade::C => 1.7,
            Grade::CMinus => 1.3,
            Grade::F => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::CMinus => "C-",
            Grade::F => "F",
        }
    }
}

impl FromStr for Grade {
    type Err = ();

    /// Exact token match; the caller is expected to trim and upper-case first.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Grade::ALL
            .into_iter()
            .find(|grade| grade.as_str() == token)
            .ok_or(())
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseEntry {
    pub code: String,
    pub grade: Grade,
    pub credit_hours: u32,
    pub quality_points: f64,
}

impl CourseEntry {
    pub fn new(code: String, grade: Grade, credit_hours: u32) -> Self {
        Self {
            quality_points: grade.points() * credit_hours as f64,
            code,
            grade,
            credit_hours,
        }
    }
}

/// One student's row from one uploaded sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemesterResult {
    pub index_no: String,
    pub name: String,
    pub semester: u8,
    pub year: u8,
    pub courses: Vec<CourseEntry>,
    pub semester_gpa: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalClass {
    #[serde(rename = "First Class")]
    First,
    #[serde(rename = "Second Upper Class")]
    SecondUpper,
    #[serde(rename = "Second Lower Class")]
    SecondLower,
    #[serde(rename = "Just Pass")]
    JustPass,
}

impl FinalClass {
    pub const ALL: [FinalClass; 4] = [
        FinalClass::First,
        FinalClass::SecondUpper,
        FinalClass::SecondLower,
        FinalClass::JustPass,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FinalClass::First => "First Class",
            FinalClass::SecondUpper => "Second Upper Class",
            FinalClass::SecondLower => "Second Lower Class",
            FinalClass::JustPass => "Just Pass",
        }
    }
}

impl FromStr for FinalClass {
    type Err = anyhow::Error;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        FinalClass::ALL
            .into_iter()
            .find(|class| class.label() == label)
            .ok_or_else(|| anyhow::anyhow!("unknown final class '{label}'"))
    }
}

impl fmt::Display for FinalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fields written onto every stored row of a student after aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAggregate {
    pub year_gpa: BTreeMap<u8, f64>,
    pub final_gpa: f64,
    pub final_class: FinalClass,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredResult {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: SemesterResult,
    #[serde(flatten)]
    pub aggregate: Option<StudentAggregate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_table_matches_published_points() {
        let expected = [
            ("A+", 4.0),
            ("A", 3.7),
            ("A-", 3.3),
            ("B+", 3.0),
            ("B", 2.7),
            ("B-", 2.3),
            ("C+", 2.0),
            ("C", 1.7),
            ("C-", 1.3),
            ("F", 0.0),
        ];

        for (token, points) in expected {
            let grade: Grade = token.parse().unwrap();
            assert_eq!(grade.points(), points, "points for {token}");
            assert_eq!(grade.to_string(), token);
        }
    }

    #[test]
    fn unknown_grade_tokens_are_rejected() {
        for token in ["D", "", "a", "A++", "E", " A"] {
            assert!(token.parse::<Grade>().is_err(), "{token:?} should not parse");
        }
    }

    #[test]
    fn course_entry_multiplies_points_by_hours() {
        let entry = CourseEntry::new("CO302".to_string(), Grade::BPlus, 3);
        assert!((entry.quality_points - 9.0).abs() < 1e-9);
    }

    #[test]
    fn final_class_round_trips_through_label() {
        for class in FinalClass::ALL {
            assert_eq!(class.label().parse::<FinalClass>().unwrap(), class);
        }
        assert!("Third Class".parse::<FinalClass>().is_err());
    }

    #[test]
    fn grade_serializes_as_token() {
        let json = serde_json::to_string(&Grade::AMinus).unwrap();
        assert_eq!(json, "\"A-\"");
    }
}
