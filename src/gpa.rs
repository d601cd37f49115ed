use std::collections::{BTreeMap, HashMap};

use crate::models::{FinalClass, SemesterResult, StudentAggregate};

/// Rolls every stored semester result up into one aggregate per student.
///
/// Each year's GPA is the mean of that year's semester GPAs, rounded to two
/// places; the final GPA is the mean of those rounded year values, rounded
/// again. Students come back in order of first appearance in `records`.
pub fn aggregate<'a, I>(records: I) -> Vec<(String, StudentAggregate)>
where
    I: IntoIterator<Item = &'a SemesterResult>,
{
    let mut order: Vec<String> = Vec::new();
    let mut by_student: HashMap<String, BTreeMap<u8, Vec<f64>>> = HashMap::new();

    for record in records {
        let years = by_student.entry(record.index_no.clone()).or_insert_with(|| {
            order.push(record.index_no.clone());
            BTreeMap::new()
        });
        years
            .entry(record.year)
            .or_default()
            .push(record.semester_gpa);
    }

    order
        .into_iter()
        .filter_map(|index_no| {
            let years = by_student.remove(&index_no)?;
            Some((index_no, summarize_years(&years)))
        })
        .collect()
}

fn summarize_years(years: &BTreeMap<u8, Vec<f64>>) -> StudentAggregate {
    let year_gpa: BTreeMap<u8, f64> = years
        .iter()
        .map(|(year, gpas)| (*year, round2(mean(gpas))))
        .collect();

    let yearly: Vec<f64> = year_gpa.values().copied().collect();
    let final_gpa = round2(mean(&yearly));

    StudentAggregate {
        year_gpa,
        final_gpa,
        final_class: classify(final_gpa),
    }
}

/// Thresholds are inclusive lower bounds on the rounded final GPA.
pub fn classify(final_gpa: f64) -> FinalClass {
    if final_gpa >= 3.7 {
        FinalClass::First
    } else if final_gpa >= 3.3 {
        FinalClass::SecondUpper
    } else if final_gpa >= 3.0 {
        FinalClass::SecondLower
    } else {
        FinalClass::JustPass
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index_no: &str, year: u8, semester: u8, semester_gpa: f64) -> SemesterResult {
        SemesterResult {
            index_no: index_no.to_string(),
            name: "Jane Doe".to_string(),
            semester,
            year,
            courses: Vec::new(),
            semester_gpa,
        }
    }

    #[test]
    fn years_count_equally_in_final_gpa() {
        let records = vec![
            record("20/COM/001", 1, 1, 3.0),
            record("20/COM/001", 1, 2, 4.0),
            record("20/COM/001", 2, 1, 3.3),
        ];

        let aggregates = aggregate(&records);
        assert_eq!(aggregates.len(), 1);

        let (index_no, student) = &aggregates[0];
        assert_eq!(index_no, "20/COM/001");
        assert_eq!(student.year_gpa, BTreeMap::from([(1, 3.5), (2, 3.3)]));
        assert_eq!(student.final_gpa, 3.4);
        assert_eq!(student.final_class, FinalClass::SecondUpper);
    }

    #[test]
    fn final_mean_uses_rounded_year_values() {
        // Year 1 mean 3.345 rounds to 3.35 before averaging with year 2.
        let records = vec![
            record("A", 1, 1, 3.34),
            record("A", 1, 2, 3.35),
            record("A", 2, 1, 3.35),
        ];
        let aggregates = aggregate(&records);
        let student = &aggregates[0].1;
        assert_eq!(student.year_gpa[&1], 3.35);
        assert_eq!(student.final_gpa, 3.35);
    }

    #[test]
    fn duplicate_uploads_weigh_into_their_year() {
        let records = vec![
            record("A", 1, 1, 3.0),
            record("A", 1, 1, 3.0),
            record("A", 1, 2, 3.6),
        ];
        let aggregates = aggregate(&records);
        assert_eq!(aggregates[0].1.year_gpa[&1], 3.2);
    }

    #[test]
    fn students_keep_first_appearance_order() {
        let records = vec![
            record("Z9", 1, 1, 2.0),
            record("A1", 1, 1, 3.9),
            record("Z9", 2, 1, 2.5),
        ];
        let order: Vec<String> = aggregate(&records).into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, ["Z9", "A1"]);
    }

    #[test]
    fn empty_input_has_no_students() {
        assert!(aggregate(&Vec::<SemesterResult>::new()).is_empty());
    }

    #[test]
    fn classification_bounds_are_inclusive() {
        assert_eq!(classify(4.0), FinalClass::First);
        assert_eq!(classify(3.7), FinalClass::First);
        assert_eq!(classify(3.69), FinalClass::SecondUpper);
        assert_eq!(classify(3.3), FinalClass::SecondUpper);
        assert_eq!(classify(3.29), FinalClass::SecondLower);
        assert_eq!(classify(3.0), FinalClass::SecondLower);
        assert_eq!(classify(2.99), FinalClass::JustPass);
        assert_eq!(classify(0.0), FinalClass::JustPass);
    }

    #[test]
    fn aggregation_is_repeatable() {
        let records = vec![record("A", 1, 1, 3.71), record("A", 3, 2, 3.68)];
        assert_eq!(aggregate(&records), aggregate(&records));
    }
}
