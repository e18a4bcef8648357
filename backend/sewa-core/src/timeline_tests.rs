// src/timeline_tests.rs

#[cfg(test)]
mod tests {
    use crate::bs_date::{diff_days, BsDate};
    use crate::era::EraSplitter;
    use crate::ingest::synthesize_pre_level_assignments;
    use crate::marks::NEW_ERA_FLAT_RATE;
    use crate::records::{AbsentDetail, Assignment, Gender, LeaveDetail};
    use crate::reference::{CsvReferenceStore, MarksType, ReferenceLookup};
    use crate::timeline::{total_marks, Segment, TimelineBuilder, TimelineError, TimelineRequest};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    // Humla -> A, Kathmandu -> D, Jumla -> B (no female old entry).
    fn builder() -> TimelineBuilder {
        let store = CsvReferenceStore::new()
            .with_office("Humla Office", "Humla")
            .with_office("Kathmandu Office", "Kathmandu")
            .with_office("Jumla Office", "Jumla")
            .with_district("Humla", "A")
            .with_district("Kathmandu", "D")
            .with_district("Jumla", "B")
            .with_category_marks("A", MarksType::Old, Some(Gender::Male), dec!(3.5))
            .with_category_marks("A", MarksType::Old, Some(Gender::Female), dec!(3.25))
            .with_category_marks("B", MarksType::Old, Some(Gender::Male), dec!(2.5))
            .with_category_marks("D", MarksType::Old, Some(Gender::Male), dec!(1.25))
            .with_category_marks("A", MarksType::New, None, dec!(3))
            .with_category_marks("B", MarksType::New, None, dec!(2))
            .with_category_marks("D", MarksType::New, None, dec!(1));
        TimelineBuilder::new(
            EraSplitter::default(),
            ReferenceLookup::new(Arc::new(store)),
        )
    }

    fn assignment(office: &str, level: i32, start: &str, end: Option<&str>) -> Assignment {
        Assignment {
            employee_id: "E1".to_string(),
            start_date: start.to_string(),
            end_date: end.map(str::to_string),
            position: "Officer".to_string(),
            work_office: office.to_string(),
            level,
            ..Default::default()
        }
    }

    fn date(s: &str) -> BsDate {
        BsDate::parse(s).unwrap()
    }

    async fn build(
        assignments: &[Assignment],
        absences: &[AbsentDetail],
        leaves: &[LeaveDetail],
        gender: Option<Gender>,
        today: &str,
    ) -> Result<Vec<Segment>, TimelineError> {
        let request = TimelineRequest {
            employee_id: "E1",
            gender,
            level_range: None,
            assignments,
            absences,
            leaves,
            today: date(today),
        };
        builder().build_timeline(&request).await
    }

    #[tokio::test]
    async fn assignment_spanning_the_cutoff_is_scored_on_both_sides() {
        let rows = vec![assignment("Humla Office", 6, "2078/01/01", Some("2080/01/01"))];
        let segments = build(&rows, &[], &[], Some(Gender::Male), "2081-01-01")
            .await
            .unwrap();

        assert_eq!(segments.len(), 2);
        let (old, new) = (&segments[0], &segments[1]);
        assert_eq!((old.start_date.as_str(), old.end_date.as_str()), ("2078-01-01", "2079-03-32"));
        assert_eq!((new.start_date.as_str(), new.end_date.as_str()), ("2079-04-01", "2080-01-01"));
        assert!(old.before_break);
        assert!(!new.before_break);
        assert_eq!(
            old.total_num_days + new.total_num_days,
            diff_days(&date("2078-01-01"), &date("2080-01-01")) + 1
        );

        assert_eq!((old.years, old.months, old.days), (1, 3, 0));
        assert_eq!(old.marks.marks_year, dec!(3.5));
        assert_eq!(old.marks.year_marks, dec!(3.5));
        // Presence carries across the cutoff within the same category.
        assert_eq!(new.present_days, old.total_num_days + new.total_num_days);
        assert_eq!(new.marks.marks_year, dec!(3));
        assert_eq!(new.category.as_deref(), Some("A"));
        assert_eq!(new.district.as_deref(), Some("Humla"));
    }

    #[tokio::test]
    async fn absences_and_non_standard_leaves_zero_their_days() {
        let rows = vec![assignment("Humla Office", 6, "2075-01-01", Some("2076-12-30"))];
        let absences = vec![AbsentDetail {
            employee_id: "E1".to_string(),
            from_date: "2075-05-01".to_string(),
            to_date: "2075-05-10".to_string(),
            ..Default::default()
        }];
        let leaves = vec![
            LeaveDetail {
                employee_id: "E1".to_string(),
                from_date: "2076-02-01".to_string(),
                to_date: "2076-02-05".to_string(),
                leave_type: "Non Standard".to_string(),
                ..Default::default()
            },
            LeaveDetail {
                employee_id: "E1".to_string(),
                from_date: "2075-09-01".to_string(),
                to_date: "2075-09-03".to_string(),
                leave_type: "Sick".to_string(),
                ..Default::default()
            },
        ];
        let segments = build(&rows, &absences, &leaves, Some(Gender::Male), "2081-01-01")
            .await
            .unwrap();

        let kinds: Vec<bool> = segments.iter().map(|s| s.is_break).collect();
        assert_eq!(kinds, vec![false, true, false, true, false]);
        assert_eq!(segments[0].end_date, "2075-04-31");
        assert_eq!(segments[1].remarks.as_deref(), Some("Absent"));
        assert_eq!(segments[3].remarks.as_deref(), Some("Non standard leave"));

        for brk in segments.iter().filter(|s| s.is_break) {
            assert_eq!(brk.marks.total_marks, Decimal::ZERO);
            assert_eq!(brk.present_days, 0);
        }
        // Presence restarts after a break.
        assert_eq!(segments[2].present_days, segments[2].total_num_days);
        assert_eq!(
            segments.iter().map(|s| s.total_num_days).sum::<i64>(),
            diff_days(&date("2075-01-01"), &date("2076-12-30")) + 1
        );
    }

    #[tokio::test]
    async fn short_old_stay_is_scored_with_the_previous_category() {
        let rows = vec![
            assignment("Kathmandu Office", 6, "2075-01-01", Some("2075-06-30")),
            // 45 days.
            assignment("Humla Office", 6, "2075-07-01", Some("2075-08-15")),
        ];
        let segments = build(&rows, &[], &[], Some(Gender::Male), "2081-01-01")
            .await
            .unwrap();

        let short = &segments[1];
        assert_eq!(short.total_num_days, 45);
        assert_eq!(short.present_days, 45);
        assert_eq!(short.category.as_deref(), Some("A"));
        assert_eq!(short.marks_category.as_deref(), Some("D"));
        assert_eq!(short.marks.marks_year, dec!(1.25));
    }

    #[tokio::test]
    async fn first_short_old_stay_without_history_scores_zero() {
        let rows = vec![assignment("Humla Office", 6, "2075-07-01", Some("2075-08-15"))];
        let segments = build(&rows, &[], &[], Some(Gender::Male), "2081-01-01")
            .await
            .unwrap();
        assert_eq!(segments[0].marks.total_marks, Decimal::ZERO);
    }

    #[tokio::test]
    async fn new_era_flat_rate_until_presence_reaches_threshold() {
        let rows = vec![
            // 187 days.
            assignment("Humla Office", 7, "2080-01-01", Some("2080-06-30")),
            // 89 more days in the same category.
            assignment("Humla Office", 7, "2080-07-01", Some("2080-09-29")),
        ];
        let segments = build(&rows, &[], &[], Some(Gender::Male), "2081-01-01")
            .await
            .unwrap();

        assert_eq!(segments[0].present_days, 187);
        assert_eq!(segments[0].marks.marks_year, NEW_ERA_FLAT_RATE);
        assert_eq!(segments[1].present_days, 276);
        assert_eq!(segments[1].marks.marks_year, dec!(3));
    }

    #[tokio::test]
    async fn female_without_own_entry_gets_male_marks() {
        // 2075 is one full year.
        let rows = vec![assignment("Jumla Office", 6, "2075-01-01", Some("2075-12-30"))];
        let segments = build(&rows, &[], &[], Some(Gender::Female), "2081-01-01")
            .await
            .unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!((segments[0].years, segments[0].months, segments[0].days), (1, 0, 0));
        assert_eq!(total_marks(&segments), dec!(2.5));
    }

    #[tokio::test]
    async fn unknown_gender_scores_old_era_zero() {
        let rows = vec![assignment("Humla Office", 6, "2075-01-01", Some("2075-12-30"))];
        let segments = build(&rows, &[], &[], None, "2081-01-01").await.unwrap();
        assert_eq!(total_marks(&segments), Decimal::ZERO);
    }

    #[tokio::test]
    async fn synthetic_assignment_covers_time_before_the_first_row_of_a_level() {
        let mut previous = assignment("Humla Office", 5, "2070-01-01", Some("2076-08-12"));
        previous.seniority_date = Some("2070-01-01".to_string());
        let mut promoted = assignment("Kathmandu Office", 6, "2078/04/07", None);
        promoted.seniority_date = Some("2076/08/13".to_string());
        let rows = synthesize_pre_level_assignments(vec![promoted, previous]);

        let request = TimelineRequest {
            employee_id: "E1",
            gender: Some(Gender::Male),
            level_range: Some(6..=6),
            assignments: &rows,
            absences: &[],
            leaves: &[],
            today: date("2079-01-01"),
        };
        let segments = builder().build_timeline(&request).await.unwrap();

        assert_eq!(segments.len(), 2);
        let synthetic = &segments[0];
        assert!(synthetic.synthetic);
        assert_eq!(synthetic.start_date, "2076-08-13");
        assert_eq!(synthetic.end_date, "2078-04-06");
        assert_eq!(synthetic.work_office, "Humla Office");
        assert_eq!(synthetic.level, 6);
        assert_eq!(segments[1].start_date, "2078-04-07");
        assert_eq!(segments[1].end_date, "2079-01-01");
    }

    #[tokio::test]
    async fn rebuilding_yields_identical_output() {
        let rows = vec![
            assignment("Kathmandu Office", 6, "2075-01-01", None),
            assignment("Humla Office", 6, "2078-01-01", None),
        ];
        let absences = vec![AbsentDetail {
            employee_id: "E1".to_string(),
            from_date: "2079-03-20".to_string(),
            to_date: "2079-04-10".to_string(),
            ..Default::default()
        }];
        let first = build(&rows, &absences, &[], Some(Gender::Male), "2081-01-01")
            .await
            .unwrap();
        let second = build(&rows, &absences, &[], Some(Gender::Male), "2081-01-01")
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        // Open end of the earlier row closes the day before the next one starts.
        assert_eq!(first[0].end_date, "2077-12-31");
    }

    #[tokio::test]
    async fn end_before_start_is_a_chronology_error() {
        let rows = vec![assignment("Humla Office", 6, "2078-01-01", Some("2077-01-01"))];
        let result = build(&rows, &[], &[], Some(Gender::Male), "2081-01-01").await;
        assert!(matches!(result, Err(TimelineError::InvalidChronology { .. })));
    }

    #[tokio::test]
    async fn open_row_sharing_a_start_with_the_next_row_scores_zero() {
        let rows = vec![
            assignment("Humla Office", 6, "2074-01-01", Some("2074-12-01")),
            assignment("Kathmandu Office", 6, "2075-01-01", None),
            assignment("Jumla Office", 6, "2075-01-01", Some("2076-01-01")),
        ];
        let segments = build(&rows, &[], &[], Some(Gender::Male), "2081-01-01")
            .await
            .unwrap();
        assert_eq!(segments.len(), 3);
        let overlapped = &segments[1];
        assert_eq!(overlapped.work_office, "Kathmandu Office");
        assert_eq!(overlapped.era, None);
        assert_eq!(overlapped.marks.total_marks, Decimal::ZERO);
        assert_eq!(overlapped.remarks.as_deref(), Some("Ends before it starts"));
        assert!(segments[2].marks.total_marks > Decimal::ZERO);
    }

    #[tokio::test]
    async fn unusable_dates_degrade_to_a_zero_segment() {
        let rows = vec![
            assignment("Humla Office", 6, "2075-01-01", Some("2075-12-30")),
            assignment("Humla Office", 6, "2076-13-01", Some("2077-01-01")),
        ];
        let segments = build(&rows, &[], &[], Some(Gender::Male), "2081-01-01")
            .await
            .unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].marks.total_marks, dec!(3.5));
        assert_eq!(segments[1].era, None);
        assert_eq!(segments[1].marks.total_marks, Decimal::ZERO);
    }

    #[tokio::test]
    async fn other_employees_and_levels_are_ignored() {
        let mut other = assignment("Humla Office", 6, "2075-01-01", Some("2075-12-30"));
        other.employee_id = "E2".to_string();
        let rows = vec![
            other,
            assignment("Humla Office", 4, "2070-01-01", Some("2074-12-30")),
            assignment("Humla Office", 6, "2075-01-01", Some("2075-12-30")),
        ];
        let request = TimelineRequest {
            employee_id: "E1",
            gender: Some(Gender::Male),
            level_range: Some(5..=7),
            assignments: &rows,
            absences: &[],
            leaves: &[],
            today: date("2081-01-01"),
        };
        let segments = builder().build_timeline(&request).await.unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_date, "2075-01-01");
    }

    #[tokio::test]
    async fn segments_serialize_in_camel_case() {
        let rows = vec![assignment("Humla Office", 6, "2075-01-01", Some("2075-12-30"))];
        let segments = build(&rows, &[], &[], Some(Gender::Male), "2081-01-01")
            .await
            .unwrap();
        let json = serde_json::to_value(&segments[0]).unwrap();
        for key in [
            "startDate",
            "endDate",
            "totalNumDays",
            "beforeBreak",
            "presentDays",
            "marksYear",
            "yearMarks",
            "monthMarks",
            "daysMarks",
            "totalMarks",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
