/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use lead_compliance_api::config::DEFAULT_INTERNAL_STATES;
use lead_compliance_api::csv_records::{parse_csv, records_to_csv, CsvRecord};
use lead_compliance_api::models::DialerType;
use lead_compliance_api::normalize::{
    is_plausible_us_phone, is_valid_email, normalize_email, normalize_phone, normalize_postal,
    to_national_us,
};
use lead_compliance_api::pre_ping::{check_state_compliance, StateAllowLists};
use proptest::prelude::*;

fn allow_lists() -> StateAllowLists {
    let states: Vec<String> = DEFAULT_INTERNAL_STATES.iter().map(|s| s.to_string()).collect();
    StateAllowLists {
        internal: states.clone(),
        pitch_bpo: states,
    }
}

// Property: normalization never panics and is idempotent
proptest! {
    #[test]
    fn phone_normalization_is_idempotent(raw in "\\PC*") {
        let once = normalize_phone(&raw);
        prop_assert!(once.chars().all(|c| c.is_ascii_digit()));
        prop_assert_eq!(normalize_phone(&once), once);
    }

    #[test]
    fn email_normalization_is_idempotent(raw in "[ a-zA-Z0-9@._+-]{0,40}") {
        let once = normalize_email(&raw);
        prop_assert_eq!(normalize_email(&once), once);
    }

    #[test]
    fn postal_normalization_is_idempotent(raw in "[ \t a-zA-Z0-9-]{0,20}") {
        let once = normalize_postal(&raw);
        prop_assert_eq!(normalize_postal(&once), once);
    }

    #[test]
    fn country_code_is_dropped(national in "[2-9][0-9]{9}") {
        prop_assert_eq!(to_national_us(&format!("+1 {}", national)), national.clone());
        prop_assert_eq!(to_national_us(&national), national);
    }

    #[test]
    fn validators_never_panic(raw in "\\PC*") {
        let _ = is_valid_email(&raw);
        let _ = is_plausible_us_phone(&raw);
    }
}

// Property: state checks depend only on the uppercased code
proptest! {
    #[test]
    fn state_check_is_case_insensitive(index in 0usize..DEFAULT_INTERNAL_STATES.len(), lower in any::<bool>()) {
        let lists = allow_lists();
        let state = DEFAULT_INTERNAL_STATES[index];
        let state = if lower { state.to_lowercase() } else { state.to_string() };
        prop_assert!(check_state_compliance(Some(&state), DialerType::Internal, &lists).is_compliant);
    }

    #[test]
    fn unlisted_states_are_rejected_with_reason(state in "[A-Z]{2}") {
        let lists = allow_lists();
        let outcome = check_state_compliance(Some(&state), DialerType::PitchBpo, &lists);
        let listed = DEFAULT_INTERNAL_STATES.contains(&state.as_str());
        prop_assert_eq!(outcome.is_compliant, listed);
        if !listed {
            prop_assert_eq!(
                outcome.reason,
                Some(format!("State {} not allowed for pitch_bpo dialer", state))
            );
        }
    }
}

// Property: exported CSV reads back unchanged
proptest! {
    #[test]
    fn csv_export_reads_back(values in prop::collection::vec("[a-zA-Z0-9 ,\"]{0,12}", 1..5)) {
        let mut record = CsvRecord::new();
        record.set("first_name", values[0].trim());
        record.set("phone", "6507769592");
        for (i, value) in values.iter().enumerate().skip(1) {
            record.set(format!("extra_{}", i), value.trim());
        }

        let text = records_to_csv(&[record.clone()]).unwrap();
        let parsed = parse_csv(&text).unwrap();
        prop_assert_eq!(parsed.records.len(), 1);
        prop_assert_eq!(&parsed.records[0], &record);
    }
}

// Property: colliding headers keep every column through export and re-import
proptest! {
    #[test]
    fn colliding_headers_read_back(
        columns in prop::collection::vec(
            (
                prop::sample::select(vec![
                    "Phone", "phone", "phone_2", "fname", "first_name", "state", "State", "notes",
                ]),
                "[a-z0-9]{1,8}",
            ),
            1..8,
        )
    ) {
        let header: Vec<&str> = columns.iter().map(|(h, _)| *h).collect();
        let row: Vec<&str> = columns.iter().map(|(_, v)| v.as_str()).collect();
        let text = format!("{}\n{}\n", header.join(","), row.join(","));

        let parsed = parse_csv(&text).unwrap();
        prop_assert_eq!(parsed.records.len(), 1);
        let values: Vec<&str> = parsed.records[0].iter().map(|(_, v)| v).collect();
        prop_assert_eq!(&values, &row);

        let reparsed = parse_csv(&records_to_csv(&parsed.records).unwrap()).unwrap();
        prop_assert_eq!(&reparsed.records, &parsed.records);
    }
}
