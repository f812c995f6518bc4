use weft_ir::WarningCategory;

use super::*;

fn caps() -> Capabilities {
    Capabilities::default()
}

#[test]
fn noop_for_supported_in_range_parameters() {
    let params = Parameters::default()
        .with_temperature(0.7)
        .with_max_tokens(256);
    let mut warnings = Vec::new();

    let normalized = normalize(&params, &caps(), &Parameters::default(), &mut warnings);
    assert_eq!(normalized, params);
    assert!(warnings.is_empty());
}

#[test]
fn temperature_scales_into_native_range() {
    let capabilities = Capabilities {
        temperature_range: Some((0.0, 1.0)),
        ..caps()
    };
    let params = Parameters::default().with_temperature(1.0);
    let mut warnings = Vec::new();

    let normalized = normalize(&params, &capabilities, &Parameters::default(), &mut warnings);
    assert_eq!(normalized.temperature, Some(0.5));
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].category, WarningCategory::ParameterNormalized);
    assert_eq!(warnings[0].field.as_deref(), Some("temperature"));
}

#[test]
fn out_of_range_values_are_clamped_with_warnings() {
    let params = Parameters {
        temperature: Some(3.5),
        top_p: Some(-0.1),
        frequency_penalty: Some(9.0),
        max_tokens: Some(0),
        ..Parameters::default()
    };
    let mut warnings = Vec::new();

    let normalized = normalize(&params, &caps(), &Parameters::default(), &mut warnings);
    assert_eq!(normalized.temperature, Some(2.0));
    assert_eq!(normalized.top_p, Some(0.0));
    assert_eq!(normalized.frequency_penalty, Some(2.0));
    assert_eq!(normalized.max_tokens, Some(1));

    assert_eq!(warnings.len(), 4);
    assert!(
        warnings
            .iter()
            .all(|w| w.category == WarningCategory::ParameterClamped)
    );
    assert!(are_parameters_valid(&normalized));
}

#[test]
fn unsupported_parameters_are_filtered() {
    let capabilities = Capabilities {
        top_k: false,
        seed: false,
        ..caps()
    };
    let params = Parameters {
        top_k: Some(40),
        seed: Some(7),
        temperature: Some(1.0),
        ..Parameters::default()
    };
    let mut warnings = Vec::new();

    let normalized = normalize(&params, &capabilities, &Parameters::default(), &mut warnings);
    assert_eq!(normalized.top_k, None);
    assert_eq!(normalized.seed, None);
    assert_eq!(normalized.temperature, Some(1.0));

    let fields: Vec<_> = warnings.iter().filter_map(|w| w.field.as_deref()).collect();
    assert_eq!(fields, vec!["top_k", "seed"]);
    assert!(
        warnings
            .iter()
            .all(|w| w.category == WarningCategory::ParameterUnsupported)
    );
}

#[test]
fn stop_sequences_truncate_to_backend_limit() {
    let capabilities = Capabilities {
        max_stop_sequences: Some(2),
        ..caps()
    };
    let params = Parameters {
        stop_sequences: Some(vec!["a".into(), "b".into(), "c".into()]),
        ..Parameters::default()
    };
    let mut warnings = Vec::new();

    let normalized = normalize(&params, &capabilities, &Parameters::default(), &mut warnings);
    assert_eq!(
        normalized.stop_sequences,
        Some(vec!["a".to_owned(), "b".to_owned()])
    );
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].category,
        WarningCategory::StopSequencesTruncated
    );
}

#[test]
fn defaults_never_overwrite_the_caller() {
    let defaults = Parameters::default()
        .with_temperature(0.3)
        .with_max_tokens(1024);
    let params = Parameters::default().with_temperature(1.5);
    let mut warnings = Vec::new();

    let normalized = normalize(&params, &caps(), &defaults, &mut warnings);
    assert_eq!(normalized.temperature, Some(1.5));
    assert_eq!(normalized.max_tokens, Some(1024));
    assert!(warnings.is_empty());
}

#[test]
fn scaling_happens_before_clamping() {
    // 3.0 is out of canonical range; it scales to 1.5 in [0, 1] terms and is
    // then clamped to the native maximum.
    let capabilities = Capabilities {
        temperature_range: Some((0.0, 1.0)),
        ..caps()
    };
    let params = Parameters::default().with_temperature(3.0);
    let mut warnings = Vec::new();

    let normalized = normalize(&params, &capabilities, &Parameters::default(), &mut warnings);
    assert_eq!(normalized.temperature, Some(1.0));

    let categories: Vec<_> = warnings.iter().map(|w| w.category).collect();
    assert_eq!(
        categories,
        vec![
            WarningCategory::ParameterNormalized,
            WarningCategory::ParameterClamped,
        ]
    );
}
