//! Parameter normalization at the frontend→backend boundary.
//!
//! Five steps, in order: scale the temperature into the backend's native
//! range, clamp every scalar to its legal range, filter parameters the
//! capability descriptor marks unsupported, truncate stop sequences, apply
//! defaults for whatever is still missing. Each step records the matching
//! drift warning; nothing changes silently.

use serde_json::json;
use tracing::debug;
use weft_ir::{
    Parameters, Warning, WarningCategory,
    parameters::{FREQUENCY_PENALTY_RANGE, PRESENCE_PENALTY_RANGE, TEMPERATURE_RANGE, TOP_P_RANGE},
};

use crate::capabilities::Capabilities;

/// Normalize `parameters` for a backend with `capabilities`, appending one
/// warning per applied transformation.
///
/// `defaults` fill in missing parameters last; they never overwrite what the
/// caller set.
#[must_use]
pub fn normalize(
    parameters: &Parameters,
    capabilities: &Capabilities,
    defaults: &Parameters,
    warnings: &mut Vec<Warning>,
) -> Parameters {
    let mut params = parameters.clone();

    scale_temperature(&mut params, capabilities, warnings);
    clamp(&mut params, capabilities, warnings);
    filter_unsupported(&mut params, capabilities, warnings);
    truncate_stop_sequences(&mut params, capabilities, warnings);
    apply_defaults(&mut params, defaults);

    params
}

/// Non-mutating bounds check over every present parameter; the test oracle
/// for the pipeline above.
#[must_use]
pub fn are_parameters_valid(parameters: &Parameters) -> bool {
    parameters.is_valid()
}

fn scale_temperature(
    params: &mut Parameters,
    capabilities: &Capabilities,
    warnings: &mut Vec<Warning>,
) {
    let Some(temperature) = params.temperature else {
        return;
    };
    let Some((low, high)) = capabilities.temperature_range else {
        return;
    };
    if (low, high) == TEMPERATURE_RANGE {
        return;
    }

    let (canon_low, canon_high) = TEMPERATURE_RANGE;
    let scaled = low + (temperature - canon_low) / (canon_high - canon_low) * (high - low);

    debug!(temperature, scaled, "Scaled temperature into native range.");
    params.temperature = Some(scaled);
    warnings.push(
        Warning::info(
            WarningCategory::ParameterNormalized,
            format!("temperature scaled from [{canon_low}, {canon_high}] to [{low}, {high}]"),
        )
        .with_field("temperature")
        .with_values(json!(temperature), json!(scaled)),
    );
}

fn clamp(params: &mut Parameters, capabilities: &Capabilities, warnings: &mut Vec<Warning>) {
    let temperature_range = capabilities.temperature_range.unwrap_or(TEMPERATURE_RANGE);

    clamp_float(&mut params.temperature, temperature_range, "temperature", warnings);
    clamp_float(&mut params.top_p, TOP_P_RANGE, "top_p", warnings);
    clamp_float(
        &mut params.frequency_penalty,
        FREQUENCY_PENALTY_RANGE,
        "frequency_penalty",
        warnings,
    );
    clamp_float(
        &mut params.presence_penalty,
        PRESENCE_PENALTY_RANGE,
        "presence_penalty",
        warnings,
    );

    clamp_min(&mut params.max_tokens, 1, "max_tokens", warnings);
    clamp_min(&mut params.top_k, 1, "top_k", warnings);
}

fn clamp_float(
    value: &mut Option<f64>,
    (low, high): (f64, f64),
    field: &str,
    warnings: &mut Vec<Warning>,
) {
    let Some(current) = *value else { return };
    let clamped = current.clamp(low, high);
    if clamped == current {
        return;
    }

    *value = Some(clamped);
    warnings.push(
        Warning::warning(
            WarningCategory::ParameterClamped,
            format!("{field} clamped to [{low}, {high}]"),
        )
        .with_field(field)
        .with_values(json!(current), json!(clamped)),
    );
}

fn clamp_min(value: &mut Option<u32>, min: u32, field: &str, warnings: &mut Vec<Warning>) {
    let Some(current) = *value else { return };
    if current >= min {
        return;
    }

    *value = Some(min);
    warnings.push(
        Warning::warning(
            WarningCategory::ParameterClamped,
            format!("{field} raised to minimum {min}"),
        )
        .with_field(field)
        .with_values(json!(current), json!(min)),
    );
}

fn filter_unsupported(
    params: &mut Parameters,
    capabilities: &Capabilities,
    warnings: &mut Vec<Warning>,
) {
    fn drop_param<T>(value: &mut Option<T>, supported: bool, field: &str, warnings: &mut Vec<Warning>)
    where
        T: serde::Serialize,
    {
        if supported || value.is_none() {
            return;
        }

        let original = value.take();
        warnings.push(
            Warning::warning(
                WarningCategory::ParameterUnsupported,
                format!("{field} is not supported by this backend"),
            )
            .with_field(field)
            .with_values(json!(original), json!(null)),
        );
    }

    drop_param(&mut params.temperature, capabilities.temperature, "temperature", warnings);
    drop_param(&mut params.top_p, capabilities.top_p, "top_p", warnings);
    drop_param(&mut params.top_k, capabilities.top_k, "top_k", warnings);
    drop_param(
        &mut params.frequency_penalty,
        capabilities.frequency_penalty,
        "frequency_penalty",
        warnings,
    );
    drop_param(
        &mut params.presence_penalty,
        capabilities.presence_penalty,
        "presence_penalty",
        warnings,
    );
    drop_param(&mut params.max_tokens, capabilities.max_tokens, "max_tokens", warnings);
    drop_param(&mut params.seed, capabilities.seed, "seed", warnings);
    drop_param(
        &mut params.stop_sequences,
        capabilities.stop_sequences,
        "stop_sequences",
        warnings,
    );
}

fn truncate_stop_sequences(
    params: &mut Parameters,
    capabilities: &Capabilities,
    warnings: &mut Vec<Warning>,
) {
    let Some(max) = capabilities.max_stop_sequences else {
        return;
    };
    let Some(sequences) = &mut params.stop_sequences else {
        return;
    };
    if sequences.len() <= max {
        return;
    }

    let original = sequences.clone();
    sequences.truncate(max);
    warnings.push(
        Warning::warning(
            WarningCategory::StopSequencesTruncated,
            format!("stop sequences truncated from {} to {max}", original.len()),
        )
        .with_field("stop_sequences")
        .with_values(json!(original), json!(sequences.clone())),
    );
}

fn apply_defaults(params: &mut Parameters, defaults: &Parameters) {
    macro_rules! fill {
        ($($field:ident),* $(,)?) => {
            $(
                if params.$field.is_none() {
                    params.$field = defaults.$field.clone();
                }
            )*
        };
    }

    fill!(
        model,
        temperature,
        max_tokens,
        top_p,
        top_k,
        frequency_penalty,
        presence_penalty,
        stop_sequences,
        seed,
        user,
    );

    for (key, value) in &defaults.custom {
        params
            .custom
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

#[cfg(test)]
#[path = "params_tests.rs"]
mod tests;
