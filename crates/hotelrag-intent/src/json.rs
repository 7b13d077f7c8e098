use serde::de::DeserializeOwned;

/// Decode a JSON object from model output, tolerating code fences and prose
/// around the object.
pub(crate) fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let body = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => cleaned.trim(),
    };
    serde_json::from_str(body).map_err(|e| format!("{e}: {}", raw.chars().take(120).collect::<String>()))
}

/// Models sometimes spell "nothing" as a string.
pub(crate) fn non_null(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| {
        !v.is_empty() && !v.eq_ignore_ascii_case("none") && !v.eq_ignore_ascii_case("null")
    })
}
