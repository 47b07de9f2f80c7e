use serde_json::Value;

/// Print just the key answer value from the output.
///
/// Looks for well-known result fields in order of priority, descending one
/// level into a nested `valuation` object, then falls back to the first
/// field in the result object.
pub fn print_minimal(value: &Value) {
    // Unwrap the "result" envelope when present
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    // Headline numbers, batch average first
    let priority_keys = [
        "average_fair_value_gross",
        "fair_value_gross",
        "fair_value_net",
        "prob_no_ko",
    ];

    // Single-note output nests the numbers under "valuation"
    let candidates = [Some(result_obj), result_obj.get("valuation")];
    for obj in candidates.into_iter().flatten() {
        if let Value::Object(map) = obj {
            // Skip null values
            for key in &priority_keys {
                if let Some(val) = map.get(*key) {
                    if !val.is_null() {
                        println!("{}", format_minimal(val));
                        return;
                    }
                }
            }
        }
    }

    // Fall back to first field
    if let Value::Object(map) = result_obj {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    // Not an object, just print directly
    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
