//! Record serialization.

use super::Value;

pub(super) fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Undefined => out.push_str("undefined"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Int(n) => {
            out.push_str(&n.to_string());
        }
        Value::Float(f) => write_float(out, *f),
        Value::Str(s) => write_string(out, s),
        Value::Array(items) => write_array(out, items),
        Value::Object(fields) => write_object(out, fields),
    }
}

fn write_float(out: &mut String, f: f64) {
    if !f.is_finite() {
        // NaN and infinities have no record representation.
        out.push_str("null");
    } else if f.fract() == 0.0 {
        // Keep a fractional part so the value re-parses as floating point.
        out.push_str(&format!("{f:.1}"));
    } else {
        out.push_str(&format!("{f}"));
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            other => out.push(other),
        }
    }
    out.push('\'');
}

fn write_array(out: &mut String, items: &[Value]) {
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        // Holes serialize as empty slots.
        if !item.is_undefined() {
            write_value(out, item);
        }
    }
    // A trailing hole needs its own comma to survive a re-parse.
    if matches!(items.last(), Some(Value::Undefined)) {
        out.push(',');
    }
    out.push(']');
}

fn write_object(out: &mut String, fields: &[(String, Value)]) {
    out.push('{');
    let mut first = true;
    for (key, value) in fields {
        // Undefined field values suppress the key entirely.
        if value.is_undefined() {
            continue;
        }
        if !first {
            out.push(',');
        }
        first = false;
        write_key(out, key);
        out.push(':');
        write_value(out, value);
    }
    out.push('}');
}

fn write_key(out: &mut String, key: &str) {
    if is_identifier(key) {
        out.push_str(key);
    } else {
        write_string(out, key);
    }
}

/// Bare-key test: `[A-Za-z_$][A-Za-z0-9_$]*`.
fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
