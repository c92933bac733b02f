use std::io::{self, Write};

use serde::Serialize;
use serde_json::ser::Formatter;

/// Serialize a value to the canonical text that fingerprints are computed over.
///
/// The output matches `json.dumps(value, sort_keys=True)`: keys sorted at every
/// level, `", "` / `": "` separators, non-ASCII escaped as `\uXXXX`, and floats
/// written in shortest round-trip form that keeps a fractional part or exponent.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(value)?;
    value.sort_all_objects();

    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_f32<W: ?Sized + Write>(&mut self, writer: &mut W, value: f32) -> io::Result<()> {
        writer.write_all(format_float(f64::from(value)).as_bytes())
    }

    fn write_f64<W: ?Sized + Write>(&mut self, writer: &mut W, value: f64) -> io::Result<()> {
        writer.write_all(format_float(value).as_bytes())
    }

    fn write_string_fragment<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        // Printable ASCII passes through; DEL and everything above is escaped.
        if fragment.bytes().all(|b| b < 0x7f) {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch < '\u{7f}' {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Python `repr(float)`: positional for exponents in `-4..16`, scientific otherwise.
pub(crate) fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let sign = if value.is_sign_negative() { "-" } else { "" };
    // `{:e}` yields the shortest round-trip digits, e.g. "1.2345e3".
    let sci = format!("{:e}", value.abs());
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exp) {
        if exp >= 0 {
            let split = exp as usize + 1;
            if digits.len() > split {
                format!("{sign}{}.{}", &digits[..split], &digits[split..])
            } else {
                format!("{sign}{}{}.0", digits, "0".repeat(split - digits.len()))
            }
        } else {
            format!("{sign}0.{}{}", "0".repeat((-exp - 1) as usize), digits)
        }
    } else {
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!("{sign}{mantissa}e{exp_sign}{:02}", exp.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn separators_match_python_dumps() {
        let text = canonical_json(&json!({"b": [1, 2], "a": {"y": 1, "x": "s"}})).unwrap();
        assert_eq!(text, r#"{"a": {"x": "s", "y": 1}, "b": [1, 2]}"#);
    }

    #[test]
    fn floats_keep_fractional_part() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.3), "0.3");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(0.0), "0.0");
        assert_eq!(format_float(1234.5), "1234.5");
        assert_eq!(format_float(1e15), "1000000000000000.0");
    }

    #[test]
    fn floats_switch_to_exponent_outside_python_range() {
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(0.00001), "1e-05");
        assert_eq!(format_float(1.5e-7), "1.5e-07");
        assert_eq!(format_float(2.5e120), "2.5e+120");
    }

    #[test]
    fn non_ascii_is_escaped() {
        let text = canonical_json(&json!({"name": "café ☕ 𝄞"})).unwrap();
        assert_eq!(text, r#"{"name": "caf\u00e9 \u2615 \ud834\udd1e"}"#);
    }

    #[test]
    fn delete_character_is_escaped() {
        let text = canonical_json(&json!({"k": "a\u{7f}b~"})).unwrap();
        assert_eq!(text, r#"{"k": "a\u007fb~"}"#);
    }

    #[test]
    fn control_characters_are_escaped() {
        let text = canonical_json(&json!({"k": "a\"b\\c\nd"})).unwrap();
        assert_eq!(text, r#"{"k": "a\"b\\c\nd"}"#);
    }

    #[test]
    fn integer_widths_serialize_identically() {
        let narrow = canonical_json(&json!({"k": 100u8})).unwrap();
        let wide = canonical_json(&json!({"k": 100i64})).unwrap();
        assert_eq!(narrow, wide);
    }
}
