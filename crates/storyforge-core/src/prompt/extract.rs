//! Tolerant JSON-object extraction: finds and returns the first balanced
//! `{...}` block in a string, ignoring any surrounding prose (§4.D:
//! "Parsers MUST tolerate surrounding prose around the JSON block").
//!
//! Grounded on the `other_examples` corpus's tolerant-LLM-JSON-extraction
//! idiom; implemented with bracket counting over a dependency like JSON5,
//! kept minimal like the teacher's own `content/` parsing.

/// Scan `raw` for the first balanced JSON object (matching `{` and `}`,
/// respecting string literals and escapes so that braces inside a string
/// value don't confuse the bracket count) and return its source slice.
pub fn extract_json_object(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let start = raw.find('{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let ch = byte as char;

        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return Some(raw[start..end].to_string());
                }
            }
            _ => {}
        }
    }

    None
}
