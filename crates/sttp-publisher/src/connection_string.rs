//! Parses the `;key=value;key={brace-quoted value}` connection string a
//! subscriber sends in its `SUBSCRIBE` payload (spec.md §4.7/§6). Braces
//! let a value itself contain `;` and `=`, which `filterExpression` and
//! `assemblyInfo` both rely on.

use std::collections::HashMap;

pub fn parse_connection_string(input: &str) -> HashMap<String, String> {
    let mut result = HashMap::new();
    let mut chars = input.chars().peekable();

    while chars.peek().is_some() {
        while chars.peek() == Some(&';') {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.peek() != Some(&'=') {
            break;
        }
        chars.next();

        let mut value = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            let mut depth = 1;
            while let Some(c) = chars.next() {
                match c {
                    '{' => {
                        depth += 1;
                        value.push(c);
                    }
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                        value.push(c);
                    }
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ';' {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }

        if !key.is_empty() {
            result.insert(key, value);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_and_brace_quoted_values() {
        let parsed = parse_connection_string(
            "throttled=False;publishInterval=1.000000;filterExpression={FILTER ActiveMeasurements WHERE Device = 'X'}",
        );
        assert_eq!(parsed.get("throttled").map(String::as_str), Some("False"));
        assert_eq!(parsed.get("publishInterval").map(String::as_str), Some("1.000000"));
        assert_eq!(
            parsed.get("filterExpression").map(String::as_str),
            Some("FILTER ActiveMeasurements WHERE Device = 'X'")
        );
    }

    #[test]
    fn assembly_info_braces_survive_nested_equals_and_semicolons() {
        let parsed =
            parse_connection_string("assemblyInfo={source=sttp-rs;version=0.1.0;updatedOn=2026-07-28};throttled=False");
        assert_eq!(
            parsed.get("assemblyInfo").map(String::as_str),
            Some("source=sttp-rs;version=0.1.0;updatedOn=2026-07-28")
        );
        assert_eq!(parsed.get("throttled").map(String::as_str), Some("False"));
    }
}
