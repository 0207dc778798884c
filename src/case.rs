//! Case conversion between the API and the store: payload and query keys are camelCase for the
//! client, columns are snake_case for the database.

use serde_json::{Map, Value};

fn is_separator(c: char) -> bool {
    c == '-' || c == '_' || c == '.' || c.is_whitespace()
}

/// Convert a single identifier to camelCase.
/// e.g. "customer_id" -> "customerId", "created-at" -> "createdAt", "Name" -> "name"
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    for c in s.to_lowercase().chars() {
        if is_separator(c) {
            capitalize_next = true;
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    // A leading separator capitalizes the first letter; camelCase never starts uppercase.
    let mut chars = out.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => first.to_lowercase().chain(chars).collect(),
        _ => out,
    }
}

/// Convert a single identifier to snake_case.
/// e.g. "customerId" -> "customer_id", "employmentStatus" -> "employment_status"
///
/// An uppercase run only gets one underscore ("customerID" -> "customer_id"); dashes and
/// whitespace runs become a single underscore.
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev: Option<char> = None;
    let mut in_space_run = false;
    for c in s.chars() {
        if c == '-' || c.is_whitespace() {
            if !in_space_run {
                out.push('_');
            }
            in_space_run = c.is_whitespace();
            prev = Some(c);
            continue;
        }
        in_space_run = false;
        if c.is_uppercase() {
            let boundary = prev
                .map(|p| p.is_lowercase() || p.is_ascii_digit())
                .unwrap_or(false);
            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

/// Returns a copy of `obj` with every key converted to camelCase.
/// Used on rows coming back from the store.
pub fn keys_to_camel_case(obj: &Map<String, Value>) -> Map<String, Value> {
    obj.iter()
        .map(|(k, v)| (to_camel_case(k), v.clone()))
        .collect()
}

/// Returns a copy of `obj` with every key converted to snake_case.
/// Used for predicates and payloads on their way to the store.
pub fn keys_to_snake_case(obj: &Map<String, Value>) -> Map<String, Value> {
    obj.iter()
        .map(|(k, v)| (to_snake_case(k), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_snake_case() {
        assert_eq!("customer_id", to_snake_case("customerId"));
        assert_eq!("name", to_snake_case("name"));
        assert_eq!("employment_status", to_snake_case("employmentStatus"));
        assert_eq!("address2_line", to_snake_case("address2Line"));
        assert_eq!("customer_id", to_snake_case("customerID"));
        assert_eq!("first_name", to_snake_case("first-name"));
        assert_eq!("first_name", to_snake_case("first   name"));
        assert_eq!("already_snake", to_snake_case("already_snake"));
    }

    #[test]
    fn test_to_camel_case() {
        assert_eq!("customerId", to_camel_case("customer_id"));
        assert_eq!("name", to_camel_case("name"));
        assert_eq!("createdAt", to_camel_case("created-at"));
        assert_eq!("createdAt", to_camel_case("created.at"));
        assert_eq!("createdAt", to_camel_case("created  at"));
        assert_eq!("createdAt", to_camel_case("created__at"));
        assert_eq!("name", to_camel_case("Name"));
        assert_eq!("name", to_camel_case("_name"));
        assert_eq!("trailing", to_camel_case("trailing_"));
    }

    #[test]
    fn test_round_trip() {
        for name in ["id", "name", "customerId", "employmentStatus", "address2Line", "a1B2"] {
            assert_eq!(name, to_camel_case(&to_snake_case(name)), "round trip of {}", name);
        }
    }

    #[test]
    fn test_keys_to_snake_case() {
        let input = json!({"name": "myName", "customerId": "myCustomerId"});
        let expected = json!({"name": "myName", "customer_id": "myCustomerId"});
        let out = keys_to_snake_case(input.as_object().unwrap());
        assert_eq!(expected, Value::Object(out));
    }

    #[test]
    fn test_keys_to_camel_case() {
        let input = json!({"id": 1, "employment_status": "Unemployed"});
        let expected = json!({"id": 1, "employmentStatus": "Unemployed"});
        let out = keys_to_camel_case(input.as_object().unwrap());
        assert_eq!(expected, Value::Object(out));
    }
}
