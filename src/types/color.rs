/// Normalizes a hex color to `#RRGGBB`; accepts 6 hex digits with an optional `#`.
pub fn normalize_hex(value: &str) -> Option<String> {
    let (r, g, b) = parse_hex_color(value.trim())?;
    Some(format!("#{:02X}{:02X}{:02X}", r, g, b))
}

fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let value = hex.strip_prefix('#').unwrap_or(hex);
    if value.len() != 6 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&value[0..2], 16).ok()?;
    let g = u8::from_str_radix(&value[2..4], 16).ok()?;
    let b = u8::from_str_radix(&value[4..6], 16).ok()?;
    Some((r, g, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_prefix() {
        assert_eq!(normalize_hex("ff8080").as_deref(), Some("#FF8080"));
        assert_eq!(normalize_hex("#00c2ff").as_deref(), Some("#00C2FF"));
    }

    #[test]
    fn rejects_non_hex_values() {
        assert_eq!(normalize_hex("ff00"), None);
        assert_eq!(normalize_hex("gg0000"), None);
        assert_eq!(normalize_hex("##ff0000"), None);
        assert_eq!(normalize_hex("+f0000"), None);
    }
}
