/// Canonical form of a free-form case reference: ASCII-insensitive upper case
/// with every non-alphanumeric character removed. Empty output is never a
/// usable match key.
pub fn normalize_identifier(raw: Option<&str>) -> String {
    match raw {
        Some(value) => value
            .chars()
            .filter(|ch| ch.is_alphanumeric())
            .flat_map(char::to_uppercase)
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_identifier;

    #[test]
    fn equivalent_spellings_normalize_to_the_same_key() {
        let expected = "MC123";
        assert_eq!(normalize_identifier(Some("mc-123")), expected);
        assert_eq!(normalize_identifier(Some("MC123")), expected);
        assert_eq!(normalize_identifier(Some(" mc123 ")), expected);
        assert_eq!(normalize_identifier(Some("mc 12/3\t")), expected);
    }

    #[test]
    fn null_and_blank_inputs_normalize_to_empty() {
        assert_eq!(normalize_identifier(None), "");
        assert_eq!(normalize_identifier(Some("")), "");
        assert_eq!(normalize_identifier(Some(" -- ")), "");
    }
}
