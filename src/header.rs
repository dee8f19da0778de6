/// Column names from the `va.dat` header line.
///
/// The line is `;`-separated; the first two fields are reserved and dropped.
/// Only the first line of `text` is considered.
pub fn parse_columns(text: &str) -> Vec<String> {
    let line = text.lines().next().unwrap_or("");
    line.split(';').skip(2).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_reserved_fields() {
        assert_eq!(parse_columns("a;b;x;y"), vec!["x", "y"]);
        assert_eq!(parse_columns("1181;0;positivi;positivi_1000"), vec!["positivi", "positivi_1000"]);
    }

    #[test]
    fn test_line_endings_and_extra_lines() {
        assert_eq!(parse_columns("a;b;x;y\r\nignored;line"), vec!["x", "y"]);
        assert_eq!(parse_columns("a;b;x\n"), vec!["x"]);
    }

    #[test]
    fn test_short_headers() {
        assert!(parse_columns("a;b").is_empty());
        assert!(parse_columns("a").is_empty());
        assert!(parse_columns("").is_empty());
    }
}
