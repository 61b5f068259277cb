/// Joins per-segment characters into the final captcha text.
///
/// Empty entries are skipped naturally, embedded spaces are removed and the
/// result is trimmed. An empty result means nothing was recoverable.
pub fn assemble<S: AsRef<str>>(characters: &[S]) -> String {
    let joined: String = characters.iter().map(|c| c.as_ref()).collect();
    joined.replace(' ', "").trim().to_string()
}

/// Keeps only alphanumeric characters, the form typed into the challenge.
pub fn keep_alphanumeric(text: &str) -> String {
    text.chars().filter(|c| c.is_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_strips_spaces_and_blanks() {
        assert_eq!(assemble(&["A", "", "B", " "]), "AB");
    }

    #[test]
    fn test_assemble_keeps_order() {
        assert_eq!(assemble(&["Q", "W", "E"]), "QWE");
    }

    #[test]
    fn test_assemble_trims_other_whitespace() {
        assert_eq!(assemble(&["\tX", "Y\n"]), "XY");
    }

    #[test]
    fn test_assemble_empty_input() {
        let empty: [&str; 0] = [];
        assert_eq!(assemble(&empty), "");
        assert_eq!(assemble(&["", " ", ""]), "");
    }

    #[test]
    fn test_keep_alphanumeric() {
        assert_eq!(keep_alphanumeric("A-B.C 9!"), "ABC9");
        assert_eq!(keep_alphanumeric("--"), "");
    }
}
