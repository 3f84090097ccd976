//! ANSI styling for terminal output.
//!
//! Only the summary lines are coloured; diagnostic text stays plain so it
//! can be captured and compared byte for byte.

const RESET: &str = "\x1b[0m";

fn paint(codes: &str, text: &str) -> String {
    format!("\x1b[{codes}m{text}{RESET}")
}

/// Bold, for source file headings.
pub fn bold(text: &str) -> String {
    paint("1", text)
}

/// Bold red, for the error summary.
pub fn bold_red(text: &str) -> String {
    paint("1;31", text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_wraps_text_in_escape_codes() {
        assert_eq!(bold("heading"), "\x1b[1mheading\x1b[0m");
    }

    #[test]
    fn bold_red_starts_with_both_codes_and_resets() {
        let styled = bold_red("2 errors");
        assert!(styled.starts_with("\x1b[1;31m"));
        assert!(styled.ends_with("\x1b[0m"));
    }
}
