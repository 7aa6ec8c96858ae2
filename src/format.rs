#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Turns a failed check into a message a student can act on.

use crate::{
    check::{CheckDefinition, SourceListing},
    outcome::{FailureLocation, Outcome, Raised},
};

/// Column at which intro text is wrapped.
pub const WRAP_WIDTH: usize = 80;

/// Line prefixes that mark annotations rather than check code.
const ANNOTATION_MARKERS: [&str; 2] = ["@", "#["];

/// Heading placed above the check's source.
const EVIDENCE_HEADING: &str = "Here is the test that elicited the error:";

/// Renders the diagnostic for a check's outcome: an intro classifying the
/// failure, then (for most failures) the check's source with the failing line
/// marked. A passing outcome renders as an empty string.
pub fn render(check: &CheckDefinition, outcome: &Outcome) -> String {
    let Some(raised) = outcome.raised() else {
        return String::new();
    };

    let intro = fill(&intro(raised), WRAP_WIDTH);
    let evidence = if shows_evidence(raised) {
        evidence(check.source(), raised)
    } else {
        String::new()
    };

    format!("{intro}\n\n{evidence}")
}

/// The first part of the diagnostic, before wrapping.
fn intro(raised: &Raised) -> String {
    match raised {
        Raised::Assertion { .. } => "Your code produced an incorrect output.".to_string(),
        Raised::Timeout(timeout) => timeout.to_string(),
        Raised::Doctest(doctest) => doctest.to_string(),
        Raised::MissingModule { name, .. } => format!(
            "It looks like your code is trying to import '{name}', but this package does not \
             exist on Gradescope."
        ),
        Raised::Unexpected { description, .. } => {
            format!("Your code unexpectedly raised {description}.")
        }
    }
}

/// Doctest failures carry a complete explanation already.
fn shows_evidence(raised: &Raised) -> bool {
    !matches!(raised, Raised::Doctest(_))
}

/// The source excerpt, with the heading, or an empty string if there is
/// nothing to show.
fn evidence(source: Option<&SourceListing>, raised: &Raised) -> String {
    let location = raised.location();
    let details = match raised {
        Raised::Assertion { message, .. } => message.lines().collect::<Vec<_>>(),
        _ => Vec::new(),
    };

    let mut lines: Vec<String> = Vec::new();
    let mut marked = false;

    if let Some(source) = source {
        let (skipped, body) = remove_annotations(source.lines());
        let first_line = source
            .first_line()
            .saturating_add(u32::try_from(skipped).unwrap_or(u32::MAX));

        for (offset, line) in body.iter().enumerate() {
            let number = first_line.saturating_add(u32::try_from(offset).unwrap_or(u32::MAX));
            if location.is_some_and(|loc| loc.line == number) && !marked {
                lines.push(format!(">   {line}"));
                lines.extend(details.iter().map(|detail| format!("E   {detail}")));
                marked = true;
            } else {
                lines.push(format!("    {line}"));
            }
        }
    }

    if !marked {
        if let Some(location) = location {
            lines.push(format!("at {}", describe_location(location)));
        }
        lines.extend(details.iter().map(|detail| format!("E   {detail}")));
    }

    if lines.is_empty() {
        return String::new();
    }

    format!("{EVIDENCE_HEADING}\n\n{}", indent(&lines.join("\n"), "    "))
}

/// `file:line:column`, or just the file and line when the column is unknown.
fn describe_location(location: &FailureLocation) -> String {
    if location.column == 0 {
        format!("{}:{}", location.file, location.line)
    } else {
        location.to_string()
    }
}

/// Drops leading annotation lines, returning how many were dropped and the
/// rest.
pub fn remove_annotations(lines: &[String]) -> (usize, &[String]) {
    let skipped = lines
        .iter()
        .take_while(|line| {
            let line = line.trim_start();
            ANNOTATION_MARKERS.iter().any(|marker| line.starts_with(marker))
        })
        .count();
    (skipped, &lines[skipped..])
}

/// Prefixes every line that is not blank.
pub fn indent(text: &str, prefix: &str) -> String {
    text.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wraps text into lines no wider than `width`. Whitespace (newlines included)
/// separates words; words longer than `width` are split.
pub fn fill(text: &str, width: usize) -> String {
    let width = width.max(1);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word;
        loop {
            let current_len = current.chars().count();
            let word_len = word.chars().count();
            let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };

            if needed <= width {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(word);
                break;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                continue;
            }

            // A single word wider than the line: split it.
            let split_at = word
                .char_indices()
                .nth(width)
                .map(|(idx, _)| idx)
                .unwrap_or(word.len());
            lines.push(word[..split_at].to_string());
            word = &word[split_at..];
            if word.is_empty() {
                break;
            }
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_wraps_at_width() {
        let text = "Your code took longer than 1 seconds to run, which is too long. We have \
                    kindly asked your code to stop running.";
        let filled = fill(text, 80);
        assert!(filled.lines().all(|line| line.chars().count() <= 80));
        assert_eq!(
            filled,
            "Your code took longer than 1 seconds to run, which is too long. We have kindly\nasked \
             your code to stop running."
        );
    }

    #[test]
    fn fill_joins_existing_newlines() {
        assert_eq!(fill("one\ntwo   three", 80), "one two three");
    }

    #[test]
    fn fill_splits_overlong_words() {
        assert_eq!(fill("abcdefghij", 4), "abcd\nefgh\nij");
    }

    #[test]
    fn indent_skips_blank_lines() {
        assert_eq!(indent("a\n\n  \nb", "    "), "    a\n\n  \n    b");
    }

    #[test]
    fn annotations_are_removed_from_the_top_only() {
        let lines: Vec<String> = ["@weight(2)", "  #[timeout(1)]", "fn check() {", "    @inner", "}"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (skipped, rest) = remove_annotations(&lines);
        assert_eq!(skipped, 2);
        assert_eq!(rest, &lines[2..]);
    }
}
