//! Cheap lexical consistency pass over freshly generated prose. Catches
//! the obvious problems synchronously; deep analysis belongs to the
//! reviewer agent behind the `consistency` workflow.

use storyloom_core::{CheckOutcome, SessionContext};

pub fn quick_check(output: &str, session: &SessionContext) -> CheckOutcome {
    let mut warnings = Vec::new();

    let trimmed = output.trim();
    if trimmed.is_empty() {
        warnings.push("Generated output is empty".to_string());
    }

    // A scene that names none of the session's known characters is
    // suspicious, not necessarily wrong
    let known: Vec<&str> = session
        .recent_entities
        .iter()
        .filter(|e| e.kind == "character")
        .map(|e| e.name.as_str())
        .collect();
    if !trimmed.is_empty() && !known.is_empty() && !known.iter().any(|name| output.contains(name)) {
        warnings.push(format!(
            "None of the recently active characters ({}) appear in the new content",
            known.join(", ")
        ));
    }

    let paragraphs: Vec<&str> = trimmed
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    for pair in paragraphs.windows(2) {
        if pair[0] == pair[1] {
            warnings.push("Repeated paragraph detected".to_string());
            break;
        }
    }

    CheckOutcome {
        kind: "consistency".to_string(),
        content: format!(
            "Checked {} paragraph(s), {} warning(s)",
            paragraphs.len(),
            warnings.len()
        ),
        warnings,
    }
}

/// Parse a reviewer agent's report: lines starting with `WARNING:` become
/// structured warnings, everything else stays narrative.
pub fn parse_review(report: &str) -> CheckOutcome {
    let warnings: Vec<String> = report
        .lines()
        .filter_map(|line| line.trim().strip_prefix("WARNING:"))
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect();
    CheckOutcome {
        kind: "consistency".to_string(),
        content: report.to_string(),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyloom_core::RecentEntity;

    #[test]
    fn flags_missing_characters_and_repeats() {
        let session = SessionContext::new("s1")
            .with_recent_entity(RecentEntity::new("c1", "character", "Mirelle"));

        let clean = quick_check("Mirelle drew her blade.", &session);
        assert!(clean.warnings.is_empty());

        let missing = quick_check("A stranger drew a blade.", &session);
        assert_eq!(missing.warnings.len(), 1);
        assert!(missing.warnings[0].contains("Mirelle"));

        let repeated = quick_check("Mirelle waited.\n\nMirelle waited.", &session);
        assert!(repeated
            .warnings
            .iter()
            .any(|w| w.contains("Repeated paragraph")));
    }

    #[test]
    fn empty_output_is_a_warning() {
        let outcome = quick_check("   ", &SessionContext::new("s1"));
        assert_eq!(outcome.warnings, vec!["Generated output is empty".to_string()]);
    }

    #[test]
    fn review_report_warnings_are_extracted() {
        let report = "Timeline holds.\nWARNING: Kale is dead as of chapter 4\nWARNING: season mismatch\n";
        let outcome = parse_review(report);
        assert_eq!(outcome.warnings.len(), 2);
        assert_eq!(outcome.warnings[0], "Kale is dead as of chapter 4");
        assert_eq!(outcome.content, report);
    }
}
