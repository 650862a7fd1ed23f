//! Property-based tests using proptest.
//!
//! Templates are split into text runs at random points; placeholder mapping
//! and splicing must not depend on where the splits fall.

use docx_splice::{
    extract_runs, logical_text, map_placeholders, splice_entry, PlaceholderSyntax, Replacements,
};
use proptest::prelude::*;

/// Split `text` at the given char positions and wrap each piece in a run.
fn to_runs_xml(text: &str, mut cuts: Vec<usize>) -> String {
    let chars: Vec<char> = text.chars().collect();
    cuts.retain(|&c| c < chars.len());
    cuts.push(chars.len());
    cuts.sort_unstable();
    cuts.dedup();

    let mut xml = String::from("<w:p>");
    let mut start = 0;
    for cut in cuts {
        let piece: String = chars[start..cut].iter().collect();
        xml.push_str("<w:r><w:rPr><w:b/></w:rPr><w:t xml:space=\"preserve\">");
        xml.push_str(&piece.replace('&', "&amp;").replace('<', "&lt;"));
        xml.push_str("</w:t></w:r>");
        start = cut;
    }
    xml.push_str("</w:p>");
    xml
}

/// Text without braces, so the only placeholder is the one inserted.
fn plain_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ,.&<é]{0,12}"
}

fn template() -> impl Strategy<Value = (String, String, String, Vec<usize>)> {
    (
        plain_text(),
        "[A-Za-z][A-Za-z0-9_]{0,11}",
        plain_text(),
        proptest::collection::vec(0usize..40, 0..8),
    )
}

proptest! {
    /// A token is found exactly once however the runs are split.
    #[test]
    fn mapping_ignores_run_boundaries((prefix, name, suffix, cuts) in template()) {
        let token = format!("{{{name}}}");
        let text = format!("{prefix}{token}{suffix}");
        let runs = extract_runs(to_runs_xml(&text, cuts).as_bytes()).unwrap();

        prop_assert_eq!(logical_text(&runs), text.clone());

        let mapped = map_placeholders(&runs, PlaceholderSyntax::Braces);
        prop_assert_eq!(mapped.placeholders.len(), 1);
        let placeholder = &mapped.placeholders[0];
        prop_assert_eq!(&placeholder.token, &token);
        prop_assert!(placeholder.matches_runs(&runs));

        let covered: usize = placeholder.runs.iter().map(|s| s.len()).sum();
        prop_assert_eq!(covered, token.chars().count());
        prop_assert_eq!(
            placeholder.logical_span.clone(),
            prefix.chars().count()..prefix.chars().count() + token.chars().count()
        );
    }

    /// Replacing the token leaves exactly prefix + value + suffix.
    #[test]
    fn splice_replaces_only_the_token(
        (prefix, name, suffix, cuts) in template(),
        value in "[a-zA-Z0-9 &<>\"']{0,16}",
    ) {
        let token = format!("{{{name}}}");
        let xml = to_runs_xml(&format!("{prefix}{token}{suffix}"), cuts);

        let mut replacements = Replacements::new();
        replacements.insert(token, value.clone());
        let outcome = splice_entry("d.xml", xml.as_bytes(), PlaceholderSyntax::Braces, &replacements).unwrap();
        prop_assert_eq!(outcome.applied, 1);

        let runs = extract_runs(&outcome.data).unwrap();
        prop_assert_eq!(logical_text(&runs), format!("{prefix}{value}{suffix}"));
    }

    /// With nothing to replace, the bytes come back untouched.
    #[test]
    fn empty_edits_are_identity(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let outcome = splice_entry("d.xml", &bytes, PlaceholderSyntax::Braces, &Replacements::new()).unwrap();
        prop_assert!(!outcome.is_modified());
        prop_assert_eq!(&outcome.data, &bytes);
    }

    /// An edit for a token that is absent changes nothing.
    #[test]
    fn unmatched_edit_is_identity((prefix, name, suffix, cuts) in template()) {
        let xml = to_runs_xml(&format!("{prefix}{{{name}}}{suffix}"), cuts);
        let mut replacements = Replacements::new();
        replacements.insert("{SomethingElse}".to_string(), "x".to_string());
        let outcome = splice_entry("d.xml", xml.as_bytes(), PlaceholderSyntax::Braces, &replacements).unwrap();
        prop_assert_eq!(outcome.data, xml.into_bytes());
    }
}
