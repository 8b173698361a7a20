//! Pulls the JSON object out of free-form model output.
//!
//! Models like to wrap their answer in prose or code fences, so the object is
//! located first and parsed second. Two locating strategies exist:
//!
//! * [`SpanMode::Greedy`] takes everything from the first `{` to the last `}`.
//!   This is what stored reports were produced with and stays the default.
//! * [`SpanMode::Balanced`] follows the first object to its matching brace,
//!   skipping braces inside string literals, so trailing text containing a
//!   stray `}` cannot corrupt the span.

use std::str::FromStr;

use tracing::debug;

use crate::error::ExtractError;
use crate::models::RawModelOutput;
use crate::report::AnalysisReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpanMode {
    #[default]
    Greedy,
    Balanced,
}

impl FromStr for SpanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "greedy" | "legacy" => Ok(SpanMode::Greedy),
            "balanced" | "strict" => Ok(SpanMode::Balanced),
            other => Err(format!("unknown span mode '{other}'")),
        }
    }
}

pub fn extract_and_validate(raw: &RawModelOutput, mode: SpanMode) -> Result<AnalysisReport, ExtractError> {
    let text = raw.text.trim();
    let span = locate_json_span(text, mode).ok_or(ExtractError::NoJsonFound)?;
    debug!(?mode, span_len = span.len(), "located JSON span");

    let value: serde_json::Value = serde_json::from_str(span).map_err(ExtractError::MalformedJson)?;
    AnalysisReport::from_value(value)
}

pub fn locate_json_span(text: &str, mode: SpanMode) -> Option<&str> {
    match mode {
        SpanMode::Greedy => greedy_span(text),
        SpanMode::Balanced => balanced_span(text),
    }
}

fn greedy_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn balanced_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Section;
    use crate::test_support::sample_report;
    use proptest::prelude::*;
    use serde_json::json;

    fn raw(text: impl Into<String>) -> RawModelOutput {
        RawModelOutput { text: text.into() }
    }

    fn both_modes() -> [SpanMode; 2] {
        [SpanMode::Greedy, SpanMode::Balanced]
    }

    #[test]
    fn text_without_braces_has_no_json() {
        for mode in both_modes() {
            for text in ["", "   ", "I could not identify the object.", "only a closing } here"] {
                let err = extract_and_validate(&raw(text), mode).unwrap_err();
                assert!(matches!(err, ExtractError::NoJsonFound), "{mode:?} {text:?}: {err:?}");
            }
        }
    }

    proptest! {
        #[test]
        fn any_text_without_an_opening_brace_has_no_json(text in "[^{]*") {
            for mode in both_modes() {
                let err = extract_and_validate(&raw(text.clone()), mode).unwrap_err();
                prop_assert!(matches!(err, ExtractError::NoJsonFound), "{:?} {:?}: {:?}", mode, text, err);
            }
        }
    }

    #[test]
    fn invalid_span_is_malformed() {
        for mode in both_modes() {
            let err = extract_and_validate(&raw("result: {nesne: 'x'}"), mode).unwrap_err();
            assert!(matches!(err, ExtractError::MalformedJson(_)), "{mode:?}: {err:?}");
        }
    }

    #[test]
    fn prose_and_fences_around_the_object_are_ignored() {
        let text = format!("Here is the result:\n```json\n{}\n```\nThanks", sample_report("Plastic Bottle"));
        for mode in both_modes() {
            let report = extract_and_validate(&raw(text.clone()), mode).unwrap();
            assert_eq!(report.object["isim"], "Plastic Bottle");
        }
    }

    #[test]
    fn single_missing_key_is_reported() {
        for section in Section::ORDER {
            let mut doc = sample_report("Lamp");
            doc.as_object_mut().unwrap().remove(section.key());
            let err = extract_and_validate(&raw(doc.to_string()), SpanMode::Greedy).unwrap_err();
            assert!(matches!(err, ExtractError::MissingField { field } if field == section));
        }
    }

    #[test]
    fn only_object_section_reports_material_next() {
        let text = json!({ "nesne": { "isim": "Cup", "kategori": "Plastik" } }).to_string();
        let err = extract_and_validate(&raw(text), SpanMode::Greedy).unwrap_err();
        assert!(matches!(err, ExtractError::MissingField { field: Section::Material }));
    }

    #[test]
    fn greedy_swallows_a_trailing_stray_brace() {
        let text = format!("{}\nNote: ignore this }} please", sample_report("Can"));
        let err = extract_and_validate(&raw(text), SpanMode::Greedy).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedJson(_)));
    }

    #[test]
    fn balanced_stops_at_the_matching_brace() {
        let text = format!("{}\nNote: ignore this }} {{ please", sample_report("Can"));
        let report = extract_and_validate(&raw(text), SpanMode::Balanced).unwrap();
        assert_eq!(report.object["isim"], "Can");
    }

    #[test]
    fn balanced_ignores_braces_inside_strings() {
        let text = r#"x {"a": "}{", "b": "\"}"} y }"#;
        assert_eq!(locate_json_span(text, SpanMode::Balanced), Some(r#"{"a": "}{", "b": "\"}"}"#));
        assert_eq!(locate_json_span(text, SpanMode::Greedy), Some(r#"{"a": "}{", "b": "\"}"} y }"#));
    }

    #[test]
    fn balanced_unclosed_object_has_no_span() {
        assert_eq!(locate_json_span(r#"{"nesne": {"isim": "x"}"#, SpanMode::Balanced), None);
        let err = extract_and_validate(&raw(r#"{"nesne": {"#), SpanMode::Balanced).unwrap_err();
        assert!(matches!(err, ExtractError::NoJsonFound));
    }

    #[test]
    fn greedy_needs_a_closing_brace_after_the_opening_one() {
        assert_eq!(locate_json_span("} then {", SpanMode::Greedy), None);
        assert_eq!(locate_json_span("a {} b", SpanMode::Greedy), Some("{}"));
    }

    #[test]
    fn span_mode_parses_from_config_strings() {
        assert_eq!("greedy".parse::<SpanMode>(), Ok(SpanMode::Greedy));
        assert_eq!(" STRICT ".parse::<SpanMode>(), Ok(SpanMode::Balanced));
        assert!("fuzzy".parse::<SpanMode>().is_err());
        assert_eq!(SpanMode::default(), SpanMode::Greedy);
    }
}
