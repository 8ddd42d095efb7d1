use crate::types::SignalCategory;

/// Leading glyphs recognized as signal markers, in classification priority
/// order alongside their textual synonyms.
const MARKERS: &[(&str, &str, SignalCategory)] = &[
    ("\u{1F7E2}", "进场", SignalCategory::Entry), // 🟢
    ("\u{1F525}", "倍投", SignalCategory::Fire),  // 🔥
    ("\u{1F7E1}", "观望", SignalCategory::Wait),  // 🟡
    ("\u{1F535}", "持有", SignalCategory::Hold),  // 🔵
];

/// A signal string decomposed for rendering: taxonomy bucket plus the
/// (marker, remainder) text split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalClassification {
    pub category: SignalCategory,
    pub marker: String,
    pub remainder: String,
}

impl SignalClassification {
    fn none() -> Self {
        Self {
            category: SignalCategory::None,
            marker: String::new(),
            remainder: String::new(),
        }
    }
}

/// Classify a free-text signal. Total over all strings: empty input maps to
/// `none`, unrecognized text keeps category `none` with the trimmed original
/// as remainder. Categories are checked by substring containment in fixed
/// priority order — markers are not mutually exclusive, first match wins.
pub fn classify(signal: &str) -> SignalClassification {
    if signal.is_empty() {
        return SignalClassification::none();
    }

    let category = MARKERS
        .iter()
        .find(|(glyph, synonym, _)| signal.contains(glyph) || signal.contains(synonym))
        .map(|&(_, _, cat)| cat)
        .unwrap_or(SignalCategory::None);

    let (marker, remainder) = split_marker(signal);

    SignalClassification { category, marker, remainder }
}

/// Split a leading recognized glyph (plus one following whitespace run) off
/// the signal text. Unmarked or partially-marked text comes back with an
/// empty marker and the trimmed original as remainder.
fn split_marker(signal: &str) -> (String, String) {
    for (glyph, _, _) in MARKERS {
        if let Some(rest) = signal.strip_prefix(glyph) {
            return (glyph.to_string(), rest.trim_start().trim_end().to_string());
        }
    }
    (String::new(), signal.trim().to_string())
}
