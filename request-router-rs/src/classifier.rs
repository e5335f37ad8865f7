// request-router-rs/src/classifier.rs
// Keyword classification of guest request text into departments

use once_cell::sync::Lazy;
use shared_types::Department;

/// Strategy interface for department classification.
pub trait RequestClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Department;
}

const KEYWORDS: &[(&str, Department)] = &[
    ("bathroom", Department::Housekeeping),
    ("bed", Department::Housekeeping),
    ("clean", Department::Housekeeping),
    ("housekeeping", Department::Housekeeping),
    ("linen", Department::Housekeeping),
    ("pillow", Department::Housekeeping),
    ("sheet", Department::Housekeeping),
    ("soap", Department::Housekeeping),
    ("toilet paper", Department::Housekeeping),
    ("towel", Department::Housekeeping),
    ("trash", Department::Housekeeping),
    ("breakfast", Department::RoomService),
    ("dinner", Department::RoomService),
    ("drink", Department::RoomService),
    ("food", Department::RoomService),
    ("hungry", Department::RoomService),
    ("lunch", Department::RoomService),
    ("menu", Department::RoomService),
    ("room service", Department::RoomService),
    ("wine", Department::RoomService),
    ("bill", Department::FrontDesk),
    ("check in", Department::FrontDesk),
    ("check out", Department::FrontDesk),
    ("checkin", Department::FrontDesk),
    ("checkout", Department::FrontDesk),
    ("concierge", Department::FrontDesk),
    ("invoice", Department::FrontDesk),
    ("key", Department::FrontDesk),
    ("late checkout", Department::FrontDesk),
    ("reservation", Department::FrontDesk),
    ("taxi", Department::FrontDesk),
    ("wake up", Department::FrontDesk),
    ("computer", Department::It),
    ("internet", Department::It),
    ("password", Department::It),
    ("remote", Department::It),
    ("television", Department::It),
    ("tv", Department::It),
    ("wifi", Department::It),
    ("wi-fi", Department::It),
];

/// Keyword table in match order (lexicographic by keyword)
pub static KEYWORD_TABLE: Lazy<Vec<(&'static str, Department)>> = Lazy::new(|| {
    let mut table = KEYWORDS.to_vec();
    table.sort_by(|a, b| a.0.cmp(b.0));
    table
});

/// Case-insensitive substring match; the first keyword in table order wins,
/// unmatched text is General.
pub fn classify(text: &str) -> Department {
    let lowered = text.to_lowercase();
    KEYWORD_TABLE
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, department)| *department)
        .unwrap_or(Department::General)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordClassifier;

impl RequestClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Department {
        classify(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn towel_is_housekeeping_in_any_case() {
        assert_eq!(classify("I need clean towels"), Department::Housekeeping);
        assert_eq!(classify("TOWEL please"), Department::Housekeeping);
        assert_eq!(classify("ToWeL"), Department::Housekeeping);
    }

    #[test]
    fn no_keyword_is_general() {
        assert_eq!(classify("blah blah"), Department::General);
        assert_eq!(classify(""), Department::General);
    }

    #[test]
    fn each_department_is_reachable() {
        assert_eq!(classify("Can I see the dinner menu?"), Department::RoomService);
        assert_eq!(classify("I'd like a late checkout"), Department::FrontDesk);
        assert_eq!(classify("The WiFi is down"), Department::It);
    }

    #[test]
    fn table_is_sorted_and_first_match_wins() {
        assert!(KEYWORD_TABLE.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(KEYWORD_TABLE.len(), KEYWORDS.len());
        // "bed" sorts before "breakfast"
        assert_eq!(classify("breakfast in bed"), Department::Housekeeping);
        // "internet" sorts before "room service"
        assert_eq!(classify("room service internet menu"), Department::It);
    }

    #[test]
    fn classification_is_deterministic() {
        let classifier = KeywordClassifier;
        for text in ["my tv remote is broken", "taxi to the airport", "hello"] {
            assert_eq!(classifier.classify(text), classify(text));
            assert_eq!(classify(text), classify(text));
        }
    }
}
