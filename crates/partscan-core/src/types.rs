use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationId(pub String);

/// Outcome of comparing the classifier's predicted label against the
/// expected part identifier decoded from the QR code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Unset,
    Match,
    Mismatch,
}

impl Verdict {
    /// Derives the verdict from a predicted label and the expected QR text.
    ///
    /// The comparison is exact: case-sensitive, no trimming. An empty
    /// predicted label against an empty QR text is a match.
    pub fn of(predicted_label: &str, qr_text: &str) -> Self {
        if predicted_label == qr_text {
            Verdict::Match
        } else {
            Verdict::Mismatch
        }
    }
}

impl Default for Verdict {
    fn default() -> Self {
        Verdict::Unset
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Unset => write!(f, "unset"),
            Verdict::Match => write!(f, "match"),
            Verdict::Mismatch => write!(f, "mismatch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Verdict;
    use proptest::prelude::*;

    #[test]
    fn exact_equality_is_a_match() {
        assert_eq!(Verdict::of("PART-123", "PART-123"), Verdict::Match);
    }

    #[test]
    fn comparison_is_case_sensitive() {
        assert_eq!(Verdict::of("part-123", "PART-123"), Verdict::Mismatch);
    }

    #[test]
    fn no_trimming_is_applied() {
        assert_eq!(Verdict::of(" PART-123", "PART-123"), Verdict::Mismatch);
    }

    #[test]
    fn empty_against_empty_matches() {
        assert_eq!(Verdict::of("", ""), Verdict::Match);
    }

    #[test]
    fn empty_against_nonempty_mismatches() {
        assert_eq!(Verdict::of("", "PART-123"), Verdict::Mismatch);
        assert_eq!(Verdict::of("PART-123", ""), Verdict::Mismatch);
    }

    proptest! {
        #[test]
        fn verdict_is_match_iff_labels_equal(a in ".*", b in ".*") {
            let verdict = Verdict::of(&a, &b);
            if a == b {
                prop_assert_eq!(verdict, Verdict::Match);
            } else {
                prop_assert_eq!(verdict, Verdict::Mismatch);
            }
        }

        #[test]
        fn verdict_of_equal_labels_is_always_match(a in ".*") {
            prop_assert_eq!(Verdict::of(&a, &a), Verdict::Match);
        }

        #[test]
        fn case_flip_of_alphabetic_label_mismatches(a in "[a-z]{1,16}") {
            let upper = a.to_ascii_uppercase();
            prop_assert_eq!(Verdict::of(&upper, &a), Verdict::Mismatch);
        }
    }
}
