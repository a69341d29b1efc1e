//! Cleanup for text read back from a rendering surface.
//!
//! Text extracted from rendered labels often carries typographic dashes and
//! letter/digit confusions inside numbers (`2l0O45` for `210045`). The rules
//! here only touch characters sitting between digits, so ordinary words are
//! left alone.

use once_cell::sync::Lazy;
use regex_lite::Regex;

const DASHES: &[char] = &[
    '\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}', '\u{2015}', '\u{2212}', '\u{FE58}',
    '\u{FE63}', '\u{FF0D}',
];

static BETWEEN_DIGITS: Lazy<[(Regex, &'static str); 3]> = Lazy::new(|| {
    [
        (Regex::new(r"(\d)[mO](\d)").unwrap(), "${1}0${2}"),
        (Regex::new(r"(\d)[lI](\d)").unwrap(), "${1}1${2}"),
        (Regex::new(r"(\d)S(\d)").unwrap(), "${1}6${2}"),
    ]
});

/// Fold dash variants to `-` and repair digit confusions inside numbers.
pub fn clean_extracted_text(text: &str) -> String {
    let mut out: String = text
        .chars()
        .map(|c| if DASHES.contains(&c) { '-' } else { c })
        .collect();

    // Matches can overlap ("1l1l1"), so repeat until nothing changes.
    loop {
        let mut changed = false;
        for (re, replacement) in BETWEEN_DIGITS.iter() {
            let next = re.replace_all(&out, *replacement).into_owned();
            if next != out {
                out = next;
                changed = true;
            }
        }
        if !changed {
            return out;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dashes_folded() {
        assert_eq!(clean_extracted_text("EPA\u{2013}12345\u{2014}6"), "EPA-12345-6");
        assert_eq!(clean_extracted_text("a\u{2212}b"), "a-b");
    }

    #[test]
    fn test_digit_confusions() {
        assert_eq!(clean_extracted_text("2l0O45"), "210045");
        assert_eq!(clean_extracted_text("12m34"), "12034");
        assert_eq!(clean_extracted_text("9S9"), "969");
        assert_eq!(clean_extracted_text("1I2"), "112");
    }

    #[test]
    fn test_overlapping_runs() {
        assert_eq!(clean_extracted_text("1l1l1"), "11111");
    }

    #[test]
    fn test_words_untouched() {
        let text = "Lot Item SOLO mOm EPA";
        assert_eq!(clean_extracted_text(text), text);
        assert_eq!(clean_extracted_text("NP6MSTGQP1"), "NP6MSTGQP1");
    }
}
