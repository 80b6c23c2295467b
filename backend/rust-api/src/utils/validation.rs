use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SENTENCE_BOUNDARY: Regex = Regex::new(r"[.!?]+").unwrap();
}

/// Stock phrases that add nothing to a practice turn. Single words are
/// already caught by the length check; the multi-word entries matter here.
const STOCK_PHRASES: &[&str] = &[
    "i don't know",
    "i dont know",
    "no idea",
    "not sure",
    "nothing to add",
    "whatever you think",
    "whatever works",
    "sounds good to me",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VagueReason {
    TooShort,
    StockPhrase,
    RepeatedCharacters,
}

impl VagueReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            VagueReason::TooShort => "too_short",
            VagueReason::StockPhrase => "stock_phrase",
            VagueReason::RepeatedCharacters => "repeated_characters",
        }
    }
}

/// Quality gate for free-text responses. A vague response is never
/// rejected; the caller records the flag so completion aggregation can
/// discount it from strength signals.
pub fn vague_reason(response: &str) -> Option<VagueReason> {
    let cleaned = response.trim().to_lowercase();
    if cleaned.is_empty() {
        return Some(VagueReason::TooShort);
    }

    if cleaned.split_whitespace().count() < 3 {
        return Some(VagueReason::TooShort);
    }

    if STOCK_PHRASES.contains(&cleaned.as_str()) {
        return Some(VagueReason::StockPhrase);
    }

    let chars: Vec<char> = cleaned.chars().filter(|c| !c.is_whitespace()).collect();
    let distinct = {
        let mut seen = chars.clone();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    };
    let floor = std::cmp::max(3, (chars.len() as f64 * 0.3).ceil() as usize);
    if distinct < floor {
        return Some(VagueReason::RepeatedCharacters);
    }

    None
}

/// Rough sentence count over `.`, `!` and `?` boundaries.
pub fn sentence_count(text: &str) -> u32 {
    SENTENCE_BOUNDARY
        .split(text)
        .filter(|fragment| !fragment.trim().is_empty())
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_responses_are_vague() {
        assert_eq!(vague_reason("ok"), Some(VagueReason::TooShort));
        assert_eq!(vague_reason("  yes  "), Some(VagueReason::TooShort));
        assert_eq!(vague_reason(""), Some(VagueReason::TooShort));
    }

    #[test]
    fn stock_phrases_are_vague() {
        assert_eq!(vague_reason("I don't know"), Some(VagueReason::StockPhrase));
        assert_eq!(
            vague_reason("sounds good to me"),
            Some(VagueReason::StockPhrase)
        );
    }

    #[test]
    fn repeated_characters_are_vague() {
        assert_eq!(
            vague_reason("aaaa aaaa aaaa"),
            Some(VagueReason::RepeatedCharacters)
        );
    }

    #[test]
    fn substantive_responses_pass() {
        let response = "I would schedule a one-on-one with the colleague to \
                        understand their concerns before escalating.";
        assert_eq!(vague_reason(response), None);
    }

    #[test]
    fn counts_sentences() {
        assert_eq!(sentence_count("One. Two! Three?"), 3);
        assert_eq!(sentence_count("no terminal punctuation"), 1);
        assert_eq!(sentence_count(""), 0);
    }
}
