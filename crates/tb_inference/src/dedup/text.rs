use std::collections::HashSet;

use lazy_static::lazy_static;

lazy_static! {
    static ref STOP_WORDS: HashSet<&'static str> = [
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "how", "in",
        "into", "is", "it", "its", "new", "of", "on", "or", "over", "that", "the", "their", "this",
        "to", "up", "via", "vs", "was", "what", "when", "why", "will", "with", "you", "your",
    ]
    .into_iter()
    .collect();
}

/// Lowercases, turns punctuation into spaces and collapses whitespace.
pub fn normalize(text: &str) -> String {
    let spaced: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();
    spaced.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn word_set(text: &str) -> HashSet<String> {
    normalize(text).split(' ').filter(|w| !w.is_empty()).map(str::to_string).collect()
}

/// Word set without stop words, used by the title overlap filter.
pub fn content_words(text: &str) -> HashSet<String> {
    word_set(text)
        .into_iter()
        .filter(|w| !STOP_WORDS.contains(w.as_str()))
        .collect()
}

/// Intersection over union. Zero when either side is empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

pub fn text_similarity(a: &str, b: &str) -> f64 {
    jaccard(&word_set(a), &word_set(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  OpenAI   releases GPT-5!  "), "openai releases gpt 5");
        assert_eq!(normalize("..."), "");
    }

    #[test]
    fn test_jaccard_bounds_and_symmetry() {
        let pairs = [
            ("OpenAI releases GPT-5", "OpenAI launches GPT 5 model"),
            ("Google DeepMind", "NVIDIA earnings"),
            ("a b c", "c d"),
        ];
        for (a, b) in pairs {
            let ab = text_similarity(a, b);
            let ba = text_similarity(b, a);
            assert_eq!(ab, ba);
            assert!((0.0..=1.0).contains(&ab));
        }
    }

    #[test]
    fn test_jaccard_identity_and_empty() {
        assert_eq!(text_similarity("Same Title Here", "same title, here"), 1.0);
        assert_eq!(text_similarity("", "anything"), 0.0);
        assert_eq!(text_similarity("", ""), 0.0);
        assert_eq!(text_similarity("!!!", "???"), 0.0);
    }

    #[test]
    fn test_punctuation_splits_words() {
        let sim = text_similarity("OpenAI releases GPT-5", "OpenAI launches GPT 5 model");
        assert!((sim - 3.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_content_words_drop_stop_words() {
        let words = content_words("The Future of AI in the Cloud");
        let mut sorted: Vec<&str> = words.iter().map(String::as_str).collect();
        sorted.sort();
        assert_eq!(sorted, vec!["ai", "cloud", "future"]);
    }
}
