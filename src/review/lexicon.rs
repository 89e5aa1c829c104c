//! Keyword tables for aspect matching and local sentiment
//!
//! Matching works on lowercase word tokens (single keywords) and on the
//! space-normalized lowercase sentence (multi-word phrases), so "fit" never
//! matches inside "outfit".

use super::types::AspectTag;

/// Weight of a single keyword hit towards match confidence
pub const KEYWORD_WEIGHT: f32 = 0.4;
/// Weight of a phrase hit towards match confidence
pub const PHRASE_WEIGHT: f32 = 0.8;

pub struct AspectLexicon {
    pub tag: AspectTag,
    pub keywords: &'static [&'static str],
    pub phrases: &'static [&'static str],
}

pub const ASPECT_LEXICON: &[AspectLexicon] = &[
    AspectLexicon {
        tag: AspectTag::Fit,
        keywords: &[
            "fit", "fits", "fitting", "fitted", "size", "sizes", "sizing", "sized", "snug",
            "tight", "loose", "baggy", "petite", "length", "inseam", "waist", "hips", "bust",
        ],
        phrases: &[
            "true to size",
            "runs small",
            "runs large",
            "runs big",
            "size up",
            "size down",
            "sized up",
            "sized down",
            "too small",
            "too big",
            "too tight",
            "too loose",
            "too long",
            "too short",
        ],
    },
    AspectLexicon {
        tag: AspectTag::Style,
        keywords: &[
            "style", "stylish", "design", "look", "looks", "fashion", "fashionable", "trendy",
            "classic", "cute", "elegant", "chic", "pattern", "aesthetic", "flattering",
            "gorgeous", "compliments",
        ],
        phrases: &["looks great", "looks cheap", "so many compliments", "dress up"],
    },
    AspectLexicon {
        tag: AspectTag::Comfort,
        keywords: &[
            "comfort", "comfortable", "uncomfortable", "comfy", "soft", "cozy", "itchy",
            "scratchy", "breathable", "stretchy", "wearable", "irritating",
        ],
        phrases: &["all day", "feels great", "digs in"],
    },
    AspectLexicon {
        tag: AspectTag::Material,
        keywords: &[
            "material", "fabric", "cotton", "polyester", "silk", "linen", "leather",
            "synthetic", "wool", "blend", "canvas", "denim", "thin", "thick", "sheer",
            "flimsy", "lining", "lined",
        ],
        phrases: &["see through", "see-through"],
    },
    AspectLexicon {
        tag: AspectTag::Color,
        keywords: &[
            "color", "colour", "colors", "colours", "shade", "tone", "hue", "vibrant", "dull",
            "bright", "faded", "fade", "fades", "dye",
        ],
        phrases: &["true to color", "than pictured", "color is off", "colour is off"],
    },
    AspectLexicon {
        tag: AspectTag::Quality,
        keywords: &[
            "quality", "durable", "sturdy", "craftsmanship", "stitching", "seams", "seam",
            "construction", "lasting", "tear", "ripped", "pilling", "pills", "unraveling",
            "workmanship", "zipper",
        ],
        phrases: &["fell apart", "held up", "after one wash", "falling apart"],
    },
    AspectLexicon {
        tag: AspectTag::Value,
        keywords: &[
            "price", "value", "worth", "expensive", "cheap", "overpriced", "cost", "budget",
            "deal", "bargain", "money", "affordable",
        ],
        phrases: &["worth every penny", "for the price", "waste of money", "on sale"],
    },
];

const POSITIVE_WORDS: &[&str] = &[
    "excellent", "amazing", "great", "good", "love", "loved", "loves", "perfect",
    "perfectly", "recommend", "fantastic", "wonderful", "best", "awesome", "satisfied",
    "pleased", "impressive", "superb", "beautiful", "gorgeous", "flattering", "comfortable",
    "comfy", "soft", "cozy", "sturdy", "durable", "vibrant", "affordable", "bargain",
    "stylish", "cute", "elegant", "chic", "breathable",
];

const NEGATIVE_WORDS: &[&str] = &[
    "poor", "terrible", "bad", "awful", "horrible", "disappointing", "disappointed",
    "avoid", "worst", "regret", "waste", "defective", "broken", "cheap", "frustrated",
    "itchy", "scratchy", "uncomfortable", "flimsy", "faded", "ripped", "overpriced",
    "returned", "returning", "unflattering", "pilling", "dull",
];

const POSITIVE_PHRASES: &[&str] = &[
    "worth every penny",
    "highly recommend",
    "very happy",
    "no complaints",
    "exceeded expectations",
    "true to size",
    "true to color",
    "fits perfectly",
    "held up",
    "so many compliments",
];

const NEGATIVE_PHRASES: &[&str] = &[
    "waste of money",
    "don't buy",
    "not worth",
    "very disappointed",
    "would not recommend",
    "runs small",
    "runs large",
    "runs big",
    "too small",
    "too big",
    "too tight",
    "too loose",
    "too short",
    "too long",
    "fell apart",
    "falling apart",
    "color is off",
    "colour is off",
    "after one wash",
    "see through",
    "digs in",
    "looks cheap",
];

const NEGATORS: &[&str] = &[
    "not", "never", "no", "isn't", "wasn't", "don't", "didn't", "doesn't", "aren't",
    "hardly",
];

/// Lowercase word tokens, keeping apostrophes and hyphens inside words
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .map(|t| t.trim_matches(|c| c == '\'' || c == '-').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Lowercase text with single spaces between tokens, padded on both ends
fn phrase_haystack(tokens: &[String]) -> String {
    format!(" {} ", tokens.join(" "))
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.contains(&format!(" {} ", phrase))
}

/// Splits review text into sentences on terminal punctuation and line breaks
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?', ';', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Aspect hits in one sentence, with the accumulated match weight per aspect
pub fn match_aspects(sentence: &str) -> Vec<(AspectTag, f32)> {
    let tokens = tokenize(sentence);
    let haystack = phrase_haystack(&tokens);

    ASPECT_LEXICON
        .iter()
        .filter_map(|lex| {
            let keyword_hits = tokens
                .iter()
                .filter(|t| lex.keywords.contains(&t.as_str()))
                .count() as f32;
            let phrase_hits = lex
                .phrases
                .iter()
                .filter(|p| contains_phrase(&haystack, p))
                .count() as f32;
            let weight = keyword_hits * KEYWORD_WEIGHT + phrase_hits * PHRASE_WEIGHT;
            (weight > 0.0).then_some((lex.tag, weight))
        })
        .collect()
}

/// Positive and negative indicator counts for one sentence
///
/// Phrases count double. A sentiment word preceded by a negator within two
/// tokens counts towards the opposite polarity.
pub fn sentiment_counts(sentence: &str) -> (u32, u32) {
    let tokens = tokenize(sentence);
    let haystack = phrase_haystack(&tokens);

    let mut positive = 0u32;
    let mut negative = 0u32;

    for (i, token) in tokens.iter().enumerate() {
        let polarity = if POSITIVE_WORDS.contains(&token.as_str()) {
            1
        } else if NEGATIVE_WORDS.contains(&token.as_str()) {
            -1
        } else {
            continue;
        };

        let negated = tokens[i.saturating_sub(2)..i]
            .iter()
            .any(|t| NEGATORS.contains(&t.as_str()));

        match (polarity, negated) {
            (1, false) | (-1, true) => positive += 1,
            _ => negative += 1,
        }
    }

    positive += 2 * POSITIVE_PHRASES
        .iter()
        .filter(|p| contains_phrase(&haystack, p))
        .count() as u32;
    negative += 2 * NEGATIVE_PHRASES
        .iter()
        .filter(|p| contains_phrase(&haystack, p))
        .count() as u32;

    (positive, negative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_keeps_contractions() {
        assert_eq!(
            tokenize("Don't buy it -- SO tight!"),
            vec!["don't", "buy", "it", "so", "tight"]
        );
    }

    #[test]
    fn test_keyword_needs_word_boundary() {
        assert!(match_aspects("What a lovely outfit").is_empty());
        let hits = match_aspects("It fits well");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, AspectTag::Fit);
    }

    #[test]
    fn test_phrase_weighs_more_than_keyword() {
        let hits = match_aspects("Runs small, true to size would be a medium");
        let fit = hits.iter().find(|(t, _)| *t == AspectTag::Fit).unwrap();
        assert!(fit.1 >= 2.0 * PHRASE_WEIGHT);
    }

    #[test]
    fn test_multiple_aspects_in_one_sentence() {
        let tags: Vec<_> = match_aspects("Soft cotton fabric in a vibrant color")
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert!(tags.contains(&AspectTag::Comfort));
        assert!(tags.contains(&AspectTag::Material));
        assert!(tags.contains(&AspectTag::Color));
    }

    #[test]
    fn test_sentiment_negation_flips() {
        let (pos, neg) = sentiment_counts("The fabric is not soft at all");
        assert_eq!((pos, neg), (0, 1));
    }

    #[test]
    fn test_sentiment_phrases_count_double() {
        let (pos, neg) = sentiment_counts("Worth every penny");
        assert_eq!((pos, neg), (2, 0));
        let (pos, neg) = sentiment_counts("It runs small");
        assert_eq!((pos, neg), (0, 2));
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("Love it! Runs small. Would buy again\nFive stars");
        assert_eq!(
            sentences,
            vec!["Love it", "Runs small", "Would buy again", "Five stars"]
        );
    }
}
