//! Review text preprocessing: cleaning, stopword removal, language detection, stemming.
//!
//! The rest of the crate only sees the [`Preprocessor`] trait and treats its output as
//! always-available plain text, so nothing in here is allowed to fail.

use crate::stem::stem_indonesian;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref URL_RE: Regex = Regex::new(r"http\S+|www\S+").expect("valid regex");
    static ref ENGLISH_STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS_EN: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any",
            "are", "aren", "as", "at", "be", "because", "been", "before", "being", "below",
            "between", "both", "but", "by", "can", "cannot", "could", "couldn", "did", "didn",
            "do", "does", "doesn", "doing", "don", "down", "during", "each", "few", "for", "from",
            "further", "had", "hadn", "has", "hasn", "have", "haven", "having", "he", "her",
            "here", "hers", "herself", "him", "himself", "his", "how", "i", "if", "in", "into",
            "is", "isn", "it", "its", "itself", "just", "let", "me", "more", "most", "mustn", "my",
            "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other",
            "ought", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should",
            "shouldn", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
            "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
            "too", "under", "until", "up", "very", "was", "wasn", "we", "were", "weren", "what",
            "when", "where", "which", "while", "who", "whom", "why", "will", "with", "won",
            "would", "wouldn", "you", "your", "yours", "yourself", "yourselves",
        ];
        words.iter().copied().collect()
    };
    static ref STOPWORDS_ID: HashSet<&'static str> = {
        let words: &[&str] = &[
            "ada", "adalah", "adanya", "agak", "agar", "akan", "akhirnya", "aku", "amat", "anda",
            "antara", "apa", "apabila", "apakah", "atau", "atas", "bagaimana", "bagi", "bahkan",
            "bahwa", "banget", "banyak", "baru", "beberapa", "begitu", "belum", "benar", "berapa",
            "biasa", "biasanya", "bila", "bisa", "boleh", "buat", "bukan", "cukup", "cuma",
            "dalam", "dan", "dapat", "dari", "daripada", "deh", "dengan", "di", "dia", "dong",
            "dulu", "hal", "hampir", "hanya", "harus", "hingga", "ia", "ini", "itu", "jadi",
            "jika", "juga", "jangan", "kalau", "kali", "kami", "kamu", "kan", "karena", "ke",
            "kecuali", "kemudian", "kenapa", "kepada", "ketika", "kita", "kok", "kurang", "lagi",
            "lah", "lain", "lalu", "lebih", "masih", "mau", "meski", "mereka", "mungkin", "nah",
            "namun", "nanti", "nya", "oleh", "pada", "para", "pernah", "pula", "pun", "saat",
            "saja", "sama", "sambil", "sampai", "sangat", "saya", "sebab", "sebagai", "sebelum",
            "sedang", "sedikit", "segera", "sehingga", "sekali", "sekarang", "selalu", "semua",
            "sempat", "sendiri", "seperti", "serta", "sesudah", "setelah", "setiap", "sih",
            "siapa", "soal", "sudah", "supaya", "tadi", "tapi", "telah", "tentang", "tentu",
            "terhadap", "tersebut", "tetapi", "tidak", "toh", "untuk", "waktu", "walau", "ya",
            "yaitu", "yakni", "yang", "yg",
        ];
        words.iter().copied().collect()
    };
}

/// Turns raw review text into a cleaned, tokenized, stemmed string.
pub trait Preprocessor: Send + Sync {
    fn preprocess(&self, raw: &str) -> String;
}

/// Passes text through unchanged, for corpora that are already clean.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityPreprocessor;

impl Preprocessor for IdentityPreprocessor {
    fn preprocess(&self, raw: &str) -> String { raw.to_string() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Indonesian,
    English,
}

/// Guesses the language of already-cleaned text.
pub trait LanguageDetector: Send + Sync {
    /// `None` means undecidable; callers fall back to a default language.
    fn detect(&self, tokens: &[&str]) -> Option<Language>;
}

/// Votes by counting stopword hits from each language's list.
#[derive(Debug, Default, Clone, Copy)]
pub struct StopwordDetector;

impl LanguageDetector for StopwordDetector {
    fn detect(&self, tokens: &[&str]) -> Option<Language> {
        let id = tokens.iter().filter(|t| STOPWORDS_ID.contains(*t)).count();
        let en = tokens.iter().filter(|t| STOPWORDS_EN.contains(*t)).count();
        match (id, en) {
            (0, 0) => None,
            (id, en) if en > id => Some(Language::English),
            _ => Some(Language::Indonesian),
        }
    }
}

/// Default review cleaner.
///
/// Indonesian text is stemmed. English tokens are kept as written unless
/// [`TextCleaner::with_english_stemming`] is set, because segment keywords such as
/// `aesthetic` are matched as substrings of the cleaned text.
pub struct TextCleaner {
    detector: Box<dyn LanguageDetector>,
    fallback: Language,
    min_token_len: usize,
    stem_english: bool,
}

impl Default for TextCleaner {
    fn default() -> Self {
        Self {
            detector: Box::new(StopwordDetector),
            fallback: Language::Indonesian,
            min_token_len: 3,
            stem_english: false,
        }
    }
}

impl TextCleaner {
    pub fn new() -> Self { Self::default() }

    pub fn with_detector(mut self, detector: Box<dyn LanguageDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_fallback(mut self, fallback: Language) -> Self {
        self.fallback = fallback;
        self
    }

    /// Snowball-stem tokens of English reviews.
    pub fn with_english_stemming(mut self, enabled: bool) -> Self {
        self.stem_english = enabled;
        self
    }

    pub fn detect_language(&self, tokens: &[&str]) -> Language {
        self.detector.detect(tokens).unwrap_or(self.fallback)
    }
}

impl Preprocessor for TextCleaner {
    fn preprocess(&self, raw: &str) -> String {
        let normalized = normalize(raw);
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        let lang = self.detect_language(&tokens);
        tokens
            .into_iter()
            .filter(|t| t.len() >= self.min_token_len && !is_stopword(t))
            .map(|t| match lang {
                Language::Indonesian => stem_indonesian(t),
                Language::English if self.stem_english => ENGLISH_STEMMER.stem(t).to_string(),
                Language::English => t.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Lowercase, fold accents, drop URLs and anything that is not `a-z`, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let without_urls = URL_RE.replace_all(&lowered, " ");
    let folded: String = without_urls
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c.is_ascii_lowercase() || c.is_whitespace() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS_ID.contains(token) || STOPWORDS_EN.contains(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_urls_digits_and_punctuation() {
        let out = normalize("Cek www.kopi.id!! Harga 25K, http://x.y/z mantap");
        assert_eq!(out, "cek harga k mantap");
    }

    #[test]
    fn undecidable_language_falls_back() {
        let cleaner = TextCleaner::new();
        assert_eq!(cleaner.detect_language(&[]), Language::Indonesian);
        let english = ["the", "coffee", "was", "good"];
        assert_eq!(cleaner.detect_language(&english), Language::English);
        let indonesian = ["kopi", "yang", "enak", "dan", "murah"];
        assert_eq!(cleaner.detect_language(&indonesian), Language::Indonesian);
    }

    #[test]
    fn english_tokens_are_kept_as_written() {
        let out = TextCleaner::new()
            .preprocess("The interior is so aesthetic and the specialty coffee was amazing");
        assert_eq!(out, "interior aesthetic specialty coffee amazing");
    }

    #[test]
    fn english_stemming_is_opt_in() {
        let out = TextCleaner::new()
            .with_english_stemming(true)
            .preprocess("The baristas were friendly and the drinks were amazing");
        let words: Vec<&str> = out.split(' ').collect();
        assert!(words.contains(&"barista"));
        assert!(words.contains(&"drink"));
        assert!(!words.contains(&"the"));
    }
}
