//! Dictionary-free Indonesian affix stripper.
//!
//! Removes inflectional particles and possessives, one derivational prefix and one
//! derivational suffix. `-kan` is only treated as a suffix on prefixed words; bare nouns
//! such as `colokan` lose `-an` instead. Every candidate stem must keep at least
//! [`MIN_STEM`] letters and start with a plausible syllable; otherwise the affix stays.

use lazy_static::lazy_static;
use std::collections::HashSet;

const MIN_STEM: usize = 4;

lazy_static! {
    /// Roots that look affixed but are not.
    static ref PROTECTED: HashSet<&'static str> = {
        let words: &[&str] = &[
            "nyaman", "lumayan", "karyawan", "pelayan", "dingin", "berisik", "kenyang", "pesan",
            "makan", "minum", "ruang", "layan", "teman", "jalan", "ikan", "tekan", "santai",
            "ramai", "pakai", "sampai", "pantai", "kedai", "mewah", "memang", "menu", "pelan",
            "tenang", "senang", "kencang", "segar", "sedap",
        ];
        words.iter().copied().collect()
    };
}

pub fn stem_indonesian(word: &str) -> String {
    if word.len() <= MIN_STEM || !word.is_ascii() || PROTECTED.contains(word) {
        return word.to_string();
    }
    let mut w = word.to_string();
    for particle in ["lah", "kah", "tah", "pun"] {
        if strip_suffix(&mut w, particle) { break; }
    }
    for possessive in ["nya", "ku", "mu"] {
        if strip_suffix(&mut w, possessive) { break; }
    }
    if PROTECTED.contains(w.as_str()) { return w; }
    let prefixed = strip_prefix(&mut w);
    if PROTECTED.contains(w.as_str()) { return w; }
    if !(prefixed && strip_suffix(&mut w, "kan")) {
        strip_suffix(&mut w, "an");
    }
    w
}

fn is_vowel(c: u8) -> bool { matches!(c, b'a' | b'e' | b'i' | b'o' | b'u') }

fn plausible_stem(stem: &str) -> bool {
    let b = stem.as_bytes();
    if b.len() < MIN_STEM { return false; }
    if is_vowel(b[0]) || is_vowel(b[1]) { return true; }
    matches!(
        &stem[..2],
        "ng" | "ny" | "kh" | "sy" | "tr" | "pr" | "kr" | "gr" | "br" | "bl" | "st" | "sp" | "sk"
            | "pl" | "kl" | "fl"
    )
}

fn strip_suffix(w: &mut String, suffix: &str) -> bool {
    match w.strip_suffix(suffix) {
        Some(stem) if stem.len() >= MIN_STEM => {
            let keep = stem.len();
            w.truncate(keep);
            true
        }
        _ => false,
    }
}

/// Candidate stems for the prefix `w` starts with, most specific first.
fn prefix_candidates(w: &str) -> Vec<String> {
    let mut out = Vec::new();
    const NASAL: [(&str, Option<char>); 8] = [
        ("meng", None),
        ("peng", None),
        ("meny", Some('s')),
        ("peny", Some('s')),
        ("mem", Some('p')),
        ("pem", Some('p')),
        ("men", Some('t')),
        ("pen", Some('t')),
    ];
    for (nasal, recode_vowel) in NASAL {
        if let Some(rest) = w.strip_prefix(nasal) {
            let starts_vowel = rest.bytes().next().is_some_and(is_vowel);
            match recode_vowel {
                Some(c) if starts_vowel => out.push(format!("{c}{rest}")),
                Some(_) if nasal.ends_with('y') => {}
                _ => out.push(rest.to_string()),
            }
            return out;
        }
    }
    for plain in ["me", "pe"] {
        if let Some(rest) = w.strip_prefix(plain) {
            if matches!(rest.bytes().next(), Some(b'l' | b'r' | b'w' | b'y')) {
                out.push(rest.to_string());
            }
            return out;
        }
    }
    if let Some(rest) = w.strip_prefix("be") {
        if let Some(r) = rest.strip_prefix('r') {
            out.push(r.to_string());
        } else if rest.starts_with("ker") {
            out.push(rest.to_string());
        }
        return out;
    }
    for p in ["ter", "di", "ke", "se"] {
        if let Some(rest) = w.strip_prefix(p) {
            out.push(rest.to_string());
            return out;
        }
    }
    out
}

fn strip_prefix(w: &mut String) -> bool {
    match prefix_candidates(w).into_iter().find(|s| plausible_stem(s)) {
        Some(stem) => {
            *w = stem;
            true
        }
        None => false,
    }
}
