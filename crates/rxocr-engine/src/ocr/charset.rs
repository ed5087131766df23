//! Classifier output alphabets.

use crate::config::Language;

/// Shared prefix of every alphabet. Index 0 is the "no character" class.
const BASE: &[&str] = &[
    "", "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q",
    "R", "S", "T", "U", "V", "W", "X", "Y", "Z", "a", "b", "c", "d", "e", "f", "g", "h", "i",
    "j", "k", "l", "m", "n", "o", "p", "q", "r", "s", "t", "u", "v", "w", "x", "y", "z", "0",
    "1", "2", "3", "4", "5", "6", "7", "8", "9", ".", "-", "+", "'",
];

const CZ_EXTRA: &[&str] = &[
    "Á", "Č", "Ď", "É", "Ě", "Í", "Ň", "Ó", "Ř", "Š", "Ť", "Ú", "Ů", "Ý", "Ž", "á", "č", "ď",
    "é", "ě", "í", "ň", "ó", "ř", "š", "ť", "ú", "ů", "ý", "ž",
];

/// Number of classes the classifier for `language` predicts.
pub fn class_count(language: Language) -> usize {
    match language {
        Language::En => BASE.len(),
        Language::Cz => BASE.len() + CZ_EXTRA.len(),
    }
}

/// Map a class index to its character.
pub fn idx2char(language: Language, idx: usize) -> Option<&'static str> {
    if idx < BASE.len() {
        return Some(BASE[idx]);
    }
    match language {
        Language::En => None,
        Language::Cz => CZ_EXTRA.get(idx - BASE.len()).copied(),
    }
}

/// Decode a sequence of class indices into a word.
///
/// Indices outside the alphabet are dropped.
pub fn decode(language: Language, indices: &[usize]) -> String {
    let mut word = String::new();
    for &idx in indices {
        match idx2char(language, idx) {
            Some(c) => word.push_str(c),
            None => tracing::warn!("Class index {} is outside the {} alphabet", idx, language),
        }
    }
    word
}
