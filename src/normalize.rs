//! Text normalization for keyword matching.
//!
//! Maps obfuscated chat text to a canonical form over `[a-z0-9]`:
//! 1. NFKC compatibility normalization
//! 2. Homoglyph folding (Greek, Cyrillic, Cherokee, fullwidth → ASCII)
//! 3. Leetspeak folding, dropping `-`, `_` and spaces
//! 4. Strip everything that is not an ASCII letter or digit
//! 5. Collapse runs of 3+ identical characters to 2
//! 6. Lowercase
//!
//! The order matters: homoglyphs must be folded after NFKC has decomposed
//! compatibility forms, and leet digits must be folded before the
//! alphanumeric filter would otherwise keep them as-is.

use std::collections::HashMap;
use std::sync::LazyLock;

use unicode_normalization::UnicodeNormalization;

/// Visually confusable code points and the ASCII character they imitate.
static HOMOGLYPHS: LazyLock<HashMap<char, char>> = LazyLock::new(|| {
    let mut table: HashMap<char, char> = HashMap::from([
        // Greek
        ('Α', 'A'),
        ('Β', 'B'),
        ('Ε', 'E'),
        ('Ζ', 'Z'),
        ('Η', 'H'),
        ('Ι', 'I'),
        ('Κ', 'K'),
        ('Μ', 'M'),
        ('Ν', 'N'),
        ('Ο', 'O'),
        ('Ρ', 'P'),
        ('Τ', 'T'),
        ('Υ', 'Y'),
        ('Χ', 'X'),
        ('α', 'a'),
        ('β', 'b'),
        ('ε', 'e'),
        ('ι', 'i'),
        ('κ', 'k'),
        ('ν', 'v'),
        ('ο', 'o'),
        ('ρ', 'p'),
        ('τ', 't'),
        ('υ', 'u'),
        ('χ', 'x'),
        ('ω', 'w'),
        // Cyrillic
        ('А', 'A'),
        ('В', 'B'),
        ('Е', 'E'),
        ('К', 'K'),
        ('М', 'M'),
        ('Н', 'H'),
        ('О', 'O'),
        ('Р', 'P'),
        ('С', 'C'),
        ('Т', 'T'),
        ('Х', 'X'),
        ('Ѕ', 'S'),
        ('І', 'I'),
        ('Ј', 'J'),
        ('а', 'a'),
        ('е', 'e'),
        ('о', 'o'),
        ('р', 'p'),
        ('с', 'c'),
        ('у', 'y'),
        ('х', 'x'),
        ('ѕ', 's'),
        ('і', 'i'),
        ('ј', 'j'),
        ('һ', 'h'),
        ('ԁ', 'd'),
        ('ԛ', 'q'),
        ('ԝ', 'w'),
        // Latin extensions and IPA
        ('ɡ', 'g'),
        ('ɑ', 'a'),
        ('ı', 'i'),
        ('ȷ', 'j'),
        ('ʏ', 'y'),
        ('ɴ', 'n'),
        ('ʀ', 'r'),
        // Cherokee
        ('Ꭰ', 'D'),
        ('Ꭱ', 'R'),
        ('Ꭲ', 'T'),
        ('Ꭹ', 'Y'),
        ('Ꭺ', 'A'),
        ('Ꭻ', 'J'),
        ('Ꭼ', 'E'),
        ('Ꮃ', 'W'),
        ('Ꮇ', 'M'),
        ('Ꮋ', 'H'),
        ('Ꮐ', 'G'),
        ('Ꮓ', 'Z'),
        ('Ꮟ', 'b'),
        ('Ꮪ', 'S'),
        ('Ꮮ', 'L'),
        ('Ꮯ', 'C'),
        ('Ꮲ', 'P'),
        ('Ꮶ', 'K'),
        ('Ᏼ', 'B'),
    ]);

    // Fullwidth Latin (U+FF21..U+FF3A, U+FF41..U+FF5A) and digits
    for (offset, ascii) in (b'A'..=b'Z').enumerate() {
        if let Some(wide) = char::from_u32(0xFF21 + offset as u32) {
            table.insert(wide, ascii as char);
        }
    }
    for (offset, ascii) in (b'a'..=b'z').enumerate() {
        if let Some(wide) = char::from_u32(0xFF41 + offset as u32) {
            table.insert(wide, ascii as char);
        }
    }
    for (offset, ascii) in (b'0'..=b'9').enumerate() {
        if let Some(wide) = char::from_u32(0xFF10 + offset as u32) {
            table.insert(wide, ascii as char);
        }
    }

    table
});

/// Leetspeak substitution. `None` means the character folds to nothing.
fn fold_leet(c: char) -> Option<char> {
    match c {
        '0' => Some('o'),
        '1' | '!' => Some('i'),
        '3' => Some('e'),
        '4' | '@' => Some('a'),
        '5' | '$' => Some('s'),
        '7' | '+' => Some('t'),
        '8' => Some('b'),
        '|' => Some('l'),
        '-' | '_' | ' ' => None,
        other => Some(other),
    }
}

/// Normalize arbitrary text to its canonical matching form.
///
/// Total and deterministic: any input produces a (possibly empty) string
/// of lowercase ASCII letters and digits, and a canonical string is a
/// fixed point.
pub fn normalize(text: &str) -> String {
    let folded = text
        .nfkc()
        .map(|c| HOMOGLYPHS.get(&c).copied().unwrap_or(c))
        .filter_map(fold_leet)
        .filter(char::is_ascii_alphanumeric);

    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    let mut run = 0usize;

    for c in folded {
        // Runs are counted case-insensitively so "EEee" collapses like "eeee".
        if prev.is_some_and(|p| p.eq_ignore_ascii_case(&c)) {
            run += 1;
        } else {
            run = 1;
        }
        prev = Some(c);
        if run <= 2 {
            out.push(c);
        }
    }

    out.make_ascii_lowercase();
    out
}

/// Normalize raw bytes. Invalid UTF-8 sequences decode to U+FFFD and are
/// dropped by the alphanumeric filter.
pub fn normalize_bytes(bytes: &[u8]) -> String {
    normalize(&String::from_utf8_lossy(bytes))
}

/// Whether `text` is already in canonical form.
pub fn is_canonical(text: &str) -> bool {
    normalize(text) == text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn punctuation_and_emoji_only_is_empty() {
        assert_eq!(normalize("?? ... 🙂🔥 \t\n ---"), "");
    }

    #[test]
    fn case_width_leet_and_spacing_are_equivalent() {
        let expected = normalize("kill");
        assert_eq!(expected, "kill");
        assert_eq!(normalize("KILL"), expected);
        assert_eq!(normalize("k1ll"), expected);
        assert_eq!(normalize("ｋｉｌｌ"), expected);
        assert_eq!(normalize("k-i-l-l"), expected);
        assert_eq!(normalize("k_i l_l"), expected);
        assert_eq!(normalize("K!LL"), expected);
    }

    #[test]
    fn run_collapse() {
        assert_eq!(normalize("heeeellooo"), normalize("heelloo"));
        assert_eq!(normalize("heeeellooo"), "heelloo");
        assert_eq!(normalize("aa"), "aa");
    }

    #[test]
    fn run_collapse_spans_removed_separators() {
        assert_eq!(normalize("s-s-s-s"), "ss");
        assert_eq!(normalize("E E e e"), "ee");
    }

    #[test]
    fn homoglyphs_fold_to_ascii() {
        // Cyrillic а, Greek ο, Cherokee Ꮶ
        assert_eq!(normalize("b\u{0430}d"), "bad");
        assert_eq!(normalize("f\u{03BF}\u{03BF}l"), "fool");
        assert_eq!(normalize("\u{13E6}ill"), "kill");
        assert_eq!(normalize("\u{03B9}diot"), "idiot");
    }

    #[test]
    fn leet_symbols_fold() {
        assert_eq!(normalize("@$$"), "ass");
        assert_eq!(normalize("h4t3"), "hate");
        assert_eq!(normalize("7r0ll"), "troll");
    }

    #[test]
    fn unmapped_digits_survive() {
        assert_eq!(normalize("2 6 9"), "269");
    }

    #[test]
    fn compatibility_forms_decompose() {
        // U+FB01 LATIN SMALL LIGATURE FI, mathematical bold letters
        assert_eq!(normalize("\u{FB01}ght"), "fight");
        assert_eq!(normalize("𝐤𝐢𝐥𝐥"), "kill");
    }

    #[test]
    fn output_alphabet_is_restricted() {
        let out = normalize("Ünïcödé — text, with ∑ symbols & 中文!");
        assert!(out.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn idempotent() {
        for input in [
            "KILL",
            "heeeellooo",
            "EEee",
            "ｋ１ｌｌ",
            "Ꮶ-і-l-l yourself!!!",
            "2222 9999",
            "",
        ] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not a fixed point for {input:?}");
            assert!(is_canonical(&once));
        }
    }

    #[test]
    fn invalid_bytes_are_filtered() {
        assert_eq!(normalize_bytes(b"ki\xff\xfell"), "kill");
        assert_eq!(normalize_bytes(b"\xc3\x28"), "");
    }
}
