//! Text folding for locale-tolerant matching of free-form lead answers.

/// Undo UTF-8 text that was decoded as Latin-1 somewhere upstream
/// ("YÃ¼ksek" → "Yüksek").
///
/// Only strings made entirely of code points below U+0100 are candidates. If
/// their bytes are not valid UTF-8, or the repaired text contains a
/// replacement character, the input is returned untouched.
pub fn repair_mojibake(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let mut bytes = Vec::with_capacity(value.len());
    for ch in value.chars() {
        match u8::try_from(u32::from(ch)) {
            Ok(byte) => bytes.push(byte),
            Err(_) => return value.to_string(),
        }
    }

    match String::from_utf8(bytes) {
        Ok(repaired) if !repaired.contains('\u{FFFD}') => repaired,
        _ => value.to_string(),
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical comparison form: repaired, whitespace-normalized, lowercased,
/// with Turkish letters reduced to their ASCII base.
pub fn fold_lead_value(value: &str) -> String {
    normalize_whitespace(&repair_mojibake(value))
        .to_lowercase()
        .chars()
        .map(|ch| match ch {
            'ı' => 'i',
            'ğ' => 'g',
            'ş' => 's',
            'ç' => 'c',
            'ö' => 'o',
            'ü' => 'u',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repairs_latin1_decoded_utf8() {
        assert_eq!(repair_mojibake("YÃ¼ksek"), "Yüksek");
        assert_eq!(repair_mojibake("YÃ¶netici"), "Yönetici");
    }

    #[test]
    fn leaves_clean_text_alone() {
        assert_eq!(repair_mojibake("Yüksek"), "Yüksek");
        assert_eq!(repair_mojibake("Kurucu Ortak"), "Kurucu Ortak");
        assert_eq!(repair_mojibake("Yönetici"), "Yönetici");
        assert_eq!(repair_mojibake(""), "");
    }

    #[test]
    fn keeps_input_when_repair_would_corrupt() {
        // Lone continuation byte is not valid UTF-8 on its own.
        assert_eq!(repair_mojibake("café"), "café");
        assert_eq!(repair_mojibake("\u{00EF}\u{00BF}\u{00BD}"), "\u{00EF}\u{00BF}\u{00BD}");
    }

    #[test]
    fn folds_turkish_and_case() {
        assert_eq!(fold_lead_value("  Yüksek   Öncelik "), "yuksek oncelik");
        assert_eq!(fold_lead_value("Yönetici"), "yonetici");
        assert_eq!(fold_lead_value("ÇALIŞMA"), "calisma");
        assert_eq!(fold_lead_value("çığ"), "cig");
    }

    #[test]
    fn folds_mojibake_before_matching() {
        assert_eq!(fold_lead_value("YÃ¼ksek"), "yuksek");
    }
}
