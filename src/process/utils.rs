/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lowercase and strip Spanish diacritics so that "Publicación",
/// "PUBLICACION" and "publicacion" compare equal.
pub fn fold_text(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            other => other,
        })
        .collect()
}

/// Case- and accent-insensitive substring test. A missing value never matches.
pub fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    match haystack {
        Some(h) => fold_text(h).contains(&fold_text(needle)),
        None => false,
    }
}

/// Decode raw file bytes as UTF-8 (dropping a BOM), falling back to Latin-1.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.strip_prefix('\u{feff}').unwrap_or(s).to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_str() {
        assert_eq!(clean_str("  \"Rol\" "), "Rol");
        assert_eq!(clean_str("\""), "\"");
        assert_eq!(clean_str(" plain "), "plain");
    }

    #[test]
    fn test_contains_ci_folds_case_and_accents() {
        assert!(contains_ci(Some("RENEGOCIACIÓN de deudas"), "renegociación"));
        assert!(contains_ci(Some("Renegociacion"), "renegociación"));
        assert!(!contains_ci(Some("Reorganización"), "renegociación"));
        assert!(!contains_ci(None, "renegociación"));
    }

    #[test]
    fn test_decode_text_latin1_fallback() {
        // "Publicación" in Latin-1
        let latin1 = b"Publicaci\xf3n";
        assert_eq!(decode_text(latin1), "Publicación");
        assert_eq!(decode_text("\u{feff}Rol".as_bytes()), "Rol");
    }
}
