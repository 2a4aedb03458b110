//! Slug derivation for directory entities.
//!
//! Slugs are URL-safe, lowercase, hyphenated identifiers derived from the
//! display name ("São Paulo" → "sao-paulo"). Derivation is an explicit pure
//! function called by the write paths; uniqueness is enforced by the store's
//! slug index trees.

/// Derive a URL-safe slug from a display name.
///
/// Lowercases, folds common Latin diacritics to ASCII, and collapses any
/// run of other characters into a single hyphen. Leading/trailing hyphens
/// are trimmed.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for ch in name.chars() {
        let lower = ch.to_lowercase().next().unwrap_or(ch);
        match fold_diacritic(lower) {
            Some(folded) => {
                if pending_hyphen && !slug.is_empty() {
                    slug.push('-');
                }
                pending_hyphen = false;
                slug.push(folded);
            }
            None => pending_hyphen = true,
        }
    }

    slug
}

/// Map a lowercase char to its ASCII slug form, or `None` for separators.
fn fold_diacritic(ch: char) -> Option<char> {
    match ch {
        'a'..='z' | '0'..='9' => Some(ch),
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => Some('a'),
        'é' | 'è' | 'ê' | 'ë' => Some('e'),
        'í' | 'ì' | 'î' | 'ï' => Some('i'),
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => Some('o'),
        'ú' | 'ù' | 'û' | 'ü' => Some('u'),
        'ç' => Some('c'),
        'ñ' => Some('n'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folds_diacritics() {
        assert_eq!(slugify("São Paulo"), "sao-paulo");
        assert_eq!(slugify("Taubaté"), "taubate");
        assert_eq!(slugify("Açaí do João"), "acai-do-joao");
    }

    #[test]
    fn test_collapses_separators() {
        assert_eq!(slugify("Padaria  &  Confeitaria"), "padaria-confeitaria");
        assert_eq!(slugify("--Centro--"), "centro");
        assert_eq!(slugify("Bar do Zé (24h)"), "bar-do-ze-24h");
    }

    #[test]
    fn test_lowercases_and_keeps_digits() {
        assert_eq!(slugify("Mercado 24H"), "mercado-24h");
        assert_eq!(slugify("LOJA 1"), "loja-1");
    }

    #[test]
    fn test_empty_and_symbol_only() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }
}
