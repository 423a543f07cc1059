//! Slug derivation for categories

/// Normalize a name into a URL-safe slug
///
/// Lowercases, collapses every run of non-alphanumeric characters into a
/// single `-` and trims dashes from both ends.
pub fn normalize(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::normalize;

    #[test]
    fn lowercases_single_words() {
        assert_eq!(normalize("Electronics"), "electronics");
    }

    #[test]
    fn collapses_separators() {
        assert_eq!(normalize("Home & Garden"), "home-garden");
        assert_eq!(normalize("  Power   Tools!! "), "power-tools");
        assert_eq!(normalize("kids_toys-2024"), "kids-toys-2024");
    }

    #[test]
    fn keeps_non_ascii_letters() {
        assert_eq!(normalize("Decoración Hogar"), "decoración-hogar");
    }

    #[test]
    fn punctuation_only_yields_empty() {
        assert_eq!(normalize("--- !!"), "");
    }
}
