//! Page name cleaning.
//!
//! Names typed by users (rename targets, link text) are turned into page
//! names by the same rule everywhere:
//! - Leading and trailing whitespace is trimmed
//! - Each whitespace-separated word is capitalized and the whitespace removed
//! - Letters, digits, and the punctuation in [`ALLOWED_PUNCTUATION`] are kept
//! - Every other character is dropped

use wiki_types::WikiPath;

use crate::error::{ResolveError, Result};

/// Punctuation that survives cleaning.
pub const ALLOWED_PUNCTUATION: &[char] = &['.', '_'];

/// Clean a single page name.
///
/// # Examples
///
/// ```
/// use wiki_resolver::names::clean_link;
///
/// assert_eq!(clean_link("link one"), "LinkOne");
/// assert_eq!(clean_link("  Test Page Referred "), "TestPageReferred");
/// assert_eq!(clean_link("a/b?c"), "Abc");
/// ```
pub fn clean_link(link: &str) -> String {
    let mut clean = String::with_capacity(link.len());
    let mut word_start = true;
    for ch in link.trim().chars() {
        if ch.is_whitespace() {
            word_start = true;
        } else if ch.is_alphanumeric() || ALLOWED_PUNCTUATION.contains(&ch) {
            if word_start {
                clean.extend(ch.to_uppercase());
                word_start = false;
            } else {
                clean.push(ch);
            }
        }
    }
    clean
}

/// Clean every component of a path's name, keeping its space.
///
/// Fails if any component cleans down to nothing.
pub fn clean_path(path: &WikiPath) -> Result<WikiPath> {
    let mut components = Vec::new();
    for component in path.path().split('/') {
        let cleaned = clean_link(component);
        if cleaned.is_empty() {
            return Err(ResolveError::InvalidName {
                name: path.to_string(),
                reason: format!("component {component:?} has no legal characters"),
            });
        }
        components.push(cleaned);
    }
    Ok(WikiPath::new(path.space(), components.join("/"))?)
}

/// Compare two names the way links compare: ignoring case and whitespace.
pub fn names_match(a: &str, b: &str) -> bool {
    clean_link(a).to_lowercase() == clean_link(b).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn capitalizes_and_joins_words() {
        assert_eq!(clean_link("link one"), "LinkOne");
        assert_eq!(clean_link("Link uno"), "LinkUno");
        assert_eq!(clean_link("already CamelCase"), "AlreadyCamelCase");
    }

    #[test]
    fn keeps_allowed_punctuation() {
        assert_eq!(clean_link("file_name.txt"), "File_name.txt");
    }

    #[test]
    fn drops_illegal_characters() {
        assert_eq!(clean_link("what?!"), "What");
        assert_eq!(clean_link("[x]|y"), "Xy");
        assert_eq!(clean_link("   "), "");
    }

    #[test]
    fn clean_path_cleans_each_component() {
        let path = WikiPath::parse("Docs:my page/some file.txt").unwrap();
        let cleaned = clean_path(&path).unwrap();
        assert_eq!(cleaned.to_string(), "Docs:MyPage/SomeFile.txt");
    }

    #[test]
    fn clean_path_rejects_empty_component() {
        let path = WikiPath::parse("Main:???").unwrap();
        assert!(clean_path(&path).is_err());
    }

    #[test]
    fn match_ignores_case_and_blanks() {
        assert!(names_match("Test Page Referred", "TestPageReferred"));
        assert!(names_match("cdauth", "CDauth"));
        assert!(!names_match("TestPage", "TestPage2"));
    }

    proptest! {
        #[test]
        fn cleaning_is_idempotent(s in "[A-Za-z0-9 ._?!-]{0,24}") {
            let once = clean_link(&s);
            prop_assert_eq!(clean_link(&once), once);
        }

        #[test]
        fn cleaned_names_have_no_whitespace(s in "\\PC{0,24}") {
            prop_assert!(!clean_link(&s).chars().any(char::is_whitespace));
        }
    }
}
