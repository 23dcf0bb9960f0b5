//! Link markup scanning and rewriting.
//!
//! Recognized link forms:
//! - `[Target]`, `[text|Target]` and `[text|Target|attributes...]`
//! - `Target#anchor` and `Target/file.ext` inside any of the above
//! - `Space:Target` for a page in another space
//! - bare CamelCase words, when CamelCase linking is enabled
//!
//! `[[` and `~[` escape a bracket, `~` before a CamelCase word escapes the
//! word, and `[{...}]` is a directive, never a link.

use std::collections::BTreeSet;
use std::fmt;

use wiki_resolver::{clean_link, names_match};
use wiki_types::WikiPath;

/// One piece of scanned markup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    Link(Link<'a>),
    /// A bare CamelCase word.
    Word(&'a str),
}

/// A bracketed link, split into its pipe-separated parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link<'a> {
    /// The link exactly as written, brackets included.
    pub raw: &'a str,
    pub text: Option<&'a str>,
    pub target: &'a str,
    pub attributes: Vec<&'a str>,
}

impl<'a> Link<'a> {
    fn parse(raw: &'a str) -> Self {
        let inner = &raw[1..raw.len() - 1];
        let mut parts = inner.split('|');
        let first = parts.next().unwrap_or_default();
        match parts.next() {
            None => Self {
                raw,
                text: None,
                target: first,
                attributes: Vec::new(),
            },
            Some(target) => Self {
                raw,
                text: Some(first),
                target,
                attributes: parts.collect(),
            },
        }
    }

    /// The page part of the target, without anchor.
    ///
    /// `None` for external links, footnote references, and empty targets.
    pub fn page_target(&self) -> Option<&'a str> {
        let (page, _) = split_anchor(self.target);
        let page = page.trim();
        if page.is_empty() || is_external(page) || page.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(page)
    }

    pub fn anchor(&self) -> Option<&'a str> {
        split_anchor(self.target).1
    }
}

impl fmt::Display for Link<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        if let Some(text) = self.text {
            write!(f, "{text}|")?;
        }
        f.write_str(self.target)?;
        for attribute in &self.attributes {
            write!(f, "|{attribute}")?;
        }
        f.write_str("]")
    }
}

/// Split markup into text, links, and (optionally) CamelCase words.
///
/// Concatenating the tokens' source text reproduces the input exactly.
pub fn scan(text: &str, camel_case: bool) -> Vec<Token<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'~' => {
                i += 1;
                if bytes.get(i) == Some(&b'[') {
                    i = skip_escaped(bytes, i + 1);
                } else {
                    i = word_end(bytes, i);
                }
            }
            b'[' => match bytes.get(i + 1) {
                Some(b'[') => i = skip_escaped(bytes, i + 2),
                Some(b'{') => i = find(bytes, i + 2, b"}]").map_or(i + 1, |end| end + 2),
                _ => match link_end(bytes, i + 1) {
                    Some(end) => {
                        push_text(&mut tokens, &text[text_start..i]);
                        tokens.push(Token::Link(Link::parse(&text[i..=end])));
                        i = end + 1;
                        text_start = i;
                    }
                    None => i += 1,
                },
            },
            b if camel_case
                && b.is_ascii_uppercase()
                && (i == 0 || !bytes[i - 1].is_ascii_alphanumeric()) =>
            {
                let end = word_end(bytes, i);
                if is_camel_case(&text[i..end]) {
                    push_text(&mut tokens, &text[text_start..i]);
                    tokens.push(Token::Word(&text[i..end]));
                    text_start = end;
                }
                i = end;
            }
            _ => i += 1,
        }
    }
    push_text(&mut tokens, &text[text_start..]);
    tokens
}

/// Returns `true` for words like `TestPage`: capitals, then lower-case
/// letters, then another capital, then letters or digits.
pub fn is_camel_case(word: &str) -> bool {
    let bytes = word.as_bytes();
    let upper = bytes.iter().take_while(|b| b.is_ascii_uppercase()).count();
    let rest = &bytes[upper..];
    let lower = rest.iter().take_while(|b| b.is_ascii_lowercase()).count();
    let rest = &rest[lower..];
    upper > 0
        && lower > 0
        && rest.first().is_some_and(u8::is_ascii_uppercase)
        && rest.iter().all(u8::is_ascii_alphanumeric)
}

/// Every page or attachment that `text` links to.
///
/// Unqualified targets resolve in `context_space`. Names are cleaned, so
/// `[link one]` refers to `LinkOne`.
pub fn referenced_pages(text: &str, context_space: &str, camel_case: bool) -> BTreeSet<WikiPath> {
    scan(text, camel_case)
        .into_iter()
        .filter_map(|token| match token {
            Token::Link(link) => link.page_target().and_then(|page| target_path(page, context_space)),
            Token::Word(word) => WikiPath::new(context_space, word).ok(),
            Token::Text(_) => None,
        })
        .collect()
}

/// Rewrite every link in `text` that points at `from` (or one of its
/// attachments) so it points at `to`.
///
/// Display text, anchors, attachment suffixes, and extra attributes are
/// kept. A link whose target was written with blanks keeps that spelling
/// as display text. Whole-word occurrences of the old name inside display
/// text are renamed too. Escaped links are left alone.
pub fn rewrite_links(
    text: &str,
    from: &WikiPath,
    to: &WikiPath,
    context_space: &str,
    camel_case: bool,
) -> String {
    let mut out = String::with_capacity(text.len());
    for token in scan(text, camel_case) {
        match token {
            Token::Text(t) => out.push_str(t),
            Token::Word(word) => {
                if word == from.path() && from.space().eq_ignore_ascii_case(context_space) {
                    let same_space = to.space().eq_ignore_ascii_case(context_space);
                    if same_space && is_camel_case(to.path()) {
                        out.push_str(to.path());
                    } else if same_space {
                        out.push_str(&format!("[{}]", to.path()));
                    } else {
                        out.push_str(&format!("[{to}]"));
                    }
                } else {
                    out.push_str(word);
                }
            }
            Token::Link(link) => match retarget(&link, from, to, context_space) {
                Some(rewritten) => out.push_str(&rewritten),
                None => out.push_str(link.raw),
            },
        }
    }
    out
}

fn retarget(link: &Link<'_>, from: &WikiPath, to: &WikiPath, context_space: &str) -> Option<String> {
    let page = link.page_target()?;
    let (explicit_space, name) = match page.split_once(':') {
        Some((space, name)) => (Some(space.trim()), name),
        None => (None, page),
    };
    if !explicit_space
        .unwrap_or(context_space)
        .eq_ignore_ascii_case(from.space())
    {
        return None;
    }

    let components: Vec<&str> = name.split('/').collect();
    let from_components: Vec<&str> = from.path().split('/').collect();
    if components.len() < from_components.len()
        || !from_components
            .iter()
            .zip(&components)
            .all(|(a, b)| names_match(a, b))
    {
        return None;
    }

    let mut target = String::new();
    if explicit_space.is_some() || !to.space().eq_ignore_ascii_case(context_space) {
        target.push_str(to.space());
        target.push(':');
    }
    target.push_str(to.path());
    for rest in &components[from_components.len()..] {
        target.push('/');
        target.push_str(rest);
    }
    if let Some(anchor) = link.anchor() {
        target.push('#');
        target.push_str(anchor);
    }

    let text = match link.text {
        Some(text) => Some(replace_word(text, from.path(), to.path())),
        None if link.target.trim().contains(char::is_whitespace) => Some(link.target.to_string()),
        None => None,
    };
    let rewritten = Link {
        raw: link.raw,
        text: text.as_deref(),
        target: &target,
        attributes: link.attributes.clone(),
    };
    Some(rewritten.to_string())
}

/// Resolve a link's page part to a path, cleaning every component.
fn target_path(page: &str, context_space: &str) -> Option<WikiPath> {
    let (space, name) = match page.split_once(':') {
        Some((space, name)) => (space.trim(), name),
        None => (context_space, page),
    };
    let mut components = Vec::new();
    for component in name.split('/') {
        let cleaned = clean_link(component);
        if cleaned.is_empty() {
            return None;
        }
        components.push(cleaned);
    }
    WikiPath::new(space, components.join("/")).ok()
}

/// Replace whole-word occurrences of `word`.
fn replace_word(text: &str, word: &str, with: &str) -> String {
    if word.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (pos, _) in text.match_indices(word) {
        let before = text[..pos].chars().next_back();
        let after = text[pos + word.len()..].chars().next();
        if before.is_some_and(char::is_alphanumeric) || after.is_some_and(char::is_alphanumeric) {
            continue;
        }
        out.push_str(&text[last..pos]);
        out.push_str(with);
        last = pos + word.len();
    }
    out.push_str(&text[last..]);
    out
}

fn split_anchor(target: &str) -> (&str, Option<&str>) {
    match target.split_once('#') {
        Some((page, anchor)) => (page, Some(anchor)),
        None => (target, None),
    }
}

fn is_external(target: &str) -> bool {
    target.contains("://") || target.starts_with("mailto:")
}

fn push_text<'a>(tokens: &mut Vec<Token<'a>>, text: &'a str) {
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
}

/// Index just past the `]` closing an escaped bracket on the same line, or
/// `from` if there is none.
fn skip_escaped(bytes: &[u8], from: usize) -> usize {
    for (offset, b) in bytes[from..].iter().enumerate() {
        match b {
            b']' => return from + offset + 1,
            b'\n' => break,
            _ => {}
        }
    }
    from
}

/// Index of the `]` closing a link opened just before `from`.
fn link_end(bytes: &[u8], from: usize) -> Option<usize> {
    for (offset, b) in bytes[from..].iter().enumerate() {
        match b {
            b']' => return Some(from + offset),
            b'[' | b'\n' => return None,
            _ => {}
        }
    }
    None
}

fn word_end(bytes: &[u8], from: usize) -> usize {
    from + bytes[from..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric())
        .count()
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| from + pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn p(s: &str) -> WikiPath {
        WikiPath::parse(s).unwrap()
    }

    fn rename(text: &str, from: &str, to: &str) -> String {
        rewrite_links(text, &p(from), &p(to), "Main", true)
    }

    // -----------------------------------------------------------------------
    // Scanning
    // -----------------------------------------------------------------------

    #[test]
    fn scan_splits_links_and_words() {
        let tokens = scan("see [a|B] and FooBar.", true);
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[0], Token::Text("see "));
        let Token::Link(link) = &tokens[1] else { panic!("expected link") };
        assert_eq!(link.text, Some("a"));
        assert_eq!(link.target, "B");
        assert_eq!(tokens[3], Token::Word("FooBar"));
        assert_eq!(tokens[4], Token::Text("."));
    }

    #[test]
    fn scan_skips_escapes_and_directives() {
        let tokens = scan("[[Foo] ~[Bar] ~CamelCase [{ALLOW edit Alice}]", true);
        assert!(tokens.iter().all(|t| matches!(t, Token::Text(_))));
    }

    #[test]
    fn unterminated_bracket_is_text() {
        let tokens = scan("a [b\n] c", false);
        assert!(tokens.iter().all(|t| matches!(t, Token::Text(_))));
    }

    #[test]
    fn camel_case_detection() {
        assert!(is_camel_case("TestPage"));
        assert!(is_camel_case("TestPage2"));
        assert!(!is_camel_case("HTMLPage"));
        assert!(!is_camel_case("Test"));
        assert!(!is_camel_case("TEST"));
        assert!(!is_camel_case("testPage"));
    }

    #[test]
    fn external_and_footnote_targets_are_not_pages() {
        let tokens = scan("[http://example.com] [1] [mailto:a@b.c] [#top]", false);
        for token in tokens {
            if let Token::Link(link) = token {
                assert_eq!(link.page_target(), None, "{}", link.raw);
            }
        }
    }

    // -----------------------------------------------------------------------
    // References
    // -----------------------------------------------------------------------

    #[test]
    fn references_are_cleaned_and_space_qualified() {
        let refs = referenced_pages("[link one] [Docs:Guide#intro] [x|Foo/a.txt] TestPage", "Main", true);
        let names: Vec<String> = refs.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec!["Docs:Guide", "Main:Foo/A.txt", "Main:LinkOne", "Main:TestPage"]
        );
    }

    #[test]
    fn camel_case_references_need_the_flag() {
        assert!(referenced_pages("TestPage", "Main", false).is_empty());
        assert_eq!(referenced_pages("TestPage", "Main", true).len(), 1);
    }

    // -----------------------------------------------------------------------
    // Rewriting
    // -----------------------------------------------------------------------

    #[test]
    fn plain_and_piped_links() {
        assert_eq!(rename("[TestPage] [linktext|TestPage]", "TestPage", "FooTest"), "[FooTest] [linktext|FooTest]");
    }

    #[test]
    fn anchors_are_kept() {
        assert_eq!(rename("[TestPage#heading1]", "TestPage", "FooTest"), "[FooTest#heading1]");
    }

    #[test]
    fn many_occurrences_in_one_page() {
        let src = "[TestPage] [TestPage] [linktext|TestPage] TestPage [linktext|TestPage] [TestPage#Anchor] [TestPage] TestPage [TestPage]";
        let dst = "[FooTest] [FooTest] [linktext|FooTest] FooTest [linktext|FooTest] [FooTest#Anchor] [FooTest] FooTest [FooTest]";
        assert_eq!(rename(src, "TestPage", "FooTest"), dst);
    }

    #[test]
    fn non_camel_case_name_variants() {
        let src = "[Test] [Test#anchor] test Test [test] [link|test] [link|test]";
        let dst = "[TestPage] [TestPage#anchor] test Test [TestPage] [link|TestPage] [link|TestPage]";
        assert_eq!(rename(src, "Test", "TestPage"), dst);
    }

    #[test]
    fn attachment_links() {
        assert_eq!(
            rename("[TestPage/foo.txt] [linktext|TestPage/bar.jpg]", "TestPage", "RenamedTest"),
            "[RenamedTest/foo.txt] [linktext|RenamedTest/bar.jpg]"
        );
    }

    #[test]
    fn attachment_links_ignore_case() {
        let src = "[Cdauth/attach.txt] [link|Cdauth/attach.txt] [cdauth|Cdauth/attach.txt]\
                   [CDauth/attach.txt] [link|CDauth/attach.txt] [cdauth|CDauth/attach.txt]\
                   [cdauth/attach.txt] [link|cdauth/attach.txt] [cdauth|cdauth/attach.txt]";
        let dst = "[CdauthNew/attach.txt] [link|CdauthNew/attach.txt] [cdauth|CdauthNew/attach.txt]\
                   [CdauthNew/attach.txt] [link|CdauthNew/attach.txt] [cdauth|CdauthNew/attach.txt]\
                   [CdauthNew/attach.txt] [link|CdauthNew/attach.txt] [cdauth|CdauthNew/attach.txt]";
        assert_eq!(rename(src, "Cdauth", "CdauthNew"), dst);
    }

    #[test]
    fn display_text_naming_the_page_is_renamed() {
        assert_eq!(rename("[Link to TestPage2|TestPage2]", "TestPage2", "Test"), "[Link to Test|Test]");
    }

    #[test]
    fn extra_attributes_are_kept() {
        assert_eq!(
            rename("[Link to TestPage2|TestPage2|target='_new']", "TestPage2", "Test"),
            "[Link to Test|Test|target='_new']"
        );
    }

    #[test]
    fn empty_target_is_untouched() {
        assert_eq!(rename("[TestPage|]", "TestPage", "FooTest"), "[TestPage|]");
    }

    #[test]
    fn empty_text_is_kept() {
        assert_eq!(rename("[|TestPage]", "TestPage", "FooTest"), "[|FooTest]");
    }

    #[test]
    fn escaped_links_are_untouched() {
        let double = "[[Link to TestPage2|TestPage2|target='_new']";
        assert_eq!(rename(double, "TestPage2", "Test"), double);
        let tilde = "~[Link to TestPage2|TestPage2|target='_new']";
        assert_eq!(rename(tilde, "TestPage2", "Test"), tilde);
        assert_eq!(rename("~TestPage2", "TestPage2", "Test"), "~TestPage2");
    }

    #[test]
    fn blank_link_text_becomes_display_text() {
        assert_eq!(
            rename("[Test Page Referred]", "TestPageReferred", "TestPageReferredNew"),
            "[Test Page Referred|TestPageReferredNew]"
        );
        assert_eq!(rename("[link one] [link two]", "Link one", "LinkUno"), "[link one|LinkUno] [link two]");
    }

    #[test]
    fn bare_word_renamed_to_non_camel_name_becomes_link() {
        assert_eq!(rename("See TestPage2 now", "TestPage2", "Test"), "See [Test] now");
    }

    #[test]
    fn camel_case_off_leaves_words() {
        let text = "TestPage [TestPage]";
        assert_eq!(
            rewrite_links(text, &p("TestPage"), &p("FooTest"), "Main", false),
            "TestPage [FooTest]"
        );
    }

    #[test]
    fn other_spaces_are_not_touched() {
        assert_eq!(rename("[Docs:TestPage] [Main:TestPage]", "TestPage", "FooTest"), "[Docs:TestPage] [Main:FooTest]");
    }

    #[test]
    fn similar_names_are_not_touched() {
        assert_eq!(rename("[TestPage2] TestPage2 [x|TestPages]", "TestPage", "FooTest"), "[TestPage2] TestPage2 [x|TestPages]");
    }

    #[test]
    fn replace_word_respects_boundaries() {
        assert_eq!(replace_word("Test Testing Test.", "Test", "X"), "X Testing X.");
        assert_eq!(replace_word("TestTest", "Test", "X"), "TestTest");
    }

    proptest! {
        #[test]
        fn text_without_markup_is_unchanged(s in "[a-z .,!?]{0,64}") {
            prop_assert_eq!(rename(&s, "TestPage", "FooTest"), s);
        }

        #[test]
        fn scan_reproduces_input(s in "[A-Za-z0-9 \\[\\]|#~{}/\n]{0,64}") {
            let rebuilt: String = scan(&s, true)
                .into_iter()
                .map(|t| match t {
                    Token::Text(t) | Token::Word(t) => t.to_string(),
                    Token::Link(l) => l.raw.to_string(),
                })
                .collect();
            prop_assert_eq!(rebuilt, s);
        }

        #[test]
        fn rewritten_links_no_longer_name_the_old_page(name in "[a-z]{1,8}") {
            let text = format!("[{name}|TestPage] [TestPage#{name}]");
            let out = rename(&text, "TestPage", "FooTest");
            let refs = referenced_pages(&out, "Main", true);
            prop_assert!(!refs.contains(&p("TestPage")));
            prop_assert!(refs.contains(&p("FooTest")));
        }
    }
}
