//! `[{ALLOW <permission> <principal>, ...}]` directives in page markup.
//!
//! Only the stored ACL is derived here. Whether a principal may act is
//! decided elsewhere.

use wiki_types::Acl;

const OPEN: &str = "[{ALLOW";
const CLOSE: &str = "}]";

/// Collect every ACL directive in `text` into one [`Acl`].
///
/// `[[{ALLOW ...}]` and `~[{ALLOW ...}]` are escapes and are ignored, as
/// are directives without a permission or a principal.
pub fn parse_acl(text: &str) -> Acl {
    let mut acl = Acl::new();
    let mut rest = text;
    let mut offset = 0;
    while let Some(found) = rest.find(OPEN) {
        let start = offset + found;
        let body_start = found + OPEN.len();
        let Some(len) = rest[body_start..].find(CLOSE) else {
            break;
        };
        let body = &rest[body_start..body_start + len];
        if !is_escaped(text, start) {
            apply_directive(&mut acl, body);
        }
        let consumed = body_start + len + CLOSE.len();
        offset += consumed;
        rest = &rest[consumed..];
    }
    acl
}

fn is_escaped(text: &str, start: usize) -> bool {
    matches!(text[..start].chars().next_back(), Some('[' | '~'))
}

fn apply_directive(acl: &mut Acl, body: &str) {
    if !body.starts_with(char::is_whitespace) {
        return;
    }
    let body = body.trim();
    let Some((permission, principals)) = body.split_once(char::is_whitespace) else {
        return;
    };
    for principal in principals.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        for perm in permission.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            acl.grant(principal, perm.to_lowercase());
        }
    }
}
