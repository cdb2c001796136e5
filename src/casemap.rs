//! Nickname case folding and mask matching.
//!
//! IRC treats `[`, `]`, `\` and `^` as the uppercase forms of `{`, `}`, `|`
//! and `~`. In ASCII those eight sit exactly 0x20 apart, just like the
//! letters, so folding is one contiguous range shift: `A` through `^`
//! move up to `a` through `~`. Everything outside ASCII is left alone.
//!
//! Registry keys, directory keys and access masks all fold through here,
//! so two names that compare equal always share a key.

const SHIFT: u8 = 0x20;

/// Canonical lowercase form of one character.
#[inline]
fn fold(c: char) -> char {
    match c {
        'A'..='^' => (c as u8 + SHIFT) as char,
        _ => c,
    }
}

/// Folded key for a nickname or any other IRC name.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(fold).collect()
}

/// Whether two names are the same once folded.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.chars().map(fold).eq(b.chars().map(fold))
}

/// Match `text` against a mask where `*` is any run and `?` any single
/// character. Both sides are folded first.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(fold).collect();
    let text: Vec<char> = text.chars().map(fold).collect();

    let (mut p, mut t) = (0, 0);
    // last '*' seen, and the text position it currently stops at
    let mut resume: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                resume = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => {
                let Some((star, from)) = resume else {
                    return false;
                };
                p = star + 1;
                t = from + 1;
                resume = Some((star, t));
            }
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_and_brackets_fold_together() {
        assert_eq!(irc_to_lower("Nick[Away]"), "nick{away}");
        assert_eq!(irc_to_lower("A\\B^C"), "a|b~c");
        assert_eq!(irc_to_lower("already{lower}|~"), "already{lower}|~");
        assert_eq!(irc_to_lower("_-`0123"), "_-`0123");
    }

    #[test]
    fn test_non_ascii_is_untouched() {
        assert_eq!(irc_to_lower("ÄÖÜ"), "ÄÖÜ");
        assert!(!irc_eq("Ä", "ä"));
    }

    #[test]
    fn test_eq_folds_both_sides() {
        assert!(irc_eq("ALICE", "alice"));
        assert!(irc_eq("foo[1]", "FOO{1}"));
        assert!(irc_eq("a^b", "A~B"));
        assert!(!irc_eq("alice", "alice2"));
        assert!(!irc_eq("alice2", "alice"));
        assert!(irc_eq("", ""));
    }

    #[test]
    fn test_eq_agrees_with_folded_keys() {
        for (a, b) in [("Bob", "bOB"), ("[x]", "{X}"), ("x", "y"), ("é", "É")] {
            assert_eq!(irc_eq(a, b), irc_to_lower(a) == irc_to_lower(b), "{a} vs {b}");
        }
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*@*.example.com", "ident@host.EXAMPLE.com"));
        assert!(wildcard_match("te?t", "TEST"));
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("a*b*c", "axxbyyc"));
        assert!(!wildcard_match("a*b*c", "axxbyy"));
        assert!(!wildcard_match("ident@host", "ident@host2"));
        assert!(wildcard_match("nick[*]", "NICK{away}"));
        assert!(!wildcard_match("?", ""));
    }
}
