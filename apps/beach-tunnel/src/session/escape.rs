use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

/// CSI sequences the remote shell emits for cursor motion, colour and
/// private modes such as bracketed paste (`ESC[?2004h`).
static CSI_SEQUENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[\??(?:[0-9]*;)*[0-9]*[A-Za-z]").expect("CSI pattern is valid")
});

/// Removes terminal escape sequences from decoded output. Removal can splice
/// a new sequence together out of surrounding bytes, so it repeats until the
/// text stops changing; applying it twice is the same as applying it once.
pub fn strip_escapes(text: &str) -> Cow<'_, str> {
    let mut current = match CSI_SEQUENCE.replace_all(text, "") {
        Cow::Borrowed(_) => return Cow::Borrowed(text),
        Cow::Owned(stripped) => stripped,
    };
    loop {
        let next = match CSI_SEQUENCE.replace_all(&current, "") {
            Cow::Borrowed(_) => None,
            Cow::Owned(next) => Some(next),
        };
        match next {
            Some(next) => current = next,
            None => return Cow::Owned(current),
        }
    }
}
