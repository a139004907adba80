use std::borrow::Cow;

/// Escaped ampersand as it commonly survives double-escaped feed titles.
const ESCAPED_AMP: &str = "&amp;";

/// Converts raw title text into the plain text stored for an entry.
///
/// Steps, in order:
/// 1. trim surrounding whitespace
/// 2. turn `&amp;` back into `&`
/// 3. drop tag markup, from the first `<` up to the last `>`
/// 4. trim again
///
/// Titles are plain text regardless of feed dialect, so anything that looks
/// like markup is removed rather than rendered.
///
/// # Examples
///
/// ```
/// use feedsync::util::sanitize_title;
///
/// assert_eq!(sanitize_title("  A &amp; B<b>bold</b> "), "A & B");
/// assert_eq!(sanitize_title("1 < 2"), "1 < 2");
/// ```
pub fn sanitize_title(raw: &str) -> String {
    let unescaped = unescape_ampersands(raw.trim());
    strip_markup(&unescaped).trim().to_string()
}

fn unescape_ampersands(s: &str) -> Cow<'_, str> {
    if s.contains(ESCAPED_AMP) {
        Cow::Owned(s.replace(ESCAPED_AMP, "&"))
    } else {
        Cow::Borrowed(s)
    }
}

/// Removes the span between the first `<` and the last `>` that follows it.
///
/// Returns `Cow::Borrowed` when there is nothing to strip (common case).
fn strip_markup(s: &str) -> Cow<'_, str> {
    let Some(start) = s.find('<') else {
        return Cow::Borrowed(s);
    };
    match s.rfind('>') {
        Some(end) if end > start => {
            let mut out = String::with_capacity(s.len() - (end - start));
            out.push_str(&s[..start]);
            out.push_str(&s[end + 1..]);
            Cow::Owned(out)
        }
        _ => Cow::Borrowed(s),
    }
}
