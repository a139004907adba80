use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use url::Url;

/// Stands in for the entry's storage id until the entry has been inserted.
pub const ENTRY_ID_MARKER: &str = "##ID##";

/// `<img ... src="...">`, single or double quoted; group 1 is the URL.
fn img_src_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)<img\b[^>]*?\ssrc\s*=\s*['"]([^'"]+)['"][^>]*>"#)
            .expect("image pattern is a valid regex")
    })
}

/// An image discovered in entry body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Absolute URL as written in the document.
    pub url: String,
    /// Final path segment of the URL; names the cached file.
    pub file_name: String,
    /// Local `file://` path embedded in the rewritten text, still carrying
    /// [`ENTRY_ID_MARKER`].
    pub placeholder: String,
}

impl ImageReference {
    /// Where the image is cached once the owning entry has id `entry_id`.
    pub fn local_path(&self, images_dir: &Path, entry_id: i64) -> PathBuf {
        images_dir.join(format!("{entry_id}__{}", self.file_name))
    }
}

/// Rewrites `<img src>` references in `html` to local placeholder paths.
///
/// Returns the trimmed, rewritten text and the discovered images in document
/// order. A URL referenced several times is listed once; every occurrence is
/// rewritten. Relative URLs and URLs without a file name are left alone.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use feedsync::feed::extract_images;
///
/// let (text, images) = extract_images("<img src='http://x/y/z.png'>", Path::new("/cache/images"));
/// assert_eq!(images.len(), 1);
/// assert_eq!(images[0].url, "http://x/y/z.png");
/// assert_eq!(text, "<img src='file:///cache/images/##ID##z.png'>");
/// ```
pub fn extract_images(html: &str, images_dir: &Path) -> (String, Vec<ImageReference>) {
    let html = html.trim();
    let mut rewritten = String::with_capacity(html.len());
    let mut images: Vec<ImageReference> = Vec::new();
    let mut copied_up_to = 0;

    for captures in img_src_pattern().captures_iter(html) {
        let Some(src) = captures.get(1) else {
            continue;
        };
        let Some(file_name) = final_segment(src.as_str()) else {
            continue;
        };

        let known = images
            .iter()
            .find(|image| image.url == src.as_str())
            .map(|image| image.placeholder.clone());
        let placeholder = match known {
            Some(placeholder) => placeholder,
            None => {
                let file_name = unique_file_name(&images, file_name);
                let placeholder = format!(
                    "file://{}",
                    images_dir
                        .join(format!("{ENTRY_ID_MARKER}{file_name}"))
                        .display()
                );
                images.push(ImageReference {
                    url: src.as_str().to_string(),
                    file_name,
                    placeholder: placeholder.clone(),
                });
                placeholder
            }
        };

        rewritten.push_str(&html[copied_up_to..src.start()]);
        rewritten.push_str(&placeholder);
        copied_up_to = src.end();
    }
    rewritten.push_str(&html[copied_up_to..]);

    (rewritten, images)
}

/// Replaces [`ENTRY_ID_MARKER`] in stored text with the on-disk prefix for `entry_id`.
pub fn resolve_image_placeholders(text: &str, entry_id: i64) -> String {
    text.replace(ENTRY_ID_MARKER, &format!("{entry_id}__"))
}

/// Distinct URLs ending in the same segment get `<n>_` prefixes so their
/// cached files do not overwrite each other.
fn unique_file_name(images: &[ImageReference], file_name: String) -> String {
    let taken = |name: &str| images.iter().any(|image| image.file_name == name);
    if !taken(&file_name) {
        return file_name;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{n}_{file_name}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn final_segment(src: &str) -> Option<String> {
    let url = Url::parse(src).ok()?;
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dir() -> &'static Path {
        Path::new("/data/images")
    }

    #[test]
    fn test_single_quoted_src() {
        let (text, images) = extract_images("<p><img src='http://x/y/z.png'></p>", dir());
        assert_eq!(text, "<p><img src='file:///data/images/##ID##z.png'></p>");
        assert_eq!(
            images,
            vec![ImageReference {
                url: "http://x/y/z.png".to_string(),
                file_name: "z.png".to_string(),
                placeholder: "file:///data/images/##ID##z.png".to_string(),
            }]
        );
    }

    #[test]
    fn test_double_quoted_with_trailing_attributes() {
        let html = r#"Intro <img src="https://cdn.example.com/a/b.jpg" alt="b" width="10"/> outro"#;
        let (text, images) = extract_images(html, dir());
        assert_eq!(
            text,
            r#"Intro <img src="file:///data/images/##ID##b.jpg" alt="b" width="10"/> outro"#
        );
        assert_eq!(images[0].url, "https://cdn.example.com/a/b.jpg");
    }

    #[test]
    fn test_attributes_before_src() {
        let html = r#"<img class="hero" src="https://example.com/hero.png">"#;
        let (_, images) = extract_images(html, dir());
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].file_name, "hero.png");
    }

    #[test]
    fn test_data_src_not_mistaken_for_src() {
        let html = r#"<img data-src="https://example.com/lazy.png">"#;
        let (text, images) = extract_images(html, dir());
        assert!(images.is_empty());
        assert_eq!(text, html);
    }

    #[test]
    fn test_repeated_url_listed_once_rewritten_everywhere() {
        let html = "<img src='http://x/a.png'><img src='http://x/a.png'><img src='http://x/b.png'>";
        let (text, images) = extract_images(html, dir());
        let urls: Vec<_> = images.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["http://x/a.png", "http://x/b.png"]);
        assert!(!text.contains("http://x/"));
        assert_eq!(text.matches("##ID##a.png").count(), 2);
    }

    #[test]
    fn test_same_file_name_from_different_urls_kept_apart() {
        let html = "<img src='http://a/x/img.png'><img src='http://b/y/img.png'><img src='http://a/x/img.png'>";
        let (text, images) = extract_images(html, dir());

        let names: Vec<_> = images.iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, vec!["img.png", "1_img.png"]);
        assert_eq!(
            images[1].local_path(dir(), 7),
            PathBuf::from("/data/images/7__1_img.png")
        );
        assert_eq!(
            text,
            "<img src='file:///data/images/##ID##img.png'>\
             <img src='file:///data/images/##ID##1_img.png'>\
             <img src='file:///data/images/##ID##img.png'>"
        );
    }

    #[test]
    fn test_relative_src_left_alone() {
        let html = "<img src='/static/a.png'>";
        let (text, images) = extract_images(html, dir());
        assert!(images.is_empty());
        assert_eq!(text, html);
    }

    #[test]
    fn test_url_without_file_name_left_alone() {
        let (_, images) = extract_images("<img src='http://example.com/'>", dir());
        assert!(images.is_empty());
    }

    #[test]
    fn test_no_images() {
        let (text, images) = extract_images("  just <b>text</b>  ", dir());
        assert_eq!(text, "just <b>text</b>");
        assert!(images.is_empty());
    }

    #[test]
    fn test_malformed_html_does_not_fail() {
        for html in ["<img src=", "<img src='http://x/a.png'", "<<<>>>", "<img src=''>"] {
            let (_, images) = extract_images(html, dir());
            assert!(images.is_empty(), "{html}");
        }
    }

    #[test]
    fn test_local_path_and_resolution_agree() {
        let (text, images) = extract_images("<img src='http://x/y/z.png'>", dir());
        let resolved = resolve_image_placeholders(&text, 42);
        let path = images[0].local_path(dir(), 42);
        assert_eq!(path, PathBuf::from("/data/images/42__z.png"));
        assert!(resolved.contains(&format!("file://{}", path.display())));
    }
}
