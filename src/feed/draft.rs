use chrono::{DateTime, Utc};

use super::date::{normalize_date, DateDialect};

/// Which field character data is currently routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveAccumulator {
    #[default]
    None,
    Title,
    Link,
    Description,
    Date(DateDialect),
}

/// Fields collected for one entry between its open and close tags.
///
/// A fresh draft is started at every entry boundary and handed to the
/// reconciler by value when the entry closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryDraft {
    /// `None` until a title element is seen.
    pub title: Option<String>,
    pub link: String,
    /// Body text from `description`, `summary` or `content`.
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    date_text: String,
    replaced_description: Option<String>,
}

impl EntryDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// A completed draft, as the handler would hand it over.
    #[cfg(test)]
    pub(crate) fn with_fields(
        title: Option<&str>,
        link: &str,
        date: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            title: title.map(str::to_string),
            link: link.to_string(),
            date,
            ..Self::default()
        }
    }

    /// Starts collecting the title. Only the first title element counts;
    /// returns whether this one should accumulate.
    pub fn begin_title(&mut self) -> bool {
        if self.title.is_some() {
            return false;
        }
        self.title = Some(String::new());
        true
    }

    /// Handles a `link` element.
    ///
    /// An `href` attribute (Atom) supplies the link directly; otherwise the
    /// element's text is collected (RSS). Returns the accumulator to route
    /// text to. A non-alternate Atom link (`rel="enclosure"`, `"self"`, ...)
    /// never replaces a link already found.
    pub fn begin_link(&mut self, href: Option<&str>, rel: Option<&str>) -> ActiveAccumulator {
        let alternate = match rel {
            Some(rel) => rel.trim().eq_ignore_ascii_case("alternate"),
            None => true,
        };
        if !alternate && !self.link.trim().is_empty() {
            return ActiveAccumulator::None;
        }

        match href.map(str::trim).filter(|href| !href.is_empty()) {
            Some(href) => {
                self.link = href.to_string();
                ActiveAccumulator::None
            }
            None => {
                self.link.clear();
                ActiveAccumulator::Link
            }
        }
    }

    /// Starts a new body text, replacing any earlier one.
    pub fn begin_description(&mut self) {
        self.replaced_description = self.description.replace(String::new());
    }

    /// Ends a body text element. An element that carried no text (an empty
    /// `<media:content/>`, say) does not wipe out the body seen before it.
    pub fn finish_description(&mut self) {
        let replaced = self.replaced_description.take();
        if self
            .description
            .as_deref()
            .is_some_and(|text| text.trim().is_empty())
            && replaced.is_some()
        {
            self.description = replaced;
        }
    }

    pub fn begin_date(&mut self) {
        self.date_text.clear();
    }

    /// Parses the collected date text. An unparseable date leaves the
    /// previously parsed date, if any, in place.
    pub fn finish_date(&mut self, dialect: DateDialect) {
        match normalize_date(&self.date_text, dialect) {
            Some(date) => self.date = Some(date),
            None => {
                tracing::debug!(raw = %self.date_text.trim(), ?dialect, "Unparseable entry date");
            }
        }
        self.date_text.clear();
    }

    /// Appends character data to the field selected by `target`.
    pub fn push_text(&mut self, target: ActiveAccumulator, text: &str) {
        match target {
            ActiveAccumulator::None => {}
            ActiveAccumulator::Title => {
                if let Some(title) = self.title.as_mut() {
                    title.push_str(text);
                }
            }
            ActiveAccumulator::Link => self.link.push_str(text),
            ActiveAccumulator::Description => {
                if let Some(description) = self.description.as_mut() {
                    description.push_str(text);
                }
            }
            ActiveAccumulator::Date(_) => self.date_text.push_str(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_first_title_wins() {
        let mut draft = EntryDraft::new();
        assert!(draft.begin_title());
        draft.push_text(ActiveAccumulator::Title, "First");
        assert!(!draft.begin_title());
        assert_eq!(draft.title.as_deref(), Some("First"));
    }

    #[test]
    fn test_text_link_resets_on_each_element() {
        let mut draft = EntryDraft::new();
        let target = draft.begin_link(None, None);
        assert_eq!(target, ActiveAccumulator::Link);
        draft.push_text(target, "https://example.com/old");

        let target = draft.begin_link(None, None);
        draft.push_text(target, "https://example.com/new");
        assert_eq!(draft.link, "https://example.com/new");
    }

    #[test]
    fn test_href_link_needs_no_text() {
        let mut draft = EntryDraft::new();
        let target = draft.begin_link(Some("https://example.com/a"), Some("alternate"));
        assert_eq!(target, ActiveAccumulator::None);
        assert_eq!(draft.link, "https://example.com/a");
    }

    #[test]
    fn test_blank_href_falls_back_to_text() {
        let mut draft = EntryDraft::new();
        assert_eq!(draft.begin_link(Some("  "), None), ActiveAccumulator::Link);
    }

    #[test]
    fn test_enclosure_link_does_not_replace_alternate() {
        let mut draft = EntryDraft::new();
        draft.begin_link(Some("https://example.com/post"), None);
        draft.begin_link(Some("https://example.com/audio.mp3"), Some("enclosure"));
        assert_eq!(draft.link, "https://example.com/post");
    }

    #[test]
    fn test_enclosure_link_used_when_nothing_else() {
        let mut draft = EntryDraft::new();
        draft.begin_link(Some("https://example.com/audio.mp3"), Some("enclosure"));
        assert_eq!(draft.link, "https://example.com/audio.mp3");
    }

    #[test]
    fn test_later_description_replaces_earlier() {
        let mut draft = EntryDraft::new();
        draft.begin_description();
        draft.push_text(ActiveAccumulator::Description, "summary");
        draft.finish_description();
        draft.begin_description();
        draft.push_text(ActiveAccumulator::Description, "full content");
        draft.finish_description();
        assert_eq!(draft.description.as_deref(), Some("full content"));
    }

    #[test]
    fn test_empty_body_element_keeps_earlier_description() {
        let mut draft = EntryDraft::new();
        draft.begin_description();
        draft.push_text(ActiveAccumulator::Description, "summary");
        draft.finish_description();
        draft.begin_description();
        draft.finish_description();
        assert_eq!(draft.description.as_deref(), Some("summary"));
    }

    #[test]
    fn test_unparseable_date_keeps_previous() {
        let mut draft = EntryDraft::new();
        draft.begin_date();
        draft.push_text(
            ActiveAccumulator::Date(DateDialect::Updated),
            "2024-03-01T12:00:00Z",
        );
        draft.finish_date(DateDialect::Updated);

        draft.begin_date();
        draft.push_text(ActiveAccumulator::Date(DateDialect::Updated), "yesterday");
        draft.finish_date(DateDialect::Updated);

        assert_eq!(
            draft.date,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
    }
}
