use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;

use super::cancel::Cancellation;
use super::handler::ParseError;

/// A single structural event from a feed document.
///
/// Element and attribute names are local names: namespace prefixes are
/// dropped, so `<dc:date>` arrives as `date` and `<rdf:RDF>` as `RDF`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Open {
        name: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    Close {
        name: String,
    },
}

impl FeedEvent {
    /// Convenience constructor for an element without attributes.
    pub fn open(name: &str) -> Self {
        FeedEvent::Open {
            name: name.to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn text(text: &str) -> Self {
        FeedEvent::Text(text.to_string())
    }

    pub fn close(name: &str) -> Self {
        FeedEvent::Close {
            name: name.to_string(),
        }
    }
}

/// Looks up an attribute by local name.
pub fn attribute<'a>(attributes: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

/// Pull-based [`FeedEvent`] stream over raw feed bytes.
///
/// Self-closing elements produce an `Open` immediately followed by a
/// `Close`. Once the shared [`Cancellation`] is stopped, the stream ends
/// without reading further input.
pub struct XmlEventSource<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    pending_close: Option<String>,
    cancel: Cancellation,
    finished: bool,
}

impl<R: BufRead> XmlEventSource<R> {
    pub fn new(input: R, cancel: Cancellation) -> Self {
        // SEC-002: no DTD entity expansion; text goes through `unescape()`, which
        // only resolves the five XML builtins.
        let mut reader = Reader::from_reader(input);
        // Real-world feeds are sloppy about matching end tags.
        reader.config_mut().check_end_names = false;

        Self {
            reader,
            buf: Vec::new(),
            pending_close: None,
            cancel,
            finished: false,
        }
    }
}

impl<R: BufRead> Iterator for XmlEventSource<R> {
    type Item = Result<FeedEvent, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(name) = self.pending_close.take() {
            return Some(Ok(FeedEvent::Close { name }));
        }

        loop {
            if self.finished || self.cancel.is_stopped() {
                return None;
            }

            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(ParseError::Xml {
                        position: self.reader.error_position(),
                        message: e.to_string(),
                    }));
                }
            };
            let decoder = self.reader.decoder();

            match event {
                Event::Start(e) => return Some(Ok(open_event(&e, decoder))),
                Event::Empty(e) => {
                    let open = open_event(&e, decoder);
                    self.pending_close = Some(local_name(e.local_name().as_ref()));
                    return Some(Ok(open));
                }
                Event::End(e) => {
                    return Some(Ok(FeedEvent::Close {
                        name: local_name(e.local_name().as_ref()),
                    }))
                }
                Event::Text(e) => {
                    let text = match e.unescape() {
                        Ok(text) => text.into_owned(),
                        // Unknown entities (`&nbsp;` and friends) keep the raw text
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    if !text.is_empty() {
                        return Some(Ok(FeedEvent::Text(text)));
                    }
                }
                Event::CData(e) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    if !text.is_empty() {
                        return Some(Ok(FeedEvent::Text(text)));
                    }
                }
                Event::Eof => {
                    self.finished = true;
                    return None;
                }
                _ => {}
            }
        }
    }
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn open_event(e: &BytesStart<'_>, decoder: Decoder) -> FeedEvent {
    let mut attributes = Vec::new();
    for attr in e.attributes().with_checks(false) {
        let attr = match attr {
            Ok(attr) => attr,
            Err(err) => {
                tracing::debug!(error = %err, "Skipping malformed attribute");
                continue;
            }
        };
        let value = attr
            .decode_and_unescape_value(decoder)
            .unwrap_or_else(|_| Cow::Owned(String::from_utf8_lossy(&attr.value).into_owned()));
        attributes.push((
            local_name(attr.key.local_name().as_ref()),
            value.into_owned(),
        ));
    }

    FeedEvent::Open {
        name: local_name(e.local_name().as_ref()),
        attributes,
    }
}
