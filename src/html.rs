//! HTML rendering helpers.
//!
//! Pages are small and built directly with a `quick-xml` writer, which
//! escapes text and attribute values for us.  Markup that is already safe
//! (for example report cells rewritten into links) goes through
//! [`HtmlWriter::raw`].

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

/// Escape `text` for use inside HTML text or attribute values.
pub fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// Incremental HTML document writer.
pub struct HtmlWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl Default for HtmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlWriter {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(Cursor::new(Vec::new())),
        }
    }

    /// Writes into a `Vec` cannot fail.
    fn emit(&mut self, event: Event<'_>) {
        self.writer.write_event(event).expect("write to Vec");
    }

    pub fn open(&mut self, tag: &str) {
        self.emit(Event::Start(BytesStart::new(tag)));
    }

    pub fn open_with(&mut self, tag: &str, attrs: &[(&str, &str)]) {
        let start = BytesStart::new(tag).with_attributes(attrs.iter().copied());
        self.emit(Event::Start(start));
    }

    /// Void element such as `<input ... />`.
    pub fn empty_with(&mut self, tag: &str, attrs: &[(&str, &str)]) {
        let start = BytesStart::new(tag).with_attributes(attrs.iter().copied());
        self.emit(Event::Empty(start));
    }

    pub fn close(&mut self, tag: &str) {
        self.emit(Event::End(BytesEnd::new(tag)));
    }

    /// Escaped text.
    pub fn text(&mut self, text: &str) {
        self.emit(Event::Text(BytesText::new(text)));
    }

    /// Markup written verbatim.
    pub fn raw(&mut self, html: &str) {
        self.emit(Event::Text(BytesText::from_escaped(html)));
    }

    pub fn newline(&mut self) {
        self.raw("\n");
    }

    /// `<tag>text</tag>`
    pub fn text_element(&mut self, tag: &str, text: &str) {
        self.open(tag);
        self.text(text);
        self.close(tag);
    }

    /// `<a href="href">text</a>`
    pub fn link(&mut self, href: &str, text: &str) {
        self.open_with("a", &[("href", href)]);
        self.text(text);
        self.close("a");
    }

    pub fn finish(self) -> String {
        String::from_utf8(self.writer.into_inner().into_inner()).expect("valid utf-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_escaped() {
        let mut w = HtmlWriter::new();
        w.text_element("h1", "a<b>&c");
        assert_eq!(w.finish(), "<h1>a&lt;b&gt;&amp;c</h1>");
    }

    #[test]
    fn test_link_attribute_escaped() {
        let mut w = HtmlWriter::new();
        w.link("/x?a=1&b=\"2\"", "x");
        assert_eq!(w.finish(), "<a href=\"/x?a=1&amp;b=&quot;2&quot;\">x</a>");
    }

    #[test]
    fn test_raw_is_verbatim() {
        let mut w = HtmlWriter::new();
        w.open("td");
        w.raw("<a href=\"/k\">k</a>");
        w.close("td");
        assert_eq!(w.finish(), "<td><a href=\"/k\">k</a></td>");
    }
}
