//! Run extraction
//!
//! A run is one `<*:t>` element: its decoded text and the exact bytes it
//! occupies in the entry. Extraction is a forward byte scan over the original
//! serialization rather than a tree parse, so every span points at the bytes
//! that were actually read and untouched siblings are never reserialized.

use std::ops::Range;

use quick_xml::escape::unescape;

use crate::error::ExtractionError;

/// Local name of the text-bearing element
const TEXT_ELEMENT: &str = "t";

/// Entities longer than this are treated as literal text
const MAX_ENTITY_LEN: usize = 32;

/// One text-bearing element of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    /// Sequence number within the entry
    pub run_id: usize,
    /// Decoded text content
    pub text: String,
    /// Qualified element name as written (e.g. `w:t`)
    pub element: String,
    /// Bytes from the opening `<` through the closing tag's `>`
    pub span: Range<usize>,
    /// Bytes between the opening and closing tags; `None` when self-closing
    pub content: Option<Range<usize>>,
    /// False when the content holds CDATA, nested markup or multi-char references
    pub verbatim: bool,
    /// Raw bytes behind each decoded char
    sources: Vec<CharSource>,
    /// Raw offset just past the last char
    text_end: usize,
}

/// Raw bytes one decoded char was read from
///
/// Chars of a multi-char reference share the reference's bytes; a normalized
/// `\r\n` covers both bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CharSource {
    start: usize,
    end: usize,
    cdata: bool,
}

/// How inserted text must be escaped at a raw position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawContext {
    Text,
    Cdata,
}

impl Run {
    /// Length of the decoded text in chars
    pub fn char_len(&self) -> usize {
        self.sources.len()
    }

    /// Raw byte range that decodes to chars `start..end` of [`Run::text`]
    ///
    /// Returns `None` when the range is out of bounds, splits a character
    /// reference, or crosses markup or a CDATA boundary.
    pub fn raw_range(&self, start: usize, end: usize) -> Option<Range<usize>> {
        self.raw_slice(start, end).map(|(range, _)| range)
    }

    /// Like [`Run::raw_range`], also telling whether the bytes sit in CDATA
    pub(crate) fn raw_slice(
        &self,
        start: usize,
        end: usize,
    ) -> Option<(Range<usize>, RawContext)> {
        if start > end || end > self.sources.len() {
            return None;
        }
        let splits = |i: usize| {
            i > 0 && i < self.sources.len() && self.sources[i - 1] == self.sources[i]
        };
        if splits(start) || splits(end) {
            return None;
        }

        if start == end {
            let at = match self.sources.get(start) {
                Some(next) => (next.start, next.cdata),
                None => self
                    .sources
                    .last()
                    .map_or((self.text_end, false), |last| (last.end, last.cdata)),
            };
            return Some((at.0..at.0, RawContext::from_cdata(at.1)));
        }

        let chars = &self.sources[start..end];
        let first = chars[0];
        let contiguous = chars.windows(2).all(|pair| {
            pair[0].cdata == pair[1].cdata
                && (pair[0] == pair[1] || pair[0].end == pair[1].start)
        });
        if !contiguous {
            return None;
        }
        let last = chars[chars.len() - 1];
        Some((first.start..last.end, RawContext::from_cdata(first.cdata)))
    }

    /// Whether `raw` still holds this run at its recorded span
    pub fn is_located_in(&self, raw: &[u8]) -> bool {
        let Some(element) = raw.get(self.span.clone()) else {
            return false;
        };
        if element.first() != Some(&b'<') || element.last() != Some(&b'>') {
            return false;
        }
        let name_end = 1 + self.element.len();
        if element.get(1..name_end) != Some(self.element.as_bytes()) {
            return false;
        }
        match &self.content {
            None => self.text.is_empty(),
            Some(content) => {
                if content.start < self.span.start || content.end > self.span.end {
                    return false;
                }
                match std::str::from_utf8(&raw[content.clone()]) {
                    Ok(inner) => decode_content(inner, content.start).text == self.text,
                    Err(_) => false,
                }
            }
        }
    }
}

/// Scan an entry for text elements in document order
pub fn extract_runs(raw: &[u8]) -> Result<Vec<Run>, ExtractionError> {
    let text = std::str::from_utf8(raw).map_err(|e| ExtractionError::InvalidUtf8 {
        valid_up_to: e.valid_up_to(),
    })?;
    Scanner::new(text).scan()
}

/// Concatenated text of `runs` in order
pub fn logical_text(runs: &[Run]) -> String {
    runs.iter().map(|r| r.text.as_str()).collect()
}

struct Scanner<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn scan(mut self) -> Result<Vec<Run>, ExtractionError> {
        let mut runs = Vec::new();

        while let Some(found) = self.text[self.pos..].find('<') {
            let lt = self.pos + found;
            let rest = &self.text[lt..];

            if rest.starts_with("<!--") {
                self.pos = self.skip_past(lt + 4, "-->");
            } else if rest.starts_with("<![CDATA[") {
                self.pos = self.skip_past(lt + 9, "]]>");
            } else if rest.starts_with("<?") {
                self.pos = self.skip_past(lt + 2, "?>");
            } else if rest.starts_with("<!") || rest.starts_with("</") {
                self.pos = self.skip_past(lt + 2, ">");
            } else if let Some(run) = self.start_tag(lt, runs.len())? {
                runs.push(run);
            }
        }

        Ok(runs)
    }

    /// Position just after the next `needle` at or after `from`, or end of input
    fn skip_past(&self, from: usize, needle: &str) -> usize {
        match self.text.get(from..).and_then(|s| s.find(needle)) {
            Some(p) => from + p + needle.len(),
            None => self.text.len(),
        }
    }

    /// Index of the `>` closing the tag whose name ends at `from`
    fn tag_end(&self, from: usize) -> Option<usize> {
        let mut quote: Option<u8> = None;
        for (i, &b) in self.bytes.iter().enumerate().skip(from) {
            match quote {
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None if b == b'"' || b == b'\'' => quote = Some(b),
                None if b == b'>' => return Some(i),
                None => {}
            }
        }
        None
    }

    fn start_tag(&mut self, lt: usize, run_id: usize) -> Result<Option<Run>, ExtractionError> {
        let name_start = lt + 1;
        let name_end = self.bytes[name_start..]
            .iter()
            .position(|&b| b.is_ascii_whitespace() || b == b'/' || b == b'>')
            .map_or(self.bytes.len(), |p| name_start + p);

        if name_end == name_start {
            self.pos = name_start;
            return Ok(None);
        }

        let qname = &self.text[name_start..name_end];
        let is_text = local_name(qname) == TEXT_ELEMENT;

        let Some(gt) = self.tag_end(name_end) else {
            if is_text {
                return Err(ExtractionError::Unterminated {
                    element: qname.to_string(),
                    offset: lt,
                });
            }
            self.pos = self.text.len();
            return Ok(None);
        };

        self.pos = gt + 1;
        if !is_text {
            return Ok(None);
        }

        if self.bytes[gt - 1] == b'/' {
            return Ok(Some(Run {
                run_id,
                text: String::new(),
                element: qname.to_string(),
                span: lt..gt + 1,
                content: None,
                verbatim: true,
                sources: Vec::new(),
                text_end: gt + 1,
            }));
        }

        let content_start = gt + 1;
        let (content_end, span_end) =
            self.find_close(qname, content_start)
                .ok_or_else(|| ExtractionError::Unterminated {
                    element: qname.to_string(),
                    offset: lt,
                })?;

        let decoded = decode_content(&self.text[content_start..content_end], content_start);
        self.pos = span_end;

        Ok(Some(Run {
            run_id,
            text: decoded.text,
            element: qname.to_string(),
            span: lt..span_end,
            content: Some(content_start..content_end),
            verbatim: decoded.verbatim,
            sources: decoded.sources,
            text_end: content_end,
        }))
    }

    /// Locate `</qname>` after `from`; returns (close tag start, index after its `>`)
    fn find_close(&self, qname: &str, from: usize) -> Option<(usize, usize)> {
        let needle = format!("</{qname}");
        let mut search = from;

        while let Some(p) = self.text[search..].find(&needle) {
            let close_lt = search + p;
            let mut i = close_lt + needle.len();
            while i < self.bytes.len() && self.bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if self.bytes.get(i) == Some(&b'>') {
                return Some((close_lt, i + 1));
            }
            // `</w:tab` and friends share the prefix
            search = close_lt + needle.len();
        }

        None
    }
}

fn local_name(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

impl RawContext {
    fn from_cdata(cdata: bool) -> Self {
        if cdata {
            RawContext::Cdata
        } else {
            RawContext::Text
        }
    }
}

pub(crate) struct Decoded {
    pub(crate) text: String,
    pub(crate) verbatim: bool,
    sources: Vec<CharSource>,
}

impl Decoded {
    fn push(&mut self, ch: char, start: usize, end: usize, cdata: bool) {
        self.text.push(ch);
        self.sources.push(CharSource { start, end, cdata });
    }

    /// Push literal text found at absolute offset `at`
    ///
    /// Line ends are normalized: `\r\n` and a lone `\r` both read as `\n`.
    fn push_literal(&mut self, chunk: &str, at: usize, cdata: bool) {
        let mut chars = chunk.char_indices().peekable();
        while let Some((off, ch)) = chars.next() {
            let start = at + off;
            let mut end = start + ch.len_utf8();
            let ch = if ch == '\r' {
                if chars.next_if(|&(_, next)| next == '\n').is_some() {
                    end += 1;
                }
                '\n'
            } else {
                ch
            };
            self.push(ch, start, end, cdata);
        }
    }
}

/// Decode element content starting at absolute offset `base`
pub(crate) fn decode_content(inner: &str, base: usize) -> Decoded {
    let mut decoded = Decoded {
        text: String::with_capacity(inner.len()),
        verbatim: true,
        sources: Vec::with_capacity(inner.len()),
    };
    let mut i = 0;

    while i < inner.len() {
        let rest = &inner[i..];

        if let Some(body) = rest.strip_prefix("<![CDATA[") {
            decoded.verbatim = false;
            let body_start = i + 9;
            let body_len = body.find("]]>").unwrap_or(body.len());
            decoded.push_literal(&body[..body_len], base + body_start, true);
            i = (body_start + body_len + 3).min(inner.len());
        } else if rest.starts_with('<') {
            decoded.verbatim = false;
            i = rest.find('>').map_or(inner.len(), |p| i + p + 1);
        } else if rest.starts_with('&') {
            let entity = rest
                .find(';')
                .filter(|&p| p <= MAX_ENTITY_LEN)
                .and_then(|p| unescape(&rest[..=p]).ok().map(|d| (p, d)));
            match entity {
                Some((p, text)) => {
                    if text.chars().count() != 1 {
                        decoded.verbatim = false;
                    }
                    for ch in text.chars() {
                        decoded.push(ch, base + i, base + i + p + 1, false);
                    }
                    i += p + 1;
                }
                None => {
                    decoded.push('&', base + i, base + i + 1, false);
                    i += 1;
                }
            }
        } else {
            let len = rest.find(&['<', '&'][..]).unwrap_or(rest.len());
            decoded.push_literal(&rest[..len], base + i, false);
            i += len;
        }
    }

    decoded
}
