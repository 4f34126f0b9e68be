//! The persisted groove document: an SVG drawing of the disc whose
//! `polyline#audioGroove` carries the point list and whose `<desc>` carries
//! the geometry descriptor.
//!
//! Reading does not need a full XML parser. A small tag scanner walks the
//! markup, collects attributes of the elements we care about, and records
//! byte offsets so malformed point lists can be reported precisely.

use std::fmt::Write as _;

use crate::codec::quantize::GroovePoint;
use crate::descriptor::GrooveDescriptor;
use crate::error::FormatError;
use crate::geometry::SpiralGeometry;

/// `id` of the polyline that holds the groove.
pub const GROOVE_ID: &str = "audioGroove";

/// A bounding circle as drawn in the document (document units, unscaled).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Circle {
    pub cx: Option<f64>,
    pub cy: Option<f64>,
    pub r: Option<f64>,
}

/// Raw content of a groove document.
#[derive(Debug, Clone, PartialEq)]
pub struct GrooveDocument {
    /// Points in document units, in document order.
    pub points: Vec<(f64, f64)>,
    /// Circles in document order; the first is the outer bound, the second
    /// the inner bound.
    pub circles: Vec<Circle>,
    pub descriptor: Option<GrooveDescriptor>,
}

// --- Scanner ---

struct Attribute<'a> {
    name: &'a str,
    value: &'a str,
    /// Byte offset of `value` in the source.
    value_start: usize,
}

struct Tag<'a> {
    name: &'a str,
    attributes: Vec<Attribute<'a>>,
    /// Byte offset just past the closing `>`.
    end: usize,
}

impl<'a> Tag<'a> {
    fn attr(&self, name: &str) -> Option<&Attribute<'a>> {
        self.attributes.iter().find(|a| a.name == name)
    }

    fn number(&self, name: &str) -> Option<f64> {
        self.attr(name)
            .and_then(|a| a.value.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }
}

struct TagScanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> TagScanner<'a> {
    fn new(src: &'a str) -> Self {
        TagScanner {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Move past the character at `pos`, which may be wider than one byte.
    fn step_char(&mut self) {
        self.pos += self.src[self.pos..].chars().next().map_or(1, char::len_utf8);
    }

    fn skip_past(&mut self, pattern: &str) {
        match self.src[self.pos..].find(pattern) {
            Some(found) => self.pos += found + pattern.len(),
            None => self.pos = self.bytes.len(),
        }
    }

    /// ASCII name characters only, so the name always ends on a char boundary.
    fn read_name(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.'))
        {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    /// Next opening (or self-closing) tag. Closing tags, comments, and
    /// declarations are skipped.
    fn next_tag(&mut self) -> Option<Tag<'a>> {
        loop {
            self.skip_past_text()?;
            // Positioned on '<'
            self.pos += 1;
            match self.peek() {
                Some(b'!') if self.src[self.pos..].starts_with("!--") => self.skip_past("-->"),
                Some(b'!') | Some(b'?') | Some(b'/') => self.skip_past(">"),
                Some(_) => {
                    if let Some(tag) = self.read_tag() {
                        return Some(tag);
                    }
                }
                None => return None,
            }
        }
    }

    fn skip_past_text(&mut self) -> Option<()> {
        let found = self.src[self.pos..].find('<')?;
        self.pos += found;
        Some(())
    }

    fn read_tag(&mut self) -> Option<Tag<'a>> {
        let name = self.read_name();
        if name.is_empty() {
            return None;
        }
        let mut attributes = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek()? {
                b'>' => {
                    self.pos += 1;
                    break;
                }
                b'/' => {
                    self.pos += 1;
                }
                _ => {
                    let attr_name = self.read_name();
                    if attr_name.is_empty() {
                        // Stray character; step over all of it
                        self.step_char();
                        continue;
                    }
                    self.skip_whitespace();
                    if self.peek() != Some(b'=') {
                        attributes.push(Attribute {
                            name: attr_name,
                            value: "",
                            value_start: self.pos,
                        });
                        continue;
                    }
                    self.pos += 1;
                    self.skip_whitespace();
                    let (value, value_start) = self.read_value()?;
                    attributes.push(Attribute {
                        name: attr_name,
                        value,
                        value_start,
                    });
                }
            }
        }
        Some(Tag {
            name,
            attributes,
            end: self.pos,
        })
    }

    fn read_value(&mut self) -> Option<(&'a str, usize)> {
        match self.peek()? {
            quote @ (b'"' | b'\'') => {
                self.pos += 1;
                let start = self.pos;
                let len = self.bytes[start..].iter().position(|&b| b == quote)?;
                self.pos = start + len + 1;
                Some((&self.src[start..start + len], start))
            }
            _ => {
                let start = self.pos;
                while matches!(self.peek(), Some(b) if !b.is_ascii_whitespace() && b != b'>') {
                    self.pos += 1;
                }
                Some((&self.src[start..self.pos], start))
            }
        }
    }
}

// --- Points ---

/// Parse a whitespace-separated `x,y` list. `offset` is the byte offset of
/// `text` in the document, used for error spans.
fn parse_points(text: &str, offset: usize) -> Result<Vec<(f64, f64)>, FormatError> {
    let mut points = Vec::with_capacity(text.len() / 12);
    let mut index = 0;
    let mut rest = text;
    let mut consumed = 0;
    while let Some(start) = rest.find(|c: char| !c.is_whitespace()) {
        let token_len = rest[start..]
            .find(char::is_whitespace)
            .unwrap_or(rest.len() - start);
        let token = &rest[start..start + token_len];
        let token_offset = offset + consumed + start;

        let parsed = token.split_once(',').and_then(|(x, y)| {
            let x = x.parse::<f64>().ok().filter(|v| v.is_finite())?;
            let y = y.parse::<f64>().ok().filter(|v| v.is_finite())?;
            Some((x, y))
        });
        match parsed {
            Some(point) => points.push(point),
            None => {
                return Err(FormatError::InvalidPoint {
                    index,
                    text: token.to_string(),
                    span: token_offset..token_offset + token_len,
                });
            }
        }

        index += 1;
        consumed += start + token_len;
        rest = &rest[start + token_len..];
    }
    if points.is_empty() {
        return Err(FormatError::EmptyPoints {
            span: offset..offset + text.len(),
        });
    }
    Ok(points)
}

impl GrooveDocument {
    /// Scan a groove document.
    ///
    /// Fails with a "missing groove data" error when there is no
    /// `polyline#audioGroove` or its point list is empty.
    pub fn parse(src: &str) -> Result<Self, FormatError> {
        let mut scanner = TagScanner::new(src);
        let mut points = None;
        let mut circles = Vec::new();
        let mut descriptor = None;

        while let Some(tag) = scanner.next_tag() {
            match tag.name {
                "polyline" if points.is_none() => {
                    let is_groove = tag.attr("id").is_some_and(|a| a.value == GROOVE_ID);
                    if !is_groove {
                        continue;
                    }
                    let parsed = match tag.attr("points") {
                        Some(attr) => parse_points(attr.value, attr.value_start)?,
                        None => {
                            return Err(FormatError::EmptyPoints {
                                span: tag.end..tag.end,
                            });
                        }
                    };
                    points = Some(parsed);
                }
                "circle" => circles.push(Circle {
                    cx: tag.number("cx"),
                    cy: tag.number("cy"),
                    r: tag.number("r"),
                }),
                "desc" if descriptor.is_none() => {
                    let body_start = tag.end;
                    let body_len = src[body_start..].find("</desc").unwrap_or(0);
                    let body = &src[body_start..body_start + body_len];
                    let parsed = GrooveDescriptor::from_text(body)
                        .map_err(|e| e.offset_by(body_start))?;
                    descriptor = Some(parsed);
                }
                _ => {}
            }
        }

        let points = points.ok_or(FormatError::MissingGroove)?;
        Ok(GrooveDocument {
            points,
            circles,
            descriptor,
        })
    }

    pub fn outer_circle(&self) -> Option<&Circle> {
        self.circles.first()
    }

    pub fn inner_circle(&self) -> Option<&Circle> {
        self.circles.get(1)
    }
}

/// Render a groove document. All coordinates (view box, circles, points)
/// are in scaled integer units.
pub fn write_document(
    geometry: &SpiralGeometry,
    descriptor: &GrooveDescriptor,
    points: &[GroovePoint],
) -> String {
    let s = geometry.scale as f64;
    let disc = &geometry.disc;
    let width = (2.0 * disc.cx * s).round();
    let height = (2.0 * disc.cy * s).round();
    let (cx, cy) = ((disc.cx * s).round(), (disc.cy * s).round());
    let outer = (disc.outer_circle_radius() * s).round();
    let inner = (disc.inner_circle_radius() * s).round();

    let mut out = String::with_capacity(points.len() * 14 + 1024);
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="520" height="520" viewBox="0 0 {width} {height}" role="img" aria-label="Geometry-only spiral record">"#
    );
    out.push_str(
        r##"  <defs>
    <radialGradient id="discGrad" r="60%">
      <stop offset="0%" stop-color="#0e1217"/>
      <stop offset="100%" stop-color="#0b0f14"/>
    </radialGradient>
  </defs>
"##,
    );
    let stroke = 2.0 * s;
    let _ = writeln!(
        out,
        r##"  <circle cx="{cx}" cy="{cy}" r="{outer}" fill="url(#discGrad)" stroke="#233242" stroke-width="{stroke}"/>"##
    );
    let _ = writeln!(
        out,
        r##"  <circle cx="{cx}" cy="{cy}" r="{inner}" fill="#0a0d11" stroke="#22303b" stroke-width="{stroke}"/>"##
    );
    let _ = write!(
        out,
        r##"  <polyline id="{GROOVE_ID}" fill="none" stroke="#5ad8cf" stroke-width="{}" stroke-linecap="round" points=""##,
        0.8 * s
    );
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{},{}", p.x, p.y);
    }
    out.push_str("\" />\n");
    let _ = writeln!(out, "  <desc>{}</desc>", descriptor.to_text());
    out.push_str("</svg>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::DiscGeometry;

    const LEGACY_DOC: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 520 520">
  <!-- <polyline id="audioGroove" points="9,9"/> -->
  <circle cx="260" cy="260" r="228" fill="url(#discGrad)"/>
  <circle cx="260" cy="260" r="32"/>
  <polyline id="audioGroove" fill="none" points="480.000,260.000 479.512,262.137  478.100,264.250" />
  <desc>Geometry-only spiral audio. sr=8000; Rout=220; Rin=40; turns=6; k=5.000000; originalLength=3; mulaw=1; preemph=1.</desc>
</svg>"#;

    #[test]
    fn scans_legacy_document() {
        let doc = GrooveDocument::parse(LEGACY_DOC).unwrap();
        assert_eq!(doc.points.len(), 3, "Commented-out polyline must be ignored");
        assert_eq!(doc.points[1], (479.512, 262.137));
        assert_eq!(doc.circles.len(), 2);
        assert_eq!(doc.outer_circle().and_then(|c| c.r), Some(228.0));
        assert_eq!(doc.inner_circle().and_then(|c| c.r), Some(32.0));
        let desc = doc.descriptor.unwrap();
        assert_eq!(desc.sample_rate, Some(8000));
        assert_eq!(desc.k, Some(5.0));
    }

    #[test]
    fn missing_polyline_is_missing_groove() {
        let err = GrooveDocument::parse("<svg><circle r='3'/></svg>").unwrap_err();
        assert!(matches!(err, FormatError::MissingGroove));

        // A polyline with a different id is not the groove
        let err = GrooveDocument::parse(r#"<svg><polyline id="other" points="1,2"/></svg>"#)
            .unwrap_err();
        assert!(matches!(err, FormatError::MissingGroove));
    }

    #[test]
    fn non_ascii_inside_tags_is_skipped() {
        let doc = GrooveDocument::parse(
            "<svg é><polyline id=\"audioGroove\" ü=x points=\"1,2 3,4\"/><ñ/></svg>",
        )
        .unwrap();
        assert_eq!(doc.points, vec![(1.0, 2.0), (3.0, 4.0)]);

        let err = GrooveDocument::parse("<svg é><circle r=\"3\" 漢字/>").unwrap_err();
        assert!(matches!(err, FormatError::MissingGroove));
    }

    #[test]
    fn empty_points_is_missing_groove() {
        let src = r#"<svg><polyline id="audioGroove" points="   "/></svg>"#;
        let err = GrooveDocument::parse(src).unwrap_err();
        assert!(matches!(err, FormatError::EmptyPoints { .. }));
        assert!(err.to_string().contains("missing groove data"));
    }

    #[test]
    fn invalid_point_span_points_into_document() {
        let src = r#"<svg><polyline id="audioGroove" points="1,2 3,x 5,6"/></svg>"#;
        let err = GrooveDocument::parse(src).unwrap_err();
        match &err {
            FormatError::InvalidPoint { index, span, .. } => {
                assert_eq!(*index, 1);
                assert_eq!(&src[span.clone()], "3,x");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.diagnostic(src).contains("invalid groove point #1"));
    }

    #[test]
    fn descriptor_error_span_is_document_relative() {
        let src = r#"<svg><polyline id="audioGroove" points="1,2"/><desc>sr=abc;</desc></svg>"#;
        let err = GrooveDocument::parse(src).unwrap_err();
        let span = err.span().unwrap();
        assert_eq!(&src[span], "abc");
    }

    #[test]
    fn written_document_scans_back() {
        let geometry = SpiralGeometry::new(DiscGeometry::default(), 6.0, 100).unwrap();
        let descriptor = GrooveDescriptor {
            sample_rate: Some(16000),
            scale: Some(100),
            ..GrooveDescriptor::default()
        };
        let points = vec![
            GroovePoint { x: 48000, y: 26000 },
            GroovePoint { x: 47951, y: -3 },
        ];
        let svg = write_document(&geometry, &descriptor, &points);
        assert!(svg.contains(r#"viewBox="0 0 52000 52000""#), "svg was {svg}");

        let doc = GrooveDocument::parse(&svg).unwrap();
        assert_eq!(doc.points, vec![(48000.0, 26000.0), (47951.0, -3.0)]);
        assert_eq!(doc.outer_circle().and_then(|c| c.r), Some(22800.0));
        assert_eq!(doc.inner_circle().and_then(|c| c.r), Some(3200.0));
        assert_eq!(doc.descriptor, Some(descriptor));
    }
}
