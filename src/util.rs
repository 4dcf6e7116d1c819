use crate::ArcStr;
use noisy_float::prelude::*;
use serde::{de, Deserialize, Deserializer};
use std::{fmt, fmt::Write, fs, io, path::Path};

/// Converts a not found error to Ok(false)
pub fn path_exists(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound) => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn check_extension(path: &Path, ext: &str) -> crate::Result<()> {
    anyhow::ensure!(
        matches!(path.extension(), Some(p) if p == ext),
        "filename should end with `.{}`",
        ext
    );
    Ok(())
}

// Helpers for serde to parse fields with quirks.

/// Parse a string, but map "null" to `None` (in addition to the default "" -> None mapping)
pub fn optional_string<'de, D>(d: D) -> Result<Option<ArcStr>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(d)?;
    if s.eq_ignore_ascii_case("null") || s.is_empty() {
        Ok(None)
    } else {
        Ok(Some(s.into()))
    }
}

/// Parse an optional float, rejecting NaN and infinities.
///
/// The extract encodes missing values as the empty field; a non-finite value means the
/// source is corrupt.
pub fn optional_finite<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<f64> = Deserialize::deserialize(d)?;
    match v {
        Some(v) => match R64::try_new(v) {
            Some(_) => Ok(Some(v)),
            None => Err(de::Error::custom("non-finite numeric value")),
        },
        None => Ok(None),
    }
}

/// Print an underlined section header to the terminal.
pub fn header(header: &str) {
    let len = header.len();
    print!("\n{}\n", header);
    for _ in 0..len {
        print!("=");
    }
    println!("\n")
}

/// Accumulates an HTML document a piece at a time.
///
/// All text content is escaped on the way in, so the output is safe to open in a browser
/// whatever ends up in the category labels.
pub struct HtmlWriter {
    output: String,
    scratch: String,
}

impl HtmlWriter {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            scratch: String::new(),
        }
    }

    pub fn heading(&mut self, level: u8, text: &str) {
        let _ = write!(self.output, "<h{}>", level);
        html_escape::encode_text_to_string(text, &mut self.output);
        let _ = write!(self.output, "</h{}>", level);
    }

    pub fn table_start(&mut self, headers: impl IntoIterator<Item = impl fmt::Display>) {
        self.output.push_str("<table><thead><tr>");
        for h in headers {
            self.output.push_str("<th>");
            self.escaped(h);
            self.output.push_str("</th>");
        }
        self.output.push_str("</tr></thead><tbody>");
    }

    pub fn row(&mut self, cells: impl IntoIterator<Item = impl fmt::Display>) {
        self.output.push_str("<tr>");
        for cell in cells {
            self.output.push_str("<td>");
            self.escaped(cell);
            self.output.push_str("</td>");
        }
        self.output.push_str("</tr>");
    }

    pub fn table_end(&mut self) {
        self.output.push_str("</tbody></table>");
    }

    pub fn finish(self) -> String {
        self.output
    }

    fn escaped(&mut self, content: impl fmt::Display) {
        self.scratch.clear();
        let _ = write!(self.scratch, "{}", content);
        html_escape::encode_text_to_string(&self.scratch, &mut self.output);
    }
}

#[cfg(test)]
mod test {
    use super::HtmlWriter;

    #[test]
    fn escapes_cell_content() {
        let mut w = HtmlWriter::new();
        w.table_start(["a<b"]);
        w.row(["x & y"]);
        w.table_end();
        let html = w.finish();
        assert!(html.contains("a&lt;b"));
        assert!(html.contains("x &amp; y"));
        assert!(!html.contains("<td>a<b</td>"));
    }
}
