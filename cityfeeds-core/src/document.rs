//! Front-matter documents.
//!
//! A record file is `<preamble>---\n<header>---\n<body>`. Only the first two
//! lines consisting of exactly `---` delimit the header; later ones belong to
//! the body, which is carried through every rewrite byte-for-byte.

/// Sentinel line delimiting the structured block.
pub const SENTINEL: &str = "---";

/// A text document split around its leading structured block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontMatterDocument {
    preamble: String,
    open: String,
    header: String,
    close: String,
    body: String,
}

impl FrontMatterDocument {
    /// Split `text` around the first two sentinel lines.
    ///
    /// Returns `None` when fewer than two sentinel lines exist.
    pub fn parse(text: &str) -> Option<Self> {
        let mut sentinels = Vec::with_capacity(2);
        let mut offset = 0;
        for line in text.split_inclusive('\n') {
            if is_sentinel(line) {
                sentinels.push((offset, offset + line.len()));
                if sentinels.len() == 2 {
                    break;
                }
            }
            offset += line.len();
        }
        let &[(open_start, open_end), (close_start, close_end)] = sentinels.as_slice() else {
            return None;
        };
        Some(Self {
            preamble: text[..open_start].to_owned(),
            open: text[open_start..open_end].to_owned(),
            header: text[open_end..close_start].to_owned(),
            close: text[close_start..close_end].to_owned(),
            body: text[close_end..].to_owned(),
        })
    }

    /// A fresh document with an empty preamble.
    pub fn new(header: impl Into<String>, body: impl Into<String>) -> Self {
        let mut doc = Self {
            preamble: String::new(),
            open: format!("{SENTINEL}\n"),
            header: String::new(),
            close: format!("{SENTINEL}\n"),
            body: body.into(),
        };
        doc.set_header(header);
        doc
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Replace the structured block. A missing trailing newline is added so
    /// the closing sentinel stays on its own line.
    pub fn set_header(&mut self, header: impl Into<String>) {
        let mut header = header.into();
        if !header.is_empty() && !header.ends_with('\n') {
            header.push('\n');
        }
        self.header = header;
    }

    /// Reassemble the full document text.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(
            self.preamble.len() + self.open.len() + self.header.len() + self.close.len() + self.body.len(),
        );
        out.push_str(&self.preamble);
        out.push_str(&self.open);
        out.push_str(&self.header);
        out.push_str(&self.close);
        out.push_str(&self.body);
        out
    }
}

fn is_sentinel(line: &str) -> bool {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
        == SENTINEL
}
