#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    /// Inside a `'...'` literal or a `"..."` identifier; doubled quotes escape.
    Quoted(u8),
    LineComment,
    BlockComment(u32),
    /// Inside a `$tag$ ... $tag$` body; the tag spans `start..start + len`.
    DollarQuoted { start: usize, len: usize },
}

/// Yields the byte offset of every bare `?` marker that sits in SQL code.
///
/// Markers inside literals, quoted identifiers, comments and dollar-quoted bodies are
/// skipped, as are markers already followed by a position (`?3`).
pub(super) struct MarkerScanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    mode: Mode,
}

impl<'a> MarkerScanner<'a> {
    pub(super) fn new(sql: &'a str) -> Self {
        Self {
            bytes: sql.as_bytes(),
            pos: 0,
            mode: Mode::Code,
        }
    }

    /// Closing `$` of a dollar-quote opener at `at`, if there is one.
    fn dollar_tag_end(&self, at: usize) -> Option<usize> {
        let mut idx = at + 1;
        while let Some(&b) = self.bytes.get(idx) {
            if b == b'$' {
                return Some(idx);
            }
            let first = idx == at + 1;
            if !(b.is_ascii_alphabetic() || b == b'_' || (!first && b.is_ascii_digit())) {
                return None;
            }
            idx += 1;
        }
        None
    }
}

impl Iterator for MarkerScanner<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while let Some(&b) = self.bytes.get(self.pos) {
            let at = self.pos;
            let following = self.bytes.get(at + 1).copied();
            self.pos += 1;
            match self.mode {
                Mode::Code => match (b, following) {
                    (b'\'' | b'"', _) => self.mode = Mode::Quoted(b),
                    (b'-', Some(b'-')) => {
                        self.mode = Mode::LineComment;
                        self.pos += 1;
                    }
                    (b'/', Some(b'*')) => {
                        self.mode = Mode::BlockComment(1);
                        self.pos += 1;
                    }
                    (b'$', _) => {
                        if let Some(end) = self.dollar_tag_end(at) {
                            self.mode = Mode::DollarQuoted {
                                start: at,
                                len: end + 1 - at,
                            };
                            self.pos = end + 1;
                        }
                    }
                    (b'?', after) if !after.is_some_and(|n| n.is_ascii_digit()) => return Some(at),
                    _ => {}
                },
                Mode::Quoted(quote) if b == quote => {
                    if following == Some(quote) {
                        self.pos += 1;
                    } else {
                        self.mode = Mode::Code;
                    }
                }
                Mode::LineComment if b == b'\n' => self.mode = Mode::Code,
                Mode::BlockComment(depth) => match (b, following) {
                    (b'/', Some(b'*')) => {
                        self.mode = Mode::BlockComment(depth + 1);
                        self.pos += 1;
                    }
                    (b'*', Some(b'/')) => {
                        self.mode = if depth == 1 {
                            Mode::Code
                        } else {
                            Mode::BlockComment(depth - 1)
                        };
                        self.pos += 1;
                    }
                    _ => {}
                },
                Mode::DollarQuoted { start, len } => {
                    let tag = &self.bytes[start..start + len];
                    if self.bytes[at..].starts_with(tag) {
                        self.pos = at + len;
                        self.mode = Mode::Code;
                    }
                }
                Mode::Quoted(_) | Mode::LineComment => {}
            }
        }
        None
    }
}
