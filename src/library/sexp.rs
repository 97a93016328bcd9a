//! Minimal S-expression reader for KiCad library files.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SexpError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected `)` at offset {0}")]
    UnbalancedClose(usize),
    #[error("trailing data after the root expression at offset {0}")]
    TrailingData(usize),
    #[error("lists nested deeper than {MAX_DEPTH} levels at offset {0}")]
    TooDeep(usize),
}

/// Deepest list nesting accepted; real KiCad files stay well below it.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

impl Sexp {
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Sexp::Atom(s) => Some(s),
            Sexp::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sexp]> {
        match self {
            Sexp::List(items) => Some(items),
            Sexp::Atom(_) => None,
        }
    }

    /// Head atom of a list, e.g. `footprint` for `(footprint "R0805" ...)`.
    pub fn head(&self) -> Option<&str> {
        self.as_list()?.first()?.as_atom()
    }

    /// Atom at `index` of a list.
    pub fn atom_at(&self, index: usize) -> Option<&str> {
        self.as_list()?.get(index)?.as_atom()
    }

    /// Direct children whose head atom is `key`.
    pub fn children<'a, 'k>(&'a self, key: &'k str) -> impl Iterator<Item = &'a Sexp> {
        self.as_list()
            .unwrap_or(&[])
            .iter()
            .filter(move |item| item.head() == Some(key))
    }

    /// First direct child whose head atom is `key`.
    pub fn child<'a>(&'a self, key: &str) -> Option<&'a Sexp> {
        self.children(key).next()
    }
}

/// Parse exactly one root expression from `input`.
pub fn parse(input: &str) -> Result<Sexp, SexpError> {
    let mut reader = Reader {
        input: input.as_bytes(),
        src: input,
        pos: 0,
        depth: 0,
    };
    let root = reader.parse_expr()?;
    reader.skip_whitespace();
    if reader.pos < reader.input.len() {
        return Err(SexpError::TrailingData(reader.pos));
    }
    Ok(root)
}

struct Reader<'a> {
    input: &'a [u8],
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl Reader<'_> {
    fn parse_expr(&mut self) -> Result<Sexp, SexpError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(SexpError::UnexpectedEof),
            Some(b'(') => self.parse_list(),
            Some(b')') => Err(SexpError::UnbalancedClose(self.pos)),
            Some(b'"') => self.parse_string(),
            Some(_) => Ok(self.parse_symbol()),
        }
    }

    fn parse_list(&mut self) -> Result<Sexp, SexpError> {
        if self.depth == MAX_DEPTH {
            return Err(SexpError::TooDeep(self.pos));
        }
        self.depth += 1;
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(SexpError::UnexpectedEof),
                Some(b')') => {
                    self.pos += 1;
                    self.depth -= 1;
                    return Ok(Sexp::List(items));
                }
                Some(_) => items.push(self.parse_expr()?),
            }
        }
    }

    fn parse_string(&mut self) -> Result<Sexp, SexpError> {
        self.pos += 1;
        let mut out = String::new();
        let mut start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b'"' => {
                    out.push_str(&self.src[start..self.pos]);
                    self.pos += 1;
                    return Ok(Sexp::Atom(out));
                }
                b'\\' => {
                    out.push_str(&self.src[start..self.pos]);
                    let escaped = self
                        .input
                        .get(self.pos + 1)
                        .copied()
                        .ok_or(SexpError::UnexpectedEof)?;
                    let unescaped = match escaped {
                        b'n' => Some('\n'),
                        b't' => Some('\t'),
                        b'r' => Some('\r'),
                        b'\\' => Some('\\'),
                        b'"' => Some('"'),
                        _ => None,
                    };
                    match unescaped {
                        Some(c) => {
                            out.push(c);
                            self.pos += 2;
                        }
                        // Unknown escape: keep the backslash, reread what follows as text.
                        None => {
                            out.push('\\');
                            self.pos += 1;
                        }
                    }
                    start = self.pos;
                }
                _ => self.pos += 1,
            }
        }
        Err(SexpError::UnexpectedEof)
    }

    fn parse_symbol(&mut self) -> Sexp {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || b == b'(' || b == b')' {
                break;
            }
            self.pos += 1;
        }
        Sexp::Atom(self.src[start..self.pos].to_string())
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }
}
