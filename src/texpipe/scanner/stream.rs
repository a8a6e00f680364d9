//! Code-point stream over a UTF-8 buffer
//!
//! Tracks the byte offset and the 1-based line number as characters are
//! consumed, which is everything the scanner needs to build source locations.

#[derive(Debug, Clone)]
pub struct CharStream<'a> {
    text: &'a str,
    position: usize,
    line: u32,
}

impl<'a> CharStream<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            position: 0,
            line: 1,
        }
    }

    /// Byte offset of the next unconsumed character
    pub fn index(&self) -> usize {
        self.position
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.text.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.text[self.position..].chars().next()
    }

    /// The character after the next one
    pub fn peek_ahead(&self) -> Option<char> {
        let mut chars = self.text[self.position..].chars();
        chars.next();
        chars.next()
    }

    /// Consume one character
    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Consume `expected` if it is next
    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Consume characters while `pred` holds, returning them as a slice
    pub fn eat_while(&mut self, mut pred: impl FnMut(char) -> bool) -> &'a str {
        let start = self.position;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.bump();
        }
        &self.text[start..self.position]
    }

    pub fn skip_whitespace(&mut self) {
        self.eat_while(char::is_whitespace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_lines_and_offsets() {
        let mut stream = CharStream::new("a\né\nb");
        assert_eq!(stream.bump(), Some('a'));
        assert_eq!(stream.bump(), Some('\n'));
        assert_eq!(stream.line(), 2);
        assert_eq!(stream.bump(), Some('é'));
        assert_eq!(stream.index(), 4);
        stream.bump();
        assert_eq!((stream.line(), stream.peek()), (3, Some('b')));
        stream.bump();
        assert!(stream.is_eof());
        assert_eq!(stream.bump(), None);
    }

    #[test]
    fn peek_ahead_sees_second_char() {
        let stream = CharStream::new("\\%x");
        assert_eq!(stream.peek(), Some('\\'));
        assert_eq!(stream.peek_ahead(), Some('%'));
        assert_eq!(CharStream::new("x").peek_ahead(), None);
    }

    #[test]
    fn eat_while_returns_slice() {
        let mut stream = CharStream::new("abc1 rest");
        assert_eq!(stream.eat_while(char::is_alphanumeric), "abc1");
        stream.skip_whitespace();
        assert_eq!(stream.peek(), Some('r'));
    }
}
