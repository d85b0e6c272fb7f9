//! A minimal C tokenizer.
//!
//! Produces a lazy sequence of byte subslices of the input: identifier/number
//! runs, single-byte punctuation, string literals, line and block comments,
//! and preprocessor directive heads. It never rejects input; malformed
//! constructs (an unterminated string or block comment) consume to the end of
//! the buffer.

use if_chain::if_chain;

/// Single-byte tokens. `*` is included so that pointer declarations like
/// `char **argv` tokenize as `char`, `*`, `*`, `argv`.
const PUNCTUATION: &[u8] = b"()[]{},;*";

/// Directive words recognized by both the include scanner and the runner
/// generator. Anything else after a `#` is an unknown directive.
pub const DIRECTIVE_WORDS: &[&[u8]] = &[
    b"include",
    b"define",
    b"undef",
    b"if",
    b"elif",
    b"ifdef",
    b"ifndef",
    b"else",
    b"endif",
];

/// Extracts the alphabetic word from a directive-head token (e.g. `# include`
/// -> `include`). Returns `None` if the token is not a directive head or the
/// head carries no word.
#[must_use]
pub fn directive_word(token: &[u8]) -> Option<&[u8]> {
    if_chain! {
        if let Some(rest) = token.strip_prefix(b"#");
        let word = trim_leading_whitespace(rest);
        if !word.is_empty();
        then {
            Some(word)
        } else {
            None
        }
    }
}

fn trim_leading_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

pub struct Tokenizer<'buf> {
    buf: &'buf [u8],
    pos: usize,
}

impl<'buf> Tokenizer<'buf> {
    #[must_use]
    pub fn new(buf: &'buf [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<&'buf [u8]> {
        self.skip_whitespace();

        let start = self.pos;
        let byte = *self.buf.get(self.pos)?;

        if byte == b'/' && self.peek(1) == Some(b'/') {
            self.consume_line_comment();
        } else if byte == b'/' && self.peek(1) == Some(b'*') {
            self.consume_block_comment();
        } else if PUNCTUATION.contains(&byte) {
            self.pos += 1;
        } else if byte == b'"' {
            self.consume_string_literal();
        } else if byte == b'#' {
            self.consume_directive_head();
        } else {
            self.consume_run();
        }

        Some(&self.buf[start..self.pos])
    }

    /// Consumes and returns the remainder of the current line, up to but not
    /// including the next newline. The cursor is left past the newline.
    pub fn rest_of_line(&mut self) -> &'buf [u8] {
        let start = self.pos;
        while self.pos < self.buf.len() && self.buf[self.pos] != b'\n' {
            self.pos += 1;
        }
        let rest = &self.buf[start..self.pos];
        if self.pos < self.buf.len() {
            self.pos += 1;
        }
        rest
    }

    /// Like [`rest_of_line`], but a `\` immediately before a newline continues
    /// the span onto the following line (the C line-continuation rule).
    ///
    /// [`rest_of_line`]: Tokenizer::rest_of_line
    pub fn rest_of_directive(&mut self) -> &'buf [u8] {
        let start = self.pos;
        loop {
            while self.pos < self.buf.len() && self.buf[self.pos] != b'\n' {
                self.pos += 1;
            }
            if self.pos >= self.buf.len() {
                return &self.buf[start..self.pos];
            }
            if self.pos > start && self.buf[self.pos - 1] == b'\\' {
                self.pos += 1;
                continue;
            }
            let rest = &self.buf[start..self.pos];
            self.pos += 1;
            return rest;
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.buf.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while self
            .buf
            .get(self.pos)
            .is_some_and(u8::is_ascii_whitespace)
        {
            self.pos += 1;
        }
    }

    fn consume_line_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.buf.len() && self.buf[self.pos] != b'\n' {
            self.pos += 1;
        }
    }

    fn consume_block_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.buf.len() {
            if self.buf[self.pos] == b'*' && self.peek(1) == Some(b'/') {
                self.pos += 2;
                return;
            }
            self.pos += 1;
        }
    }

    fn consume_string_literal(&mut self) {
        self.pos += 1;
        while self.pos < self.buf.len() {
            match self.buf[self.pos] {
                b'\\' => {
                    // The escape consumes the next byte regardless of value.
                    self.pos += 2;
                }
                b'"' => {
                    self.pos += 1;
                    return;
                }
                _ => {
                    self.pos += 1;
                }
            }
        }
        self.pos = self.buf.len();
    }

    // A directive head is `#`, optional whitespace, and the immediately
    // adjacent alphabetic word, emitted as one token (`# include`,
    // `#define`). A `#` with no adjacent word is a one-byte token.
    fn consume_directive_head(&mut self) {
        self.pos += 1;
        let after_pound = self.pos;
        while self
            .buf
            .get(self.pos)
            .is_some_and(u8::is_ascii_whitespace)
        {
            self.pos += 1;
        }
        if self.buf.get(self.pos).is_some_and(u8::is_ascii_alphabetic) {
            while self
                .buf
                .get(self.pos)
                .is_some_and(u8::is_ascii_alphabetic)
            {
                self.pos += 1;
            }
        } else {
            self.pos = after_pound;
        }
    }

    fn consume_run(&mut self) {
        while self.pos < self.buf.len() {
            let byte = self.buf[self.pos];
            if byte.is_ascii_whitespace() || self.starts_token(byte) {
                return;
            }
            self.pos += 1;
        }
    }

    fn starts_token(&self, byte: u8) -> bool {
        PUNCTUATION.contains(&byte)
            || byte == b'"'
            || byte == b'#'
            || (byte == b'/' && matches!(self.peek(1), Some(b'/') | Some(b'*')))
    }
}

impl<'buf> Iterator for Tokenizer<'buf> {
    type Item = &'buf [u8];

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

#[cfg(test)]
mod tests {
    use super::{DIRECTIVE_WORDS, Tokenizer, directive_word};

    fn tokens(input: &str) -> Vec<&str> {
        Tokenizer::new(input.as_bytes())
            .map(|token| std::str::from_utf8(token).unwrap())
            .collect()
    }

    #[test]
    fn hello_world() {
        assert_eq!(
            tokens(r#"int main(int argc, char **argv) { printf("Hello World!\n"); return 0; }"#),
            [
                "int", "main", "(", "int", "argc", ",", "char", "*", "*", "argv", ")", "{",
                "printf", "(", r#""Hello World!\n""#, ")", ";", "return", "0", ";", "}",
            ]
        );
    }

    #[test]
    fn adjacent_string_literals() {
        assert_eq!(
            tokens(r#""test1\n""test2\n\\""test3\n""#),
            [r#""test1\n""#, r#""test2\n\\""#, r#""test3\n""#]
        );
    }

    #[test]
    fn line_comment() {
        assert_eq!(tokens("int//comment\nfloat"), ["int", "//comment", "float"]);
    }

    #[test]
    fn block_comment() {
        assert_eq!(tokens("int/*a\nb*/float"), ["int", "/*a\nb*/", "float"]);
    }

    #[test]
    fn directive_head_with_whitespace() {
        assert_eq!(tokens("# include <x.h>"), ["# include", "<x.h>"]);
    }

    #[test]
    fn directive_head_without_whitespace() {
        assert_eq!(tokens("#define FOO 1"), ["#define", "FOO", "1"]);
    }

    #[test]
    fn lone_pound() {
        assert_eq!(tokens("# 1"), ["#", "1"]);
    }

    #[test]
    fn unterminated_string_consumes_to_end() {
        assert_eq!(tokens(r#"x "abc"#), ["x", r#""abc"#]);
    }

    #[test]
    fn unterminated_block_comment_consumes_to_end() {
        assert_eq!(tokens("x /* abc"), ["x", "/* abc"]);
    }

    #[test]
    fn concatenation_reproduces_input_modulo_whitespace() {
        let input = "int main ( void ) { return 0 ; }";
        let concatenated = Tokenizer::new(input.as_bytes()).collect::<Vec<_>>().concat();
        let expected = input
            .bytes()
            .filter(|byte| !byte.is_ascii_whitespace())
            .collect::<Vec<_>>();
        assert_eq!(concatenated, expected);
    }

    #[test]
    fn rest_of_line_stops_at_newline() {
        let mut tokenizer = Tokenizer::new(b"#include \"a.h\"\nint x;");
        assert_eq!(tokenizer.next_token(), Some(b"#include".as_slice()));
        assert_eq!(tokenizer.rest_of_line(), b" \"a.h\"");
        assert_eq!(tokenizer.next_token(), Some(b"int".as_slice()));
    }

    #[test]
    fn rest_of_directive_honors_line_continuations() {
        let mut tokenizer = Tokenizer::new(b"#define FOO \\\n    1\nint x;");
        assert_eq!(tokenizer.next_token(), Some(b"#define".as_slice()));
        assert_eq!(tokenizer.rest_of_directive(), b" FOO \\\n    1");
        assert_eq!(tokenizer.next_token(), Some(b"int".as_slice()));
    }

    #[test]
    fn directive_words() {
        assert_eq!(directive_word(b"# include"), Some(b"include".as_slice()));
        assert_eq!(directive_word(b"#define"), Some(b"define".as_slice()));
        assert_eq!(directive_word(b"#"), None);
        assert_eq!(directive_word(b"include"), None);
        assert!(DIRECTIVE_WORDS.contains(&directive_word(b"#ifdef").unwrap()));
    }
}
