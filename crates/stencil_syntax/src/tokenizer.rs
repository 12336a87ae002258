use crate::error::LexerError;
use crate::span::Span;
use crate::token::{Keyword, Punct, TemplateChunk, Token, TokenKind};

pub type LexResult<T> = Result<T, LexerError>;

/// Deepest nesting of templates inside template substitutions.
pub const MAX_TEMPLATE_NESTING: usize = 32;

/// Tokenize a whole script. The returned list always ends with `Eof`.
pub fn tokenize(source: &str) -> LexResult<Vec<Token>> {
    tokenize_at(source, 0)
}

/// Tokenize `source` as if it started at byte `base` of a larger script.
pub fn tokenize_at(source: &str, base: usize) -> LexResult<Vec<Token>> {
    Tokenizer {
        src: source,
        pos: 0,
        base,
        newline_before: false,
        template_depth: 0,
    }
    .run()
}

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
    base: usize,
    newline_before: bool,
    template_depth: usize,
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

fn is_line_terminator(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

impl Tokenizer<'_> {
    fn run(mut self) -> LexResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let start = self.pos;
            let Some(ch) = self.bump() else {
                tokens.push(Token::new(
                    TokenKind::Eof,
                    self.span(start),
                    self.newline_before,
                ));
                return Ok(tokens);
            };

            let kind = self.token(ch, start)?;
            tokens.push(Token::new(kind, self.span(start), self.newline_before));
            self.newline_before = false;
        }
    }

    /// Lex the token starting with `ch`, already consumed at `start`.
    fn token(&mut self, ch: char, start: usize) -> LexResult<TokenKind> {
        match ch {
            '0'..='9' => self.number(start),
            '.' if self.peek().is_some_and(|next| next.is_ascii_digit()) => self.number(start),
            '"' | '\'' => self.string(ch, start),
            '`' => self.template(start),
            c if is_ident_start(c) => Ok(self.ident(start)),
            _ => self.punct(ch, start),
        }
    }

    fn span(&self, start: usize) -> Span {
        Span::new(self.base + start, self.base + self.pos)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) -> LexResult<()> {
        while let Some(ch) = self.peek() {
            if is_line_terminator(ch) {
                self.newline_before = true;
                self.bump();
            } else if ch.is_whitespace() {
                self.bump();
            } else if ch == '/' && self.peek_second() == Some('/') {
                while self.peek().is_some_and(|c| !is_line_terminator(c)) {
                    self.bump();
                }
            } else if ch == '/' && self.peek_second() == Some('*') {
                let start = self.pos;
                self.pos += 2;
                loop {
                    match self.bump() {
                        None => {
                            return Err(LexerError::UnterminatedComment {
                                span: self.span(start),
                            });
                        }
                        Some('*') if self.eat('/') => break,
                        Some(c) if is_line_terminator(c) => self.newline_before = true,
                        Some(_) => {}
                    }
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    fn consume_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    fn number(&mut self, start: usize) -> LexResult<TokenKind> {
        self.consume_digits();
        if self.peek() == Some('.') {
            self.bump();
            self.consume_digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let exponent_follows = match self.peek_second() {
                Some(c) if c.is_ascii_digit() => true,
                Some('+' | '-') => {
                    let mut chars = self.src[self.pos..].chars().skip(2);
                    chars.next().is_some_and(|c| c.is_ascii_digit())
                }
                _ => false,
            };
            if exponent_follows {
                self.bump();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.bump();
                }
                self.consume_digits();
            }
        }

        // `3in` and friends are a single malformed literal, not two tokens.
        let mut malformed = false;
        while self.peek().is_some_and(is_ident_continue) {
            malformed = true;
            self.bump();
        }

        let text = &self.src[start..self.pos];
        match text.parse::<f64>() {
            Ok(value) if !malformed => Ok(TokenKind::Number(value)),
            _ => Err(LexerError::InvalidNumber {
                text: text.to_string(),
                span: self.span(start),
            }),
        }
    }

    fn ident(&mut self, start: usize) -> TokenKind {
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        let text = &self.src[start..self.pos];
        match Keyword::from_ident(text) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Ident(text.to_string()),
        }
    }

    fn string(&mut self, quote: char, start: usize) -> LexResult<TokenKind> {
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(LexerError::UnterminatedString {
                        span: self.span(start),
                    });
                }
                Some(c) if is_line_terminator(c) => {
                    return Err(LexerError::UnterminatedString {
                        span: self.span(start),
                    });
                }
                Some('\\') => {
                    if let Some(ch) = self.escape()? {
                        value.push(ch);
                    }
                }
                Some(c) if c == quote => return Ok(TokenKind::String(value)),
                Some(c) => value.push(c),
            }
        }
    }

    /// Decode the escape after a backslash. Line continuations produce nothing.
    fn escape(&mut self) -> LexResult<Option<char>> {
        let start = self.pos.saturating_sub(1);
        let Some(ch) = self.bump() else {
            return Err(LexerError::InvalidEscape {
                span: self.span(start),
            });
        };
        let decoded = match ch {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' => '\0',
            'u' => return self.unicode_escape(start).map(Some),
            c if is_line_terminator(c) => return Ok(None),
            c => c,
        };
        Ok(Some(decoded))
    }

    fn unicode_escape(&mut self, start: usize) -> LexResult<char> {
        let digits = if self.eat('{') {
            let open = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits = &self.src[open..self.pos];
            if !self.eat('}') {
                return Err(LexerError::InvalidEscape {
                    span: self.span(start),
                });
            }
            digits
        } else {
            let open = self.pos;
            for _ in 0..4 {
                if !self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                    return Err(LexerError::InvalidEscape {
                        span: self.span(start),
                    });
                }
                self.bump();
            }
            &self.src[open..self.pos]
        };

        u32::from_str_radix(digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or(LexerError::InvalidEscape {
                span: self.span(start),
            })
    }

    fn template(&mut self, start: usize) -> LexResult<TokenKind> {
        if self.template_depth >= MAX_TEMPLATE_NESTING {
            return Err(LexerError::TemplateNesting {
                limit: MAX_TEMPLATE_NESTING,
                span: self.span(start),
            });
        }
        self.template_depth += 1;
        let result = self.template_chunks(start);
        self.template_depth -= 1;
        result
    }

    fn template_chunks(&mut self, start: usize) -> LexResult<TokenKind> {
        let mut chunks = Vec::new();
        let mut text = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(LexerError::UnterminatedTemplate {
                        span: self.span(start),
                    });
                }
                Some('`') => break,
                Some('\\') => {
                    if let Some(ch) = self.escape()? {
                        text.push(ch);
                    }
                }
                Some('$') if self.eat('{') => {
                    if !text.is_empty() {
                        chunks.push(TemplateChunk::Text(std::mem::take(&mut text)));
                    }
                    let code_start = self.pos;
                    self.skip_substitution(start)?;
                    // `pos` sits just past the closing brace.
                    let code = &self.src[code_start..self.pos - 1];
                    chunks.push(TemplateChunk::Code {
                        source: code.to_string(),
                        offset: self.base + code_start,
                    });
                }
                Some(c) => text.push(c),
            }
        }
        if !text.is_empty() {
            chunks.push(TemplateChunk::Text(text));
        }
        Ok(TokenKind::Template(chunks))
    }

    /// Advance past the `}` closing a template substitution.
    ///
    /// The code is lexed token by token so braces inside strings, comments and
    /// nested templates do not end the substitution.
    fn skip_substitution(&mut self, template_start: usize) -> LexResult<()> {
        let newline_before = self.newline_before;
        let mut depth = 0usize;
        loop {
            self.skip_trivia()?;
            let start = self.pos;
            match self.bump() {
                None => {
                    return Err(LexerError::UnterminatedTemplate {
                        span: self.span(template_start),
                    });
                }
                Some('{') => depth += 1,
                Some('}') if depth == 0 => break,
                Some('}') => depth -= 1,
                Some(ch) => {
                    self.token(ch, start)?;
                }
            }
        }
        self.newline_before = newline_before;
        Ok(())
    }

    fn punct(&mut self, ch: char, start: usize) -> LexResult<TokenKind> {
        let punct = match ch {
            '(' => Punct::LParen,
            ')' => Punct::RParen,
            '{' => Punct::LBrace,
            '}' => Punct::RBrace,
            ',' => Punct::Comma,
            ';' => Punct::Semicolon,
            '+' => Punct::Plus,
            '-' => Punct::Minus,
            '*' => Punct::Star,
            '/' => Punct::Slash,
            '%' => Punct::Percent,
            '!' if self.eat('=') => {
                if self.eat('=') {
                    Punct::NotEqEq
                } else {
                    Punct::NotEq
                }
            }
            '!' => Punct::Bang,
            '=' if self.eat('=') => {
                if self.eat('=') {
                    Punct::EqEqEq
                } else {
                    Punct::EqEq
                }
            }
            '=' => Punct::Assign,
            '<' if self.eat('=') => Punct::Le,
            '<' => Punct::Lt,
            '>' if self.eat('=') => Punct::Ge,
            '>' => Punct::Gt,
            '&' if self.eat('&') => Punct::AndAnd,
            '|' if self.eat('|') => Punct::OrOr,
            other => {
                return Err(LexerError::UnexpectedChar {
                    ch: other,
                    span: self.span(start),
                });
            }
        };
        Ok(TokenKind::Punct(punct))
    }
}
