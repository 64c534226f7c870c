//! Lexer for query string syntax
//!
//! Splits a Lucene-style query string into tokens, each tagged with the
//! character offset where it starts.

use crate::error::{Result, SearchError};

/// Characters with a meaning of their own in query strings
pub(crate) const SPECIAL_CHARS: &[char] = &[
    '\\', '+', '-', '!', '(', ')', ':', '^', '[', ']', '"', '{', '}', '~', '*', '?', '|', '&', '/',
];

/// Token types for query string parsing
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A bare word; `prefix` is set for a trailing `*`
    Word { text: String, prefix: bool },
    /// A double-quoted phrase
    Quoted(String),
    /// `^` with its boost value
    Caret(f32),

    And,
    Or,
    Not,
    /// TO keyword for ranges
    To,
    /// Colon separator (field:value)
    Colon,
    /// Standalone `*`
    Star,

    /// `[`, inclusive range start
    LeftBracket,
    /// `]`, inclusive range end
    RightBracket,
    /// `{`, exclusive range start
    LeftBrace,
    /// `}`, exclusive range end
    RightBrace,
    LeftParen,
    RightParen,
    Plus,
    Minus,

    /// End of input
    Eof,
}

/// A token and the character offset it starts at
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Lexer for tokenizing query strings
pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    /// Create a new lexer for the given input string
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Tokenize the whole input; the last token is always `Eof`
    pub fn tokenize(mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Result<Spanned> {
        self.skip_whitespace();
        let start = self.position;
        let token = self.read_token(start)?;
        Ok(Spanned {
            token,
            position: start,
        })
    }

    fn read_token(&mut self, start: usize) -> Result<Token> {
        let Some(ch) = self.current_char() else {
            return Ok(Token::Eof);
        };

        let simple = match ch {
            ':' => Some(Token::Colon),
            '[' => Some(Token::LeftBracket),
            ']' => Some(Token::RightBracket),
            '{' => Some(Token::LeftBrace),
            '}' => Some(Token::RightBrace),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '!' => Some(Token::Not),
            '*' => Some(Token::Star),
            _ => None,
        };
        if let Some(token) = simple {
            self.advance();
            return Ok(token);
        }

        match ch {
            '"' => {
                self.advance();
                self.read_quoted(start)
            }
            '^' => {
                self.advance();
                self.read_boost(start)
            }
            '&' | '|' if self.peek() == Some(ch) => {
                self.advance();
                self.advance();
                Ok(if ch == '&' { Token::And } else { Token::Or })
            }
            _ if Self::is_word_char(ch) || ch == '\\' => self.read_word(start),
            _ => Err(SearchError::syntax(
                start,
                format!("Unexpected character '{}'", ch),
            )),
        }
    }

    fn read_word(&mut self, start: usize) -> Result<Token> {
        let mut text = String::new();
        let mut escaped = false;

        while let Some(ch) = self.current_char() {
            if ch == '\\' {
                let escape_at = self.position;
                self.advance();
                match self.current_char() {
                    Some(next) => {
                        text.push(next);
                        escaped = true;
                        self.advance();
                    }
                    None => {
                        return Err(SearchError::syntax(escape_at, "Dangling escape character"))
                    }
                }
            } else if Self::is_word_char(ch) || (ch == '-' && !text.is_empty()) {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let prefix = self.current_char() == Some('*');
        if prefix {
            self.advance();
        }

        // Keywords are case-insensitive; escaping any character disables them
        if !escaped && !prefix {
            match text.to_uppercase().as_str() {
                "AND" => return Ok(Token::And),
                "OR" => return Ok(Token::Or),
                "NOT" => return Ok(Token::Not),
                "TO" => return Ok(Token::To),
                _ => {}
            }
        }

        if text.is_empty() {
            return Err(SearchError::syntax(start, "Empty term"));
        }
        Ok(Token::Word { text, prefix })
    }

    fn read_quoted(&mut self, start: usize) -> Result<Token> {
        let mut s = String::new();

        while let Some(ch) = self.current_char() {
            self.advance();
            match ch {
                '"' => return Ok(Token::Quoted(s)),
                '\\' => {
                    if let Some(escaped) = self.current_char() {
                        s.push(escaped);
                        self.advance();
                    }
                }
                _ => s.push(ch),
            }
        }

        Err(SearchError::syntax(start, "Unterminated quoted string"))
    }

    fn read_boost(&mut self, start: usize) -> Result<Token> {
        let mut num_str = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() || (ch == '.' && !num_str.contains('.')) {
                num_str.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match num_str.parse::<f32>() {
            Ok(boost) if boost.is_finite() => Ok(Token::Caret(boost)),
            _ => Err(SearchError::syntax(start, "Expected a number after '^'")),
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().map_or(false, char::is_whitespace) {
            self.advance();
        }
    }

    /// Characters allowed in a bare word; `-` also continues a started word
    fn is_word_char(ch: char) -> bool {
        !ch.is_whitespace() && !SPECIAL_CHARS.contains(&ch)
    }
}
