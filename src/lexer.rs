#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Illegal,
    Identifier,
    Number,
    String,
    Decorator,
    // Keywords
    Let,
    Func,
    True,
    False,
    If,
    Else,
    Return,
    While,
    In,
    Typeof,
    Null,
    Throw,
    Delete,
    Use,
    // Operators
    Assign,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Bang,
    Equal,
    NotEqual,
    LessThan,
    LessThanEq,
    GreaterThan,
    GreaterThanEq,
    And,
    Or,
    // Punctuation
    Comma,
    Semicolon,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
}

pub fn lookup_keyword(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "let" => TokenKind::Let,
        "func" => TokenKind::Func,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "return" => TokenKind::Return,
        "while" => TokenKind::While,
        "in" => TokenKind::In,
        "typeof" => TokenKind::Typeof,
        "null" => TokenKind::Null,
        "throw" => TokenKind::Throw,
        "delete" => TokenKind::Delete,
        "use" => TokenKind::Use,
        _ => return None,
    };
    Some(kind)
}

/// Single forward scan over a source text.
///
/// Tokens are produced one at a time by [`Lexer::next_token`]; once the input
/// is exhausted every further call yields an end-of-file token. A scan cannot
/// be rewound, so re-tokenizing the same text needs a fresh lexer.
pub struct Lexer<'a> {
    chars: std::str::Chars<'a>,
    peeked: Option<char>,
    line: usize,
    column: usize,
    pending: Option<Token>,
    file_name: String,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_file(input, "<unknown>")
    }

    pub fn with_file(input: &'a str, file_name: impl Into<String>) -> Self {
        Self {
            chars: input.chars(),
            peeked: None,
            line: 1,
            column: 1,
            pending: None,
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Drains the scan into a vector, end-of-file token included.
    pub fn lex(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    pub fn next_token(&mut self) -> Token {
        if let Some(token) = self.pending.take() {
            return token;
        }

        loop {
            self.consume_whitespace();

            let line = self.line;
            let column = self.column;
            let ch = match self.advance_char() {
                Some(ch) => ch,
                None => return Token::new(TokenKind::Eof, "", line, column),
            };

            let kind = match ch {
                c if is_identifier_start(c) => return self.read_identifier(c, line, column),
                '0'..='9' => return self.read_number(ch, line, column),
                '"' | '\'' => return self.read_string(ch, line, column),
                '@' => return self.read_decorator(line, column),
                '/' => {
                    if matches!(self.peek_char(), Some('/')) {
                        self.consume_comment();
                        continue;
                    }
                    TokenKind::Slash
                }
                '=' => self.pick('=', TokenKind::Equal, TokenKind::Assign),
                '!' => self.pick('=', TokenKind::NotEqual, TokenKind::Bang),
                '<' => self.pick('=', TokenKind::LessThanEq, TokenKind::LessThan),
                '>' => self.pick('=', TokenKind::GreaterThanEq, TokenKind::GreaterThan),
                '&' => self.pick('&', TokenKind::And, TokenKind::Illegal),
                '|' => self.pick('|', TokenKind::Or, TokenKind::Illegal),
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Asterisk,
                '%' => TokenKind::Percent,
                ',' => TokenKind::Comma,
                ';' => TokenKind::Semicolon,
                ':' => TokenKind::Colon,
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                _ => TokenKind::Illegal,
            };

            let literal = self.literal_since(ch, kind);
            return Token::new(kind, literal, line, column);
        }
    }

    /// Consumes `second` when it follows, choosing between a two- and a one-character token.
    fn pick(&mut self, second: char, matched: TokenKind, single: TokenKind) -> TokenKind {
        if self.peek_char() == Some(second) {
            self.advance_char();
            matched
        } else {
            single
        }
    }

    fn literal_since(&self, first: char, kind: TokenKind) -> String {
        match kind {
            TokenKind::Equal => "==".to_string(),
            TokenKind::NotEqual => "!=".to_string(),
            TokenKind::LessThanEq => "<=".to_string(),
            TokenKind::GreaterThanEq => ">=".to_string(),
            TokenKind::And => "&&".to_string(),
            TokenKind::Or => "||".to_string(),
            _ => first.to_string(),
        }
    }

    fn consume_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn consume_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                break;
            }
            self.advance_char();
        }
    }

    fn read_identifier(&mut self, first: char, line: usize, column: usize) -> Token {
        let mut ident = String::from(first);
        while let Some(ch) = self.peek_char() {
            if is_identifier_continue(ch) {
                ident.push(ch);
                self.advance_char();
            } else {
                break;
            }
        }

        let kind = lookup_keyword(&ident).unwrap_or(TokenKind::Identifier);
        Token::new(kind, ident, line, column)
    }

    fn read_number(&mut self, first: char, line: usize, column: usize) -> Token {
        let mut number = String::from(first);
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance_char();
            } else {
                break;
            }
        }
        Token::new(TokenKind::Number, number, line, column)
    }

    fn read_string(&mut self, quote: char, line: usize, column: usize) -> Token {
        let mut content = String::new();
        let mut raw = String::from(quote);

        while let Some(ch) = self.advance_char() {
            raw.push(ch);
            match ch {
                c if c == quote => return Token::new(TokenKind::String, content, line, column),
                '\\' => {
                    let Some(escaped) = self.advance_char() else {
                        break;
                    };
                    raw.push(escaped);
                    content.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                _ => content.push(ch),
            }
        }

        // Unterminated: report at the opening quote and keep the raw text.
        Token::new(TokenKind::Illegal, raw, line, column)
    }

    /// `@name` becomes a decorator marker followed by the name as an identifier.
    fn read_decorator(&mut self, line: usize, column: usize) -> Token {
        match self.peek_char() {
            Some(ch) if is_identifier_start(ch) => {
                let name_line = self.line;
                let name_column = self.column;
                self.advance_char();
                let mut name = self.read_identifier(ch, name_line, name_column);
                // Keywords are plain names after '@'.
                name.kind = TokenKind::Identifier;
                self.pending = Some(name);
                Token::new(TokenKind::Decorator, "@", line, column)
            }
            _ => Token::new(TokenKind::Illegal, "@", line, column),
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn advance_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.peeked = None;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            literal: literal.into(),
            line,
            column,
        }
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_identifier_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).lex().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_let_statement() {
        assert_eq!(
            kinds("let five = 5;"),
            vec![
                TokenKind::Let,
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_two_character_operators() {
        assert_eq!(
            kinds("== != <= >= && || < > ! ="),
            vec![
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::LessThanEq,
                TokenKind::GreaterThanEq,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::LessThan,
                TokenKind::GreaterThan,
                TokenKind::Bang,
                TokenKind::Assign,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn records_line_and_column() {
        let tokens = Lexer::new("let a = 1;\n  a + 2").lex();
        let plus = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Plus)
            .expect("plus token");
        assert_eq!((plus.line, plus.column), (2, 5));
        let first = &tokens[0];
        assert_eq!((first.line, first.column), (1, 1));
    }

    #[test]
    fn skips_comments() {
        assert_eq!(
            kinds("1 // the rest is ignored\n2"),
            vec![TokenKind::Number, TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn strings_accept_both_quotes_and_escapes() {
        let tokens = Lexer::new(r#"'it\'s' "a\n\"b\"""#).lex();
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].literal, "it's");
        assert_eq!(tokens[1].kind, TokenKind::String);
        assert_eq!(tokens[1].literal, "a\n\"b\"");
    }

    #[test]
    fn unterminated_string_is_illegal_at_opening_quote() {
        let tokens = Lexer::new("let s = \"abc").lex();
        let illegal = &tokens[3];
        assert_eq!(illegal.kind, TokenKind::Illegal);
        assert_eq!((illegal.line, illegal.column), (1, 9));
        assert!(illegal.literal.starts_with('"'));
        assert_eq!(tokens[4].kind, TokenKind::Eof);
    }

    #[test]
    fn unknown_characters_do_not_halt_the_scan() {
        assert_eq!(
            kinds("1 # 2"),
            vec![
                TokenKind::Number,
                TokenKind::Illegal,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn decorator_splits_into_marker_and_name() {
        let tokens = Lexer::new("@memo func").lex();
        assert_eq!(tokens[0].kind, TokenKind::Decorator);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].literal, "memo");
        assert_eq!(tokens[1].column, 2);
        assert_eq!(tokens[2].kind, TokenKind::Func);
    }

    #[test]
    fn keeps_returning_eof() {
        let mut lexer = Lexer::new("x");
        assert_eq!(lexer.next_token().kind, TokenKind::Identifier);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn classifies_keywords() {
        assert_eq!(
            kinds("typeof in throw delete use while"),
            vec![
                TokenKind::Typeof,
                TokenKind::In,
                TokenKind::Throw,
                TokenKind::Delete,
                TokenKind::Use,
                TokenKind::While,
                TokenKind::Eof,
            ]
        );
    }
}
