use std::rc::Rc;

use crate::{
    ast::{
        Block, Expression, ExpressionKind, FunctionLiteral, InfixOperator, Position,
        PrefixOperator, Program, Statement, StatementKind,
    },
    error::ParseError,
    lexer::{Lexer, Token, TokenKind},
    stack::ensure_sufficient_stack,
};

type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Assign,
    Logical,
    Equality,
    Comparison,
    Sum,
    Product,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::Lowest => Precedence::Assign,
            Precedence::Assign => Precedence::Logical,
            Precedence::Logical => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Sum,
            Precedence::Sum | Precedence::Product => Precedence::Product,
        }
    }
}

/// Recursive-descent parser with precedence climbing for binary operators.
///
/// A malformed statement is recorded in [`Parser::errors`] and skipped; the
/// parser then resynchronises at the next statement boundary and carries on,
/// so one call to [`Parser::parse_program`] reports every syntax error.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    peek: Token,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    pub fn new(mut lexer: Lexer<'a>) -> Self {
        let current = lexer.next_token();
        let peek = lexer.next_token();
        Self {
            lexer,
            current,
            peek,
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ParseError> {
        self.errors
    }

    pub fn parse_program(&mut self) -> Program {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            if self.current.kind == TokenKind::Semicolon {
                self.advance();
                continue;
            }
            let start = self.position();
            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize(start);
                }
            }
        }

        Program {
            statements,
            file: self.lexer.file_name().to_string(),
        }
    }

    /// Skips to the next statement boundary after an error: past a `;`, or up
    /// to a keyword that starts a statement. Always consumes at least one
    /// token when the failing statement consumed none.
    fn synchronize(&mut self, start: Position) {
        if self.position() == start {
            self.advance();
        }
        while !self.is_at_end() {
            match self.current.kind {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::Let | TokenKind::Return | TokenKind::Use | TokenKind::Decorator => {
                    return
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        ensure_sufficient_stack(|| match self.current.kind {
            TokenKind::Let => self.parse_let_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Use => self.parse_use_statement(),
            TokenKind::LBrace => {
                let position = self.position();
                let block = self.parse_block()?;
                Ok(Statement::new(StatementKind::Block(block), position))
            }
            TokenKind::Func if self.peek.kind == TokenKind::Identifier => {
                self.parse_function_declaration()
            }
            _ => {
                let position = self.position();
                let expr = self.parse_expression()?;
                self.skip_semicolon();
                Ok(Statement::new(StatementKind::Expression(expr), position))
            }
        })
    }

    fn parse_let_statement(&mut self) -> ParseResult<Statement> {
        let position = self.position();
        self.advance(); // consume 'let'
        let name = self.consume_identifier("Expected a name after 'let'")?;
        self.expect(TokenKind::Assign, "Expected '=' after the name in 'let'")?;
        let mut value = self.parse_expression()?;
        if let ExpressionKind::Function(literal) = &mut value.kind {
            if literal.name.is_none() {
                literal.name = Some(name.clone());
            }
        }
        self.skip_semicolon();
        Ok(Statement::new(StatementKind::Let { name, value }, position))
    }

    fn parse_return_statement(&mut self) -> ParseResult<Statement> {
        let position = self.position();
        self.advance(); // consume 'return'
        let value = if matches!(
            self.current.kind,
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.skip_semicolon();
        Ok(Statement::new(StatementKind::Return(value), position))
    }

    fn parse_use_statement(&mut self) -> ParseResult<Statement> {
        let position = self.position();
        self.advance(); // consume 'use'
        let module = match self.current.kind {
            TokenKind::String | TokenKind::Identifier => self.advance().literal,
            _ => return Err(self.error_at_current("Expected a module name after 'use'")),
        };
        self.skip_semicolon();
        Ok(Statement::new(StatementKind::Use { module }, position))
    }

    /// `func name(params) { ... }` is sugar for `let name = func(params) { ... }`.
    fn parse_function_declaration(&mut self) -> ParseResult<Statement> {
        let position = self.position();
        let literal = self.parse_function_literal()?;
        let name = literal.name.clone().unwrap_or_default();
        let value = Expression::new(ExpressionKind::Function(literal), position);
        self.skip_semicolon();
        Ok(Statement::new(StatementKind::Let { name, value }, position))
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        let open = self.expect(TokenKind::LBrace, "Expected '{'")?;
        let mut statements = Vec::new();

        while self.current.kind != TokenKind::RBrace {
            match self.current.kind {
                TokenKind::Eof => {
                    return Err(ParseError::new(
                        "Expected '}' to close the block",
                        open.line,
                        open.column,
                    ))
                }
                TokenKind::Semicolon => {
                    self.advance();
                }
                _ => statements.push(self.parse_statement()?),
            }
        }
        self.advance(); // consume '}'

        Ok(Block { statements })
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_expression(Precedence::Assign)
    }

    fn parse_binary_expression(&mut self, min_precedence: Precedence) -> ParseResult<Expression> {
        ensure_sufficient_stack(|| {
            let mut left = self.parse_unary_expression()?;

            loop {
                let precedence = match self.current_precedence() {
                    Some(precedence) => precedence,
                    None => break,
                };

                if precedence < min_precedence {
                    break;
                }

                if self.current.kind == TokenKind::Assign {
                    let operator = self.advance();
                    let name = match left.kind {
                        ExpressionKind::Identifier(ref name) => name.clone(),
                        _ => {
                            return Err(ParseError::new(
                                "Invalid assignment target",
                                operator.line,
                                operator.column,
                            ))
                        }
                    };
                    // Right-associative: the right side may itself be an assignment.
                    let value = self.parse_binary_expression(Precedence::Assign)?;
                    left = Expression::new(
                        ExpressionKind::Assign {
                            name,
                            value: Box::new(value),
                        },
                        left.position,
                    );
                    continue;
                }

                let position = self.position();
                let op = self.parse_operator()?;
                let right = self.parse_binary_expression(precedence.next())?;
                left = Expression::new(
                    ExpressionKind::Infix {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    position,
                );
            }

            Ok(left)
        })
    }

    fn parse_unary_expression(&mut self) -> ParseResult<Expression> {
        let position = self.position();
        let op = match self.current.kind {
            TokenKind::Minus => PrefixOperator::Negate,
            TokenKind::Bang => PrefixOperator::Not,
            TokenKind::Typeof => PrefixOperator::Typeof,
            TokenKind::Throw => PrefixOperator::Throw,
            TokenKind::Delete => PrefixOperator::Delete,
            _ => return self.parse_call_expression(),
        };
        self.advance();

        let operand = match op {
            PrefixOperator::Throw => self.parse_expression()?,
            PrefixOperator::Delete => {
                let target = self.position();
                let name = self.consume_identifier("Expected a name after 'delete'")?;
                Expression::new(ExpressionKind::Identifier(name), target)
            }
            _ => ensure_sufficient_stack(|| self.parse_unary_expression())?,
        };

        Ok(Expression::new(
            ExpressionKind::Prefix {
                op,
                operand: Box::new(operand),
            },
            position,
        ))
    }

    fn parse_call_expression(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary_expression()?;

        loop {
            match self.current.kind {
                TokenKind::LParen => {
                    let position = self.position();
                    self.advance();
                    let args = self.parse_expression_list(TokenKind::RParen)?;
                    self.expect(TokenKind::RParen, "Expected ')' after arguments")?;
                    expr = Expression::new(
                        ExpressionKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        position,
                    );
                }
                TokenKind::LBracket => {
                    let position = self.position();
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBracket, "Expected ']' after index")?;
                    expr = Expression::new(
                        ExpressionKind::Index {
                            collection: Box::new(expr),
                            index: Box::new(index),
                        },
                        position,
                    );
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary_expression(&mut self) -> ParseResult<Expression> {
        let position = self.position();
        let kind = match self.current.kind {
            TokenKind::Number => {
                let token = self.advance();
                let value = token.literal.parse::<f64>().map_err(|err| {
                    ParseError::new(
                        format!("Invalid number literal '{}': {}", token.literal, err),
                        token.line,
                        token.column,
                    )
                })?;
                ExpressionKind::Number(value)
            }
            TokenKind::String => ExpressionKind::String(self.advance().literal),
            TokenKind::True => {
                self.advance();
                ExpressionKind::Boolean(true)
            }
            TokenKind::False => {
                self.advance();
                ExpressionKind::Boolean(false)
            }
            TokenKind::Null => {
                self.advance();
                ExpressionKind::Null
            }
            TokenKind::Identifier => ExpressionKind::Identifier(self.advance().literal),
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "Expected ')' after expression")?;
                return Ok(expr);
            }
            TokenKind::LBracket => {
                self.advance();
                let elements = self.parse_expression_list(TokenKind::RBracket)?;
                self.expect(TokenKind::RBracket, "Expected ']' after array elements")?;
                ExpressionKind::Array(elements)
            }
            TokenKind::LBrace => self.parse_hash_literal()?,
            TokenKind::If => self.parse_if_expression()?,
            TokenKind::While => self.parse_while_expression()?,
            TokenKind::Func => ExpressionKind::Function(self.parse_function_literal()?),
            TokenKind::Decorator => self.parse_decorator()?,
            TokenKind::Illegal => {
                let message = if self.current.literal.starts_with(['"', '\'']) {
                    "Unterminated string literal".to_string()
                } else {
                    format!("Illegal character '{}'", self.current.literal)
                };
                return Err(self.error_at_current(message));
            }
            TokenKind::Eof => return Err(self.error_at_current("Unexpected end of input")),
            _ => {
                let message = format!("Unexpected token '{}'", self.current.literal);
                return Err(self.error_at_current(message));
            }
        };

        Ok(Expression::new(kind, position))
    }

    fn parse_hash_literal(&mut self) -> ParseResult<ExpressionKind> {
        self.advance(); // consume '{'
        let mut pairs = Vec::new();

        while self.current.kind != TokenKind::RBrace {
            // A bare name before ':' is a string key.
            let key = if self.current.kind == TokenKind::Identifier
                && self.peek.kind == TokenKind::Colon
            {
                let position = self.position();
                Expression::new(ExpressionKind::String(self.advance().literal), position)
            } else {
                self.parse_expression()?
            };
            self.expect(TokenKind::Colon, "Expected ':' after hash key")?;
            let value = self.parse_expression()?;
            pairs.push((key, value));

            if self.current.kind == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "Expected '}' after hash entries")?;

        Ok(ExpressionKind::Hash(pairs))
    }

    fn parse_if_expression(&mut self) -> ParseResult<ExpressionKind> {
        self.advance(); // consume 'if'
        let condition = self.parse_condition("if")?;
        let consequence = self.parse_block()?;

        let alternative = if self.current.kind == TokenKind::Else {
            self.advance();
            if self.current.kind == TokenKind::If {
                let position = self.position();
                let nested = Expression::new(self.parse_if_expression()?, position);
                Some(Block {
                    statements: vec![Statement::new(StatementKind::Expression(nested), position)],
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Ok(ExpressionKind::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn parse_while_expression(&mut self) -> ParseResult<ExpressionKind> {
        self.advance(); // consume 'while'
        let condition = self.parse_condition("while")?;
        let body = self.parse_block()?;
        Ok(ExpressionKind::While {
            condition: Box::new(condition),
            body,
        })
    }

    fn parse_condition(&mut self, keyword: &str) -> ParseResult<Expression> {
        self.expect(
            TokenKind::LParen,
            &format!("Expected '(' after '{}'", keyword),
        )?;
        let condition = self.parse_expression()?;
        self.expect(
            TokenKind::RParen,
            &format!("Expected ')' after the '{}' condition", keyword),
        )?;
        Ok(condition)
    }

    fn parse_function_literal(&mut self) -> ParseResult<FunctionLiteral> {
        self.advance(); // consume 'func'
        let name = if self.current.kind == TokenKind::Identifier {
            Some(self.advance().literal)
        } else {
            None
        };

        self.expect(TokenKind::LParen, "Expected '(' before parameters")?;
        let params = self.parse_parameter_list()?;
        self.expect(TokenKind::RParen, "Expected ')' after parameters")?;
        let body = Rc::new(self.parse_block()?);

        Ok(FunctionLiteral { name, params, body })
    }

    fn parse_parameter_list(&mut self) -> ParseResult<Vec<String>> {
        let mut params: Vec<String> = Vec::new();
        if self.current.kind == TokenKind::RParen {
            return Ok(params);
        }

        loop {
            let token = self.current.clone();
            let name = self.consume_identifier("Expected parameter name")?;
            if params.contains(&name) {
                return Err(ParseError::new(
                    format!("Duplicate parameter '{}'", name),
                    token.line,
                    token.column,
                ));
            }
            params.push(name);

            if self.current.kind == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        Ok(params)
    }

    /// `@name` or `@name(args)` followed by the declaration it wraps.
    fn parse_decorator(&mut self) -> ParseResult<ExpressionKind> {
        self.advance(); // consume '@'
        let name_position = self.position();
        let name = self.consume_identifier("Expected a decorator name after '@'")?;
        let mut decorator = Expression::new(ExpressionKind::Identifier(name), name_position);

        if self.current.kind == TokenKind::LParen {
            let position = self.position();
            self.advance();
            let args = self.parse_expression_list(TokenKind::RParen)?;
            self.expect(TokenKind::RParen, "Expected ')' after decorator arguments")?;
            decorator = Expression::new(
                ExpressionKind::Call {
                    callee: Box::new(decorator),
                    args,
                },
                position,
            );
        }

        let declaration = match self.current.kind {
            TokenKind::Let => self.parse_let_statement()?,
            TokenKind::Func if self.peek.kind == TokenKind::Identifier => {
                self.parse_function_declaration()?
            }
            TokenKind::Decorator => {
                let position = self.position();
                let inner = Expression::new(self.parse_decorator()?, position);
                Statement::new(StatementKind::Expression(inner), position)
            }
            _ => {
                return Err(self.error_at_current(
                    "A decorator must be followed by a 'func' or 'let' declaration",
                ))
            }
        };

        Ok(ExpressionKind::Decorator {
            decorator: Box::new(decorator),
            declaration: Box::new(declaration),
        })
    }

    fn parse_expression_list(&mut self, end: TokenKind) -> ParseResult<Vec<Expression>> {
        let mut items = Vec::new();
        while self.current.kind != end {
            items.push(self.parse_expression()?);
            if self.current.kind == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        Ok(items)
    }

    fn parse_operator(&mut self) -> ParseResult<InfixOperator> {
        let op = match self.current.kind {
            TokenKind::Plus => InfixOperator::Add,
            TokenKind::Minus => InfixOperator::Sub,
            TokenKind::Asterisk => InfixOperator::Mul,
            TokenKind::Slash => InfixOperator::Div,
            TokenKind::Percent => InfixOperator::Mod,
            TokenKind::Equal => InfixOperator::Eq,
            TokenKind::NotEqual => InfixOperator::NotEq,
            TokenKind::LessThan => InfixOperator::LessThan,
            TokenKind::LessThanEq => InfixOperator::LessThanEq,
            TokenKind::GreaterThan => InfixOperator::GreaterThan,
            TokenKind::GreaterThanEq => InfixOperator::GreaterThanEq,
            TokenKind::And => InfixOperator::And,
            TokenKind::Or => InfixOperator::Or,
            TokenKind::In => InfixOperator::In,
            _ => {
                let message = format!("Expected operator but found '{}'", self.current.literal);
                return Err(self.error_at_current(message));
            }
        };
        self.advance();
        Ok(op)
    }

    fn current_precedence(&self) -> Option<Precedence> {
        match self.current.kind {
            TokenKind::Assign => Some(Precedence::Assign),
            TokenKind::And | TokenKind::Or => Some(Precedence::Logical),
            TokenKind::Equal | TokenKind::NotEqual => Some(Precedence::Equality),
            TokenKind::LessThan
            | TokenKind::LessThanEq
            | TokenKind::GreaterThan
            | TokenKind::GreaterThanEq
            | TokenKind::In => Some(Precedence::Comparison),
            TokenKind::Plus | TokenKind::Minus => Some(Precedence::Sum),
            TokenKind::Asterisk | TokenKind::Slash | TokenKind::Percent => {
                Some(Precedence::Product)
            }
            _ => None,
        }
    }

    fn consume_identifier(&mut self, msg: &str) -> ParseResult<String> {
        if self.current.kind == TokenKind::Identifier {
            Ok(self.advance().literal)
        } else {
            Err(self.error_at_current(msg))
        }
    }

    fn expect(&mut self, expected: TokenKind, msg: &str) -> ParseResult<Token> {
        if self.current.kind == expected {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(msg))
        }
    }

    fn skip_semicolon(&mut self) {
        if self.current.kind == TokenKind::Semicolon {
            self.advance();
        }
    }

    fn error_at_current(&self, msg: impl Into<String>) -> ParseError {
        let msg = msg.into();
        let found = match self.current.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("'{}'", self.current.literal),
        };
        let message = if msg.starts_with("Expected") {
            format!("{}, found {}", msg, found)
        } else {
            msg
        };
        ParseError::new(message, self.current.line, self.current.column)
    }

    fn position(&self) -> Position {
        Position::new(self.current.line, self.current.column)
    }

    fn is_at_end(&self) -> bool {
        self.current.kind == TokenKind::Eof
    }

    /// Moves to the next token, returning the one just consumed.
    fn advance(&mut self) -> Token {
        let next = self.lexer.next_token();
        let peek = std::mem::replace(&mut self.peek, next);
        std::mem::replace(&mut self.current, peek)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> (Program, Vec<ParseError>) {
        let mut parser = Parser::new(Lexer::new(source));
        let program = parser.parse_program();
        (program, parser.into_errors())
    }

    fn parse_ok(source: &str) -> Program {
        let (program, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected parse errors: {:?}", errors);
        program
    }

    /// Fully parenthesised rendering of an expression, for precedence checks.
    fn show(expr: &Expression) -> String {
        match &expr.kind {
            ExpressionKind::Identifier(name) => name.clone(),
            ExpressionKind::Number(n) => n.to_string(),
            ExpressionKind::String(s) => format!("{:?}", s),
            ExpressionKind::Boolean(b) => b.to_string(),
            ExpressionKind::Null => "null".to_string(),
            ExpressionKind::Prefix { op, operand } => format!("({} {})", op.symbol(), show(operand)),
            ExpressionKind::Infix { op, left, right } => {
                format!("({} {} {})", show(left), op.symbol(), show(right))
            }
            ExpressionKind::Assign { name, value } => format!("({} = {})", name, show(value)),
            ExpressionKind::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(show).collect();
                format!("{}({})", show(callee), args.join(", "))
            }
            ExpressionKind::Index { collection, index } => {
                format!("({}[{}])", show(collection), show(index))
            }
            other => format!("{:?}", other),
        }
    }

    fn first_expression(source: &str) -> Expression {
        let program = parse_ok(source);
        match &program.statements[0].kind {
            StatementKind::Expression(expr) => expr.clone(),
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn parses_let_statement() {
        let program = parse_ok("let x = 5;");
        assert_eq!(
            program.statements,
            vec![Statement::new(
                StatementKind::Let {
                    name: "x".to_string(),
                    value: Expression::new(ExpressionKind::Number(5.0), Position::new(1, 9)),
                },
                Position::new(1, 1),
            )]
        );
    }

    #[test]
    fn operator_precedence() {
        let cases = [
            ("1 + 2 * 3", "(1 + (2 * 3))"),
            ("1 * 2 + 3", "((1 * 2) + 3)"),
            ("a - b - c", "((a - b) - c)"),
            ("-a * b", "((- a) * b)"),
            ("!x == false", "((! x) == false)"),
            ("a < b == c > d", "((a < b) == (c > d))"),
            ("a || b && c", "((a || b) && c)"),
            ("a == b && c != d", "((a == b) && (c != d))"),
            ("(1 + 2) * 3", "((1 + 2) * 3)"),
            ("f(a + b) * c", "(f((a + b)) * c)"),
            ("-xs[0]", "(- (xs[0]))"),
            ("typeof x == \"number\"", "((typeof x) == \"number\")"),
            ("x in xs == true", "((x in xs) == true)"),
            ("a = b = 1 + 2", "(a = (b = (1 + 2)))"),
        ];
        for (source, expected) in cases {
            assert_eq!(show(&first_expression(source)), expected, "source: {}", source);
        }
    }

    #[test]
    fn invalid_assignment_target_is_an_error() {
        let (_, errors) = parse("1 + 2 = 3;");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Invalid assignment target"));
    }

    #[test]
    fn function_declaration_is_let_sugar() {
        let program = parse_ok("func add(a, b) { return a + b; }");
        match &program.statements[0].kind {
            StatementKind::Let { name, value } => {
                assert_eq!(name, "add");
                match &value.kind {
                    ExpressionKind::Function(literal) => {
                        assert_eq!(literal.params, vec!["a", "b"]);
                        assert_eq!(literal.body.statements.len(), 1);
                    }
                    other => panic!("expected function literal, got {:?}", other),
                }
            }
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn anonymous_function_takes_binding_name() {
        let program = parse_ok("let id = func(x) { x };");
        match &program.statements[0].kind {
            StatementKind::Let { value, .. } => match &value.kind {
                ExpressionKind::Function(literal) => {
                    assert_eq!(literal.name.as_deref(), Some("id"))
                }
                other => panic!("expected function literal, got {:?}", other),
            },
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn else_if_chains_nest_in_alternative() {
        let expr = first_expression("if (a) { 1 } else if (b) { 2 } else { 3 }");
        match expr.kind {
            ExpressionKind::If { alternative, .. } => {
                let alternative = alternative.expect("else branch");
                match &alternative.statements[0].kind {
                    StatementKind::Expression(Expression {
                        kind: ExpressionKind::If { alternative, .. },
                        ..
                    }) => assert!(alternative.is_some()),
                    other => panic!("expected nested if, got {:?}", other),
                }
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn if_requires_parenthesised_condition() {
        let (_, errors) = parse("if x { 1 }");
        assert!(!errors.is_empty());
        assert!(errors[0].message.starts_with("Expected '(' after 'if'"));
    }

    #[test]
    fn parses_collections_and_calls() {
        let expr = first_expression("f()");
        assert_eq!(show(&expr), "f()");

        let program = parse_ok("let h = {name: \"x\", 1: [1, 2,], \"k\": null};");
        match &program.statements[0].kind {
            StatementKind::Let { value, .. } => match &value.kind {
                ExpressionKind::Hash(pairs) => {
                    assert_eq!(pairs.len(), 3);
                    assert_eq!(pairs[0].0.kind, ExpressionKind::String("name".to_string()));
                    assert_eq!(pairs[1].0.kind, ExpressionKind::Number(1.0));
                }
                other => panic!("expected hash, got {:?}", other),
            },
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn parses_decorated_declaration() {
        let expr = first_expression("@memo(10) func fib(n) { n }");
        match expr.kind {
            ExpressionKind::Decorator {
                decorator,
                declaration,
            } => {
                assert_eq!(show(&decorator), "memo(10)");
                assert_eq!(declaration.declared_name(), Some("fib"));
            }
            other => panic!("expected decorator, got {:?}", other),
        }
    }

    #[test]
    fn decorator_without_declaration_is_an_error() {
        let (_, errors) = parse("@memo 1 + 2;");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("must be followed"));
    }

    #[test]
    fn valid_program_has_no_errors() {
        let (_, errors) = parse(
            r#"
            use "@std/lib";
            let counter = 0;
            func tick() { counter = counter + 1; return counter; }
            while (counter < 3) { tick(); }
            let data = {total: counter, items: [1, 2, 3]};
            if (typeof data == "hash") { delete counter; } else { throw "unexpected"; }
            "#,
        );
        assert_eq!(errors, Vec::<ParseError>::new());
    }

    #[test]
    fn recovers_after_malformed_statement() {
        let (program, errors) = parse("let = 5; let y = 10;");
        assert_eq!(errors.len(), 1);
        assert_eq!((errors[0].line, errors[0].column), (1, 5));
        assert_eq!(program.statements.len(), 1);
        assert_eq!(program.statements[0].declared_name(), Some("y"));
    }

    #[test]
    fn reports_every_malformed_statement() {
        let (program, errors) = parse("let a = ;\nlet b = 2;\nlet c = );\nlet d = 4;");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].line, 3);
        let names: Vec<&str> = program
            .statements
            .iter()
            .filter_map(Statement::declared_name)
            .collect();
        assert_eq!(names, vec!["b", "d"]);
    }

    #[test]
    fn unterminated_string_reports_opening_quote() {
        let (_, errors) = parse("let s = 'abc");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Unterminated string literal");
        assert_eq!((errors[0].line, errors[0].column), (1, 9));
    }

    #[test]
    fn unclosed_block_reports_open_brace() {
        let (_, errors) = parse("func f() {\n  return 1;\n");
        assert_eq!(errors.len(), 1);
        assert_eq!((errors[0].line, errors[0].column), (1, 10));
    }
}
