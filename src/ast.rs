use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
    /// Name of the source the program was parsed from.
    pub file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Let { name: String, value: Expression },
    Return(Option<Expression>),
    Expression(Expression),
    Block(Block),
    Use { module: String },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Identifier(String),
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    Prefix {
        op: PrefixOperator,
        operand: Box<Expression>,
    },
    Infix {
        op: InfixOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        consequence: Block,
        alternative: Option<Block>,
    },
    While {
        condition: Box<Expression>,
        body: Block,
    },
    Function(FunctionLiteral),
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
    Array(Vec<Expression>),
    Hash(Vec<(Expression, Expression)>),
    Index {
        collection: Box<Expression>,
        index: Box<Expression>,
    },
    Assign {
        name: String,
        value: Box<Expression>,
    },
    Decorator {
        decorator: Box<Expression>,
        declaration: Box<Statement>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Rc<Block>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOperator {
    Negate,
    Not,
    Typeof,
    Throw,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    LessThan,
    LessThanEq,
    GreaterThan,
    GreaterThanEq,
    And,
    Or,
    In,
}

impl Expression {
    pub fn new(kind: ExpressionKind, position: Position) -> Self {
        Self { kind, position }
    }
}

impl Statement {
    pub fn new(kind: StatementKind, position: Position) -> Self {
        Self { kind, position }
    }

    /// Name bound by a `let` statement, looking through any decorators around it.
    pub fn declared_name(&self) -> Option<&str> {
        match &self.kind {
            StatementKind::Let { name, .. } => Some(name),
            StatementKind::Expression(Expression {
                kind: ExpressionKind::Decorator { declaration, .. },
                ..
            }) => declaration.declared_name(),
            _ => None,
        }
    }
}

impl PrefixOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            PrefixOperator::Negate => "-",
            PrefixOperator::Not => "!",
            PrefixOperator::Typeof => "typeof",
            PrefixOperator::Throw => "throw",
            PrefixOperator::Delete => "delete",
        }
    }
}

impl InfixOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            InfixOperator::Add => "+",
            InfixOperator::Sub => "-",
            InfixOperator::Mul => "*",
            InfixOperator::Div => "/",
            InfixOperator::Mod => "%",
            InfixOperator::Eq => "==",
            InfixOperator::NotEq => "!=",
            InfixOperator::LessThan => "<",
            InfixOperator::LessThanEq => "<=",
            InfixOperator::GreaterThan => ">",
            InfixOperator::GreaterThanEq => ">=",
            InfixOperator::And => "&&",
            InfixOperator::Or => "||",
            InfixOperator::In => "in",
        }
    }
}
