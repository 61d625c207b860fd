use std::{
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use tracing::{debug, trace};

use crate::{
    ast::{
        Block, Expression, ExpressionKind, InfixOperator, Position, PrefixOperator, Program,
        Statement, StatementKind,
    },
    builtins,
    environment::{Env, Environment},
    lexer::Lexer,
    object::{ErrorObject, FunctionObject, HashObject, Object},
    options::Options,
    parser::Parser,
    stack::ensure_sufficient_stack,
    stdio::Stdio,
};

pub const STD_LIB: &str = "@std/lib";

const STD_LIB_SOURCE: &str = include_str!("std/lib.tiny");

const MODULE_EXTENSION: &str = ".tiny";

/// Why evaluation stopped early: an error value travelling up to the nearest
/// evaluation boundary, or a `return` travelling up to the enclosing call.
#[derive(Debug, Clone)]
pub enum Unwind {
    Error(ErrorObject),
    Return(Object),
}

impl From<ErrorObject> for Unwind {
    fn from(error: ErrorObject) -> Self {
        Unwind::Error(error)
    }
}

type Eval = Result<Object, Unwind>;

fn fail(message: impl Into<String>, position: Position) -> Unwind {
    Unwind::Error(ErrorObject::at(message, position))
}

struct CallFrame {
    name: Option<String>,
    args: Vec<Object>,
}

/// Walks one program against an environment.
///
/// The interpreter owns the per-evaluation state that builtins may consult:
/// the capability flags, the embedder's streams, the import stack used for
/// cycle detection, and the call frames behind `__builtin__arguments`.
pub struct Interpreter<'io> {
    options: Options,
    stdio: &'io mut dyn Stdio,
    imports: Vec<String>,
    frames: Vec<CallFrame>,
    /// Sources being evaluated through `eval` or `import`, innermost last.
    sources: usize,
    steps: u64,
    call_site: Position,
    file: Rc<str>,
}

impl<'io> Interpreter<'io> {
    pub fn new(options: &Options, stdio: &'io mut dyn Stdio) -> Self {
        Self {
            options: options.clone(),
            stdio,
            imports: Vec::new(),
            frames: Vec::new(),
            sources: 0,
            steps: 0,
            call_site: Position::default(),
            file: Rc::from("<unknown>"),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn stdio(&mut self) -> &mut (dyn Stdio + 'io) {
        &mut *self.stdio
    }

    /// Evaluates every statement in `env` and returns the last value. Errors
    /// come back as [`Object::Error`]; a top-level `return` ends the program
    /// with its value. Errors are tagged with the program's file unless a
    /// function from another source raised them.
    pub fn eval_program(&mut self, program: &Program, env: &Env) -> Object {
        let outer_file = std::mem::replace(&mut self.file, Rc::from(program.file.as_str()));
        let result = finish(self.eval_statements(&program.statements, env));
        self.file = outer_file;
        match result {
            Object::Error(error) => Object::Error(error.in_file(&program.file)),
            value => value,
        }
    }

    fn eval_statements(&mut self, statements: &[Statement], env: &Env) -> Eval {
        let mut result = Object::Null;
        for statement in statements {
            trace!(line = statement.position.line, "statement");
            result = self.eval_statement(statement, env)?;
        }
        Ok(result)
    }

    fn eval_statement(&mut self, statement: &Statement, env: &Env) -> Eval {
        match &statement.kind {
            StatementKind::Let { name, value } => {
                let value = self.eval_expression(value, env)?;
                env.define(name.as_str(), value);
                Ok(Object::Null)
            }
            StatementKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expression(expr, env)?,
                    None => Object::Null,
                };
                Err(Unwind::Return(value))
            }
            StatementKind::Expression(expr) => self.eval_expression(expr, env),
            StatementKind::Block(block) => self.eval_block(block, &Environment::enclosed(env)),
            StatementKind::Use { module } => match self.import(module, env) {
                Object::Error(error) => Err(Unwind::Error(error.located(statement.position))),
                value => Ok(value),
            },
        }
    }

    /// Runs a block in `env`. Callers pass a fresh child scope so bindings
    /// made inside do not leak out.
    fn eval_block(&mut self, block: &Block, env: &Env) -> Eval {
        self.eval_statements(&block.statements, env)
    }

    fn eval_expression(&mut self, expr: &Expression, env: &Env) -> Eval {
        ensure_sufficient_stack(|| self.eval_expression_kind(expr, env))
    }

    fn eval_expression_kind(&mut self, expr: &Expression, env: &Env) -> Eval {
        let position = expr.position;
        match &expr.kind {
            ExpressionKind::Identifier(name) => self.resolve(name, env, position),
            ExpressionKind::Number(n) => Ok(Object::Number(*n)),
            ExpressionKind::String(s) => Ok(Object::String(s.clone())),
            ExpressionKind::Boolean(b) => Ok(Object::Boolean(*b)),
            ExpressionKind::Null => Ok(Object::Null),
            ExpressionKind::Prefix { op, operand } => self.eval_prefix(*op, operand, env, position),
            ExpressionKind::Infix { op, left, right } => {
                self.eval_infix(*op, left, right, env, position)
            }
            ExpressionKind::If {
                condition,
                consequence,
                alternative,
            } => {
                let condition = self.eval_expression(condition, env)?;
                if condition.is_truthy() {
                    self.eval_block(consequence, &Environment::enclosed(env))
                } else if let Some(alternative) = alternative {
                    self.eval_block(alternative, &Environment::enclosed(env))
                } else {
                    Ok(Object::Null)
                }
            }
            ExpressionKind::While { condition, body } => {
                let mut result = Object::Null;
                while self.eval_expression(condition, env)?.is_truthy() {
                    self.tick(position)?;
                    result = self.eval_block(body, &Environment::enclosed(env))?;
                }
                Ok(result)
            }
            ExpressionKind::Function(literal) => Ok(Object::Function(Rc::new(FunctionObject {
                name: literal.name.clone(),
                params: literal.params.clone(),
                body: Rc::clone(&literal.body),
                env: Rc::clone(env),
                file: Rc::clone(&self.file),
            }))),
            ExpressionKind::Call { callee, args } => {
                let callee = self.eval_expression(callee, env)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expression(arg, env)?);
                }
                self.apply(&callee, values, env, position)
            }
            ExpressionKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expression(element, env)?);
                }
                Ok(Object::array(values))
            }
            ExpressionKind::Hash(pairs) => {
                let mut hash = HashObject::new();
                for (key, value) in pairs {
                    let key = self.eval_expression(key, env)?;
                    let value = self.eval_expression(value, env)?;
                    hash.insert(key, value);
                }
                Ok(Object::hash(hash))
            }
            ExpressionKind::Index { collection, index } => {
                let collection = self.eval_expression(collection, env)?;
                let index = self.eval_expression(index, env)?;
                index_value(&collection, &index).map_err(|message| fail(message, position))
            }
            ExpressionKind::Assign { name, value } => {
                let value = self.eval_expression(value, env)?;
                if env.update(name, value.clone()) {
                    Ok(value)
                } else {
                    Err(fail(
                        format!("Cannot assign to undeclared name '{}'", name),
                        position,
                    ))
                }
            }
            ExpressionKind::Decorator {
                decorator,
                declaration,
            } => self.eval_decorator(decorator, declaration, env),
        }
    }

    /// Scope chain first, then the builtin registry.
    fn resolve(&mut self, name: &str, env: &Env, position: Position) -> Eval {
        if let Some(value) = env.get(name) {
            return Ok(value);
        }
        match builtins::lookup(name) {
            Some(builtin) => Ok(Object::Builtin(builtin)),
            None => Err(fail(format!("Undefined name '{}'", name), position)),
        }
    }

    fn eval_prefix(
        &mut self,
        op: PrefixOperator,
        operand: &Expression,
        env: &Env,
        position: Position,
    ) -> Eval {
        if op == PrefixOperator::Delete {
            if let ExpressionKind::Identifier(name) = &operand.kind {
                env.delete(name);
            }
            return Ok(Object::Null);
        }

        let value = self.eval_expression(operand, env)?;
        match op {
            PrefixOperator::Negate => match value {
                Object::Number(n) => Ok(Object::Number(-n)),
                other => Err(fail(
                    format!("Invalid operand for '-': {}", other.type_name()),
                    position,
                )),
            },
            PrefixOperator::Not => Ok(Object::Boolean(!value.is_truthy())),
            PrefixOperator::Typeof => Ok(Object::string(value.type_name())),
            PrefixOperator::Throw => match value {
                Object::Error(error) => Err(Unwind::Error(error.located(position))),
                other => Err(fail(other.stringify(), position)),
            },
            PrefixOperator::Delete => Ok(Object::Null),
        }
    }

    fn eval_infix(
        &mut self,
        op: InfixOperator,
        left: &Expression,
        right: &Expression,
        env: &Env,
        position: Position,
    ) -> Eval {
        let left = self.eval_expression(left, env)?;

        match op {
            InfixOperator::And if !left.is_truthy() => return Ok(Object::Boolean(false)),
            InfixOperator::Or if left.is_truthy() => return Ok(Object::Boolean(true)),
            InfixOperator::And | InfixOperator::Or => {
                let right = self.eval_expression(right, env)?;
                return Ok(Object::Boolean(right.is_truthy()));
            }
            _ => {}
        }

        let right = self.eval_expression(right, env)?;
        binary_op(op, &left, &right).map_err(|message| fail(message, position))
    }

    /// `@decorator declaration`: binds the declaration, passes the declared
    /// value to the decorator, then rebinds the name to whatever it returns.
    fn eval_decorator(&mut self, decorator: &Expression, declaration: &Statement, env: &Env) -> Eval {
        let decorator_value = self.eval_expression(decorator, env)?;

        let Some(name) = declaration.declared_name() else {
            return Err(fail("A decorator must wrap a declaration", declaration.position));
        };
        let declared = match &declaration.kind {
            StatementKind::Let { .. } => {
                self.eval_statement(declaration, env)?;
                env.get(name).unwrap_or(Object::Null)
            }
            StatementKind::Expression(inner) => self.eval_expression(inner, env)?,
            _ => return Err(fail("A decorator must wrap a declaration", declaration.position)),
        };

        let wrapped = self.apply(&decorator_value, vec![declared], env, decorator.position)?;
        env.define(name, wrapped.clone());
        Ok(wrapped)
    }

    fn apply(&mut self, callee: &Object, args: Vec<Object>, env: &Env, position: Position) -> Eval {
        match callee {
            Object::Builtin(builtin) => {
                let outer_site = std::mem::replace(&mut self.call_site, position);
                let result = (builtin.func)(self, &args, env);
                self.call_site = outer_site;
                match result {
                    Object::Error(error) => Err(Unwind::Error(error.located(position))),
                    value => Ok(value),
                }
            }
            Object::Function(func) => self.call_function(func, args, position),
            other => Err(fail(
                format!("Not callable: {}", other.type_name()),
                position,
            )),
        }
    }

    fn call_function(&mut self, func: &Rc<FunctionObject>, args: Vec<Object>, position: Position) -> Eval {
        if args.len() != func.params.len() {
            return Err(fail(
                format!(
                    "{} expects {} argument(s) but got {}",
                    describe(func),
                    func.params.len(),
                    args.len()
                ),
                position,
            ));
        }
        if self.frames.len() + self.sources >= self.options.max_call_depth {
            return Err(fail(
                format!("Maximum call depth of {} exceeded", self.options.max_call_depth),
                position,
            ));
        }
        self.tick(position)?;

        let call_env = Environment::enclosed(&func.env);
        for (param, arg) in func.params.iter().zip(args.iter()) {
            call_env.define(param.as_str(), arg.clone());
        }

        self.frames.push(CallFrame {
            name: func.name.clone(),
            args,
        });
        let outer_file = std::mem::replace(&mut self.file, Rc::clone(&func.file));
        let result = self.eval_block(&func.body, &call_env);
        self.file = outer_file;
        self.frames.pop();

        match result {
            Ok(value) | Err(Unwind::Return(value)) => Ok(value),
            Err(Unwind::Error(error)) => Err(Unwind::Error(error.in_file(&func.file))),
        }
    }

    /// Counts one unit of work against the optional step budget.
    fn tick(&mut self, position: Position) -> Result<(), Unwind> {
        let Some(max_steps) = self.options.max_steps else {
            return Ok(());
        };
        self.steps += 1;
        if self.steps > max_steps {
            debug!(max_steps, "step budget exhausted");
            return Err(fail(format!("Step budget of {} exceeded", max_steps), position));
        }
        Ok(())
    }

    /// Calls a function or builtin on behalf of a native, e.g. a `forEach` callback.
    pub fn call(&mut self, callee: &Object, args: Vec<Object>, env: &Env) -> Object {
        let position = self.call_site;
        finish(self.apply(callee, args, env, position))
    }

    /// Arguments of the innermost user call, optionally the innermost one with
    /// the given function name.
    pub fn arguments(&self, name: Option<&str>) -> Vec<Object> {
        self.frames
            .iter()
            .rev()
            .find(|frame| name.map_or(true, |name| frame.name.as_deref() == Some(name)))
            .map(|frame| frame.args.clone())
            .unwrap_or_default()
    }

    /// Parses `code` and evaluates it in `env`. A syntax error is reported as
    /// an error value carrying the first parse error. Nested sources share
    /// the call-depth bound with user calls.
    pub fn eval_source(&mut self, code: &str, file_name: &str, env: &Env) -> Object {
        if self.frames.len() + self.sources >= self.options.max_call_depth {
            return Object::error(format!(
                "Maximum call depth of {} exceeded",
                self.options.max_call_depth
            ));
        }

        let mut parser = Parser::new(Lexer::with_file(code, file_name));
        let program = parser.parse_program();
        if let Some(first) = parser.errors().first() {
            return Object::Error(ErrorObject {
                message: first.message.clone(),
                line: Some(first.line),
                column: Some(first.column),
                file: Some(program.file),
            });
        }

        self.sources += 1;
        let result = self.eval_program(&program, env);
        self.sources -= 1;
        result
    }

    /// Loads a module and evaluates it against `env`, so its top-level
    /// bindings land in the importer's scope. Names starting with `@std/`
    /// resolve to bundled sources; anything else is read from disk.
    pub fn import(&mut self, name: &str, env: &Env) -> Object {
        let (key, source) = match self.load_module(name) {
            Ok(loaded) => loaded,
            Err(error) => {
                debug!(module = name, %error, "import failed");
                return Object::error(format!("Could not import file: {}", name));
            }
        };

        if self.imports.contains(&key) {
            return Object::error(format!("Circular import of {}", name));
        }

        debug!(module = name, path = %key, "importing");
        self.imports.push(key);
        let result = self.eval_source(&source, name, env);
        self.imports.pop();
        result
    }

    /// Returns the module's identity for cycle detection and its source text.
    fn load_module(&self, name: &str) -> std::io::Result<(String, String)> {
        if name == STD_LIB {
            return Ok((name.to_string(), STD_LIB_SOURCE.to_string()));
        }
        if name.starts_with("@std/") {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such bundled module",
            ));
        }

        let path = self.resolve_module_path(name);
        let canonical = fs::canonicalize(&path)?;
        let source = fs::read_to_string(&canonical)?;
        Ok((canonical.display().to_string(), source))
    }

    fn resolve_module_path(&self, name: &str) -> PathBuf {
        let file_name = if name.ends_with(MODULE_EXTENSION) {
            name.to_string()
        } else {
            format!("{}{}", name, MODULE_EXTENSION)
        };
        match &self.options.module_dir {
            Some(dir) => dir.join(&file_name),
            None => Path::new(&file_name).to_path_buf(),
        }
    }
}

fn finish(result: Eval) -> Object {
    match result {
        Ok(value) | Err(Unwind::Return(value)) => value,
        Err(Unwind::Error(error)) => Object::Error(error),
    }
}

fn describe(func: &FunctionObject) -> String {
    match &func.name {
        Some(name) => format!("Function '{}'", name),
        None => "Anonymous function".to_string(),
    }
}

fn type_mismatch(op: InfixOperator, left: &Object, right: &Object) -> String {
    format!(
        "Type mismatch: {} {} {}",
        left.type_name(),
        op.symbol(),
        right.type_name()
    )
}

fn binary_op(op: InfixOperator, left: &Object, right: &Object) -> Result<Object, String> {
    use InfixOperator::*;

    match (op, left, right) {
        (Eq, _, _) => Ok(Object::Boolean(left.values_equal(right))),
        (NotEq, _, _) => Ok(Object::Boolean(!left.values_equal(right))),
        (Add, Object::Number(l), Object::Number(r)) => Ok(Object::Number(l + r)),
        (Add, Object::String(_), _) | (Add, _, Object::String(_)) => Ok(Object::String(format!(
            "{}{}",
            left.stringify(),
            right.stringify()
        ))),
        (Add, Object::Array(l), Object::Array(r)) => {
            let mut elements = l.borrow().clone();
            elements.extend(r.borrow().iter().cloned());
            Ok(Object::array(elements))
        }
        (Sub, Object::Number(l), Object::Number(r)) => Ok(Object::Number(l - r)),
        (Mul, Object::Number(l), Object::Number(r)) => Ok(Object::Number(l * r)),
        (Div | Mod, Object::Number(_), Object::Number(r)) if *r == 0.0 => {
            Err("Division by zero".to_string())
        }
        (Div, Object::Number(l), Object::Number(r)) => Ok(Object::Number(l / r)),
        (Mod, Object::Number(l), Object::Number(r)) => Ok(Object::Number(l % r)),
        (LessThan | LessThanEq | GreaterThan | GreaterThanEq, Object::Number(l), Object::Number(r)) => {
            Ok(Object::Boolean(compare(op, l.partial_cmp(r))))
        }
        (LessThan | LessThanEq | GreaterThan | GreaterThanEq, Object::String(l), Object::String(r)) => {
            Ok(Object::Boolean(compare(op, Some(l.cmp(r)))))
        }
        (In, _, Object::Array(elements)) => Ok(Object::Boolean(
            elements.borrow().iter().any(|element| element.values_equal(left)),
        )),
        (In, _, Object::Hash(hash)) => Ok(Object::Boolean(hash.borrow().contains_key(left))),
        (In, Object::String(needle), Object::String(haystack)) => {
            Ok(Object::Boolean(haystack.contains(needle.as_str())))
        }
        _ => Err(type_mismatch(op, left, right)),
    }
}

fn compare(op: InfixOperator, ordering: Option<std::cmp::Ordering>) -> bool {
    use std::cmp::Ordering::*;

    match (op, ordering) {
        (_, None) => false,
        (InfixOperator::LessThan, Some(o)) => o == Less,
        (InfixOperator::LessThanEq, Some(o)) => o != Greater,
        (InfixOperator::GreaterThan, Some(o)) => o == Greater,
        (InfixOperator::GreaterThanEq, Some(o)) => o != Less,
        _ => false,
    }
}

/// Resolves an integral, possibly negative index against `len`.
fn element_index(index: f64, len: usize) -> Result<Option<usize>, String> {
    if index.fract() != 0.0 {
        return Err(format!("Index must be an integer, got {}", index));
    }
    let len = len as i64;
    let index = index as i64;
    let resolved = if index < 0 { len + index } else { index };
    Ok((0..len).contains(&resolved).then_some(resolved as usize))
}

fn index_value(collection: &Object, index: &Object) -> Result<Object, String> {
    match (collection, index) {
        (Object::Array(elements), Object::Number(n)) => {
            let elements = elements.borrow();
            Ok(element_index(*n, elements.len())?
                .map(|i| elements[i].clone())
                .unwrap_or(Object::Null))
        }
        (Object::String(s), Object::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(element_index(*n, chars.len())?
                .map(|i| Object::String(chars[i].to_string()))
                .unwrap_or(Object::Null))
        }
        (Object::Hash(hash), key) => Ok(hash.borrow().get(key).unwrap_or(Object::Null)),
        _ => Err(format!(
            "Cannot index {} with {}",
            collection.type_name(),
            index.type_name()
        )),
    }
}
