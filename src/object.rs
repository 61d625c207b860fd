use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    ast::{Block, Position},
    builtins::NativeFn,
    environment::Env,
    error::format_error,
    options::Options,
};

/// A runtime value.
///
/// Arrays and hashes are shared, mutable containers: cloning an `Object`
/// clones the handle, so a builtin that pushes onto an array is observed by
/// every binding that holds it.
#[derive(Clone)]
pub enum Object {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Rc<RefCell<Vec<Object>>>),
    Hash(Rc<RefCell<HashObject>>),
    Function(Rc<FunctionObject>),
    Builtin(Builtin),
    Error(ErrorObject),
}

pub struct FunctionObject {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Rc<Block>,
    pub env: Env,
    /// Source the body was parsed from; errors leaving the body are tagged with it.
    pub file: Rc<str>,
}

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: NativeFn,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorObject {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub file: Option<String>,
}

/// Insertion-ordered map whose keys are compared by value equality.
#[derive(Default, Clone)]
pub struct HashObject {
    pairs: Vec<(Object, Object)>,
}

impl Object {
    pub fn error(message: impl Into<String>) -> Self {
        Object::Error(ErrorObject::new(message))
    }

    pub fn array(elements: Vec<Object>) -> Self {
        Object::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn hash(hash: HashObject) -> Self {
        Object::Hash(Rc::new(RefCell::new(hash)))
    }

    pub fn string(text: impl Into<String>) -> Self {
        Object::String(text.into())
    }

    /// Name reported by `typeof`, one per variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "null",
            Object::Boolean(_) => "boolean",
            Object::Number(_) => "number",
            Object::String(_) => "string",
            Object::Array(_) => "array",
            Object::Hash(_) => "hash",
            Object::Function(_) => "function",
            Object::Builtin(_) => "builtin",
            Object::Error(_) => "error",
        }
    }

    /// `null`, `false` and `0` are falsy; everything else, empty containers included, is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Object::Null => false,
            Object::Boolean(b) => *b,
            Object::Number(n) => *n != 0.0,
            _ => true,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Object::Error(_))
    }

    /// Deep equality. Container pairs already under comparison count as
    /// equal, so self-referencing arrays and hashes compare without looping.
    pub fn values_equal(&self, other: &Object) -> bool {
        self.equal_within(other, &mut Vec::new())
    }

    fn equal_within(&self, other: &Object, seen: &mut Vec<(usize, usize)>) -> bool {
        match (self, other) {
            (Object::Null, Object::Null) => true,
            (Object::Boolean(l), Object::Boolean(r)) => l == r,
            (Object::Number(l), Object::Number(r)) => l == r,
            (Object::String(l), Object::String(r)) => l == r,
            (Object::Array(l), Object::Array(r)) => {
                if Rc::ptr_eq(l, r) {
                    return true;
                }
                let pair = (Rc::as_ptr(l) as usize, Rc::as_ptr(r) as usize);
                if seen.contains(&pair) {
                    return true;
                }
                seen.push(pair);
                let (l, r) = (l.borrow(), r.borrow());
                let equal = l.len() == r.len()
                    && l.iter().zip(r.iter()).all(|(a, b)| a.equal_within(b, seen));
                seen.pop();
                equal
            }
            (Object::Hash(l), Object::Hash(r)) => {
                if Rc::ptr_eq(l, r) {
                    return true;
                }
                let pair = (Rc::as_ptr(l) as usize, Rc::as_ptr(r) as usize);
                if seen.contains(&pair) {
                    return true;
                }
                seen.push(pair);
                let (l, r) = (l.borrow(), r.borrow());
                let equal = l.len() == r.len()
                    && l.iter().all(|(key, value)| {
                        r.get(key)
                            .map(|other| value.equal_within(&other, seen))
                            .unwrap_or(false)
                    });
                seen.pop();
                equal
            }
            (Object::Function(l), Object::Function(r)) => Rc::ptr_eq(l, r),
            (Object::Builtin(l), Object::Builtin(r)) => l.name == r.name,
            (Object::Error(l), Object::Error(r)) => l.message == r.message,
            _ => false,
        }
    }

    /// Display form used by printing and string concatenation: strings are raw
    /// at the top level and quoted inside containers.
    pub fn stringify(&self) -> String {
        match self {
            Object::String(s) => s.clone(),
            other => other.inspect(),
        }
    }

    /// Debug form. A container nested inside itself prints as `[...]` or `{...}`.
    pub fn inspect(&self) -> String {
        self.inspect_within(&mut Vec::new())
    }

    fn inspect_within(&self, open: &mut Vec<usize>) -> String {
        match self {
            Object::Null => "null".to_string(),
            Object::Boolean(b) => b.to_string(),
            Object::Number(n) => format_number(*n),
            Object::String(s) => format!("{:?}", s),
            Object::Array(elements) => {
                let id = Rc::as_ptr(elements) as usize;
                if open.contains(&id) {
                    return "[...]".to_string();
                }
                open.push(id);
                let parts: Vec<String> = elements
                    .borrow()
                    .iter()
                    .map(|element| element.inspect_within(open))
                    .collect();
                open.pop();
                format!("[{}]", parts.join(", "))
            }
            Object::Hash(hash) => {
                let id = Rc::as_ptr(hash) as usize;
                if open.contains(&id) {
                    return "{...}".to_string();
                }
                open.push(id);
                let parts: Vec<String> = hash
                    .borrow()
                    .iter()
                    .map(|(key, value)| {
                        let key = key.inspect_within(open);
                        let value = value.inspect_within(open);
                        format!("{}: {}", key, value)
                    })
                    .collect();
                open.pop();
                format!("{{{}}}", parts.join(", "))
            }
            Object::Function(func) => match &func.name {
                Some(name) => format!("func {}({})", name, func.params.join(", ")),
                None => format!("func({})", func.params.join(", ")),
            },
            Object::Builtin(builtin) => format!("<builtin {}>", builtin.name),
            Object::Error(error) => format!("Error: {}", error.message),
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.values_equal(other)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inspect())
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stringify())
    }
}

impl From<ErrorObject> for Object {
    fn from(error: ErrorObject) -> Self {
        Object::Error(error)
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl ErrorObject {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
            file: None,
        }
    }

    pub fn at(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            line: Some(position.line),
            column: Some(position.column),
            file: None,
        }
    }

    /// Attaches `position` unless the error already carries one.
    pub fn located(mut self, position: Position) -> Self {
        if self.line.is_none() {
            self.line = Some(position.line);
            self.column = Some(position.column);
        }
        self
    }

    /// Records the source the error was raised in, unless one is already known.
    pub fn in_file(mut self, file: &str) -> Self {
        if self.file.is_none() {
            self.file = Some(file.to_string());
        }
        self
    }

    pub fn position(&self) -> Option<(usize, usize)> {
        Some((self.line?, self.column.unwrap_or(1)))
    }

    /// Formats the error against its own source, falling back to `file`.
    pub fn render(&self, file: &str, options: &Options) -> String {
        format_error(
            &self.message,
            self.position(),
            self.file.as_deref().unwrap_or(file),
            options,
        )
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position() {
            Some((line, column)) => match &self.file {
                Some(file) => write!(f, "{} at {} {}:{}", self.message, file, line, column),
                None => write!(f, "{} at {}:{}", self.message, line, column),
            },
            None => write!(f, "{}", self.message),
        }
    }
}

impl HashObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Object) -> Option<Object> {
        self.pairs
            .iter()
            .find(|(k, _)| k.values_equal(key))
            .map(|(_, v)| v.clone())
    }

    pub fn contains_key(&self, key: &Object) -> bool {
        self.pairs.iter().any(|(k, _)| k.values_equal(key))
    }

    /// Inserts or replaces; a replaced key keeps its original slot.
    pub fn insert(&mut self, key: Object, value: Object) {
        match self.pairs.iter_mut().find(|(k, _)| k.values_equal(&key)) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Object, Object)> {
        self.pairs.iter()
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<builtin {}>", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_language_rules() {
        assert!(!Object::Null.is_truthy());
        assert!(!Object::Boolean(false).is_truthy());
        assert!(!Object::Number(0.0).is_truthy());
        assert!(Object::Number(-1.0).is_truthy());
        assert!(Object::string("").is_truthy());
        assert!(Object::array(Vec::new()).is_truthy());
        assert!(Object::hash(HashObject::new()).is_truthy());
    }

    #[test]
    fn arrays_compare_structurally() {
        let left = Object::array(vec![Object::Number(1.0), Object::string("a")]);
        let right = Object::array(vec![Object::Number(1.0), Object::string("a")]);
        assert!(left.values_equal(&right));
        let shorter = Object::array(vec![Object::Number(1.0)]);
        assert!(!left.values_equal(&shorter));
    }

    #[test]
    fn hash_keys_use_value_equality() {
        let mut hash = HashObject::new();
        hash.insert(Object::array(vec![Object::Number(1.0)]), Object::string("one"));
        hash.insert(Object::Number(2.0), Object::string("two"));
        hash.insert(Object::Number(2.0), Object::string("deux"));
        assert_eq!(hash.len(), 2);
        assert_eq!(
            hash.get(&Object::array(vec![Object::Number(1.0)])),
            Some(Object::string("one"))
        );
        assert_eq!(hash.get(&Object::Number(2.0)), Some(Object::string("deux")));
        assert!(hash.contains_key(&Object::Number(2.0)));
        assert!(!hash.contains_key(&Object::Number(3.0)));
    }

    #[test]
    fn self_referencing_arrays_compare_and_print() {
        let a = Object::array(vec![Object::Number(1.0)]);
        let b = Object::array(vec![Object::Number(1.0)]);
        if let (Object::Array(inner_a), Object::Array(inner_b)) = (&a, &b) {
            inner_a.borrow_mut().push(a.clone());
            inner_b.borrow_mut().push(b.clone());
        }
        assert!(a.values_equal(&b));
        assert_eq!(a.inspect(), "[1, [...]]");

        let c = Object::array(vec![Object::Number(2.0)]);
        if let Object::Array(inner_c) = &c {
            inner_c.borrow_mut().push(c.clone());
        }
        assert!(!a.values_equal(&c));
    }

    #[test]
    fn self_referencing_hash_prints_placeholder() {
        let hash = Object::hash(HashObject::new());
        if let Object::Hash(inner) = &hash {
            inner.borrow_mut().insert(Object::string("me"), hash.clone());
        }
        assert_eq!(hash.inspect(), "{\"me\": {...}}");
        assert!(hash.values_equal(&hash.clone()));
    }

    #[test]
    fn errors_keep_the_first_file_they_are_tagged_with() {
        let error = ErrorObject::new("boom").in_file("util").in_file("main.tiny");
        assert_eq!(error.file.as_deref(), Some("util"));
        assert_eq!(ErrorObject::new("x").file, None);
    }

    #[test]
    fn numbers_print_without_trailing_zero() {
        assert_eq!(Object::Number(3.0).inspect(), "3");
        assert_eq!(Object::Number(2.5).inspect(), "2.5");
        assert_eq!(Object::Number(f64::INFINITY).inspect(), "Infinity");
    }

    #[test]
    fn strings_are_quoted_only_inside_containers() {
        let array = Object::array(vec![Object::string("a"), Object::Null]);
        assert_eq!(array.stringify(), "[\"a\", null]");
        assert_eq!(Object::string("a").stringify(), "a");
    }

    #[test]
    fn type_names_cover_every_variant() {
        let names: Vec<&str> = [
            Object::Null,
            Object::Boolean(true),
            Object::Number(1.0),
            Object::string("s"),
            Object::array(Vec::new()),
            Object::hash(HashObject::new()),
            Object::error("e"),
        ]
        .iter()
        .map(Object::type_name)
        .collect();
        assert_eq!(
            names,
            vec!["null", "boolean", "number", "string", "array", "hash", "error"]
        );
    }
}
