//! Native functions, looked up by name when an identifier is not bound in
//! any scope.
//!
//! The registry is built once on first use and never changes afterwards.
//! Every native reports failure by returning an [`Object::Error`]; the
//! evaluator attaches the call-site position.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::{
    environment::Env,
    evaluator::Interpreter,
    object::{Builtin, Object},
};

pub type NativeFn = fn(&mut Interpreter<'_>, &[Object], &Env) -> Object;

const INVALID_ARGUMENTS: &str = "Invalid arguments";

static REGISTRY: Lazy<HashMap<&'static str, NativeFn>> = Lazy::new(|| {
    let natives: [(&'static str, NativeFn); 18] = [
        ("import", import),
        ("update", update),
        ("eval", eval),
        ("js", js),
        ("__builtin_print", print),
        ("__builtin_print_error", print_error),
        ("__builtin_readline", readline),
        ("__builtin_length", length),
        ("__builtin_push", push),
        ("__builtin_pop", pop),
        ("__builtin_shift", shift),
        ("__builtin_unshift", unshift),
        ("__builtin_slice", slice),
        ("__builtin_forEach", for_each),
        ("__builtin__arguments", arguments),
        ("__builtin_keys", keys),
        ("__builtin_str", stringify),
        ("__new_line", new_line),
    ];
    natives.into_iter().collect()
});

pub fn lookup(name: &str) -> Option<Builtin> {
    REGISTRY
        .get_key_value(name)
        .map(|(name, func)| Builtin {
            name: *name,
            func: *func,
        })
}

pub fn names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

fn invalid() -> Object {
    Object::error(INVALID_ARGUMENTS)
}

fn string_arg(args: &[Object], index: usize) -> Option<&str> {
    match args.get(index) {
        Some(Object::String(s)) => Some(s),
        _ => None,
    }
}

fn import(interp: &mut Interpreter<'_>, args: &[Object], env: &Env) -> Object {
    match string_arg(args, 0) {
        Some(name) => interp.import(name, env),
        None => invalid(),
    }
}

/// `update("name", value)`: assigns to an existing binding anywhere in the chain.
fn update(_: &mut Interpreter<'_>, args: &[Object], env: &Env) -> Object {
    let (Some(name), Some(value)) = (string_arg(args, 0), args.get(1)) else {
        return invalid();
    };
    if env.update(name, value.clone()) {
        value.clone()
    } else {
        Object::error(format!("Cannot assign to undeclared name '{}'", name))
    }
}

fn eval(interp: &mut Interpreter<'_>, args: &[Object], env: &Env) -> Object {
    let Some(code) = string_arg(args, 0) else {
        return invalid();
    };
    if !interp.options().allow_eval {
        debug!("eval refused: allow_eval is off");
        return Object::error("allowEval is not allowed");
    }
    interp.eval_source(code, "<eval>", env)
}

fn js(interp: &mut Interpreter<'_>, args: &[Object], _: &Env) -> Object {
    let Some(code) = string_arg(args, 0) else {
        return invalid();
    };
    if !interp.options().allow_javascript {
        debug!("js refused: allow_javascript is off");
        return Object::error("allowJavaScript is not allowed");
    }
    match interp.stdio().eval_host(code) {
        Ok(output) => Object::String(output),
        Err(message) => Object::error(format!("Could not eval JS code: {}", message)),
    }
}

fn joined(args: &[Object]) -> String {
    args.iter().map(Object::stringify).collect()
}

/// Writes every argument, concatenated, with no separator or trailing newline.
fn print(interp: &mut Interpreter<'_>, args: &[Object], _: &Env) -> Object {
    match interp.stdio().write_out(&joined(args)) {
        Ok(()) => Object::Null,
        Err(err) => Object::error(format!("Could not write to stdout: {}", err)),
    }
}

fn print_error(interp: &mut Interpreter<'_>, args: &[Object], _: &Env) -> Object {
    match interp.stdio().write_err(&joined(args)) {
        Ok(()) => Object::Null,
        Err(err) => Object::error(format!("Could not write to stderr: {}", err)),
    }
}

/// Prints an optional prompt, then reads one line. End of input yields `null`.
fn readline(interp: &mut Interpreter<'_>, args: &[Object], _: &Env) -> Object {
    if let Some(prompt) = args.first() {
        if let Err(err) = interp.stdio().write_out(&prompt.stringify()) {
            return Object::error(format!("Could not write to stdout: {}", err));
        }
    }
    match interp.stdio().read_line() {
        Ok(Some(line)) => Object::String(line),
        Ok(None) => Object::Null,
        Err(err) => Object::error(format!("Could not read from stdin: {}", err)),
    }
}

fn length(_: &mut Interpreter<'_>, args: &[Object], _: &Env) -> Object {
    let len = match args.first() {
        Some(Object::Array(elements)) => elements.borrow().len(),
        Some(Object::Hash(hash)) => hash.borrow().len(),
        Some(Object::String(s)) => s.chars().count(),
        _ => return invalid(),
    };
    Object::Number(len as f64)
}

/// Appends the remaining arguments and returns the (shared) array.
fn push(_: &mut Interpreter<'_>, args: &[Object], _: &Env) -> Object {
    match args.split_first() {
        Some((array @ Object::Array(elements), rest)) => {
            elements.borrow_mut().extend(rest.iter().cloned());
            array.clone()
        }
        _ => invalid(),
    }
}

fn pop(_: &mut Interpreter<'_>, args: &[Object], _: &Env) -> Object {
    match args.first() {
        Some(Object::Array(elements)) => elements.borrow_mut().pop().unwrap_or(Object::Null),
        _ => invalid(),
    }
}

fn shift(_: &mut Interpreter<'_>, args: &[Object], _: &Env) -> Object {
    match args.first() {
        Some(Object::Array(elements)) => {
            let mut elements = elements.borrow_mut();
            if elements.is_empty() {
                Object::Null
            } else {
                elements.remove(0)
            }
        }
        _ => invalid(),
    }
}

/// Prepends the remaining arguments, keeping their order, and returns the array.
fn unshift(_: &mut Interpreter<'_>, args: &[Object], _: &Env) -> Object {
    match args.split_first() {
        Some((array @ Object::Array(elements), rest)) => {
            elements.borrow_mut().splice(0..0, rest.iter().cloned());
            array.clone()
        }
        _ => invalid(),
    }
}

/// Resolves a possibly negative bound against `len`, clamped to `0..=len`.
fn bound(value: Option<&Object>, len: usize, default: usize) -> Option<usize> {
    match value {
        None | Some(Object::Null) => Some(default),
        Some(Object::Number(n)) if n.fract() == 0.0 => {
            let len = len as i64;
            let n = *n as i64;
            let resolved = if n < 0 { len + n } else { n };
            Some(resolved.clamp(0, len) as usize)
        }
        _ => None,
    }
}

/// `slice(xs, start, end?)` copies `xs[start..end]` of an array or string.
fn slice(_: &mut Interpreter<'_>, args: &[Object], _: &Env) -> Object {
    match args.first() {
        Some(Object::Array(elements)) => {
            let elements = elements.borrow();
            let len = elements.len();
            let (Some(start), Some(end)) = (bound(args.get(1), len, 0), bound(args.get(2), len, len))
            else {
                return invalid();
            };
            Object::array(elements[start..end.max(start)].to_vec())
        }
        Some(Object::String(s)) => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len();
            let (Some(start), Some(end)) = (bound(args.get(1), len, 0), bound(args.get(2), len, len))
            else {
                return invalid();
            };
            Object::String(chars[start..end.max(start)].iter().collect())
        }
        _ => invalid(),
    }
}

/// Calls the callback with `(element, index, array)`, trimmed to the number of
/// parameters a user function declares. Stops at the first error.
fn for_each(interp: &mut Interpreter<'_>, args: &[Object], env: &Env) -> Object {
    let (Some(array @ Object::Array(elements)), Some(callback)) = (args.first(), args.get(1)) else {
        return invalid();
    };
    let arity = match callback {
        Object::Function(func) => func.params.len().min(3),
        Object::Builtin(_) => 1,
        _ => return Object::error(format!("Not callable: {}", callback.type_name())),
    };

    // Snapshot so the callback may push onto the array it is walking.
    let snapshot: Vec<Object> = elements.borrow().clone();
    for (index, element) in snapshot.into_iter().enumerate() {
        let call_args = vec![element, Object::Number(index as f64), array.clone()];
        let result = interp.call(callback, call_args.into_iter().take(arity).collect(), env);
        if result.is_error() {
            return result;
        }
    }
    Object::Null
}

/// Arguments of the innermost running user function, or of the innermost one
/// named by the optional first argument. Empty outside any call.
fn arguments(interp: &mut Interpreter<'_>, args: &[Object], _: &Env) -> Object {
    let name = match args.first() {
        None => None,
        Some(Object::String(name)) => Some(name.as_str()),
        Some(_) => return invalid(),
    };
    Object::array(interp.arguments(name))
}

fn keys(_: &mut Interpreter<'_>, args: &[Object], _: &Env) -> Object {
    match args.first() {
        Some(Object::Hash(hash)) => {
            Object::array(hash.borrow().iter().map(|(key, _)| key.clone()).collect())
        }
        _ => invalid(),
    }
}

fn stringify(_: &mut Interpreter<'_>, args: &[Object], _: &Env) -> Object {
    match args {
        [value] => Object::String(value.stringify()),
        _ => invalid(),
    }
}

fn new_line(_: &mut Interpreter<'_>, _: &[Object], _: &Env) -> Object {
    Object::string("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{environment::Environment, options::Options, stdio::BufferedStdio};
    use pretty_assertions::assert_eq;

    fn call(name: &str, args: &[Object]) -> Object {
        let options = Options::default().with_std_lib(false);
        let mut stdio = BufferedStdio::new();
        let mut interp = Interpreter::new(&options, &mut stdio);
        let builtin = lookup(name).expect("registered builtin");
        (builtin.func)(&mut interp, args, &Environment::root())
    }

    fn numbers(values: &[f64]) -> Object {
        Object::array(values.iter().map(|n| Object::Number(*n)).collect())
    }

    #[test]
    fn unknown_names_are_absent() {
        assert!(lookup("no_such_builtin").is_none());
        assert!(lookup("import").is_some());
    }

    #[test]
    fn registry_lists_every_native() {
        let names = names();
        for expected in [
            "__builtin__arguments",
            "__builtin_forEach",
            "__builtin_print",
            "__new_line",
            "eval",
            "js",
            "update",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
    }

    #[test]
    fn push_mutates_the_shared_array() {
        let array = numbers(&[1.0]);
        let result = call("__builtin_push", &[array.clone(), Object::Number(2.0)]);
        assert_eq!(result, numbers(&[1.0, 2.0]));
        assert_eq!(array, numbers(&[1.0, 2.0]));
    }

    #[test]
    fn pop_and_shift_take_from_either_end() {
        let array = numbers(&[1.0, 2.0, 3.0]);
        assert_eq!(call("__builtin_pop", &[array.clone()]), Object::Number(3.0));
        assert_eq!(call("__builtin_shift", &[array.clone()]), Object::Number(1.0));
        assert_eq!(array, numbers(&[2.0]));
        assert_eq!(call("__builtin_pop", &[numbers(&[])]), Object::Null);
    }

    #[test]
    fn unshift_keeps_argument_order() {
        let array = numbers(&[3.0]);
        call("__builtin_unshift", &[array.clone(), Object::Number(1.0), Object::Number(2.0)]);
        assert_eq!(array, numbers(&[1.0, 2.0, 3.0]));
    }

    #[test]
    fn slice_supports_negative_and_open_bounds() {
        let array = numbers(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(
            call("__builtin_slice", &[array.clone(), Object::Number(1.0)]),
            numbers(&[2.0, 3.0, 4.0])
        );
        assert_eq!(
            call("__builtin_slice", &[array.clone(), Object::Number(-2.0), Object::Number(10.0)]),
            numbers(&[3.0, 4.0])
        );
        assert_eq!(
            call("__builtin_slice", &[Object::string("hello"), Object::Number(1.0), Object::Number(3.0)]),
            Object::string("el")
        );
    }

    #[test]
    fn length_counts_characters_elements_and_entries() {
        assert_eq!(call("__builtin_length", &[Object::string("héllo")]), Object::Number(5.0));
        assert_eq!(call("__builtin_length", &[numbers(&[1.0, 2.0])]), Object::Number(2.0));
    }

    #[test]
    fn wrong_shapes_are_invalid_arguments() {
        for (name, args) in [
            ("__builtin_push", vec![Object::Number(1.0)]),
            ("__builtin_length", vec![Object::Null]),
            ("__builtin_slice", vec![numbers(&[1.0]), Object::string("x")]),
            ("import", vec![]),
            ("update", vec![Object::string("x")]),
        ] {
            assert_eq!(call(name, &args), Object::error(INVALID_ARGUMENTS), "{}", name);
        }
    }

    #[test]
    fn capability_gates_refuse_by_default() {
        assert_eq!(
            call("eval", &[Object::string("1 + 1")]),
            Object::error("allowEval is not allowed")
        );
        assert_eq!(
            call("js", &[Object::string("1 + 1")]),
            Object::error("allowJavaScript is not allowed")
        );
    }

    #[test]
    fn print_writes_to_the_embedder_streams() {
        let options = Options::default();
        let mut stdio = BufferedStdio::new();
        {
            let mut interp = Interpreter::new(&options, &mut stdio);
            let env = Environment::root();
            print(&mut interp, &[Object::string("a"), Object::Number(1.0)], &env);
            print_error(&mut interp, &[Object::string("bad")], &env);
        }
        assert_eq!(stdio.out(), "a1");
        assert_eq!(stdio.err(), "bad");
    }

    #[test]
    fn readline_returns_null_at_end_of_input() {
        let options = Options::default();
        let mut stdio = BufferedStdio::with_input(["hello"]);
        let mut interp = Interpreter::new(&options, &mut stdio);
        let env = Environment::root();
        assert_eq!(readline(&mut interp, &[], &env), Object::string("hello"));
        assert_eq!(readline(&mut interp, &[], &env), Object::Null);
    }
}
