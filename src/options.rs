use std::path::PathBuf;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 4096;

/// Read-only interpreter configuration threaded through every evaluation.
#[derive(Debug, Clone)]
pub struct Options {
    /// Lets the `eval` builtin run a string as code in the current environment.
    pub allow_eval: bool,
    /// Lets the `js` builtin hand code to the host through [`crate::Stdio::eval_host`].
    pub allow_javascript: bool,
    /// Imports `@std/lib` into the root environment before the first statement.
    pub use_std_lib_automatically: bool,
    /// Presentation only: consumed by [`crate::error::format_error`].
    pub stderr_prefix: bool,
    /// Presentation only: consumed by [`crate::error::format_error`].
    pub stderr_color: bool,
    /// Cooperative budget of loop iterations and function calls. `None` is unbounded.
    pub max_steps: Option<u64>,
    pub max_call_depth: usize,
    /// Directory that relative module names resolve against.
    pub module_dir: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            allow_eval: false,
            allow_javascript: false,
            use_std_lib_automatically: true,
            stderr_prefix: true,
            stderr_color: true,
            max_steps: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            module_dir: None,
        }
    }
}

impl Options {
    pub fn with_allow_eval(mut self, allow: bool) -> Self {
        self.allow_eval = allow;
        self
    }

    pub fn with_allow_javascript(mut self, allow: bool) -> Self {
        self.allow_javascript = allow;
        self
    }

    pub fn with_std_lib(mut self, automatically: bool) -> Self {
        self.use_std_lib_automatically = automatically;
        self
    }

    pub fn with_stderr_prefix(mut self, prefix: bool) -> Self {
        self.stderr_prefix = prefix;
        self
    }

    pub fn with_stderr_color(mut self, color: bool) -> Self {
        self.stderr_color = color;
        self
    }

    pub fn with_max_steps(mut self, steps: Option<u64>) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_module_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.module_dir = Some(dir.into());
        self
    }
}
