use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Terminal access handed to builtins. The evaluator itself never touches it.
pub trait Stdio {
    /// Next input line without its line terminator, or `None` at end of input.
    fn read_line(&mut self) -> io::Result<Option<String>>;

    fn write_out(&mut self, text: &str) -> io::Result<()>;

    fn write_err(&mut self, text: &str) -> io::Result<()>;

    /// Host-native escape hatch behind the `js` builtin. Hosts without one
    /// keep the default, which refuses.
    fn eval_host(&mut self, code: &str) -> Result<String, String> {
        let _ = code;
        Err("no host evaluator is available".to_string())
    }
}

/// The process's own stdin, stdout and stderr.
#[derive(Debug, Default)]
pub struct StdStreams;

impl StdStreams {
    pub fn new() -> Self {
        Self
    }
}

impl Stdio for StdStreams {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(trim_line_end(line)))
    }

    fn write_out(&mut self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()
    }

    fn write_err(&mut self, text: &str) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        stderr.write_all(text.as_bytes())?;
        stderr.flush()
    }
}

/// In-memory streams: queued input lines and captured output, for embedding and tests.
#[derive(Debug, Default)]
pub struct BufferedStdio {
    input: VecDeque<String>,
    out: String,
    err: String,
}

impl BufferedStdio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn out(&self) -> &str {
        &self.out
    }

    pub fn err(&self) -> &str {
        &self.err
    }
}

impl Stdio for BufferedStdio {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.input.pop_front())
    }

    fn write_out(&mut self, text: &str) -> io::Result<()> {
        self.out.push_str(text);
        Ok(())
    }

    fn write_err(&mut self, text: &str) -> io::Result<()> {
        self.err.push_str(text);
        Ok(())
    }
}

fn trim_line_end(mut line: String) -> String {
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_stdio_replays_input_and_captures_output() -> io::Result<()> {
        let mut stdio = BufferedStdio::with_input(["first", "second"]);
        assert_eq!(stdio.read_line()?, Some("first".to_string()));
        assert_eq!(stdio.read_line()?, Some("second".to_string()));
        assert_eq!(stdio.read_line()?, None);

        stdio.write_out("a")?;
        stdio.write_out("b")?;
        stdio.write_err("oops")?;
        assert_eq!(stdio.out(), "ab");
        assert_eq!(stdio.err(), "oops");
        Ok(())
    }

    #[test]
    fn host_evaluation_is_refused_by_default() {
        let mut stdio = BufferedStdio::new();
        assert!(stdio.eval_host("1 + 1").is_err());
    }

    #[test]
    fn line_terminators_are_trimmed() {
        assert_eq!(trim_line_end("abc\r\n".to_string()), "abc");
        assert_eq!(trim_line_end("abc".to_string()), "abc");
    }
}
