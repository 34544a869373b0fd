//! Interactive subject questions.

use std::io::{self, BufRead, Write};

use crate::error::CliError;

/// Source of answers to subject questions.
pub trait Prompter {
    /// Asks one question and returns the answer without its line ending.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Prompt`] when input ends before an answer.
    fn ask(&mut self, question: &str) -> Result<String, CliError>;

    /// Asks each question in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failed question.
    fn ask_all(&mut self, questions: &[&str]) -> Result<Vec<String>, CliError> {
        questions.iter().map(|question| self.ask(question)).collect()
    }
}

/// Writes each question to `output` and reads one line from `input`.
#[derive(Debug)]
pub struct LinePrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    /// Create a prompter over the given streams.
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl LinePrompter<io::StdinLock<'static>, io::Stderr> {
    /// Prompter reading stdin and asking on stderr, leaving stdout for artifacts.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn ask(&mut self, question: &str) -> Result<String, CliError> {
        write!(self.output, "{question}: ")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(CliError::Prompt(format!("no answer for '{question}'")));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_one_line_per_question() {
        let input = b"svc.local, 10.0.0.1\r\nNZ\n\n".as_slice();
        let mut output = Vec::new();
        let mut prompter = LinePrompter::new(input, &mut output);

        let answers = prompter.ask_all(&["Common Name", "Country", "Province"]).unwrap();
        assert_eq!(answers, vec!["svc.local, 10.0.0.1", "NZ", ""]);

        let shown = String::from_utf8(output).unwrap();
        assert_eq!(shown, "Common Name: Country: Province: ");
    }

    #[test]
    fn end_of_input_is_an_error() {
        let mut prompter = LinePrompter::new(b"only one\n".as_slice(), io::sink());
        let err = prompter.ask_all(&["First", "Second"]).unwrap_err();
        assert!(matches!(err, CliError::Prompt(msg) if msg.contains("Second")));
    }
}
