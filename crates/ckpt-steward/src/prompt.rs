use std::collections::VecDeque;
use std::io::{BufRead, Write};

use crate::error::{Error, Result};

/// The only answer that confirms a phase.
pub const AFFIRMATIVE: &str = "yes";

pub trait Prompt {
    /// Asks `question` and returns the raw answer, `None` at end of input.
    fn ask(&mut self, question: &str) -> Result<Option<String>>;

    fn confirm(&mut self, question: &str) -> Result<bool> {
        Ok(self
            .ask(question)?
            .is_some_and(|a| is_affirmative(&a)))
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    answer == AFFIRMATIVE
}

/// Reads answers line by line, writing questions to `out`.
pub struct LinePrompt<R, W> {
    input: R,
    out: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, out: W) -> Self {
        Self { input, out }
    }
}

impl LinePrompt<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdin() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompt for LinePrompt<R, W> {
    fn ask(&mut self, question: &str) -> Result<Option<String>> {
        write!(self.out, "{question} Type \"{AFFIRMATIVE}\" to continue: ")?;
        self.out.flush()?;
        let mut line = String::new();
        let n = self
            .input
            .read_line(&mut line)
            .map_err(|e| Error::msg(format!("failed to read answer: {e}")))?;
        if n == 0 {
            writeln!(self.out)?;
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Answers every question with the affirmative token (`--yes`).
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Prompt for AssumeYes {
    fn ask(&mut self, question: &str) -> Result<Option<String>> {
        tracing::info!(question, "auto-confirmed");
        Ok(Some(AFFIRMATIVE.to_string()))
    }
}

/// Replays canned answers and records the questions asked.
#[derive(Debug, Default, Clone)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    pub asked: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, question: &str) -> Result<Option<String>> {
        self.asked.push(question.to_string());
        Ok(self.answers.pop_front())
    }
}
