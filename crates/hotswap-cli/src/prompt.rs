use std::io::{self, BufRead, Write};

/// Yes/no questions asked during an interactive run.
pub trait Prompter {
    fn confirm(&self, question: &str) -> bool;
}

/// Asks on stderr and reads the answer from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, question: &str) -> bool {
        let mut stderr = io::stderr();
        if write!(stderr, "{question} [y/N] ").and_then(|()| stderr.flush()).is_err() {
            return false;
        }

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => {
                let accepted = parse_answer(&answer);
                tracing::info!(question, accepted, "prompt answered");
                accepted
            }
            Err(err) => {
                tracing::warn!("failed to read prompt answer: {err}");
                false
            }
        }
    }
}

/// Declines every question. Used in CI mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessPrompter;

impl Prompter for HeadlessPrompter {
    fn confirm(&self, question: &str) -> bool {
        tracing::info!(question, "declining prompt in headless mode");
        false
    }
}

pub fn parse_answer(answer: &str) -> bool {
    matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    )
}
