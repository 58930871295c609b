//! Operator prompts used during install.
//!
//! The orchestrator only talks to the [`Prompter`] trait so tests and
//! unattended runs can feed answers from a script instead of a terminal.

use std::collections::VecDeque;

use dialoguer::{Confirm, Input, Password, console::Term};

/// Source of operator answers.
pub trait Prompter: Send {
    /// Free-form text, trimmed.
    fn text(&mut self, prompt: &str) -> dialoguer::Result<String>;
    /// Hidden input (e.g. keys).
    fn secret(&mut self, prompt: &str) -> dialoguer::Result<String>;
    /// Yes/no question; `default` is used when the operator just hits enter.
    fn confirm(
        &mut self,
        prompt: &str,
        default: bool,
    ) -> dialoguer::Result<bool>;
}

/// Interactive prompter on stderr, so stdout stays clean for piping.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn text(&mut self, prompt: &str) -> dialoguer::Result<String> {
        let value: String = Input::new()
            .with_prompt(prompt)
            .interact_text_on(&Term::stderr())?;
        Ok(value.trim().to_string())
    }

    fn secret(&mut self, prompt: &str) -> dialoguer::Result<String> {
        Password::new()
            .with_prompt(prompt)
            .allow_empty_password(false)
            .interact_on(&Term::stderr())
    }

    fn confirm(
        &mut self,
        prompt: &str,
        default: bool,
    ) -> dialoguer::Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact_on(&Term::stderr())
    }
}

/// One pre-recorded answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Answer to a text or secret prompt.
    Text(String),
    /// Answer to a yes/no prompt.
    Confirm(bool),
}

/// Prompter that replays answers in order and records what was asked.
///
/// An exhausted script answers text prompts with an empty string and
/// confirmations with their default.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<Answer>,
    asked: Vec<String>,
}

impl ScriptedPrompter {
    /// Replay `answers` in order.
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    /// Prompts shown so far, in order.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }

    fn next_text(&mut self, prompt: &str) -> String {
        self.asked.push(prompt.to_string());
        match self.answers.pop_front() {
            Some(Answer::Text(value)) => value.trim().to_string(),
            Some(Answer::Confirm(value)) => value.to_string(),
            None => String::new(),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn text(&mut self, prompt: &str) -> dialoguer::Result<String> {
        Ok(self.next_text(prompt))
    }

    fn secret(&mut self, prompt: &str) -> dialoguer::Result<String> {
        Ok(self.next_text(prompt))
    }

    fn confirm(
        &mut self,
        prompt: &str,
        default: bool,
    ) -> dialoguer::Result<bool> {
        self.asked.push(prompt.to_string());
        Ok(match self.answers.pop_front() {
            Some(Answer::Confirm(value)) => value,
            Some(Answer::Text(raw)) => {
                crate::cli::parse_yes_no(&raw).unwrap_or(default)
            }
            None => default,
        })
    }
}
