//! Password sources consulted when a document rejects the configured password.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Supplies replacement passwords on demand.
pub trait CredentialProvider {
    /// Returns a new password for `attempt` (1-based), or `None` when no
    /// further credential can be obtained.
    fn request_password(&mut self, attempt: u32) -> io::Result<Option<String>>;
}

/// Never supplies a password; used for non-interactive runs.
#[derive(Debug, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn request_password(&mut self, _attempt: u32) -> io::Result<Option<String>> {
        Ok(None)
    }
}

/// Hands out a fixed sequence of passwords.
#[derive(Debug, Default)]
pub struct FixedCredentials {
    passwords: VecDeque<String>,
    requests: u32,
}

impl FixedCredentials {
    pub fn new<I, S>(passwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            passwords: passwords.into_iter().map(Into::into).collect(),
            requests: 0,
        }
    }

    /// Number of times a password was requested.
    pub fn requests(&self) -> u32 {
        self.requests
    }
}

impl CredentialProvider for FixedCredentials {
    fn request_password(&mut self, _attempt: u32) -> io::Result<Option<String>> {
        self.requests += 1;
        Ok(self.passwords.pop_front())
    }
}

/// Prompts on the console. Input is echoed; an empty line gives up.
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl ConsolePrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Asks `question`, offering `default` when the answer is blank.
    pub fn ask(&mut self, question: &str, default: Option<&str>) -> io::Result<Option<String>> {
        match default {
            Some(default) if !default.is_empty() => {
                write!(self.output, "{question} [{default}]: ")?
            }
            _ => write!(self.output, "{question}: ")?,
        }
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(default.map(str::to_string).filter(|value| !value.is_empty()));
        }
        let answer = line.trim_end_matches(['\r', '\n']);
        if answer.trim().is_empty() {
            Ok(default.map(str::to_string).filter(|value| !value.is_empty()))
        } else {
            Ok(Some(answer.to_string()))
        }
    }
}

impl<R: BufRead, W: Write> CredentialProvider for ConsolePrompt<R, W> {
    fn request_password(&mut self, attempt: u32) -> io::Result<Option<String>> {
        self.ask(
            &format!("Password rejected. Enter password (attempt {attempt})"),
            None,
        )
    }
}
