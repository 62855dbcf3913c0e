//! Interactive operator console
//!
//! Stdin is read on a background thread so prompts can also be interrupted
//! with Ctrl+C. A recording waits on [`Console::wait_for_stop`], which returns
//! on either an affirmative answer or an interrupt.

use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// Interval between interrupt checks while waiting for input
const POLL: Duration = Duration::from_millis(100);

/// One outcome of waiting for operator input
enum Input {
    Line(String),
    Interrupted,
    Closed,
}

pub struct Console {
    lines: Receiver<io::Result<String>>,
    interrupted: Arc<AtomicBool>,
}

impl Console {
    /// Install the Ctrl+C handler and start the stdin reader
    pub fn new() -> Result<Self> {
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .context("Failed to install Ctrl+C handler")?;

        let (tx, lines) = mpsc::channel();
        std::thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })
            .context("Failed to spawn stdin reader")?;

        Ok(Self { lines, interrupted })
    }

    fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    fn read(&self, question: &str) -> Result<Input> {
        print!("{question}");
        io::stdout().flush()?;
        loop {
            if self.take_interrupt() {
                println!();
                return Ok(Input::Interrupted);
            }
            match self.lines.recv_timeout(POLL) {
                Ok(line) => return Ok(Input::Line(line?.trim().to_string())),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(Input::Closed),
            }
        }
    }

    /// Ask until a non-empty value is entered
    pub fn prompt(&self, label: &str) -> Result<String> {
        loop {
            match self.read(&format!("{label}: "))? {
                Input::Line(value) if !value.is_empty() => return Ok(value),
                Input::Line(_) => continue,
                Input::Interrupted => bail!("Interrupted"),
                Input::Closed => bail!("No value given for '{label}'"),
            }
        }
    }

    /// Yes/no question; an interrupt or closed stdin counts as no
    pub fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            match self.read(&format!("{question} {hint} "))? {
                Input::Line(answer) => match parse_answer(&answer) {
                    Some(yes) => return Ok(yes),
                    None if answer.is_empty() => return Ok(default),
                    None => println!("Please answer y or n."),
                },
                Input::Interrupted | Input::Closed => return Ok(false),
            }
        }
    }

    /// Block until the operator asks to stop or presses Ctrl+C
    pub fn wait_for_stop(&self) -> Result<()> {
        loop {
            match self.read("Stop the recording? [y/N] ")? {
                Input::Line(answer) if parse_answer(&answer) == Some(true) => return Ok(()),
                Input::Line(_) => continue,
                Input::Interrupted => return Ok(()),
                Input::Closed => {
                    // Nothing left on stdin, only Ctrl+C can end the recording
                    while !self.take_interrupt() {
                        std::thread::sleep(POLL);
                    }
                    println!();
                    return Ok(());
                }
            }
        }
    }
}

fn parse_answer(answer: &str) -> Option<bool> {
    match answer.to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y"), Some(true));
        assert_eq!(parse_answer("YES"), Some(true));
        assert_eq!(parse_answer("n"), Some(false));
        assert_eq!(parse_answer(""), None);
        assert_eq!(parse_answer("maybe"), None);
    }
}
