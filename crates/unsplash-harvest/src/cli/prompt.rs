// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Interactive prompts for inputs missing from the command line.

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Ask until `parse` accepts the answer.
///
/// Returns `None` when the user interrupts (Ctrl+C) or closes stdin.
pub fn ask<T>(question: &str, parse: impl Fn(&str) -> Result<T, String>) -> Result<Option<T>> {
    let mut rl = DefaultEditor::new()?;
    loop {
        match rl.readline(question) {
            Ok(line) => match parse(&line) {
                Ok(value) => return Ok(Some(value)),
                Err(msg) => eprintln!("  {msg}"),
            },
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
    }
}

pub fn ask_query() -> Result<Option<String>> {
    ask("Enter search query (e.g. cat, nature): ", parse_query)
}

pub fn ask_count() -> Result<Option<usize>> {
    ask("How many images do you want to download? ", parse_count)
}

pub fn parse_query(input: &str) -> Result<String, String> {
    let query = input.trim();
    if query.is_empty() {
        return Err("Query cannot be empty.".to_string());
    }
    Ok(query.to_string())
}

pub fn parse_count(input: &str) -> Result<usize, String> {
    match input.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err("Please enter a positive number.".to_string()),
        Err(_) => Err("Please enter a valid number.".to_string()),
    }
}
