// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal decision presenter: a banner for forced purges, a y/N prompt
//! for skippable ones.

use std::io::{BufRead, IsTerminal, Write};

use async_trait::async_trait;
use vigil_core::{Decision, DecisionPresenter, InvalidationRecord, VigilError};

pub struct TerminalPresenter {
    use_color: bool,
}

impl TerminalPresenter {
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    /// Colors only when stdout is a terminal.
    pub fn detect() -> Self {
        Self::new(std::io::stdout().is_terminal())
    }

    fn banner(&self, record: &InvalidationRecord, skippable: bool) -> String {
        let title = if skippable {
            "Update available"
        } else {
            "Your session needs to be refreshed"
        };
        let reason = record
            .reason
            .as_deref()
            .unwrap_or("Cached data on this device is out of date.");
        let scope = format!("clears: {}", record.clear_type);

        if self.use_color {
            use colored::Colorize;
            format!(
                "\n  {} {}\n    {}\n    {}\n",
                "!".yellow().bold(),
                title.bold(),
                reason,
                scope.dimmed()
            )
        } else {
            format!("\n  [!] {title}\n    {reason}\n    {scope}\n")
        }
    }
}

/// `y`/`yes` accepts; anything else, including an empty line, defers.
pub fn parse_answer(line: &str) -> Decision {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Decision::Accept,
        _ => Decision::Defer,
    }
}

#[async_trait]
impl DecisionPresenter for TerminalPresenter {
    async fn show_notice(&self, record: &InvalidationRecord) -> Result<(), VigilError> {
        println!("{}", self.banner(record, false));
        println!("    You will be signed out now.");
        Ok(())
    }

    async fn ask_choice(&self, record: &InvalidationRecord) -> Result<Decision, VigilError> {
        if !std::io::stdin().is_terminal() {
            return Err(VigilError::Presentation("stdin is not a terminal".into()));
        }
        println!("{}", self.banner(record, true));

        let line = tokio::task::spawn_blocking(|| {
            print!("    Sign out and refresh now? [y/N] ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok::<_, std::io::Error>(line)
        })
        .await
        .map_err(|e| VigilError::Presentation(format!("prompt task failed: {e}")))?
        .map_err(|e| VigilError::Presentation(format!("failed to read answer: {e}")))?;

        Ok(parse_answer(&line))
    }
}
