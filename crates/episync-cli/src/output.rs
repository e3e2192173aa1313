use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde_json::json;
use std::io::IsTerminal;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    #[value(name = "json-pretty")]
    JsonPretty,
}

pub struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    pub fn is_human(&self) -> bool {
        self.format == OutputFormat::Human
    }

    pub fn success(&self, msg: impl AsRef<str>) {
        self.message("success", msg.as_ref(), |m| println!("{} {}", "✓".green(), m));
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.message("info", msg.as_ref(), |m| println!("{}", m));
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.message("warning", msg.as_ref(), |m| println!("{} {}", "⚠".yellow(), m));
    }

    /// Errors are printed even in quiet mode
    pub fn error(&self, msg: impl AsRef<str>) {
        match self.format {
            OutputFormat::Human => eprintln!("{} {}", "✗".red(), msg.as_ref()),
            _ => self.print_json(&json!({ "type": "error", "message": msg.as_ref() })),
        }
    }

    fn message(&self, kind: &str, msg: &str, human: impl FnOnce(&str)) {
        if self.quiet {
            return;
        }
        match self.format {
            OutputFormat::Human => human(msg),
            _ => self.print_json(&json!({ "type": kind, "message": msg })),
        }
    }

    /// Structured result of a command; ignored in human mode
    pub fn json(&self, data: &serde_json::Value) {
        if self.is_human() {
            return;
        }
        self.print_json(data);
    }

    /// Render rows as a table in human mode
    pub fn table<I, R>(&self, header: &[&str], rows: I)
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = String>,
    {
        if self.quiet || !self.is_human() {
            return;
        }
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(header.iter().map(|h| Cell::new(h).add_attribute(Attribute::Bold)));
        for row in rows {
            table.add_row(row.into_iter().collect::<Vec<_>>());
        }
        println!("{table}");
    }

    /// Spinner for a long step; `None` unless a human is watching a terminal
    pub fn spinner(&self, msg: impl Into<String>) -> Option<ProgressBar> {
        if self.quiet || !self.is_human() || !std::io::stdout().is_terminal() {
            return None;
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        spinner.set_message(msg.into());
        spinner.enable_steady_tick(Duration::from_millis(100));
        Some(spinner)
    }

    fn print_json(&self, data: &serde_json::Value) {
        match self.format {
            OutputFormat::JsonPretty => {
                println!("{}", serde_json::to_string_pretty(data).unwrap_or_default())
            }
            _ => println!("{}", serde_json::to_string(data).unwrap_or_default()),
        }
    }
}

/// Mask a secret for display, keeping two characters at each end
pub fn mask(secret: &str) -> String {
    if secret.is_empty() || secret.starts_with("YOUR_") {
        return "<not set>".to_string();
    }
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}
