use std::io::IsTerminal;
use std::sync::Arc;

use anstyle::{AnsiColor, Effects, Style};
use tuffix_core::{Keyword, KEYWORD_MAX_LENGTH};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(
        std::io::stdout().is_terminal(),
        std::env::var_os("NO_COLOR").is_some(),
    )
}

pub(crate) fn stderr_output_style() -> OutputStyle {
    resolve_output_style(
        std::io::stderr().is_terminal(),
        std::env::var_os("NO_COLOR").is_some(),
    )
}

pub(crate) fn resolve_output_style(is_terminal: bool, no_color: bool) -> OutputStyle {
    if is_terminal && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

/// One line of command output; rich output carries a colored badge.
pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!(
            "{} {message}",
            colorize(status_style(status), status_badge(status))
        ),
    }
}

pub(crate) fn render_section_header(style: OutputStyle, title: &str) -> String {
    match style {
        OutputStyle::Plain => format!("{title}:"),
        OutputStyle::Rich => colorize(section_style(), &format!("== {title} ==")),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "info" => "[INFO]",
        "warn" => "[WARN]",
        "error" => "[ERR]",
        _ => "[..]",
    }
}

fn status_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::Green,
        "warn" => AnsiColor::Yellow,
        "error" => AnsiColor::Red,
        _ => AnsiColor::Cyan,
    };
    Style::new()
        .fg_color(Some(color.into()))
        .effects(Effects::BOLD)
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

pub(crate) fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

pub(crate) fn format_keyword_line(keyword: &dyn Keyword) -> String {
    format!(
        "{:<width$}   {}",
        keyword.name(),
        keyword.description(),
        width = KEYWORD_MAX_LENGTH
    )
}

pub(crate) fn format_keyword_lines(keywords: &[Arc<dyn Keyword>]) -> Vec<String> {
    keywords
        .iter()
        .map(|keyword| format_keyword_line(keyword.as_ref()))
        .collect()
}

pub(crate) fn format_describe_line(keyword: &dyn Keyword) -> String {
    format!("{}: {}", keyword.name(), keyword.description())
}

pub(crate) fn format_installed_lines(installed: &[String], style: OutputStyle) -> Vec<String> {
    if installed.is_empty() {
        return vec![render_status_line(
            style,
            "info",
            "No keywords are installed",
        )];
    }

    let mut lines = Vec::with_capacity(installed.len() + 1);
    lines.push(render_status_line(
        style,
        "info",
        "Tuffix installed keywords:",
    ));
    lines.extend(installed.iter().cloned());
    lines
}

pub(crate) fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}
