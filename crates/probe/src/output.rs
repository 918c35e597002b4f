//! Console rendering for check results.

use serde::Serialize;
use std::io::IsTerminal;

const HEADER: &str = "\x1b[95m";
const BLUE: &str = "\x1b[94m";
const CYAN: &str = "\x1b[96m";
const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const RED: &str = "\x1b[91m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

const RULE_WIDTH: usize = 60;
const NAME_WIDTH: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct Console {
    color: bool,
}

impl Console {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Color only when stdout is a terminal and it was not turned off.
    pub fn detect(no_color: bool) -> Self {
        Self::new(!no_color && std::io::stdout().is_terminal())
    }

    fn paint(&self, codes: &str, text: &str) -> String {
        if self.color {
            format!("{codes}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    pub fn banner(&self, title: &str) {
        let inner = RULE_WIDTH - 1;
        let top = format!("╔{}╗", "═".repeat(inner));
        let middle = format!("║{:^width$}║", title, width = inner);
        let bottom = format!("╚{}╝", "═".repeat(inner));
        println!();
        for line in [top, middle, bottom] {
            println!("{}", self.paint(&format!("{BOLD}{HEADER}"), &line));
        }
        println!();
    }

    pub fn section(&self, title: &str) {
        let rule = "=".repeat(RULE_WIDTH);
        let style = format!("{HEADER}{BOLD}");
        println!();
        println!("{}", self.paint(&style, &rule));
        println!("{}", self.paint(&style, &format!("🧪 {title}")));
        println!("{}", self.paint(&style, &rule));
        println!();
    }

    pub fn success(&self, msg: &str) {
        println!("{}", self.success_line(msg));
    }

    pub fn error(&self, msg: &str) {
        println!("{}", self.error_line(msg));
    }

    pub fn info(&self, msg: &str) {
        println!("{}", self.paint(CYAN, &format!("ℹ️  {msg}")));
    }

    pub fn warning(&self, msg: &str) {
        println!("{}", self.paint(YELLOW, &format!("⚠️  {msg}")));
    }

    pub fn item(&self, text: &str) {
        println!("  - {text}");
    }

    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", self.paint(BLUE, &text)),
            Err(e) => self.error(&format!("Could not render JSON: {e}")),
        }
    }

    /// Print a body as pretty JSON when it parses, verbatim otherwise.
    pub fn body(&self, body: &str) {
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) => self.json(&value),
            Err(_) => println!("{}", self.paint(BLUE, body.trim())),
        }
    }

    pub fn summary(&self, results: &[(&str, bool)]) {
        self.banner("Test Summary");
        for (name, passed) in results {
            println!("{}", self.summary_line(name, *passed));
        }
        println!();

        let passed = results.iter().filter(|(_, ok)| *ok).count();
        let total = results.len();
        if passed == total {
            self.success(&format!("All tests passed! ({passed}/{total})"));
        } else {
            self.error(&format!("Some tests failed ({passed}/{total} passed)"));
        }
    }

    fn success_line(&self, msg: &str) -> String {
        self.paint(GREEN, &format!("✅ {msg}"))
    }

    fn error_line(&self, msg: &str) -> String {
        self.paint(RED, &format!("❌ {msg}"))
    }

    fn summary_line(&self, name: &str, passed: bool) -> String {
        let status = if passed {
            self.paint(GREEN, "✅ PASS")
        } else {
            self.paint(RED, "❌ FAIL")
        };
        format!("  {name:.<width$} {status}", width = NAME_WIDTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_output_has_no_escapes() {
        let console = Console::new(false);
        assert_eq!(console.success_line("ok"), "✅ ok");
        assert_eq!(console.error_line("bad"), "❌ bad");
    }

    #[test]
    fn test_colored_output_wraps_text() {
        let console = Console::new(true);
        assert_eq!(console.success_line("ok"), "\x1b[92m✅ ok\x1b[0m");
    }

    #[test]
    fn test_summary_line_pads_name() {
        let console = Console::new(false);
        let line = console.summary_line("Health Check", true);

        assert!(line.starts_with("  Health Check......"));
        assert!(line.ends_with(" ✅ PASS"));
        assert_eq!(line.chars().count(), 2 + NAME_WIDTH + 1 + "✅ PASS".chars().count());

        let failed = console.summary_line("SSE Connection", false);
        assert!(failed.ends_with("❌ FAIL"));
    }
}
