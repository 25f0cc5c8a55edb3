//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `annotrack_core` linkage.
//! - Supply the console implementation of the prompt capability the core
//!   consumes; the core itself never touches stdin/stdout.

use annotrack_core::Prompter;
use std::io::{BufRead, Write};

/// Console-backed prompt capability for interactive grading sessions.
struct ConsolePrompter;

impl Prompter for ConsolePrompter {
    fn ask(&mut self, message: &str) -> String {
        print!("{message}");
        let _ = std::io::stdout().flush();
        let mut reply = String::new();
        let _ = std::io::stdin().lock().read_line(&mut reply);
        reply.trim_end_matches(['\n', '\r']).to_string()
    }

    fn notify(&mut self, message: &str) {
        println!("{message}");
    }
}

fn main() {
    println!("annotrack_core ping={}", annotrack_core::ping());
    println!("annotrack_core version={}", annotrack_core::core_version());

    // Quick manual check of the double-entry capture protocol against a
    // real terminal.
    if std::env::args().any(|arg| arg == "--capture-demo") {
        let mut prompter = ConsolePrompter;
        let decision =
            annotrack_core::capture_grade(&mut prompter, annotrack_core::CaptureOptions::default());
        println!("captured decision: {decision:?}");
    }
}
