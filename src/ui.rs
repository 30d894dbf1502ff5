use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use terminal_size::{Width, Height, terminal_size};

use crate::auth::SessionState;

pub fn print_header(title: &str) {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    let line = "─".repeat(width.0 as usize);
    println!("{}", line.black().bold());

    let name = "navcharts".cyan().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  {} {}  •  {}", name, version, title);

    println!("{}", line.black().bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}

pub fn state_label(state: SessionState) -> ColoredString {
    match state {
        SessionState::LoggedIn => "logged in".green(),
        SessionState::LoggedOut => "logged out".yellow(),
        SessionState::AwaitingCallback => "waiting for browser".cyan(),
        SessionState::Refreshing => "refreshing".cyan(),
    }
}

/// Spinner shown while waiting on the browser or the network
pub fn spinner(msg: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("  {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(msg.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Run `handler` on Ctrl+C. Only the first registration in a process takes
/// effect; a failure is logged and reported as `false`.
pub fn on_interrupt<F>(handler: F) -> bool
where
    F: FnMut() + Send + 'static,
{
    match ctrlc::set_handler(handler) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            false
        }
    }
}
