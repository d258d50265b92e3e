//! Console output for transfer and archive runs.
//!
//! Prefixed status lines are colored only when their destination stream
//! is a TTY; piped output stays plain. Progress lines and primary
//! results go through [`print_user`]/[`print_progress`] unprefixed, so
//! scripts can consume them.

use owo_colors::OwoColorize;

fn stdout_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

fn stderr_tty() -> bool {
    atty::is(atty::Stream::Stderr)
}

pub fn print_info(msg: &str) {
    if stdout_tty() {
        println!("{} {}", "info:".cyan().bold(), msg);
    } else {
        println!("info: {}", msg);
    }
}

pub fn print_warn(msg: &str) {
    if stderr_tty() {
        eprintln!("{} {}", "warn:".yellow().bold(), msg);
    } else {
        eprintln!("warn: {}", msg);
    }
}

pub fn print_error(msg: &str) {
    if stderr_tty() {
        eprintln!("{} {}", "error:".red().bold(), msg);
    } else {
        eprintln!("error: {}", msg);
    }
}

pub fn print_success(msg: &str) {
    if stdout_tty() {
        println!("{} {}", "ok:".green().bold(), msg);
    } else {
        println!("ok: {}", msg);
    }
}

/// Plain unprefixed line, for primary outputs such as "Copied X -> Y".
pub fn print_user(msg: &str) {
    println!("{}", msg);
}

/// One periodic report line: percent, cumulative KiB, current rate.
pub fn print_progress(percent: f32, bytes_moved: u64, write_speed: u64) {
    println!("{}", progress_line(percent, bytes_moved, write_speed));
}

fn progress_line(percent: f32, bytes_moved: u64, write_speed: u64) -> String {
    format!(
        "{:>5.1}%  {} KiB  ({} KiB/s)",
        percent,
        bytes_moved / 1024,
        write_speed / 1024
    )
}
