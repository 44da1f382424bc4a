//! dbwin - shows debug output (`OutputDebugString`) from every process in the session

mod filter;
#[cfg(windows)]
mod process;

use clap::Parser;
use colored::Colorize;
use dbwin_shared::TextEncoding;
use filter::IgnoreSet;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[cfg_attr(not(windows), allow(dead_code))]
#[command(name = "dbwin")]
#[command(about = "Debug output monitor - prints OutputDebugString text from other processes")]
#[command(version)]
struct Args {
    /// Watch the system-wide channel (services, other sessions) instead of this session
    #[arg(short, long)]
    global: bool,

    /// Only show messages from this process ID
    #[arg(short, long)]
    pid: Option<i32>,

    /// Only show messages from processes whose name contains this (case-insensitive)
    #[arg(short, long)]
    name: Option<String>,

    /// Hide messages matching this glob pattern (repeatable)
    #[arg(short, long = "ignore", value_name = "GLOB")]
    ignore: Vec<String>,

    /// Read ignore patterns from a file, one per line
    #[arg(long, value_name = "PATH")]
    ignore_file: Option<PathBuf>,

    /// Decode text as UTF-8 instead of the system ANSI code page
    #[arg(long, conflicts_with = "codepage")]
    utf8: bool,

    /// Decode text with this Windows code page (e.g. 1252, 932)
    #[arg(long, value_name = "CP")]
    codepage: Option<u32>,

    /// Send TEXT to the channel and exit
    #[arg(long, value_name = "TEXT")]
    send: Option<String>,

    /// Log channel events (honours RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn encoding(&self) -> TextEncoding {
        match (self.utf8, self.codepage) {
            (true, _) => TextEncoding::Utf8,
            (false, Some(cp)) => TextEncoding::CodePage(cp),
            (false, None) => TextEncoding::Ansi,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose {
        init_tracing();
    }

    print_banner();

    let ignore = match IgnoreSet::build(&args.ignore, args.ignore_file.as_deref()) {
        Ok(set) => set,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red(), e);
            return ExitCode::FAILURE;
        }
    };

    run(&args, &ignore)
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dbwin_shared=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_banner() {
    println!();
    println!("{}", "DBWIN".cyan().bold());
    println!("{}", "Debug output monitor".white());
    println!();
}

#[cfg(not(windows))]
fn run(_args: &Args, _ignore: &IgnoreSet) -> ExitCode {
    eprintln!(
        "{} The debug output channel only exists on Windows",
        "[ERROR]".red()
    );
    ExitCode::FAILURE
}

#[cfg(windows)]
fn run(args: &Args, ignore: &IgnoreSet) -> ExitCode {
    if let Some(ref text) = args.send {
        return send(text);
    }
    watch(args, ignore)
}

#[cfg(windows)]
fn send(text: &str) -> ExitCode {
    match dbwin_shared::emit::output_debug_string(text) {
        Ok(()) => {
            println!("{} Sent {} bytes", "[OK]".green(), text.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(windows)]
fn watch(args: &Args, ignore: &IgnoreSet) -> ExitCode {
    use dbwin_shared::{CancelSignal, Error, Observer, ObserverConfig, Scope};
    use std::time::Instant;

    let scope = if args.global {
        Scope::Global
    } else {
        Scope::Session
    };

    println!("{} Attaching to {} debug output...", "[INFO]".blue(), scope);
    let mut observer = Observer::with_config(ObserverConfig {
        scope,
        encoding: args.encoding(),
    });

    if let Some(reason) = observer.detach_reason() {
        eprintln!("{} Could not attach: {}", "[ERROR]".red(), reason);
        eprintln!("Close any other debug output monitor or debugger and try again.");
        if scope == Scope::Global {
            eprintln!("The global channel also requires running as administrator.");
        }
        return ExitCode::FAILURE;
    }

    let cancel = match CancelSignal::new() {
        Ok(cancel) => cancel,
        Err(e) => {
            eprintln!("{} Failed to create cancel signal: {}", "[ERROR]".red(), e);
            return ExitCode::FAILURE;
        }
    };
    let on_ctrl_c = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || on_ctrl_c.cancel()) {
        eprintln!("{} Failed to install Ctrl-C handler: {}", "[WARN]".yellow(), e);
    }

    if ignore.pattern_count() > 0 {
        println!(
            "{} Ignoring messages matching {} patterns",
            "[INFO]".blue(),
            ignore.pattern_count()
        );
    }
    println!("{} Attached, press Ctrl-C to stop\n", "[OK]".green());

    let mut names = process::ProcessNames::new();
    let name_filter = args.name.as_deref().map(str::to_lowercase);
    let start = Instant::now();
    let mut shown = 0usize;

    loop {
        let msg = match observer.try_take(None, Some(&cancel)) {
            Ok(Some(msg)) => msg,
            Ok(None) => continue,
            Err(Error::Cancelled) => break,
            Err(Error::Decode(e)) => {
                eprintln!("{} {}", "[WARN]".yellow(), e);
                continue;
            }
            Err(e) => {
                eprintln!("{} {}", "[ERROR]".red(), e);
                break;
            }
        };

        if args.pid.is_some_and(|pid| pid != msg.pid) || ignore.is_ignored(&msg.text) {
            continue;
        }

        let name = names.lookup(msg.pid).unwrap_or("?");
        if let Some(ref wanted) = name_filter
            && !name.to_lowercase().contains(wanted)
        {
            continue;
        }

        display_message(start.elapsed().as_secs_f64(), msg.pid, name, &msg.text);
        shown += 1;
    }

    observer.dispose();
    println!("\n{} Detached after {} messages", "[OK]".green(), shown);
    ExitCode::SUCCESS
}

/// Print one message, one line per text line
#[cfg(windows)]
fn display_message(seconds: f64, pid: i32, name: &str, text: &str) {
    let prefix = format!("{:>10.3} {:>6} {:<20}", seconds, pid, truncate(name, 20));
    let text = text.trim_end_matches(['\r', '\n']);
    let mut lines = text.lines();

    println!("{} {}", prefix.dimmed(), lines.next().unwrap_or(""));
    for line in lines {
        println!("{} {}", " ".repeat(prefix.len()), line);
    }
}

#[cfg_attr(not(windows), allow(dead_code))]
fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
