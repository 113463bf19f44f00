use anyhow::Result;
use colored::Colorize;
use phaseline::prelude::*;
use phaseline::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

const LOGO: &str = r"
   ___  __                   ___
  / _ \/ /  ___ ____ ___ ___/ (_)__  ___
 / ___/ _ \/ _ `(_-</ -_) __/ / / _ \/ -_)
/_/  /_//_/\_,_/___/\__/_/ /_/_/_//_/\__/
";

/// Colors the command word of the line being edited.
#[derive(Completer, Helper, Hinter, Validator)]
struct CommandHighlighter;

impl Highlighter for CommandHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        match line.split_once(' ') {
            Some((command, rest)) => Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow())),
            None => Cow::Owned(line.yellow().bold().to_string()),
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", LOGO.cyan());
    println!("{}", "-".repeat(64).dimmed());
    println!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!(
        "{}",
        "    Distributed under the MIT OR Apache-2.0 license.".dimmed()
    );
    println!("{}", "-".repeat(64).dimmed());
}

fn print_help() {
    println!("Available commands:");
    println!("  start                 - Starts the experience at phase 1 (restarts if running).");
    println!("  jump <P>              - Restarts the experience at the beginning of phase P.");
    println!("  stop                  - Fades every channel out and ends the run.");
    println!("  status                - Shows the current phase, progress and network counters.");
    println!("  watch on|off          - Prints phase changes as they happen.");
    println!("  exit                  - Quits the shell.");
}

/// Prints sequencer events. Phase changes only while `watching` is set.
fn spawn_event_listener(engine: &PhaselineEngine, watching: Arc<AtomicBool>) {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SequencerEvent::PhaseEntered { from, to } => {
                    if watching.load(Ordering::Relaxed) {
                        println!("<-- [PHASE] {} -> {}", from, to);
                    }
                }
                SequencerEvent::SubsystemFailed { name, op, error } => {
                    println!("<-- [{}] {} failed during {}: {}", "SUBSYSTEM".red(), name, op, error);
                }
                other => println!("\n<-- [SEQUENCER] {:?}", other),
            }
        }
    });
}

fn print_status(status: &SequencerSnapshot) {
    let state = if status.running {
        "running".green().bold()
    } else {
        "stopped".dimmed()
    };
    println!(
        "--> {} | phase {}/{} | progress {:>5.1}% | {:.1}s of {:.1}s",
        state,
        status.phase,
        status.phase_count,
        status.progress * 100.0,
        status.elapsed.as_secs_f64(),
        status.total.as_secs_f64(),
    );
    if let Some(wait) = status.next_action_in {
        println!("    next scheduled action in {:.1}s", wait.as_secs_f64());
    }
    match status.network {
        Some(net) => println!(
            "    haptics: {} sent, {} dropped, {} reopened",
            net.sent, net.dropped, net.reopened
        ),
        None => println!("    haptics: {}", "disabled".dimmed()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();
    phaseline::logging::init_logging("warn");

    let path = env::args_os().nth(1).map(PathBuf::from);
    let config = PhaselineConfig::load(path.as_deref())?;
    let clock = SystemClock::shared();
    let engine = PhaselineEngine::from_config(&config, clock.clone());

    {
        let mut sequencer = engine.sequencer().await;
        for subsystem in &config.subsystems {
            sequencer.attach(Box::new(ChannelProbe::new(subsystem.name.clone(), clock.clone())));
        }
    }

    let watching = Arc::new(AtomicBool::new(false));
    spawn_event_listener(&engine, watching.clone());

    // The shell drives starts itself; only debug mode launches on its own.
    if config.debug.enabled {
        engine.schedule_launch(&config.timeline, &config.debug).await;
    }

    info!("Spawning {} in the background...", ENGINE_NAME.cyan());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_until(shutdown_rx).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(CommandHighlighter));

    println!(
        "{} is running. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => break,
        };
        rl.add_history_entry(line.as_str())?;
        let args = line.split_whitespace().collect::<Vec<_>>();

        match args.as_slice() {
            ["start"] => match engine.start().await {
                Ok(()) => println!("--> Experience started."),
                Err(e) => println!("Error: {}", e),
            },
            ["jump", phase] => match phase.parse::<usize>() {
                Ok(phase) => match engine.jump(PhaseId(phase)).await {
                    Ok(actual) if actual.0 == phase => println!("--> Jumped to phase {}.", actual),
                    Ok(actual) => println!("--> Phase {} is not playable; jumped to {}.", phase, actual),
                    Err(e) => println!("Error: {}", e),
                },
                Err(_) => println!("Error: '{}' is not a phase number.", phase),
            },
            ["jump"] => println!("Usage: jump <PHASE>"),
            ["stop"] => {
                engine.stop().await;
                println!("--> Stopped.");
            }
            ["status"] => print_status(&engine.status().await),
            ["watch", "on"] => {
                watching.store(true, Ordering::Relaxed);
                println!("--> Watching phase changes.");
            }
            ["watch", "off"] => {
                watching.store(false, Ordering::Relaxed);
                println!("--> No longer watching phase changes.");
            }
            ["watch", ..] => println!("Usage: watch on|off"),
            ["help"] => print_help(),
            ["exit"] | ["quit"] => break,
            [] => {}
            _ => println!("Unknown command: '{}'. Type 'help'.", line.trim()),
        }
    }

    println!("Exiting phaseshell...");
    shutdown_tx.send(()).ok();
    worker.await??;
    Ok(())
}
