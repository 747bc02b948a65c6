#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that plays a Screw Unlock level with the auto-play client.

mod render;

use std::{fs, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use screw_unlock_core::{Command, Event, LevelConfig};
use screw_unlock_session::{self as session, query, GameSession};
use screw_unlock_system_autoplay::{AutoPlay, Config as AutoPlayConfig};

/// Plays a level headlessly and prints the final board.
#[derive(Debug, Parser)]
#[command(name = "screw-unlock", version)]
struct CliArgs {
    /// TOML file describing the level; built-in defaults apply when omitted.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Overrides the level seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Overrides the number of pegs in the level.
    #[arg(long, value_name = "COUNT")]
    total_pegs: Option<u32>,
    /// Overrides the number of palette colors.
    #[arg(long, value_name = "COUNT")]
    colors: Option<u32>,
    /// Overrides the number of temporary slots.
    #[arg(long, value_name = "COUNT")]
    temp_slots: Option<u32>,
    /// Milliseconds of simulated time between auto-play moves.
    #[arg(long, default_value_t = 100, value_name = "MS")]
    step_ms: u64,
    /// Upper bound on simulated steps before giving up.
    #[arg(long, default_value_t = 10_000)]
    max_steps: u32,
    /// Prints the board after every move instead of only at the end.
    #[arg(long)]
    show_moves: bool,
}

impl CliArgs {
    fn level_config(&self) -> Result<LevelConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read level file {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("failed to parse level file {}", path.display()))?
            }
            None => LevelConfig::default(),
        };

        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(total) = self.total_pegs {
            config.total_pegs = total;
        }
        if let Some(colors) = self.colors {
            config.color_count = colors;
        }
        if let Some(slots) = self.temp_slots {
            config.temp_slot_count = slots;
        }
        Ok(config)
    }
}

/// Entry point for the Screw Unlock command-line interface.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    let config = args.level_config()?;
    let step = Duration::from_millis(args.step_ms);

    let mut game = GameSession::new();
    let mut events = Vec::new();
    session::start_level(&mut game, config, None, &mut events)
        .context("level configuration rejected")?;
    report(&events);

    let mut autoplay = AutoPlay::new(AutoPlayConfig::new(step));
    autoplay.start();

    let mut steps = 0;
    while autoplay.is_running() {
        if steps >= args.max_steps {
            bail!("no outcome after {} steps", args.max_steps);
        }
        steps += 1;

        events.clear();
        session::apply(&mut game, Command::Tick { dt_ms: args.step_ms }, &mut events);

        let mut commands = Vec::new();
        autoplay.handle(step, &query::snapshot(&game), &mut commands);
        for command in commands {
            session::apply(&mut game, command, &mut events);
        }
        report(&events);

        if args.show_moves && !events.is_empty() {
            println!("{}", render::render(&query::snapshot(&game)));
        }
    }

    println!("{}", render::render(&query::snapshot(&game)));
    let outcome = query::outcome(&game).context("auto-play stopped before the level ended")?;
    info!("finished after {steps} steps: {outcome:?}");
    Ok(())
}

fn report(events: &[Event]) {
    for event in events {
        match event {
            Event::LevelStarted { .. }
            | Event::RegionActivated { .. }
            | Event::TripleEliminated { .. }
            | Event::ComponentSkipped { .. }
            | Event::GameOver { .. } => info!("{event:?}"),
            Event::LevelRejected { reason } => warn!("level rejected: {reason}"),
            _ => debug!("{event:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use screw_unlock_core::DifficultyProfile;

    use super::*;

    #[test]
    fn relaxed_demo_level_parses() {
        let config: LevelConfig =
            toml::from_str(include_str!("../../../demos/relaxed.toml")).expect("demo parses");

        assert_eq!(config.total_pegs, 90);
        assert_eq!(config.locks.max_lock_groups, Some(4));
        assert_eq!(config.rows, LevelConfig::default().rows);
        assert!(matches!(
            config.difficulty,
            DifficultyProfile::Stages { ref stages } if stages.len() == 3
        ));
    }

    #[test]
    fn flags_override_the_file() {
        let args = CliArgs::parse_from(["screw-unlock", "--seed", "9", "--colors", "4"]);
        let config = args.level_config().expect("defaults load");

        assert_eq!(config.seed, 9);
        assert_eq!(config.color_count, 4);
        assert_eq!(config.total_pegs, LevelConfig::default().total_pegs);
    }
}
