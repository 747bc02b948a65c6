use std::collections::BTreeSet;

use screw_unlock_core::{
    Command, DifficultyProfile, DifficultyStage, Event, LevelConfig, Outcome, PegId,
    SessionSnapshot,
};
use screw_unlock_session::{self as session, query, GameSession};

const SEEDS: [u64; 4] = [1, 7, 42, 0x5eed];
const STEP_LIMIT: usize = 1_000;

/// Greedy player: a peg that fits an active box first, otherwise the lowest selectable peg.
fn next_selection(snapshot: &SessionSnapshot) -> Option<PegId> {
    let selectable: Vec<_> = snapshot
        .pegs_on_board()
        .filter(|peg| peg.is_selectable())
        .collect();
    selectable
        .iter()
        .find(|peg| {
            peg.color
                .map_or(false, |color| snapshot.boxes.iter().any(|b| b.accepts(color)))
        })
        .or_else(|| selectable.first())
        .map(|peg| peg.id)
}

fn play<F>(config: LevelConfig, mut check: F) -> Vec<Event>
where
    F: FnMut(&GameSession),
{
    let mut game = GameSession::new();
    let mut log = Vec::new();
    session::apply(&mut game, Command::StartLevel { config }, &mut log);
    check(&game);

    for _ in 0..STEP_LIMIT {
        if query::outcome(&game).is_some() {
            break;
        }
        let Some(peg) = next_selection(&query::snapshot(&game)) else {
            break;
        };
        session::apply(&mut game, Command::SelectPeg { peg }, &mut log);
        check(&game);
    }
    log
}

fn assert_lock_graph_is_sound(game: &GameSession) {
    let graph = query::lock_graph(game);
    let limits = *graph.limits();
    let snapshot = query::snapshot(game);

    for peg in &snapshot.pegs {
        let controllers = graph.controllers(peg.id);
        if peg.cell().is_none() {
            assert!(controllers.is_empty(), "peg {:?} off the board keeps controllers", peg.id);
            assert_eq!(graph.control(peg.id), None);
            continue;
        }
        assert!(controllers.len() <= limits.max_controllers as usize);
        assert_eq!(peg.locked, !controllers.is_empty());
        assert!(
            query::lock_depth(game, peg.id) <= limits.max_chain_length,
            "peg {:?} sits in a chain deeper than {}",
            peg.id,
            limits.max_chain_length
        );

        let chain = query::chain(game, peg.id);
        let unique: BTreeSet<PegId> = chain.iter().copied().collect();
        assert_eq!(unique.len(), chain.len(), "chain of {:?} repeats a peg", peg.id);
        assert!(!chain.contains(&peg.id), "peg {:?} controls itself", peg.id);
    }

    let mut controlling = BTreeSet::new();
    for connection in graph.connections() {
        assert!(
            controlling.insert(connection.controller),
            "peg {:?} controls more than one peg",
            connection.controller
        );
        assert!(graph.is_on_board(connection.controller));
        assert!(graph.is_on_board(connection.locked));
    }
}

fn assert_pegs_are_conserved(game: &GameSession) {
    let progress = query::progress(game);
    assert_eq!(
        progress.eliminated
            + progress.on_board
            + progress.in_temp
            + progress.in_boxes
            + progress.unspawned,
        progress.total,
        "pegs leaked: {progress:?}"
    );
    assert_eq!(progress.eliminated % 3, 0);
    let eliminated: u32 = progress.colors.iter().map(|tally| tally.eliminated).sum();
    let spawned: u32 = progress.colors.iter().map(|tally| tally.spawned).sum();
    assert_eq!(eliminated, progress.eliminated);
    assert_eq!(spawned, progress.total - progress.unspawned);
    for tally in &progress.colors {
        assert_eq!(tally.eliminated % 3, 0, "{tally:?} eliminated a partial triple");
        assert!(tally.spawned >= tally.eliminated);
    }
    for color_box in query::boxes(game) {
        assert!(color_box.filled() <= 3);
    }
}

#[test]
fn lock_graph_stays_acyclic_and_bounded_through_play() {
    for seed in SEEDS {
        let config = LevelConfig {
            seed,
            ..LevelConfig::default()
        };
        let _ = play(config, assert_lock_graph_is_sound);
    }
}

#[test]
fn every_peg_is_accounted_for_after_each_command() {
    for seed in SEEDS {
        let config = LevelConfig {
            seed,
            ..LevelConfig::default()
        };
        let _ = play(config, assert_pegs_are_conserved);
    }
}

#[test]
fn every_seeded_level_ends_in_an_outcome() {
    for seed in SEEDS {
        let config = LevelConfig {
            seed,
            ..LevelConfig::default()
        };
        let log = play(config, |_| {});
        let endings = log
            .iter()
            .filter(|event| matches!(event, Event::GameOver { .. }))
            .count();
        assert_eq!(endings, 1, "seed {seed} ended {endings} times");
    }
}

#[test]
fn levels_with_a_slot_per_peg_are_always_won() {
    for seed in [0, 8] {
        let defaults = LevelConfig::default();
        let config = LevelConfig {
            seed,
            temp_slot_count: defaults.total_pegs,
            ..defaults
        };
        let mut game = GameSession::new();
        let mut log = Vec::new();
        session::apply(&mut game, Command::StartLevel { config }, &mut log);
        for _ in 0..STEP_LIMIT {
            if query::outcome(&game).is_some() {
                break;
            }
            let Some(peg) = next_selection(&query::snapshot(&game)) else {
                break;
            };
            session::apply(&mut game, Command::SelectPeg { peg }, &mut log);
        }

        assert_eq!(query::outcome(&game), Some(Outcome::Win), "seed {seed} was not won");
        for tally in query::progress(&game).colors {
            assert_eq!(tally.spawned, tally.eliminated, "seed {seed}: {tally:?}");
            assert_eq!(tally.spawned % 3, 0);
        }
    }
}

#[test]
fn lock_group_limit_holds_after_the_opening_spawn() {
    for seed in SEEDS {
        let mut config = LevelConfig {
            seed,
            ..LevelConfig::default()
        };
        config.locks.max_lock_groups = Some(1);
        config.difficulty = DifficultyProfile::Stages {
            stages: vec![DifficultyStage {
                until: 1.0,
                k: 0.5,
                lock_probability_factor: 1.0,
                connection_multiplier: 1.0,
            }],
        };

        let mut game = GameSession::new();
        let mut events = Vec::new();
        session::apply(&mut game, Command::StartLevel { config }, &mut events);

        assert!(query::lock_group_count(&game) <= 1, "seed {seed} exceeded the group limit");
    }
}

#[test]
fn identical_seeds_replay_identically() {
    let config = LevelConfig {
        seed: 99,
        ..LevelConfig::default()
    };

    let first = play(config.clone(), |_| {});
    let second = play(config, |_| {});

    assert!(!first.is_empty());
    assert_eq!(first, second, "replay diverged between runs");
}

#[test]
fn different_seeds_produce_different_levels() {
    let first = play(
        LevelConfig {
            seed: 1,
            ..LevelConfig::default()
        },
        |_| {},
    );
    let second = play(
        LevelConfig {
            seed: 2,
            ..LevelConfig::default()
        },
        |_| {},
    );

    assert_ne!(first, second);
}
