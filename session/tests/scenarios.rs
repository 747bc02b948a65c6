use screw_unlock_core::{
    BoxId, BoxPhase, CellRectSize, Command, ComponentId, CountRange, DifficultyProfile,
    DifficultyStage, Event, LevelConfig, MoveDestination, Outcome, PegId, PegLocation, RegionId,
    RejectionReason, SizeClassSpec,
};
use screw_unlock_session::{self as session, query, GameSession};

/// A single component with one plate of `total` pegs and no random locks.
fn tiny_level(total: u32, colors: u32) -> LevelConfig {
    let mut config = LevelConfig {
        rows: 6,
        columns: 6,
        total_pegs: total,
        color_count: colors,
        min_onboard_pegs: total,
        temp_slot_count: 1,
        box_count: 1,
        enabled_boxes: 1,
        region_count: 1,
        end_game_threshold: 0,
        ..LevelConfig::default()
    };
    config.components.large = SizeClassSpec {
        count: CountRange::exactly(1),
        layers: CountRange::exactly(1),
        pegs_per_layer: CountRange::exactly(total),
        footprint: CellRectSize::new(3, 3),
    };
    config.components.medium.count = CountRange::exactly(0);
    config.locks.needy_lock_probability = 0.0;
    config.difficulty = DifficultyProfile::Stages {
        stages: vec![DifficultyStage {
            until: 1.0,
            k: 0.0,
            lock_probability_factor: 0.0,
            connection_multiplier: 1.0,
        }],
    };
    config
}

/// Three-peg plates: `layers` of them in the large component, then one medium component.
fn plated_level(layers: u32, medium_pegs: u32) -> LevelConfig {
    let total = layers * 3 + medium_pegs;
    let mut config = tiny_level(total, 1);
    config.min_onboard_pegs = 3;
    config.components.large.layers = CountRange::exactly(layers);
    config.components.large.pegs_per_layer = CountRange::exactly(3);
    if medium_pegs > 0 {
        config.components.medium = SizeClassSpec {
            count: CountRange::exactly(1),
            layers: CountRange::exactly(1),
            pegs_per_layer: CountRange::exactly(medium_pegs),
            footprint: CellRectSize::new(3, 3),
        };
    }
    config
}

fn position(events: &[Event], wanted: &Event) -> usize {
    events
        .iter()
        .position(|event| event == wanted)
        .unwrap_or_else(|| panic!("{wanted:?} missing from {events:?}"))
}

fn started(config: LevelConfig) -> (GameSession, Vec<Event>) {
    let mut game = GameSession::new();
    let mut events = Vec::new();
    session::apply(&mut game, Command::StartLevel { config }, &mut events);
    (game, events)
}

fn select(game: &mut GameSession, peg: u32) -> Vec<Event> {
    let mut events = Vec::new();
    session::apply(
        game,
        Command::SelectPeg {
            peg: PegId::new(peg),
        },
        &mut events,
    );
    events
}

#[test]
fn start_level_reveals_every_peg_of_a_small_level() {
    let (game, events) = started(tiny_level(3, 1));

    assert!(matches!(
        events.first(),
        Some(Event::LevelStarted {
            total_pegs: 3,
            components: 1
        })
    ));
    let spawned = events
        .iter()
        .filter(|event| matches!(event, Event::PegSpawned { .. }))
        .count();
    assert_eq!(spawned, 3);

    let progress = query::progress(&game);
    assert_eq!(progress.on_board, 3);
    assert_eq!(progress.unspawned, 0);
    assert!(query::boxes(&game)[0].color().is_some());
}

#[test]
fn three_matching_selections_eliminate_a_triple_and_win() {
    let (mut game, _) = started(tiny_level(3, 1));

    let _ = select(&mut game, 0);
    let _ = select(&mut game, 1);
    let events = select(&mut game, 2);

    assert!(events
        .iter()
        .any(|event| matches!(event, Event::TripleEliminated { .. })));
    assert_eq!(
        events.last(),
        Some(&Event::GameOver {
            outcome: Outcome::Win
        })
    );
    let progress = query::progress(&game);
    assert_eq!(progress.eliminated, 3);
    assert_eq!(progress.boxes_completed, 1);
    assert_eq!(query::outcome(&game), Some(Outcome::Win));
    assert_eq!(query::boxes(&game)[0].phase, BoxPhase::Disabled);
}

#[test]
fn selection_reports_where_the_peg_went() {
    let (mut game, _) = started(tiny_level(3, 1));
    let mut events = Vec::new();

    let outcome = session::select_peg(&mut game, PegId::new(0), &mut events);

    assert_eq!(outcome.moved_to, Some(MoveDestination::Box(BoxId::new(0))));
    assert!(!outcome.eliminated_triple);
    assert_eq!(outcome.game_over, None);
    assert!(events.contains(&Event::PegBoxed {
        peg: PegId::new(0),
        box_id: BoxId::new(0),
        filled: 1,
    }));
}

#[test]
fn full_temporary_row_loses_the_level() {
    let mut config = tiny_level(3, 2);
    config.enabled_boxes = 0;
    let (mut game, _) = started(config);

    let first = select(&mut game, 0);
    assert!(first.contains(&Event::PegParked {
        peg: PegId::new(0),
        slot: 0
    }));
    assert_eq!(query::outcome(&game), None);

    let second = select(&mut game, 1);
    assert_eq!(
        second,
        vec![Event::GameOver {
            outcome: Outcome::Lose
        }]
    );
    let peg = query::peg(&game, PegId::new(1)).expect("peg exists");
    assert!(matches!(peg.location, PegLocation::Board(_)));

    let after = select(&mut game, 1);
    assert_eq!(
        after,
        vec![Event::SelectionRejected {
            peg: PegId::new(1),
            reason: RejectionReason::Inactive
        }]
    );
}

#[test]
fn parking_the_last_peg_with_no_open_box_loses() {
    let mut config = tiny_level(3, 2);
    config.enabled_boxes = 0;
    config.temp_slot_count = 3;
    let (mut game, _) = started(config);

    let _ = select(&mut game, 0);
    let _ = select(&mut game, 1);
    assert_eq!(query::outcome(&game), None);

    let events = select(&mut game, 2);
    assert!(events.contains(&Event::PegParked {
        peg: PegId::new(2),
        slot: 2
    }));
    assert_eq!(
        events.last(),
        Some(&Event::GameOver {
            outcome: Outcome::Lose
        })
    );
    assert_eq!(query::outcome(&game), Some(Outcome::Lose));
}

#[test]
fn plates_are_revealed_in_order_and_complete_the_component() {
    let (mut game, events) = started(plated_level(2, 0));
    assert!(events.contains(&Event::PlateSpawned {
        component: ComponentId::new(0),
        plate: 0,
        plate_count: 2
    }));
    assert_eq!(query::progress(&game).unspawned, 3);

    let _ = select(&mut game, 0);
    let _ = select(&mut game, 1);
    let events = select(&mut game, 2);
    let cleared = position(
        &events,
        &Event::PlateCleared {
            component: ComponentId::new(0),
            plate: 0,
        },
    );
    let revealed = position(
        &events,
        &Event::PlateSpawned {
            component: ComponentId::new(0),
            plate: 1,
            plate_count: 2,
        },
    );
    assert!(cleared < revealed);
    assert_eq!(query::progress(&game).on_board, 3);

    let _ = select(&mut game, 3);
    let _ = select(&mut game, 4);
    let events = select(&mut game, 5);
    let cleared = position(
        &events,
        &Event::PlateCleared {
            component: ComponentId::new(0),
            plate: 1,
        },
    );
    let completed = position(
        &events,
        &Event::ComponentCompleted {
            component: ComponentId::new(0),
        },
    );
    assert!(cleared < completed);
    assert_eq!(
        events.last(),
        Some(&Event::GameOver {
            outcome: Outcome::Win
        })
    );
}

#[test]
fn exhausted_region_hands_over_to_the_next() {
    let mut config = plated_level(1, 3);
    config.region_count = 2;
    let (mut game, events) = started(config);
    assert!(events.contains(&Event::RegionActivated {
        region: RegionId::new(0)
    }));
    assert!(!events.iter().any(|event| matches!(
        event,
        Event::ComponentSpawned { component, .. } if *component == ComponentId::new(1)
    )));

    let _ = select(&mut game, 0);
    let _ = select(&mut game, 1);
    let events = select(&mut game, 2);
    let activated = position(
        &events,
        &Event::RegionActivated {
            region: RegionId::new(1),
        },
    );
    let spawned = events
        .iter()
        .position(|event| {
            matches!(event, Event::ComponentSpawned { component, .. }
                if *component == ComponentId::new(1))
        })
        .expect("second component spawns");
    assert!(activated < spawned);

    // The emptied box only takes a color once the new pegs are out.
    assert!(query::boxes(&game)[0].color().is_some());
    for peg in 3..6 {
        let _ = select(&mut game, peg);
    }
    assert_eq!(query::outcome(&game), Some(Outcome::Win));
}

#[test]
fn component_without_room_is_skipped_and_the_level_lost() {
    let mut config = plated_level(1, 3);
    config.rows = 3;
    config.columns = 3;
    config.min_onboard_pegs = 6;
    let (mut game, events) = started(config);

    assert!(events.contains(&Event::ComponentSkipped {
        component: ComponentId::new(1)
    }));
    assert_eq!(query::progress(&game).on_board, 3);

    let _ = select(&mut game, 0);
    let _ = select(&mut game, 1);
    let events = select(&mut game, 2);
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::TripleEliminated { .. })));
    assert_eq!(
        events.last(),
        Some(&Event::GameOver {
            outcome: Outcome::Lose
        })
    );
    assert_eq!(query::progress(&game).unspawned, 3);
}

#[test]
fn pegs_of_a_waiting_color_are_locked_behind_the_board() {
    let locks_on_fresh_pegs = |needy: f32| {
        let mut config = plated_level(2, 3);
        config.locks.needy_lock_probability = needy;
        let (mut game, _) = started(config);
        let events = select(&mut game, 0);
        assert!(events.iter().any(|event| matches!(
            event,
            Event::ComponentSpawned { component, .. } if *component == ComponentId::new(1)
        )));
        events
            .iter()
            .filter(|event| {
                matches!(event, Event::LockApplied { locked, .. } if (6..=8).contains(&locked.get()))
            })
            .count()
    };

    assert!(locks_on_fresh_pegs(1.0) > 0);
    assert_eq!(locks_on_fresh_pegs(0.0), 0);
}

#[test]
fn removing_a_chain_root_unlocks_pegs_one_at_a_time() {
    let (mut game, _) = started(tiny_level(3, 1));
    let (a, b, c) = (PegId::new(0), PegId::new(1), PegId::new(2));
    let mut events = Vec::new();
    assert!(session::apply_lock(&mut game, b, c, &mut events));
    assert!(session::apply_lock(&mut game, a, b, &mut events));
    assert_eq!(query::chain(&game, c), vec![a, b]);
    assert_eq!(query::lock_depth(&game, c), 3);
    assert_eq!(query::lock_group_count(&game), 1);

    let rejected = select(&mut game, 2);
    assert_eq!(
        rejected,
        vec![Event::SelectionRejected {
            peg: c,
            reason: RejectionReason::Locked
        }]
    );

    let events = select(&mut game, 0);
    assert!(events.contains(&Event::LockReleased {
        controller: a,
        locked: b
    }));
    assert!(events.contains(&Event::PegUnlocked { peg: b }));
    assert!(query::peg(&game, c).expect("peg exists").locked);

    let events = select(&mut game, 1);
    assert!(events.contains(&Event::PegUnlocked { peg: c }));

    let _ = select(&mut game, 2);
    assert_eq!(query::outcome(&game), Some(Outcome::Win));
}

#[test]
fn cyclic_lock_requests_are_refused() {
    let (mut game, _) = started(tiny_level(3, 1));
    let (a, b) = (PegId::new(0), PegId::new(1));
    let mut events = Vec::new();

    assert!(session::apply_lock(&mut game, a, b, &mut events));
    assert!(!session::apply_lock(&mut game, b, a, &mut events));
    assert!(!session::apply_lock(&mut game, a, a, &mut events));
    assert_eq!(
        events,
        vec![Event::LockApplied {
            controller: a,
            locked: b
        }]
    );
}

#[test]
fn delayed_elimination_waits_for_ticks() {
    let mut config = tiny_level(3, 1);
    config.elimination_delay_ms = 500;
    let (mut game, _) = started(config);

    for peg in 0..3 {
        let _ = select(&mut game, peg);
    }
    assert_eq!(query::pending_eliminations(&game), 1);
    assert_eq!(query::progress(&game).in_boxes, 3);
    assert_eq!(query::outcome(&game), None);

    let mut events = Vec::new();
    session::apply(&mut game, Command::Tick { dt_ms: 499 }, &mut events);
    assert!(events.is_empty());

    session::apply(&mut game, Command::Tick { dt_ms: 1 }, &mut events);
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::TripleEliminated { .. })));
    assert_eq!(query::outcome(&game), Some(Outcome::Win));
    assert_eq!(query::pending_eliminations(&game), 0);
}

#[test]
fn relief_box_takes_the_parked_color_and_absorbs_the_peg() {
    let mut config = tiny_level(6, 2);
    config.box_count = 2;
    config.enabled_boxes = 0;
    config.temp_slot_count = 3;
    let (mut game, _) = started(config);

    let _ = select(&mut game, 0);
    let parked = query::peg(&game, PegId::new(0))
        .and_then(|peg| peg.color)
        .expect("parked peg is colored");

    let mut events = Vec::new();
    session::apply(
        &mut game,
        Command::OpenBox {
            box_id: BoxId::new(0),
            relief: true,
        },
        &mut events,
    );

    assert!(events.contains(&Event::BoxColored {
        box_id: BoxId::new(0),
        color: parked
    }));
    assert!(events.contains(&Event::PegAbsorbed {
        peg: PegId::new(0),
        slot: 0,
        box_id: BoxId::new(0),
    }));
    assert_eq!(query::progress(&game).in_temp, 0);
    assert_eq!(query::boxes(&game)[0].filled(), 1);
}

#[test]
fn opening_an_enabled_box_is_ignored() {
    let (mut game, _) = started(tiny_level(3, 1));
    let mut events = Vec::new();

    session::apply(
        &mut game,
        Command::OpenBox {
            box_id: BoxId::new(0),
            relief: false,
        },
        &mut events,
    );

    assert!(events.is_empty());
}

#[test]
fn temporary_row_can_grow() {
    let (mut game, _) = started(tiny_level(3, 1));
    let mut events = Vec::new();

    session::apply(&mut game, Command::AddTempSlot, &mut events);

    assert_eq!(events, vec![Event::TempSlotAdded { capacity: 2 }]);
    assert_eq!(query::temp_slots(&game).len(), 2);
}

#[test]
fn invalid_configuration_is_rejected_without_starting() {
    let mut config = tiny_level(3, 1);
    config.color_count = 0;
    let (mut game, events) = started(config);

    assert!(matches!(events.as_slice(), [Event::LevelRejected { .. }]));
    assert_eq!(
        select(&mut game, 0),
        vec![Event::SelectionRejected {
            peg: PegId::new(0),
            reason: RejectionReason::Inactive
        }]
    );
}

#[test]
fn configuration_errors_name_the_problem() {
    let mut game = GameSession::new();
    let mut events = Vec::new();

    let mut oversized = tiny_level(3, 1);
    oversized.components.large.footprint = CellRectSize::new(7, 3);
    assert!(matches!(
        session::start_level(&mut game, oversized, None, &mut events),
        Err(session::ConfigurationError::FootprintTooLarge { width: 7, .. })
    ));

    let mut crowded = tiny_level(3, 1);
    crowded.enabled_boxes = 2;
    assert_eq!(
        session::start_level(&mut game, crowded, None, &mut events),
        Err(session::ConfigurationError::TooManyEnabledBoxes {
            enabled: 2,
            boxes: 1
        })
    );

    let mut cramped = tiny_level(3, 1);
    cramped.components.large.footprint = CellRectSize::new(1, 2);
    assert!(matches!(
        session::start_level(&mut game, cramped, None, &mut events),
        Err(session::ConfigurationError::FootprintTooSmall { cells: 2, pegs: 3, .. })
    ));

    assert_eq!(
        session::start_level(&mut game, tiny_level(4, 1), None, &mut events),
        Err(session::ConfigurationError::PartialTriple { total: 4 })
    );

    assert!(events.is_empty());
}

#[test]
fn unknown_and_missing_pegs_are_rejected() {
    let (mut game, _) = started(tiny_level(3, 1));

    assert_eq!(
        select(&mut game, 99),
        vec![Event::SelectionRejected {
            peg: PegId::new(99),
            reason: RejectionReason::UnknownPeg
        }]
    );

    let _ = select(&mut game, 0);
    assert_eq!(
        select(&mut game, 0),
        vec![Event::SelectionRejected {
            peg: PegId::new(0),
            reason: RejectionReason::NotOnBoard
        }]
    );
}
