use screw_unlock_core::{DifficultyProfile, DifficultyStage};
use screw_unlock_system_difficulty::{build_curve, DifficultyCurve, DifficultyError};

fn assert_monotone(curve: &dyn DifficultyCurve) {
    let mut previous = curve.sample(0.0).k;
    for step in 1..=200 {
        let progress = step as f32 / 200.0;
        let k = curve.sample(progress).k;
        assert!(
            k + 1e-6 >= previous,
            "curve decreased from {previous} to {k} at progress {progress}",
        );
        assert!((0.0..=1.0).contains(&k), "k {k} escaped the unit interval");
        previous = k;
    }
}

fn stage(until: f32, k: f32, lock: f32, connections: f32) -> DifficultyStage {
    DifficultyStage {
        until,
        k,
        lock_probability_factor: lock,
        connection_multiplier: connections,
    }
}

#[test]
fn default_profile_is_loose_early_and_tight_late() {
    let curve = build_curve(&DifficultyProfile::default()).expect("default profile is valid");
    assert_monotone(curve.as_ref());

    let early = curve.sample(0.1).k;
    let late = curve.sample(0.9).k;
    assert!(early < 0.15, "early difficulty {early} should stay near the floor");
    assert!(late > 0.7, "late difficulty {late} should approach the ceiling");
}

#[test]
fn every_shape_is_monotone() {
    let profiles = vec![
        DifficultyProfile::Cubic {
            floor: 0.0,
            ceiling: 1.0,
        },
        DifficultyProfile::Table {
            values: vec![0.1, 0.1, 0.3, 0.35, 0.9],
        },
        DifficultyProfile::Spline {
            points: vec![[0.0, 0.1], [0.3, 0.2], [0.6, 0.2], [0.8, 0.9], [1.0, 1.0]],
        },
        DifficultyProfile::Stages {
            stages: vec![stage(0.3, 0.1, 0.1, 1.0), stage(1.0, 0.6, 0.5, 2.0)],
        },
    ];

    for profile in profiles {
        let curve = build_curve(&profile).expect("profile should be valid");
        assert_monotone(curve.as_ref());
    }
}

#[test]
fn stages_expose_their_lock_knobs() {
    let curve = build_curve(&DifficultyProfile::Stages {
        stages: vec![
            stage(0.25, 0.1, 0.2, 1.0),
            stage(0.75, 0.4, 0.5, 1.5),
            stage(1.0, 0.8, 0.9, 3.0),
        ],
    })
    .expect("valid stages");

    let first = curve.sample(0.1);
    assert!((first.lock_probability - 0.2).abs() < 1e-6);

    let middle = curve.sample(0.25);
    assert!((middle.k - 0.4).abs() < 1e-6, "threshold starts the next stage");
    assert!((middle.connection_multiplier - 1.5).abs() < 1e-6);

    let last = curve.sample(1.0);
    assert!((last.connection_multiplier - 3.0).abs() < 1e-6);
}

#[test]
fn spline_passes_through_control_points() {
    let curve = build_curve(&DifficultyProfile::Spline {
        points: vec![[0.0, 0.2], [0.5, 0.4], [1.0, 1.0]],
    })
    .expect("valid spline");

    assert!((curve.sample(0.0).k - 0.2).abs() < 1e-5);
    assert!((curve.sample(0.5).k - 0.4).abs() < 1e-5);
    assert!((curve.sample(1.0).k - 1.0).abs() < 1e-5);
}

#[test]
fn invalid_profiles_are_rejected() {
    assert_eq!(
        build_curve(&DifficultyProfile::Table { values: Vec::new() }).unwrap_err(),
        DifficultyError::Empty,
    );
    assert_eq!(
        build_curve(&DifficultyProfile::Table {
            values: vec![0.5, 0.4],
        })
        .unwrap_err(),
        DifficultyError::NotMonotone { index: 1 },
    );
    assert_eq!(
        build_curve(&DifficultyProfile::Cubic {
            floor: 0.0,
            ceiling: 1.5,
        })
        .unwrap_err(),
        DifficultyError::OutOfRange {
            index: 1,
            value: 1.5,
        },
    );
    assert!(matches!(
        build_curve(&DifficultyProfile::Spline {
            points: vec![[0.5, 0.1], [0.5, 0.2]],
        }),
        Err(DifficultyError::UnorderedProgress { index: 1, .. })
    ));
    assert!(matches!(
        build_curve(&DifficultyProfile::Stages {
            stages: vec![stage(0.5, 0.6, 0.5, 1.0), stage(1.0, 0.3, 0.5, 1.0)],
        }),
        Err(DifficultyError::NotMonotone { index: 1 })
    ));
}

#[test]
fn stages_may_not_loosen_their_lock_knobs() {
    let looser_locks = DifficultyProfile::Stages {
        stages: vec![stage(0.5, 0.2, 0.6, 1.0), stage(1.0, 0.4, 0.3, 1.0)],
    };
    assert!(matches!(
        build_curve(&looser_locks),
        Err(DifficultyError::NotMonotone { index: 1 })
    ));

    let fewer_connections = DifficultyProfile::Stages {
        stages: vec![
            stage(0.3, 0.2, 0.2, 1.0),
            stage(0.6, 0.3, 0.2, 2.0),
            stage(1.0, 0.4, 0.3, 1.5),
        ],
    };
    assert!(matches!(
        build_curve(&fewer_connections),
        Err(DifficultyError::NotMonotone { index: 2 })
    ));

    let flat = DifficultyProfile::Stages {
        stages: vec![stage(0.5, 0.2, 0.3, 1.5), stage(1.0, 0.2, 0.3, 1.5)],
    };
    assert!(build_curve(&flat).is_ok());
}
