use ar_anchor::sim::{run_scenario, CameraPermission, Scenario, SessionEvent};
use ar_anchor::{MarkerId, SessionState, Viewport};

fn state(state: SessionState) -> SessionEvent {
    SessionEvent::State { state }
}

#[test]
fn occluded_marker_is_lost_once_and_refound() {
    let mut scenario = Scenario {
        refreshes: 30,
        ..Scenario::default()
    };
    scenario.occlude(5..15);

    let report = run_scenario(&scenario).expect("valid scenario");
    assert!(report.started);
    assert_eq!(report.start_state, SessionState::Running);
    assert_eq!(report.final_state, SessionState::Stopped);
    assert_eq!(report.refreshes, 30);

    // Last sighting on frame 4; the third missed frame (7) loses it.
    let mut expected = vec![1; 7];
    expected.extend([0; 8]);
    expected.extend([1; 15]);
    assert_eq!(report.render.visible, expected);

    assert_eq!(
        report.events,
        vec![
            state(SessionState::Initializing),
            state(SessionState::Running),
            SessionEvent::Found {
                marker: MarkerId(0)
            },
            SessionEvent::Lost {
                marker: MarkerId(0)
            },
            SessionEvent::Found {
                marker: MarkerId(0)
            },
            state(SessionState::Stopped),
        ]
    );

    let teardown = report.teardown.expect("teardown report");
    assert!(teardown.is_clean());
    assert!(teardown.stream_released);
    assert!(teardown.loop_stopped);
    assert_eq!(teardown.nodes_released, 1);
}

#[test]
fn short_occlusion_never_flickers() {
    let mut scenario = Scenario {
        refreshes: 20,
        ..Scenario::default()
    };
    scenario.occlude(5..7);

    let report = run_scenario(&scenario).expect("valid scenario");
    assert_eq!(report.found_count(), 1);
    assert_eq!(report.lost_count(), 0);
    assert!(report.render.visible.iter().all(|&n| n == 1));
}

#[test]
fn denied_camera_never_draws() {
    let scenario = Scenario {
        camera: ar_anchor::sim::SimulatedCamera {
            permission: CameraPermission::Denied,
            frame_every: 1,
        },
        ..Scenario::default()
    };

    let report = run_scenario(&scenario).expect("valid scenario");
    assert!(!report.started);
    assert_eq!(
        report.start_state,
        SessionState::Error("camera access denied".to_owned())
    );
    assert_eq!(report.refreshes, 0);
    assert_eq!(report.render.draws, 0);
    assert_eq!(report.stats.ticks, 0);
    assert_eq!(report.final_state, SessionState::Stopped);
}

#[test]
fn failing_estimator_reports_tracking_init_failure() {
    let scenario = Scenario {
        fail_init: true,
        ..Scenario::default()
    };
    let report = run_scenario(&scenario).expect("valid scenario");
    assert_eq!(
        report.start_state,
        SessionState::Error("tracking init failed".to_owned())
    );
    assert_eq!(report.render.draws, 0);
}

#[test]
fn slow_camera_runs_the_estimator_once_per_frame() {
    let mut scenario = Scenario {
        refreshes: 10,
        ..Scenario::default()
    };
    scenario.camera.frame_every = 2;

    let report = run_scenario(&scenario).expect("valid scenario");
    assert_eq!(report.stats.ticks, 10);
    assert_eq!(report.stats.estimator_calls, 5);
    assert_eq!(report.stats.repeated_frames, 5);
    assert_eq!(report.render.draws, 10);
}

#[test]
fn resize_mid_run_reaches_the_renderer() {
    let scenario = Scenario {
        refreshes: 10,
        resize: Some((5, Viewport::new(640, 480))),
        ..Scenario::default()
    };
    let report = run_scenario(&scenario).expect("valid scenario");
    assert_eq!(
        report.render.resizes,
        vec![Viewport::default(), Viewport::new(640, 480)]
    );
}

#[test]
fn invalid_config_is_an_error() {
    let mut scenario = Scenario::default();
    scenario.config.scheduler.refresh_hz = -1.0;
    assert!(run_scenario(&scenario).is_err());
}
