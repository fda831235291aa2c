//! Full experiment runs through the registry.

use cardiac_core::CardiacError;
use cardiac_experiments::{
    CellModelKind, RestitutionConfig, RestitutionProgress, SteadyStateConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};

fn short_restitution(min_di: f64, max_di: f64, di_step: f64) -> RestitutionConfig {
    RestitutionConfig {
        cell_type: "endo".to_string(),
        min_di,
        max_di,
        di_step,
        steady_state_cycles: 3,
        ..Default::default()
    }
}

#[test]
fn restitution_curve_is_ordered_by_di() {
    let s1_cycles = AtomicUsize::new(0);
    let s2_beats = AtomicUsize::new(0);
    let curve = CellModelKind::Minimal
        .restitution(&short_restitution(100.0, 400.0, 100.0), |event| match event {
            RestitutionProgress::SteadyState(_) => {
                s1_cycles.fetch_add(1, Ordering::Relaxed);
            }
            RestitutionProgress::Point(_) => {
                s2_beats.fetch_add(1, Ordering::Relaxed);
            }
        })
        .unwrap();

    assert_eq!(s1_cycles.load(Ordering::Relaxed), 3);
    assert_eq!(s2_beats.load(Ordering::Relaxed), 3);

    let dis: Vec<f64> = curve.points.iter().map(|p| p.di).collect();
    assert_eq!(dis, vec![100.0, 200.0, 300.0]);
    assert_eq!(curve.model, "minimal_model");
    assert!(curve.steady_state_apd90 > 150.0 && curve.steady_state_apd90 < 450.0);

    for point in &curve.points {
        assert!(point.apd90 > 0.0 && point.apd90 < 1000.0, "{:?}", point);
    }
    // Longer recovery gives a longer action potential
    let first = curve.points[0].apd90;
    let last = curve.points[2].apd90;
    assert!(last > first, "APD90 {} at DI 300 <= {} at DI 100", last, first);
    assert!(last <= curve.steady_state_apd90 + 1.0);
}

#[test]
fn restitution_s2_beyond_recorded_beat() {
    // APD90 + 800 ms lies past the end of a 1000 ms S1 beat
    let s2_beats = AtomicUsize::new(0);
    let result = CellModelKind::Minimal.restitution(&short_restitution(800.0, 900.0, 50.0), |event| {
        if let RestitutionProgress::Point(_) = event {
            s2_beats.fetch_add(1, Ordering::Relaxed);
        }
    });
    assert!(matches!(result, Err(CardiacError::InsufficientDataError(_))));
    assert_eq!(s2_beats.load(Ordering::Relaxed), 0);
}

#[test]
fn steady_state_report_serializes() {
    let config = SteadyStateConfig {
        cell_type: "m".to_string(),
        num_cycles: 2,
        apd_percents: vec![90],
        ..Default::default()
    };
    let report = CellModelKind::Minimal.steady_state(&config, |_| {}).unwrap();
    assert_eq!(report.apd.len(), 1);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["experiment_id"], "steady_state");
    assert_eq!(json["cell_type"], "m");
    assert!(json["last_beat"]["action_potential"].is_array());
}
