#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use approx::assert_relative_eq;
use rtalgebra::operations::ApplyBinary;
use rtalgebra::superstructure::{
    CreateSuperstructure, Definition, JsonStore, RegenerationOutcome, TargetSpec,
};
use rtalgebra::{
    AlgebraConfig, BooleanOp, CavalierClipper, Contour, Polygon, RegenerationController, Rgb,
    SliceMap, Structure, StructureSet, StructureStore, SuperstructureStore,
};

const TOLERANCE: f64 = 1.0;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn circle(cx: f64, z: f64) -> Contour {
    Contour::new(z, Polygon::circle(cx, 0.0, 10.0, 128, z).into_points()).unwrap()
}

fn two_circles() -> StructureSet {
    let set = StructureSet::new("plan-1");
    set.insert(Structure::new(1, "A", Rgb(255, 0, 0)).with_contours(vec![circle(0.0, 0.0)]));
    set.insert(Structure::new(2, "B", Rgb(0, 0, 255)).with_contours(vec![circle(8.0, 0.0)]));
    set
}

fn area(set: &StructureSet, op: BooleanOp) -> f64 {
    let a = SliceMap::from_structure(&set.structure(1).unwrap(), TOLERANCE);
    let b = SliceMap::from_structure(&set.structure(2).unwrap(), TOLERANCE);
    let outcome = ApplyBinary::new(op, &a, &b).execute(&CavalierClipper);
    assert!(outcome.skipped.is_empty());
    outcome.slices.total_area()
}

#[test]
fn two_circle_algebra() {
    init_tracing();
    let set = two_circles();
    let single = std::f64::consts::PI * 100.0;

    let union = area(&set, BooleanOp::Union);
    let intersect = area(&set, BooleanOp::Intersect);
    let subtract = area(&set, BooleanOp::Subtract);
    let xor = area(&set, BooleanOp::Xor);

    assert!(union > single && union < 2.0 * single, "union {union}");
    assert!(intersect > 0.0 && intersect < single, "intersect {intersect}");
    assert!(subtract > 0.0 && subtract < single, "subtract {subtract}");
    assert_relative_eq!(xor, union - intersect, max_relative = 1e-2);
    assert_relative_eq!(subtract + intersect, single, max_relative = 1e-2);
}

fn request(expression: &str) -> CreateSuperstructure {
    CreateSuperstructure {
        definition: Definition::Expression(expression.into()),
        target: TargetSpec {
            roi_number: None,
            name: None,
            color: Rgb(0, 255, 0),
        },
        auto_update: true,
    }
}

#[test]
fn superstructures_survive_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("superstructures.json");
    let set: Arc<StructureSet> = Arc::new(two_circles());
    let config = AlgebraConfig::default().with_parallel(false);

    let created = {
        let ctl = RegenerationController::new(
            Arc::clone(&set) as Arc<dyn StructureStore>,
            Arc::new(JsonStore::open(&path).unwrap()),
            CavalierClipper,
        )
        .with_config(config);
        ctl.create(request("PTV = margin(A ∪ B, 2)"))
            .unwrap()
            .superstructure
    };
    let ptv_area = |set: &StructureSet| {
        SliceMap::from_structure(&set.structure(created.target_roi_number).unwrap(), TOLERANCE)
            .total_area()
    };
    let before = ptv_area(&set);
    assert!(before > 0.0);

    let ctl = RegenerationController::new(
        Arc::clone(&set) as Arc<dyn StructureStore>,
        Arc::new(JsonStore::open(&path).unwrap()),
        CavalierClipper,
    )
    .with_config(config);
    let loaded = ctl.load().unwrap();
    assert_eq!(loaded, vec![created.clone()]);

    // Moving B away from A splits the margin into two islands.
    let reports = ctl.edit_structure(2, vec![circle(40.0, 0.0)]).unwrap();
    assert_eq!(reports.len(), 1);
    assert!(matches!(
        reports[0].outcome,
        RegenerationOutcome::Regenerated { contour_count: 2, .. }
    ));
    assert!(ptv_area(&set) > before);

    let reloaded = JsonStore::open(&path).unwrap();
    let record = reloaded.get(created.id).unwrap().unwrap();
    assert!(record.last_updated >= created.last_updated);
}
