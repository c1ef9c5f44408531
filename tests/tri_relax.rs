mod util;

use mgrit_relax::prelude::*;
use util::{Event, ScalarApp, serial};

fn all_points(nlevels: usize) -> RelaxConfig {
    let mut cfg = RelaxConfig::new(nlevels);
    cfg.set_storage(Some(0));
    cfg
}

fn single(grid: Grid, cfg: RelaxConfig) -> Relaxer<ScalarApp, NoComm> {
    let mut r = Relaxer::new(ScalarApp::new(), NoComm, cfg, vec![grid]).unwrap();
    r.initialize(0).unwrap();
    r
}

#[test]
fn pass_order_over_zero_to_four() {
    let mut r = serial(4, 2, all_points(1));
    r.tri_fcf_relax(0, Some(1)).unwrap();

    let (f, t) = (false, true);
    assert_eq!(
        r.app().solves(),
        vec![
            // F-pass, C-pass (interior 2, then boundaries 0 and 4)
            (1, f),
            (3, f),
            (2, f),
            (0, f),
            (4, f),
            // final F-pass
            (1, f),
            (3, f),
            // closing pass
            (1, t),
            (2, t),
            (3, t),
            (0, t),
            (4, t),
        ]
    );
    assert_eq!(r.stats().solves, 12);
    assert_eq!(r.stats().closing_passes, 1);
}

#[test]
fn stencil_is_cut_at_the_axis_ends() {
    let mut r = serial(4, 2, all_points(1));
    r.tri_fcf_relax(0, Some(0)).unwrap();

    for e in &r.app().events {
        if let Event::Solve {
            index, left, right, ..
        } = e
        {
            assert_eq!(left.is_none(), *index == 0, "left neighbour at {index}");
            assert_eq!(right.is_none(), *index == 4, "right neighbour at {index}");
        }
    }
}

#[test]
fn solve_sees_values_of_the_same_pass() {
    let mut r = serial(4, 2, all_points(1));
    r.tri_fcf_relax(0, Some(0)).unwrap();

    // nrelax = 0: one F-pass then the closing pass; point 2 in the closing
    // pass sees point 1 already re-solved by that pass
    let solve_out = |at: TimeIndex, xr: bool| {
        r.app()
            .events
            .iter()
            .find_map(|e| match e {
                Event::Solve {
                    index, xrelax, out, ..
                } if *index == at && *xrelax == xr => Some(*out),
                _ => None,
            })
            .unwrap()
    };
    let left_of_two = r
        .app()
        .events
        .iter()
        .find_map(|e| match e {
            Event::Solve {
                index: 2,
                xrelax: true,
                left,
                ..
            } => *left,
            _ => None,
        })
        .unwrap();
    assert_eq!(left_of_two, solve_out(1, true));
    assert_eq!(r.value(0, 4).unwrap(), solve_out(4, true));
}

#[test]
fn single_point_is_solved_once_per_pass() {
    let mut r = single(Grid::new(0, 0, 0, 2, 0).unwrap(), all_points(1));
    r.tri_fcf_relax(0, Some(1)).unwrap();
    assert_eq!(r.app().solves(), vec![(0, false), (0, true)]);
}

#[test]
fn empty_range_does_nothing() {
    let mut r = single(Grid::new(0, 5, 4, 2, 8).unwrap(), all_points(1));
    r.tri_fcf_relax(0, Some(3)).unwrap();
    assert!(r.app().events.is_empty());
    assert_eq!(r.stats(), &RelaxStats::default());
}

#[test]
fn configured_count_applies_without_override() {
    let mut cfg = all_points(1);
    cfg.set_nrelax(None, 2);
    let mut r = serial(4, 2, cfg);
    r.tri_fcf_relax(0, None).unwrap();
    // three F-passes of 2 points, two C-passes of 3 points, closing pass of 5
    assert_eq!(r.stats().solves, 3 * 2 + 2 * 3 + 5);

    let mut r = serial(4, 2, all_points(1));
    r.tri_fcf_relax(0, Some(2)).unwrap();
    assert_eq!(r.stats().solves, 17);
}

#[test]
fn requires_every_point_stored() {
    let mut r = serial(4, 2, RelaxConfig::new(1));
    assert!(matches!(
        r.tri_fcf_relax(0, None),
        Err(RelaxError::InvalidConfig(_))
    ));
    assert!(r.app().events.is_empty());
}

#[test]
fn solve_failure_propagates() {
    let mut r = serial(4, 2, all_points(1));
    r.app_mut().fail_at = Some(3);
    let err = r.tri_fcf_relax(0, Some(1)).unwrap_err();
    assert!(matches!(
        err,
        RelaxError::Collaborator {
            op: "tri_solve",
            level: 0,
            index: 3,
            ..
        }
    ));
    assert!(!r.cache(0).unwrap().in_flight());
    // only point 1 was solved before the failure
    assert_eq!(r.app().solves(), vec![(1, false)]);
}
