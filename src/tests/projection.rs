use crate::Box;
use proptest::prelude::*;

#[test]
fn unbounded_projection_is_the_identity() {
    let b = Box::unbounded(3);
    let v = [1e30, -42.0, 0.0];
    let mut out = [0.0; 3];
    b.project(&v, &mut out);
    assert_eq!(out, v);

    b.projecting_difference(&v, &mut out);
    assert_eq!(out, [0.0; 3]);
}

#[test]
fn one_sided_bounds() {
    let b = Box::new(
        vec![0.0, f64::NEG_INFINITY],
        vec![f64::INFINITY, 1.0],
    )
    .unwrap();
    let mut out = [0.0; 2];
    b.project(&[-3.0, 4.0], &mut out);
    assert_eq!(out, [0.0, 1.0]);
    b.projecting_difference(&[-3.0, 4.0], &mut out);
    assert_eq!(out, [-3.0, 3.0]);
}

#[test]
fn invalid_bounds_are_rejected() {
    assert!(Box::new(vec![1.0], vec![0.0]).is_err());
    assert!(Box::new(vec![f64::NAN], vec![1.0]).is_err());
    assert!(Box::new(vec![0.0, 0.0], vec![1.0]).is_err());
}

proptest! {
    #[test]
    fn projection_lands_in_the_box_and_is_idempotent(
        data in prop::collection::vec(
            (-1e6f64..1e6, -1e6f64..1e6, -1e9f64..1e9),
            1..8,
        )
    ) {
        let lower: Vec<f64> = data.iter().map(|(a, b, _)| a.min(*b)).collect();
        let upper: Vec<f64> = data.iter().map(|(a, b, _)| a.max(*b)).collect();
        let v: Vec<f64> = data.iter().map(|&(_, _, v)| v).collect();
        let b = Box::new(lower, upper).unwrap();

        let mut once = vec![0.0; v.len()];
        b.project(&v, &mut once);
        prop_assert!(b.contains(&once));

        let mut twice = vec![0.0; v.len()];
        b.project(&once, &mut twice);
        prop_assert_eq!(&once, &twice);

        // v - project(v) and project(v) add back up to v, modulo the
        // rounding of the subtraction.
        let mut diff = vec![0.0; v.len()];
        b.projecting_difference(&v, &mut diff);
        for i in 0..v.len() {
            let err = (once[i] + diff[i] - v[i]).abs();
            prop_assert!(err <= 1e-12 * v[i].abs().max(1.0));
        }
    }

    #[test]
    fn points_inside_are_fixed(
        data in prop::collection::vec((-1e6f64..1e6, 0.0f64..1e6, 0.0f64..1.0), 1..8)
    ) {
        let lower: Vec<f64> = data.iter().map(|&(a, _, _)| a).collect();
        let upper: Vec<f64> = data.iter().map(|&(a, w, _)| a + w).collect();
        let v: Vec<f64> = data.iter().map(|&(a, w, t)| a + t * w).collect();
        let b = Box::new(lower, upper).unwrap();

        prop_assert!(b.contains(&v));
        let mut out = vec![0.0; v.len()];
        b.project(&v, &mut out);
        prop_assert_eq!(&out, &v);
    }
}
