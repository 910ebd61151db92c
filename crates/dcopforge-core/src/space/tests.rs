use super::*;

fn table(scope: &[&str], domains: Vec<Vec<Value>>, values: &[f64]) -> UtilitySpace {
    UtilitySpace::new(
        scope.iter().map(|s| s.to_string()).collect(),
        domains,
        values.iter().map(|&v| Utility::of(v)).collect(),
    )
    .unwrap()
}

fn xy() -> UtilitySpace {
    // x in {0,1}, y in {0,1,2}
    table(&["x", "y"], vec![vec![0, 1], vec![0, 1, 2]], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
}

fn yz() -> UtilitySpace {
    table(&["y", "z"], vec![vec![0, 1, 2], vec![7, 8]], &[0.5, 1.5, 2.5, 3.5, 4.5, 5.5])
}

fn zx() -> UtilitySpace {
    table(&["z", "x"], vec![vec![7, 8], vec![0, 1]], &[10.0, -1.0, 0.25, 3.0])
}

#[test]
fn test_row_major_lookup() {
    let s = xy();
    assert_eq!(s.utility(&[0, 0]), Some(Utility::of(1.0)));
    assert_eq!(s.utility(&[0, 2]), Some(Utility::of(3.0)));
    assert_eq!(s.utility(&[1, 1]), Some(Utility::of(5.0)));
    assert_eq!(s.utility(&[1, 9]), None);
}

#[test]
fn test_new_rejects_bad_shapes() {
    let scope = vec!["x".to_string()];
    assert!(UtilitySpace::new(scope.clone(), vec![vec![0, 1]], vec![Utility::ZERO]).is_err());
    assert!(UtilitySpace::new(scope.clone(), vec![vec![]], vec![]).is_err());
    assert!(UtilitySpace::new(
        vec!["x".to_string(), "x".to_string()],
        vec![vec![0], vec![0]],
        vec![Utility::ZERO]
    )
    .is_err());
}

#[test]
fn test_join_adds_over_union_scope() {
    let mut checks = ConstraintChecks::new();
    let joined = xy().join(&yz(), &mut checks).unwrap();
    assert_eq!(joined.scope(), &["x", "y", "z"]);
    assert_eq!(joined.size(), 12);
    assert_eq!(checks.performed(), 12);

    let assignment: Assignment = [("x".into(), 1), ("y".into(), 2), ("z".into(), 8)].into();
    assert_eq!(joined.utility_for(&assignment), Some(Utility::of(6.0 + 5.5)));
}

#[test]
fn test_join_is_commutative() {
    let mut checks = ConstraintChecks::new();
    let ab = xy().join(&yz(), &mut checks).unwrap();
    let ba = yz().join(&xy(), &mut checks).unwrap();
    assert_ne!(ab.scope(), ba.scope());
    assert!(ab.equivalent(&ba, 1e-9));

    let plus = table(&["x"], vec![vec![0, 1]], &[f64::INFINITY, 1.0]);
    let minus = table(&["x"], vec![vec![0, 1]], &[f64::NEG_INFINITY, 2.0]);
    let ab = plus.join(&minus, &mut checks).unwrap();
    let ba = minus.join(&plus, &mut checks).unwrap();
    assert!(ab.equivalent(&ba, 1e-9));
    assert_eq!(ab.utility(&[0]), Some(Utility::MINUS_INFINITY));
    assert_eq!(ab.utility(&[1]), Some(Utility::of(3.0)));
}

#[test]
fn test_join_is_associative() {
    let mut checks = ConstraintChecks::new();
    let left = xy()
        .join(&yz(), &mut checks)
        .unwrap()
        .join(&zx(), &mut checks)
        .unwrap();
    let right = xy()
        .join(&yz().join(&zx(), &mut checks).unwrap(), &mut checks)
        .unwrap();
    assert!(left.equivalent(&right, 1e-9));
}

#[test]
fn test_join_intersects_shared_domains() {
    let mut checks = ConstraintChecks::new();
    let a = table(&["x"], vec![vec![0, 1, 2]], &[1.0, 2.0, 3.0]);
    let b = table(&["x"], vec![vec![2, 1]], &[10.0, 20.0]);
    let joined = a.join(&b, &mut checks).unwrap();
    assert_eq!(joined.domains(), &[vec![1, 2]]);
    assert_eq!(joined.utility(&[1]), Some(Utility::of(22.0)));
    assert_eq!(joined.utility(&[2]), Some(Utility::of(13.0)));

    let disjoint = table(&["x"], vec![vec![5]], &[0.0]);
    assert!(a.join(&disjoint, &mut checks).is_err());
}

#[test]
fn test_projection_removes_exactly_one_variable() {
    let mut checks = ConstraintChecks::new();
    let joined = xy().join(&yz(), &mut checks).unwrap();
    let projected = joined.project("y", Optimization::Maximize, &mut checks).unwrap();
    assert_eq!(projected.scope(), &["x", "z"]);
    assert!(!projected.contains("y"));

    // x=0, z=7: max over y of (1,2,3) + (0.5,2.5,4.5) = 7.5
    assert_eq!(projected.utility(&[0, 7]), Some(Utility::of(7.5)));

    let minimized = joined.project("y", Optimization::Minimize, &mut checks).unwrap();
    assert_eq!(minimized.utility(&[0, 7]), Some(Utility::of(1.5)));
}

#[test]
fn test_projection_of_unknown_variable_fails() {
    let mut checks = ConstraintChecks::new();
    assert!(xy().project("w", Optimization::Maximize, &mut checks).is_err());
}

#[test]
fn test_projection_to_scalar() {
    let mut checks = ConstraintChecks::new();
    let s = table(&["x"], vec![vec![0, 1, 2]], &[4.0, 9.0, -2.0]);
    let scalar = s.project("x", Optimization::Maximize, &mut checks).unwrap();
    assert!(scalar.scope().is_empty());
    assert_eq!(scalar.scalar_value(), Some(Utility::of(9.0)));
}

#[test]
fn test_infeasibility_propagates() {
    let mut checks = ConstraintChecks::new();
    let hard = table(
        &["x"],
        vec![vec![0, 1]],
        &[f64::NEG_INFINITY, f64::NEG_INFINITY],
    );
    let soft = table(&["x"], vec![vec![0, 1]], &[3.0, 4.0]);
    let joined = hard.join(&soft, &mut checks).unwrap();
    let scalar = joined.project("x", Optimization::Maximize, &mut checks).unwrap();
    assert_eq!(scalar.scalar_value(), Some(Utility::MINUS_INFINITY));
}

#[test]
fn test_slice_fixes_variables() {
    let assignment: Assignment = [("y".into(), 1), ("q".into(), 3)].into();
    let sliced = xy().slice(&assignment).unwrap();
    assert_eq!(sliced.scope(), &["x"]);
    assert_eq!(sliced.utility(&[0]), Some(Utility::of(2.0)));
    assert_eq!(sliced.utility(&[1]), Some(Utility::of(5.0)));

    let bad: Assignment = [("y".into(), 42)].into();
    assert!(xy().slice(&bad).is_err());
}

#[test]
fn test_argopt_uses_context() {
    let mut checks = ConstraintChecks::new();
    let context: Assignment = [("x".into(), 1)].into();
    let (value, utility) = xy()
        .argopt("y", &context, Optimization::Maximize, &mut checks)
        .unwrap();
    assert_eq!(value, 2);
    assert_eq!(utility, Utility::of(6.0));

    let (value, _) = xy()
        .argopt("y", &context, Optimization::Minimize, &mut checks)
        .unwrap();
    assert_eq!(value, 0);
}

#[test]
fn test_argopt_breaks_ties_by_domain_order() {
    let mut checks = ConstraintChecks::new();
    let flat = table(&["x"], vec![vec![5, 3, 4]], &[1.0, 1.0, 1.0]);
    let (value, _) = flat
        .argopt("x", &Assignment::new(), Optimization::Maximize, &mut checks)
        .unwrap();
    assert_eq!(value, 5);
}

#[test]
fn test_argopt_missing_context_is_inconsistent() {
    let mut checks = ConstraintChecks::new();
    let err = xy()
        .argopt("y", &Assignment::new(), Optimization::Maximize, &mut checks)
        .unwrap_err();
    assert!(matches!(err, DcopError::Inconsistent(_)));

    let wrong: Assignment = [("x".into(), 7)].into();
    assert!(xy()
        .argopt("y", &wrong, Optimization::Maximize, &mut checks)
        .is_err());
}

#[test]
fn test_deserialization_validates_shape() {
    let ok = toml::to_string(&xy()).unwrap();
    let parsed: UtilitySpace = toml::from_str(&ok).unwrap();
    assert_eq!(parsed, xy());

    let bad = r#"
        scope = ["x"]
        domains = [[0, 1]]
        utilities = [1.0]
    "#;
    assert!(toml::from_str::<UtilitySpace>(bad).is_err());
}
