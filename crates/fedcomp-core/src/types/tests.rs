//! Tests for the type model

use super::*;
use proptest::prelude::*;

#[cfg(test)]
mod display_tests {
    use super::*;

    #[test]
    fn test_render_tensor_and_tuple() {
        let ty = Type::named_tuple([(Some("a"), Type::int32()), (None, Type::float32())]);
        assert_eq!(ty.to_string(), "<a=int32,float32>");
        assert_eq!(Type::tuple([]).to_string(), "<>");
    }

    #[test]
    fn test_render_functions() {
        assert_eq!(
            Type::function(Type::int32(), Type::int32()).to_string(),
            "(int32 -> int32)"
        );
        assert_eq!(Type::niladic(Type::bool()).to_string(), "( -> bool)");
    }

    #[test]
    fn test_render_placed_types() {
        assert_eq!(Type::at_clients(Type::int32()).to_string(), "{int32}@CLIENTS");
        assert_eq!(Type::at_server(Type::int32()).to_string(), "int32@SERVER");
        assert_eq!(
            Type::placed_with(Type::int32(), Placement::Clients, true).to_string(),
            "int32@CLIENTS"
        );
    }
}

#[cfg(test)]
mod placement_tests {
    use super::*;

    #[test]
    fn test_default_all_equal_bits() {
        assert_eq!(
            Type::at_server(Type::int32()).placed_parts(),
            Some((&Type::int32(), Placement::Server, true))
        );
        assert_eq!(
            Type::at_clients(Type::int32()).placed_parts(),
            Some((&Type::int32(), Placement::Clients, false))
        );
    }

    #[test]
    fn test_strip_placement_recurses() {
        let ty = Type::function(
            Type::tuple([Type::at_clients(Type::int32()), Type::at_server(Type::float32())]),
            Type::at_server(Type::tuple([Type::bool()])),
        );
        assert_eq!(
            ty.strip_placement(),
            Type::function(
                Type::tuple([Type::int32(), Type::float32()]),
                Type::tuple([Type::bool()])
            )
        );
        assert!(ty.contains_placement());
        assert!(!ty.strip_placement().contains_placement());
    }

    #[test]
    fn test_normalize_all_equal() {
        let ty = Type::tuple([
            Type::placed_with(Type::int32(), Placement::Clients, true),
            Type::placed_with(Type::int32(), Placement::Server, false),
        ]);
        assert_eq!(
            ty.normalize_all_equal(),
            Type::tuple([Type::at_clients(Type::int32()), Type::at_server(Type::int32())])
        );
    }
}

#[cfg(test)]
mod assignability_tests {
    use super::*;

    #[test]
    fn test_all_equal_is_assignable_to_not_all_equal() {
        let all_equal = Type::placed_with(Type::int32(), Placement::Clients, true);
        let not_all_equal = Type::at_clients(Type::int32());
        assert!(not_all_equal.is_assignable_from(&all_equal));
        assert!(!all_equal.is_assignable_from(&not_all_equal));
    }

    #[test]
    fn test_placements_must_match() {
        assert!(!Type::at_clients(Type::int32()).is_assignable_from(&Type::at_server(Type::int32())));
    }

    #[test]
    fn test_unnamed_source_fits_named_target() {
        let named = Type::named_tuple([(Some("a"), Type::int32())]);
        let unnamed = Type::tuple([Type::int32()]);
        let other = Type::named_tuple([(Some("b"), Type::int32())]);
        assert!(named.is_assignable_from(&unnamed));
        assert!(!named.is_assignable_from(&other));
    }

    #[test]
    fn test_function_parameters_are_contravariant() {
        let loose = Type::function(Type::at_clients(Type::int32()), Type::int32());
        let strict = Type::function(
            Type::placed_with(Type::int32(), Placement::Clients, true),
            Type::int32(),
        );
        assert!(strict.is_assignable_from(&loose));
        assert!(!loose.is_assignable_from(&strict));
        assert!(!Type::niladic(Type::int32()).is_assignable_from(&loose));
    }
}

fn arb_type() -> impl Strategy<Value = Type> {
    let leaf = prop_oneof![
        Just(Type::int32()),
        Just(Type::float32()),
        Just(Type::bool()),
    ];
    leaf.prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(|elements| Type::tuple(elements)),
            (inner.clone(), inner.clone()).prop_map(|(p, r)| Type::function(p, r)),
            (inner, any::<bool>(), any::<bool>()).prop_map(|(m, clients, all_equal)| {
                let placement = if clients {
                    Placement::Clients
                } else {
                    Placement::Server
                };
                Type::placed_with(m, placement, all_equal)
            }),
        ]
    })
}

proptest! {
    /// Normalizing twice is the same as normalizing once
    #[test]
    fn prop_normalize_all_equal_idempotent(ty in arb_type()) {
        let once = ty.normalize_all_equal();
        prop_assert_eq!(once.normalize_all_equal(), once);
    }

    /// Every type is assignable from itself
    #[test]
    fn prop_assignability_reflexive(ty in arb_type()) {
        prop_assert!(ty.is_assignable_from(&ty));
    }

    /// Stripping removes every placement and is idempotent
    #[test]
    fn prop_strip_placement(ty in arb_type()) {
        let stripped = ty.strip_placement();
        prop_assert!(!stripped.contains_placement());
        prop_assert_eq!(stripped.strip_placement(), stripped);
    }
}

#[test]
fn test_placed_type_json_shape() {
    let ty = Type::named_tuple([(Some("state"), Type::at_server(Type::int32()))]);
    let json = serde_json::to_value(&ty).unwrap();
    let back: Type = serde_json::from_value(json).unwrap();
    assert_eq!(back, ty);
    assert_eq!(back.to_string(), "<state=int32@SERVER>");
}
