//! Tests for aligning and splitting

use super::*;
use crate::config::TransformConfig;
use fedcomp_core::{FederatedError, TensorKind};
use fedcomp_ir::intrinsics::{create_federated_map, create_federated_zip};
use fedcomp_ir::{compiled_primitive, count_called_intrinsics, Primitive};

fn server_pair() -> Type {
    Type::named_tuple([
        (Some("a"), Type::at_server(Type::int32())),
        (Some("b"), Type::at_server(Type::int32())),
    ])
}

fn round_type() -> Type {
    Type::named_tuple([
        (Some("server_state"), Type::at_server(Type::int32())),
        (Some("client_data"), Type::at_clients(Type::int32())),
    ])
}

/// `federated_map(<(x -> add(x)), federated_zip(<broadcast(p[0]), p[1]>)>)`
fn client_update(p: &Comp) -> Comp {
    let add = compiled_primitive(Primitive::Add(TensorKind::Int32)).unwrap();
    let broadcast = create_federated_broadcast(BuildingBlock::selection(p.clone(), 0).unwrap()).unwrap();
    let zipped = create_federated_zip(BuildingBlock::unnamed_tuple([
        broadcast,
        BuildingBlock::selection(p.clone(), 1).unwrap(),
    ]))
    .unwrap();
    let pair = Type::tuple([Type::int32(), Type::int32()]);
    let x = BuildingBlock::reference("x", pair.clone());
    let adder = BuildingBlock::lambda("x", pair, BuildingBlock::call(add, Some(x)).unwrap());
    create_federated_map(adder, zipped).unwrap()
}

/// `(p -> <federated_sum(client_update(p)), p[0]>)`
fn round() -> Comp {
    let p = BuildingBlock::reference("p", round_type());
    let sum = create_federated_sum(client_update(&p)).unwrap();
    let state = BuildingBlock::selection(p, 0).unwrap();
    BuildingBlock::lambda("p", round_type(), BuildingBlock::unnamed_tuple([sum, state]))
}

fn parameter_type(comp: &Comp) -> Type {
    comp.type_signature().function_parts().unwrap().0.unwrap().clone()
}

fn result_type(comp: &Comp) -> Type {
    comp.type_signature().function_parts().unwrap().1.clone()
}

#[cfg(test)]
mod split_tests {
    use super::*;

    #[test]
    fn test_single_call() {
        let server = Type::at_server(Type::int32());
        let x = BuildingBlock::reference("x", server.clone());
        let comp = BuildingBlock::lambda("x", server, create_federated_broadcast(x).unwrap());

        let (before, after) = force_align_and_split_by_intrinsic(&comp, IntrinsicUri::FederatedBroadcast).unwrap();
        assert_eq!(before.to_string(), "(_var1 -> _var1)");
        assert_eq!(after.to_string(), "(_var2 -> _var2)");
        assert_eq!(parameter_type(&before), parameter_type(&comp));
        assert_eq!(result_type(&after), result_type(&comp));
    }

    #[test]
    fn test_distinct_broadcasts_are_zipped() {
        let p = BuildingBlock::reference("p", server_pair());
        let body = BuildingBlock::unnamed_tuple([
            create_federated_broadcast(BuildingBlock::selection(p.clone(), 0).unwrap()).unwrap(),
            create_federated_broadcast(BuildingBlock::selection(p, 1).unwrap()).unwrap(),
        ]);
        let comp = BuildingBlock::lambda("p", server_pair(), body);

        let (before, after) = force_align_and_split_by_intrinsic(&comp, IntrinsicUri::FederatedBroadcast).unwrap();
        assert_eq!(
            before.to_string(),
            "(_var1 -> federated_zip_at_server(<_var1[0],_var1[1]>))"
        );
        assert_eq!(
            after.to_string(),
            "(_var2 -> <federated_map_all_equal(<(_var3 -> _var3[0]),_var2>),federated_map_all_equal(<(_var4 -> _var4[1]),_var2>)>)"
        );
        assert_eq!(result_type(&after), result_type(&comp));
    }

    #[test]
    fn test_repeated_call_is_merged() {
        let p = BuildingBlock::reference("p", server_pair());
        let broadcast = || create_federated_broadcast(BuildingBlock::selection(p.clone(), 0).unwrap()).unwrap();
        let comp = BuildingBlock::lambda("p", server_pair(), BuildingBlock::unnamed_tuple([broadcast(), broadcast()]));

        let (before, after) = force_align_and_split_by_intrinsic(&comp, IntrinsicUri::FederatedBroadcast).unwrap();
        assert_eq!(before.to_string(), "(_var1 -> _var1[0])");
        assert_eq!(after.to_string(), "(_var2 -> <_var2,_var2>)");
    }

    #[test]
    fn test_remainder_reading_parameter_takes_hybrid_argument() {
        let comp = round();
        let (before, after) = force_align_and_split_by_intrinsic(&comp, IntrinsicUri::FederatedSum).unwrap();

        assert_eq!(count_called_intrinsics(&before, IntrinsicUri::FederatedSum), 0);
        assert_eq!(count_called_intrinsics(&after, IntrinsicUri::FederatedSum), 0);
        assert_eq!(parameter_type(&before), round_type());
        assert_eq!(result_type(&after), result_type(&comp));

        let hybrid = parameter_type(&after);
        let elements = hybrid.tuple_elements().unwrap();
        assert_eq!(elements[0].0.as_deref(), Some(ORIGINAL_ARG));
        assert_eq!(elements[0].1, round_type());
        assert_eq!(elements[1].0.as_deref(), Some(INTRINSIC_RESULTS));
        assert_eq!(elements[1].1, Type::at_server(Type::int32()));
        assert!(unbound_references(&after).is_empty());
    }

    #[test]
    fn test_broadcast_split_keeps_the_rest_after() {
        let comp = round();
        let (before, after) = force_align_and_split_by_intrinsic(&comp, IntrinsicUri::FederatedBroadcast).unwrap();
        assert_eq!(result_type(&before), Type::at_server(Type::int32()));
        assert_eq!(count_called_intrinsics(&after, IntrinsicUri::FederatedBroadcast), 0);
        assert_eq!(count_called_intrinsics(&after, IntrinsicUri::FederatedSum), 1);
        assert_eq!(result_type(&after), result_type(&comp));
    }

    #[test]
    fn test_deduplication_can_be_disabled() {
        // Two copies of a sum over a mapped lambda differ only in binder names
        let p = BuildingBlock::reference("p", round_type());
        let identity = |name: &str| {
            BuildingBlock::lambda(name, Type::int32(), BuildingBlock::reference(name, Type::int32()))
        };
        let sum = |name: &str| {
            let mapped = create_federated_map(identity(name), BuildingBlock::selection(p.clone(), 1).unwrap()).unwrap();
            create_federated_sum(mapped).unwrap()
        };
        let comp = BuildingBlock::lambda("p", round_type(), BuildingBlock::unnamed_tuple([sum("u"), sum("v")]));

        let (before, _) = force_align_and_split_by_intrinsic(&comp, IntrinsicUri::FederatedSum).unwrap();
        assert_eq!(result_type(&before), Type::at_clients(Type::int32()));

        let strict = CanonicalFormCompiler::new(TransformConfig {
            deduplicate_intrinsic_calls: false,
            ..TransformConfig::default()
        });
        let (before, after) = strict
            .force_align_and_split_by_intrinsic(&comp, IntrinsicUri::FederatedSum)
            .unwrap();
        assert_eq!(
            result_type(&before),
            Type::at_clients(Type::tuple([Type::int32(), Type::int32()]))
        );
        assert_eq!(count_called_intrinsics(&after, IntrinsicUri::FederatedApply), 2);
        assert_eq!(result_type(&after), result_type(&comp));
    }
}

#[cfg(test)]
mod merge_tests {
    use super::*;
    use fedcomp_ir::check_has_unique_names;

    fn assert_split_preserves(comp: &Comp, before: &Comp, after: &Comp) {
        assert_eq!(parameter_type(before), parameter_type(comp));
        assert_eq!(result_type(after), result_type(comp));
        check_has_unique_names(before).unwrap();
        check_has_unique_names(after).unwrap();
        assert!(unbound_references(before).is_empty());
        assert!(unbound_references(after).is_empty());
    }

    fn local_pair() -> Type {
        Type::tuple([Type::int32(), Type::bool()])
    }

    #[test]
    fn test_means_are_zipped() {
        let ty = Type::tuple([Type::at_clients(Type::int32()), Type::at_clients(Type::float32())]);
        let p = BuildingBlock::reference("p", ty.clone());
        let body = BuildingBlock::unnamed_tuple([
            create_federated_mean(BuildingBlock::selection(p.clone(), 0).unwrap()).unwrap(),
            create_federated_mean(BuildingBlock::selection(p, 1).unwrap()).unwrap(),
        ]);
        let comp = BuildingBlock::lambda("p", ty, body);

        let (before, after) = force_align_and_split_by_intrinsic(&comp, IntrinsicUri::FederatedMean).unwrap();
        assert_eq!(before.to_string(), "(_var1 -> federated_zip_at_clients(<_var1[0],_var1[1]>))");
        assert_eq!(
            after.to_string(),
            "(_var2 -> <federated_apply(<(_var3 -> _var3[0]),_var2>),\
             federated_apply(<(_var4 -> _var4[1]),_var2>)>)"
        );
        assert_split_preserves(&comp, &before, &after);
    }

    #[test]
    fn test_values_at_server_are_tupled() {
        let x = BuildingBlock::reference("x", local_pair());
        let body = BuildingBlock::unnamed_tuple([
            create_federated_value(BuildingBlock::selection(x.clone(), 0).unwrap(), Placement::Server).unwrap(),
            create_federated_value(BuildingBlock::selection(x, 1).unwrap(), Placement::Server).unwrap(),
        ]);
        let comp = BuildingBlock::lambda("x", local_pair(), body);

        let (before, after) =
            force_align_and_split_by_intrinsic(&comp, IntrinsicUri::FederatedValueAtServer).unwrap();
        assert_eq!(before.to_string(), "(_var1 -> <_var1[0],_var1[1]>)");
        assert_eq!(result_type(&before), local_pair());
        assert_eq!(count_called_intrinsics(&after, IntrinsicUri::FederatedApply), 2);
        assert_split_preserves(&comp, &before, &after);
    }

    #[test]
    fn test_values_at_clients_stay_all_equal() {
        let x = BuildingBlock::reference("x", local_pair());
        let body = BuildingBlock::unnamed_tuple([
            create_federated_value(BuildingBlock::selection(x.clone(), 0).unwrap(), Placement::Clients).unwrap(),
            create_federated_value(BuildingBlock::selection(x, 1).unwrap(), Placement::Clients).unwrap(),
        ]);
        let comp = BuildingBlock::lambda("x", local_pair(), body);

        let (before, after) =
            force_align_and_split_by_intrinsic(&comp, IntrinsicUri::FederatedValueAtClients).unwrap();
        assert_eq!(before.to_string(), "(_var1 -> <_var1[0],_var1[1]>)");
        assert_eq!(
            parameter_type(&after),
            Type::placed_with(local_pair(), Placement::Clients, true)
        );
        assert_eq!(count_called_intrinsics(&after, IntrinsicUri::FederatedMapAllEqual), 2);
        assert_split_preserves(&comp, &before, &after);
    }

    #[test]
    fn test_opaque_aggregate_arguments_are_bound_once() {
        let binary = Type::function(Type::tuple([Type::int32(), Type::int32()]), Type::int32());
        let arguments = Type::tuple([
            Type::at_clients(Type::int32()),
            Type::int32(),
            binary.clone(),
            binary,
            Type::function(Type::int32(), Type::int32()),
        ]);
        let ty = Type::tuple([arguments.clone(), arguments.clone()]);
        let p = BuildingBlock::reference("p", ty.clone());
        let aggregate = |index: usize| {
            let intrinsic = BuildingBlock::intrinsic(
                IntrinsicUri::FederatedAggregate,
                Type::function(arguments.clone(), Type::at_server(Type::int32())),
            );
            BuildingBlock::call(intrinsic, Some(BuildingBlock::selection(p.clone(), index).unwrap())).unwrap()
        };
        let comp = BuildingBlock::lambda("p", ty, BuildingBlock::unnamed_tuple([aggregate(0), aggregate(1)]));

        let (before, after) =
            force_align_and_split_by_intrinsic(&comp, IntrinsicUri::FederatedAggregate).unwrap();
        let rendered = before.to_string();
        assert!(
            rendered.starts_with(
                "(_var1 -> (_var2 -> (_var3 -> <federated_zip_at_clients(<_var2[0],_var3[0]>),<_var2[1],_var3[1]>,"
            ),
            "{rendered}"
        );
        assert!(rendered.ends_with(")(_var1[1]))(_var1[0]))"), "{rendered}");
        assert_eq!(rendered.matches("_var1[0]").count(), 1);
        assert_eq!(rendered.matches("_var1[1]").count(), 1);
        assert_eq!(count_called_intrinsics(&after, IntrinsicUri::FederatedApply), 2);
        assert_split_preserves(&comp, &before, &after);
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_requires_lambda() {
        let x = BuildingBlock::reference("x", Type::at_server(Type::int32()));
        let err = force_align_and_split_by_intrinsic(&x, IntrinsicUri::FederatedBroadcast).unwrap_err();
        assert!(matches!(err, FederatedError::Type(TypeError::UnexpectedNode { .. })));
    }

    #[test]
    fn test_missing_intrinsic() {
        let err = force_align_and_split_by_intrinsic(&round(), IntrinsicUri::FederatedAggregate).unwrap_err();
        assert!(err.is_compilation_error());
        assert!(err.to_string().contains("no calls to target intrinsic federated_aggregate found"));
    }

    #[test]
    fn test_nested_calls_are_not_alignable() {
        let server = Type::at_server(Type::int32());
        let x = BuildingBlock::reference("x", server.clone());
        let inner = create_federated_broadcast(x).unwrap();
        let summed = create_federated_sum(inner).unwrap();
        let outer = create_federated_broadcast(summed).unwrap();
        let comp = BuildingBlock::lambda("x", server, outer);
        let err = force_align_and_split_by_intrinsic(&comp, IntrinsicUri::FederatedBroadcast).unwrap_err();
        assert!(err.is_compilation_error());
        assert!(err.to_string().contains("depends on another call to federated_broadcast"));
    }

    #[test]
    fn test_locally_bound_argument_is_not_alignable() {
        let server = Type::at_server(Type::int32());
        let y = BuildingBlock::reference("y", server.clone());
        let inner = BuildingBlock::lambda("y", server.clone(), create_federated_broadcast(y).unwrap());
        let comp = BuildingBlock::lambda("x", server, inner);
        let err = force_align_and_split_by_intrinsic(&comp, IntrinsicUri::FederatedBroadcast).unwrap_err();
        assert!(err.to_string().contains("locally bound name"));
    }

    #[test]
    fn test_maps_cannot_be_merged() {
        let p = BuildingBlock::reference("p", round_type());
        let data = BuildingBlock::selection(p, 1).unwrap();
        let identity = |name: &str| {
            BuildingBlock::lambda(name, Type::int32(), BuildingBlock::reference(name, Type::int32()))
        };
        let body = BuildingBlock::unnamed_tuple([
            create_federated_map(identity("u"), data.clone()).unwrap(),
            create_federated_map(identity("v"), data).unwrap(),
        ]);
        let strict = CanonicalFormCompiler::new(TransformConfig {
            deduplicate_intrinsic_calls: false,
            ..TransformConfig::default()
        });
        let comp = BuildingBlock::lambda("p", round_type(), body);
        let err = strict
            .force_align_and_split_by_intrinsic(&comp, IntrinsicUri::FederatedMap)
            .unwrap_err();
        assert!(err.to_string().contains("cannot merge 2 calls to federated_map"));
    }
}
