//! Shared fixtures for the canonical-form integration tests

#![allow(dead_code)]

use fedcomp_core::{TensorKind, Type};
use fedcomp_ir::intrinsics::{
    create_federated_aggregate, create_federated_broadcast, create_federated_map,
    create_federated_zip,
};
use fedcomp_ir::{
    compiled_constant, compiled_identity, compiled_primitive, BuildingBlock, Comp, Primitive, Value,
};
use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static TRACING: Once = Once::new();

/// Log transformation decisions when `RUST_LOG` is set
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

/// `<server_state=int32@SERVER, client_data={int32}@CLIENTS>`
pub fn round_parameter_type() -> Type {
    Type::named_tuple([
        (Some("server_state"), Type::at_server(Type::int32())),
        (Some("client_data"), Type::at_clients(Type::int32())),
    ])
}

pub fn primitive(primitive: Primitive) -> Comp {
    compiled_primitive(primitive).unwrap()
}

/// Each client adds the broadcast server state to its own value
pub fn client_updates(p: &Comp) -> Comp {
    let state = BuildingBlock::selection(p.clone(), 0).unwrap();
    let data = BuildingBlock::selection(p.clone(), 1).unwrap();
    let broadcast = create_federated_broadcast(state).unwrap();
    let zipped = create_federated_zip(BuildingBlock::unnamed_tuple([broadcast, data])).unwrap();
    let pair = Type::tuple([Type::int32(), Type::int32()]);
    let x = BuildingBlock::reference("x", pair.clone());
    let add = primitive(Primitive::Add(TensorKind::Int32));
    let update = BuildingBlock::lambda("x", pair, BuildingBlock::call(add, Some(x)).unwrap());
    create_federated_map(update, zipped).unwrap()
}

/// Aggregate `value` with `operator` for both accumulate and merge
pub fn aggregate_with(value: Comp, operator: Primitive) -> Comp {
    let zero = BuildingBlock::call(compiled_constant(Value::Int32(0)).unwrap(), None).unwrap();
    create_federated_aggregate(
        value,
        zero,
        primitive(operator),
        primitive(operator),
        compiled_identity(Type::int32()).unwrap(),
    )
    .unwrap()
}

/// One training round: broadcast, local update, then a sum and a maximum
/// over the updates
///
/// `(p -> <aggregate(updates, 0, add, add, id), aggregate(updates, 0, max, max, id)>)`
pub fn training_round() -> Comp {
    let p = BuildingBlock::reference("p", round_parameter_type());
    let total = aggregate_with(client_updates(&p), Primitive::Add(TensorKind::Int32));
    let largest = aggregate_with(client_updates(&p), Primitive::Maximum(TensorKind::Int32));
    BuildingBlock::lambda(
        "p",
        round_parameter_type(),
        BuildingBlock::unnamed_tuple([total, largest]),
    )
}

/// `(p -> <aggregate(updates, ...), p[0]>)`: the state survives the round
pub fn stateful_round() -> Comp {
    let p = BuildingBlock::reference("p", round_parameter_type());
    let total = aggregate_with(client_updates(&p), Primitive::Add(TensorKind::Int32));
    let state = BuildingBlock::selection(p, 0).unwrap();
    BuildingBlock::lambda(
        "p",
        round_parameter_type(),
        BuildingBlock::unnamed_tuple([total, state]),
    )
}

pub fn parameter_type(comp: &Comp) -> Type {
    comp.type_signature().function_parts().unwrap().0.unwrap().clone()
}

pub fn result_type(comp: &Comp) -> Type {
    comp.type_signature().function_parts().unwrap().1.clone()
}
