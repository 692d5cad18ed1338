//! Intrinsic catalogue and call constructors
//!
//! Intrinsics are identified by an enumerated [`IntrinsicUri`] rather than
//! by string. Each `create_*` function builds a well-typed call, deriving the
//! intrinsic's declared type from the types of the actual arguments.

use crate::building_block::{BlockKind, BuildingBlock, Comp};
use crate::naming::NameGenerator;
use compact_str::CompactString;
use fedcomp_core::{FederatedResult, Placement, Type, TypeError, ValueError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The intrinsic catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntrinsicUri {
    FederatedAggregate,
    FederatedApply,
    FederatedBroadcast,
    FederatedMap,
    FederatedMapAllEqual,
    FederatedMean,
    FederatedSum,
    FederatedValueAtClients,
    FederatedValueAtServer,
    FederatedZipAtClients,
    FederatedZipAtServer,
}

impl IntrinsicUri {
    pub const ALL: [IntrinsicUri; 11] = [
        IntrinsicUri::FederatedAggregate,
        IntrinsicUri::FederatedApply,
        IntrinsicUri::FederatedBroadcast,
        IntrinsicUri::FederatedMap,
        IntrinsicUri::FederatedMapAllEqual,
        IntrinsicUri::FederatedMean,
        IntrinsicUri::FederatedSum,
        IntrinsicUri::FederatedValueAtClients,
        IntrinsicUri::FederatedValueAtServer,
        IntrinsicUri::FederatedZipAtClients,
        IntrinsicUri::FederatedZipAtServer,
    ];

    /// Stable identifier of the intrinsic
    pub fn as_str(self) -> &'static str {
        match self {
            IntrinsicUri::FederatedAggregate => "federated_aggregate",
            IntrinsicUri::FederatedApply => "federated_apply",
            IntrinsicUri::FederatedBroadcast => "federated_broadcast",
            IntrinsicUri::FederatedMap => "federated_map",
            IntrinsicUri::FederatedMapAllEqual => "federated_map_all_equal",
            IntrinsicUri::FederatedMean => "federated_mean",
            IntrinsicUri::FederatedSum => "federated_sum",
            IntrinsicUri::FederatedValueAtClients => "federated_value_at_clients",
            IntrinsicUri::FederatedValueAtServer => "federated_value_at_server",
            IntrinsicUri::FederatedZipAtClients => "federated_zip_at_clients",
            IntrinsicUri::FederatedZipAtServer => "federated_zip_at_server",
        }
    }

    /// Intrinsics that act independently on each participant's member value.
    ///
    /// Stripped of placement they are plain function application, the
    /// identity, or a reshaping of a tuple, so local consolidation inlines
    /// them. Every other intrinsic moves data between placements.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            IntrinsicUri::FederatedApply
                | IntrinsicUri::FederatedMap
                | IntrinsicUri::FederatedMapAllEqual
                | IntrinsicUri::FederatedValueAtClients
                | IntrinsicUri::FederatedValueAtServer
                | IntrinsicUri::FederatedZipAtClients
                | IntrinsicUri::FederatedZipAtServer
        )
    }
}

impl fmt::Display for IntrinsicUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown intrinsic identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown intrinsic '{0}'")]
pub struct UnknownIntrinsic(pub String);

impl FromStr for IntrinsicUri {
    type Err = UnknownIntrinsic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IntrinsicUri::ALL
            .into_iter()
            .find(|uri| uri.as_str() == s)
            .ok_or_else(|| UnknownIntrinsic(s.to_string()))
    }
}

fn call_intrinsic(uri: IntrinsicUri, argument: Comp, result: Type) -> FederatedResult<Comp> {
    let ty = Type::function(argument.type_signature().clone(), result);
    BuildingBlock::call(BuildingBlock::intrinsic(uri, ty), Some(argument))
}

fn expect_placed(value: &Comp, placement: Placement) -> FederatedResult<(Type, bool)> {
    match value.type_signature().placed_parts() {
        Some((member, actual, all_equal)) if actual == placement => Ok((member.clone(), all_equal)),
        Some(_) => Err(TypeError::WrongPlacement {
            expected: placement,
            actual: value.type_signature().clone(),
        }
        .into()),
        None => Err(TypeError::NotPlaced {
            ty: value.type_signature().clone(),
        }
        .into()),
    }
}

/// Check that `function` accepts `member` and return its result type
fn mapped_result(function: &Comp, member: &Type) -> FederatedResult<Type> {
    let Some((Some(parameter), result)) = function.type_signature().function_parts() else {
        return Err(TypeError::NotAFunction {
            ty: function.type_signature().clone(),
        }
        .into());
    };
    if !parameter.is_assignable_from(member) {
        return Err(TypeError::Mismatch {
            context: "mapped function parameter",
            expected: parameter.clone(),
            actual: member.clone(),
        }
        .into());
    }
    Ok(result.clone())
}

/// `federated_map(<function, argument>)` over a clients value
pub fn create_federated_map(function: Comp, argument: Comp) -> FederatedResult<Comp> {
    let (member, _) = expect_placed(&argument, Placement::Clients)?;
    let result = mapped_result(&function, &member)?;
    call_intrinsic(
        IntrinsicUri::FederatedMap,
        BuildingBlock::unnamed_tuple([function, argument]),
        Type::placed_with(result, Placement::Clients, false),
    )
}

/// `federated_map_all_equal(<function, argument>)` over an all-equal clients value
pub fn create_federated_map_all_equal(function: Comp, argument: Comp) -> FederatedResult<Comp> {
    let (member, all_equal) = expect_placed(&argument, Placement::Clients)?;
    if !all_equal {
        return Err(TypeError::Mismatch {
            context: "federated_map_all_equal argument",
            expected: Type::placed_with(member.clone(), Placement::Clients, true),
            actual: argument.type_signature().clone(),
        }
        .into());
    }
    let result = mapped_result(&function, &member)?;
    call_intrinsic(
        IntrinsicUri::FederatedMapAllEqual,
        BuildingBlock::unnamed_tuple([function, argument]),
        Type::placed_with(result, Placement::Clients, true),
    )
}

/// `federated_apply(<function, argument>)` over a server value.
///
/// The result keeps the argument's all-equal bit.
pub fn create_federated_apply(function: Comp, argument: Comp) -> FederatedResult<Comp> {
    let (member, all_equal) = expect_placed(&argument, Placement::Server)?;
    let result = mapped_result(&function, &member)?;
    call_intrinsic(
        IntrinsicUri::FederatedApply,
        BuildingBlock::unnamed_tuple([function, argument]),
        Type::placed_with(result, Placement::Server, all_equal),
    )
}

/// Map `function` over `argument` with the intrinsic that keeps its placement
/// and all-equal bit: apply at the server, map-all-equal for all-equal
/// clients values, map otherwise.
pub fn create_federated_map_or_apply(function: Comp, argument: Comp) -> FederatedResult<Comp> {
    match argument.type_signature().placed_parts() {
        Some((_, Placement::Server, _)) => create_federated_apply(function, argument),
        Some((_, Placement::Clients, true)) => create_federated_map_all_equal(function, argument),
        Some((_, Placement::Clients, false)) => create_federated_map(function, argument),
        None => Err(TypeError::NotPlaced {
            ty: argument.type_signature().clone(),
        }
        .into()),
    }
}

/// Zip a tuple of values placed at one placement into one placed tuple.
///
/// The zipped value is all-equal only if every element is.
pub fn create_federated_zip(value: Comp) -> FederatedResult<Comp> {
    let Some(elements) = value.type_signature().tuple_elements() else {
        return Err(TypeError::NotATuple {
            ty: value.type_signature().clone(),
        }
        .into());
    };
    if elements.is_empty() {
        return Err(ValueError::Empty {
            what: "the tuple passed to federated_zip",
        }
        .into());
    }
    let mut placement = None;
    let mut all_equal = true;
    let mut members = Vec::with_capacity(elements.len());
    for (name, ty) in elements {
        let Some((member, element_placement, element_all_equal)) = ty.placed_parts() else {
            return Err(TypeError::NotPlaced { ty: ty.clone() }.into());
        };
        match placement {
            None => placement = Some(element_placement),
            Some(first) if first != element_placement => {
                return Err(TypeError::MixedPlacements {
                    first,
                    second: element_placement,
                }
                .into());
            }
            Some(_) => {}
        }
        all_equal &= element_all_equal;
        members.push((name.clone(), member.clone()));
    }
    let (uri, placement) = match placement {
        Some(Placement::Server) => (IntrinsicUri::FederatedZipAtServer, Placement::Server),
        _ => (IntrinsicUri::FederatedZipAtClients, Placement::Clients),
    };
    call_intrinsic(
        uri,
        value,
        Type::placed_with(Type::NamedTuple(members), placement, all_equal),
    )
}

/// Place an unplaced `value` at `placement`
pub fn create_federated_value(value: Comp, placement: Placement) -> FederatedResult<Comp> {
    if value.type_signature().contains_placement() {
        return Err(TypeError::UnexpectedNode {
            expected: "an unplaced value",
            found: value.type_signature().to_string(),
        }
        .into());
    }
    let member = value.type_signature().clone();
    let uri = match placement {
        Placement::Clients => IntrinsicUri::FederatedValueAtClients,
        Placement::Server => IntrinsicUri::FederatedValueAtServer,
    };
    call_intrinsic(uri, value, Type::placed_with(member, placement, true))
}

/// Broadcast a server value to the clients
pub fn create_federated_broadcast(value: Comp) -> FederatedResult<Comp> {
    let (member, _) = expect_placed(&value, Placement::Server)?;
    call_intrinsic(
        IntrinsicUri::FederatedBroadcast,
        value,
        Type::placed_with(member, Placement::Clients, true),
    )
}

/// Sum a clients value onto the server
pub fn create_federated_sum(value: Comp) -> FederatedResult<Comp> {
    let (member, _) = expect_placed(&value, Placement::Clients)?;
    call_intrinsic(IntrinsicUri::FederatedSum, value, Type::at_server(member))
}

/// Average a clients value onto the server
pub fn create_federated_mean(value: Comp) -> FederatedResult<Comp> {
    let (member, _) = expect_placed(&value, Placement::Clients)?;
    call_intrinsic(IntrinsicUri::FederatedMean, value, Type::at_server(member))
}

/// Aggregate a clients value onto the server
///
/// `accumulate: <A,V> -> A`, `merge: <A,A> -> A`, `report: A -> R`; the
/// result is `R@SERVER`.
pub fn create_federated_aggregate(
    value: Comp,
    zero: Comp,
    accumulate: Comp,
    merge: Comp,
    report: Comp,
) -> FederatedResult<Comp> {
    let (member, _) = expect_placed(&value, Placement::Clients)?;
    let accumulator = zero.type_signature().clone();
    let pair = |second: &Type| Type::tuple([accumulator.clone(), second.clone()]);
    mapped_result(&accumulate, &pair(&member))?;
    mapped_result(&merge, &pair(&accumulator))?;
    let result = mapped_result(&report, &accumulator)?;
    call_intrinsic(
        IntrinsicUri::FederatedAggregate,
        BuildingBlock::unnamed_tuple([value, zero, accumulate, merge, report]),
        Type::at_server(result),
    )
}

/// The elements of an intrinsic's tuple argument, each usable once
#[derive(Debug, Clone)]
pub struct UnpackedArgument {
    pub elements: Vec<Comp>,
    binding: Option<(CompactString, Comp)>,
}

impl UnpackedArgument {
    /// Close `body`, which uses the elements, over the argument binding.
    ///
    /// Yields `(v -> body)(argument)` when the argument was not a literal
    /// tuple and `body` otherwise.
    pub fn bind(&self, body: Comp) -> FederatedResult<Comp> {
        match &self.binding {
            Some((name, argument)) => {
                let ty = argument.type_signature().clone();
                let scope = BuildingBlock::lambda(name.clone(), ty, body);
                BuildingBlock::call(scope, Some(argument.clone()))
            }
            None => Ok(body),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }
}

/// Split an intrinsic's tuple argument into its elements.
///
/// A literal tuple yields its elements directly. Any other tuple-typed node
/// is bound once to a fresh name `v` and yields `v[0]`, `v[1]`, ...; wrap
/// the expression built from them with [`UnpackedArgument::bind`].
pub fn unpack_argument(
    argument: &Comp,
    intrinsic: IntrinsicUri,
    expected: usize,
    names: &mut NameGenerator,
) -> FederatedResult<UnpackedArgument> {
    let Some(elements) = argument.type_signature().tuple_elements() else {
        return Err(TypeError::NotATuple {
            ty: argument.type_signature().clone(),
        }
        .into());
    };
    if elements.len() != expected {
        return Err(TypeError::IntrinsicArity {
            intrinsic: intrinsic.as_str(),
            expected,
            actual: elements.len(),
        }
        .into());
    }
    if let BlockKind::Tuple { elements } = argument.kind() {
        return Ok(UnpackedArgument {
            elements: elements.iter().map(|(_, e)| e.clone()).collect(),
            binding: None,
        });
    }
    let name = names.next_name();
    let reference = BuildingBlock::reference(name.clone(), argument.type_signature().clone());
    let elements = (0..expected)
        .map(|index| BuildingBlock::selection(reference.clone(), index))
        .collect::<FederatedResult<Vec<_>>>()?;
    Ok(UnpackedArgument {
        elements,
        binding: Some((name, argument.clone())),
    })
}
