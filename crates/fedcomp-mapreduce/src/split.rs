//! Aligning and splitting a computation around one intrinsic
//!
//! Every call to the target intrinsic is merged into a single call. The
//! computation is then cut at that call: `before` computes its argument
//! from the original parameter, `after` consumes its result.

use crate::compiler::CanonicalFormCompiler;
use crate::reduce::beta_reduce;
use compact_str::CompactString;
use fedcomp_core::{compilation_error, FederatedResult, Placement, Type, TypeError};
use fedcomp_ir::intrinsics::{
    create_federated_aggregate, create_federated_apply, create_federated_broadcast,
    create_federated_map_all_equal, create_federated_mean, create_federated_sum,
    create_federated_value, create_federated_zip, unpack_argument, UnpackedArgument,
};
use fedcomp_ir::tree::{alpha_equivalent, contains_intrinsic, substitute, walk};
use fedcomp_ir::{
    transform_postorder, unbound_references, uniquify_reference_names, BuildingBlock, Comp,
    IntrinsicUri, NameGenerator,
};
use tracing::{debug, debug_span, trace};

/// Element name of the original parameter in a hybrid `after` parameter
pub const ORIGINAL_ARG: &str = "original_arg";

/// Element name of the merged intrinsic result in a hybrid `after` parameter
pub const INTRINSIC_RESULTS: &str = "intrinsic_results";

/// How each original call's result is recovered from the merged result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    /// One distinct call: the merged result is the result
    Whole,
    /// Server-placed tuple: `federated_apply` a selection
    Apply,
    /// All-equal clients tuple: `federated_map_all_equal` a selection
    MapAllEqual,
}

/// The single call that replaces every distinct target call
#[derive(Debug)]
struct MergedCall {
    call: Comp,
    recovery: Recovery,
    /// Opaque original arguments the merged argument reads through a binding
    scopes: Vec<UnpackedArgument>,
}

impl MergedCall {
    /// The merged argument, closed over the bindings of opaque arguments
    fn bound_argument(&self) -> FederatedResult<Comp> {
        self.scopes
            .iter()
            .rev()
            .try_fold(self.argument()?, |body, scope| scope.bind(body))
    }

    fn argument(&self) -> FederatedResult<Comp> {
        match self.call.call_parts() {
            Some((_, Some(argument))) => Ok(argument.clone()),
            _ => Err(compilation_error(format!(
                "merged intrinsic call {} has no argument",
                self.call
            ))),
        }
    }

    /// The `index`th original result, read out of `result`
    fn recover(
        &self,
        index: usize,
        result: &Comp,
        names: &mut NameGenerator,
    ) -> FederatedResult<Comp> {
        if self.recovery == Recovery::Whole {
            return Ok(result.clone());
        }
        let Some((member, _, _)) = result.type_signature().placed_parts() else {
            return Err(TypeError::NotPlaced {
                ty: result.type_signature().clone(),
            }
            .into());
        };
        let select = selector(member, index, names)?;
        match self.recovery {
            Recovery::Apply => create_federated_apply(select, result.clone()),
            _ => create_federated_map_all_equal(select, result.clone()),
        }
    }
}

/// `(t -> t[index])` over `ty`, with a fresh `t`
fn selector(ty: &Type, index: usize, names: &mut NameGenerator) -> FederatedResult<Comp> {
    let parameter = names.next_name();
    let reference = BuildingBlock::reference(parameter.clone(), ty.clone());
    Ok(BuildingBlock::lambda(
        parameter,
        ty.clone(),
        BuildingBlock::selection(reference, index)?,
    ))
}

impl CanonicalFormCompiler {
    /// Split `comp` into `(before, after)` around the calls to `uri`.
    ///
    /// `before` maps the parameter of `comp` to the argument of the merged
    /// call; `after` maps the merged result to the result of `comp`. When the
    /// remainder of `comp` still reads its parameter, `after` takes
    /// `<original_arg=P, intrinsic_results=R>` instead of `R`.
    pub fn force_align_and_split_by_intrinsic(
        &self,
        comp: &Comp,
        uri: IntrinsicUri,
    ) -> FederatedResult<(Comp, Comp)> {
        let _span = debug_span!("force_align_and_split_by_intrinsic", intrinsic = %uri).entered();

        if !comp.is_lambda() {
            return Err(TypeError::UnexpectedNode {
                expected: "a Lambda",
                found: comp.kind().label().to_string(),
            }
            .into());
        }
        let mut names = self.names_for(comp);
        let normalized = beta_reduce(&uniquify_reference_names(comp, &mut names)?, &mut names)?;
        let Some((parameter, parameter_type, body)) = normalized.lambda_parts() else {
            return Err(compilation_error(format!("{comp} did not reduce to a lambda")));
        };

        let calls = self.distinct_calls(body, uri);
        debug!(distinct = calls.len(), "located calls to the target intrinsic");
        if calls.is_empty() {
            return Err(compilation_error(format!(
                "no calls to target intrinsic {uri} found in {comp}"
            )));
        }
        for call in &calls {
            check_alignable(call, uri, parameter)?;
        }

        let merged = merge_calls(uri, &calls, &mut names)?;
        debug!(call = %merged.call, "merged intrinsic call");
        let before = BuildingBlock::lambda(
            parameter.clone(),
            parameter_type.clone(),
            merged.bound_argument()?,
        );

        let result_name = names.next_name();
        let result_type = merged.call.type_signature().clone();
        let result = BuildingBlock::reference(result_name.clone(), result_type.clone());
        let mut recover_call = |node: &Comp| -> FederatedResult<Option<Comp>> {
            if !node.is_called_intrinsic(uri) {
                return Ok(None);
            }
            match calls.iter().position(|call| self.same_call(call, node)) {
                Some(index) => {
                    trace!(index, "recovering original result");
                    merged.recover(index, &result, &mut names).map(Some)
                }
                None => Err(compilation_error(format!(
                    "call {node} to {uri} was not aligned with the merged call"
                ))),
            }
        };
        let remainder = transform_postorder(body, &mut recover_call)?;

        let after = if unbound_references(&remainder).contains_key(parameter) {
            debug!("remainder reads the original parameter; threading it through");
            let hybrid_name = names.next_name();
            let hybrid_type = Type::named_tuple([
                (Some(ORIGINAL_ARG), parameter_type.clone()),
                (Some(INTRINSIC_RESULTS), result_type),
            ]);
            let hybrid = BuildingBlock::reference(hybrid_name.clone(), hybrid_type.clone());
            let original = BuildingBlock::selection(hybrid.clone(), 0)?;
            let results = BuildingBlock::selection(hybrid, 1)?;
            let body = substitute(&remainder, parameter, &original, &mut names)?;
            let body = substitute(&body, &result_name, &results, &mut names)?;
            BuildingBlock::lambda(hybrid_name, hybrid_type, body)
        } else {
            BuildingBlock::lambda(result_name, result_type, remainder)
        };

        debug!(
            before = %before.type_signature(),
            after = %after.type_signature(),
            "split complete"
        );
        Ok((before, after))
    }

    /// Calls to `uri` in `body`, merging duplicates
    fn distinct_calls(&self, body: &Comp, uri: IntrinsicUri) -> Vec<Comp> {
        let mut calls: Vec<Comp> = Vec::new();
        walk(body, &mut |node: &Comp| {
            if node.is_called_intrinsic(uri)
                && !calls.iter().any(|seen| self.same_call(seen, node))
            {
                calls.push(node.clone());
            }
        });
        calls
    }

    fn same_call(&self, a: &Comp, b: &Comp) -> bool {
        if self.config().deduplicate_intrinsic_calls {
            alpha_equivalent(a, b)
        } else {
            a == b
        }
    }
}

/// Split `comp` around `uri` with the default configuration
pub fn force_align_and_split_by_intrinsic(
    comp: &Comp,
    uri: IntrinsicUri,
) -> FederatedResult<(Comp, Comp)> {
    CanonicalFormCompiler::default().force_align_and_split_by_intrinsic(comp, uri)
}

/// A call can be hoisted only if its argument needs nothing but `parameter`
fn check_alignable(
    call: &Comp,
    uri: IntrinsicUri,
    parameter: &CompactString,
) -> FederatedResult<()> {
    let Some((_, Some(argument))) = call.call_parts() else {
        return Err(compilation_error(format!("call {call} to {uri} has no argument")));
    };
    if contains_intrinsic(argument, uri) {
        return Err(compilation_error(format!(
            "cannot align {call}: its argument depends on another call to {uri}"
        )));
    }
    if let Some(local) = unbound_references(argument).keys().find(|name| *name != parameter) {
        return Err(compilation_error(format!(
            "cannot align {call}: its argument depends on locally bound name {local}"
        )));
    }
    Ok(())
}

fn merge_calls(
    uri: IntrinsicUri,
    calls: &[Comp],
    names: &mut NameGenerator,
) -> FederatedResult<MergedCall> {
    if let [call] = calls {
        return Ok(MergedCall {
            call: call.clone(),
            recovery: Recovery::Whole,
            scopes: Vec::new(),
        });
    }
    let arguments = calls
        .iter()
        .map(|call| match call.call_parts() {
            Some((_, Some(argument))) => Ok(argument.clone()),
            _ => Err(compilation_error(format!("call {call} to {uri} has no argument"))),
        })
        .collect::<FederatedResult<Vec<_>>>()?;
    debug!(count = calls.len(), "merging distinct calls");

    let mut scopes = Vec::new();
    let (call, recovery) = match uri {
        IntrinsicUri::FederatedBroadcast => {
            let zipped = create_federated_zip(BuildingBlock::unnamed_tuple(arguments))?;
            (create_federated_broadcast(zipped)?, Recovery::MapAllEqual)
        }
        IntrinsicUri::FederatedSum => {
            let zipped = create_federated_zip(BuildingBlock::unnamed_tuple(arguments))?;
            (create_federated_sum(zipped)?, Recovery::Apply)
        }
        IntrinsicUri::FederatedMean => {
            let zipped = create_federated_zip(BuildingBlock::unnamed_tuple(arguments))?;
            (create_federated_mean(zipped)?, Recovery::Apply)
        }
        IntrinsicUri::FederatedValueAtServer => (
            create_federated_value(BuildingBlock::unnamed_tuple(arguments), Placement::Server)?,
            Recovery::Apply,
        ),
        IntrinsicUri::FederatedValueAtClients => (
            create_federated_value(BuildingBlock::unnamed_tuple(arguments), Placement::Clients)?,
            Recovery::MapAllEqual,
        ),
        IntrinsicUri::FederatedAggregate => {
            let unpacked = arguments
                .iter()
                .map(|argument| {
                    unpack_argument(argument, IntrinsicUri::FederatedAggregate, 5, names)
                })
                .collect::<FederatedResult<Vec<_>>>()?;
            let call = merge_aggregates(&unpacked, names)?;
            scopes.extend(unpacked.into_iter().filter(UnpackedArgument::is_bound));
            (call, Recovery::Apply)
        }
        other => {
            return Err(compilation_error(format!(
                "cannot merge {} calls to {other} into one call",
                calls.len()
            )))
        }
    };
    Ok(MergedCall {
        call,
        recovery,
        scopes,
    })
}

/// One aggregate over the zipped values with component-wise operators
fn merge_aggregates(
    arguments: &[UnpackedArgument],
    names: &mut NameGenerator,
) -> FederatedResult<Comp> {
    let mut values = Vec::with_capacity(arguments.len());
    let mut zeros = Vec::with_capacity(arguments.len());
    let mut accumulates = Vec::with_capacity(arguments.len());
    let mut merges = Vec::with_capacity(arguments.len());
    let mut reports = Vec::with_capacity(arguments.len());
    for argument in arguments {
        let parts = &argument.elements;
        values.push(parts[0].clone());
        zeros.push(parts[1].clone());
        accumulates.push(parts[2].clone());
        merges.push(parts[3].clone());
        reports.push(parts[4].clone());
    }

    let value = create_federated_zip(BuildingBlock::unnamed_tuple(values))?;
    let zero = BuildingBlock::unnamed_tuple(zeros);
    let accumulator_type = zero.type_signature().clone();
    let Some((member_type, _, _)) = value.type_signature().placed_parts() else {
        return Err(TypeError::NotPlaced {
            ty: value.type_signature().clone(),
        }
        .into());
    };
    let member_type = member_type.clone();

    let accumulate = pairwise(&accumulates, &accumulator_type, &member_type, names)?;
    let merge = pairwise(&merges, &accumulator_type, &accumulator_type, names)?;

    let report_name = names.next_name();
    let report_reference = BuildingBlock::reference(report_name.clone(), accumulator_type.clone());
    let reported = reports
        .into_iter()
        .enumerate()
        .map(|(index, report)| {
            let component = BuildingBlock::selection(report_reference.clone(), index)?;
            BuildingBlock::call(report, Some(component))
        })
        .collect::<FederatedResult<Vec<_>>>()?;
    let report = BuildingBlock::lambda(
        report_name,
        accumulator_type,
        BuildingBlock::unnamed_tuple(reported),
    );

    create_federated_aggregate(value, zero, accumulate, merge, report)
}

/// `(a -> <f_0(<a[0][0], a[1][0]>), f_1(<a[0][1], a[1][1]>), ...>)`
fn pairwise(
    functions: &[Comp],
    left: &Type,
    right: &Type,
    names: &mut NameGenerator,
) -> FederatedResult<Comp> {
    let parameter = names.next_name();
    let parameter_type = Type::tuple([left.clone(), right.clone()]);
    let reference = BuildingBlock::reference(parameter.clone(), parameter_type.clone());
    let lhs = BuildingBlock::selection(reference.clone(), 0)?;
    let rhs = BuildingBlock::selection(reference, 1)?;
    let components = functions
        .iter()
        .enumerate()
        .map(|(index, function)| {
            let pair = BuildingBlock::unnamed_tuple([
                BuildingBlock::selection(lhs.clone(), index)?,
                BuildingBlock::selection(rhs.clone(), index)?,
            ]);
            BuildingBlock::call(function.clone(), Some(pair))
        })
        .collect::<FederatedResult<Vec<_>>>()?;
    Ok(BuildingBlock::lambda(
        parameter,
        parameter_type,
        BuildingBlock::unnamed_tuple(components),
    ))
}

#[cfg(test)]
mod tests;
