//! Consolidation of local processing into compiled units
//!
//! A computation that moves no data between placements is reduced to a
//! single compiled unit. Placed values are projected to their members and
//! the structural intrinsics (map, map-all-equal, apply, value-at and zip)
//! become plain local computation; any other intrinsic makes the input
//! non-local and is reported.

use crate::compiler::CanonicalFormCompiler;
use crate::reduce::{beta_reduce, eta_reduce_compiled_units};
use compact_str::CompactString;
use fedcomp_core::{compilation_error, FederatedResult, Type, TypeError};
use fedcomp_ir::intrinsics::unpack_argument;
use fedcomp_ir::tree::{map_children, substitute, unbound_references};
use fedcomp_ir::{compile_local, BlockKind, BuildingBlock, Comp, IntrinsicUri, NameGenerator};
use indexmap::IndexMap;
use tracing::{debug, debug_span, trace};

impl CanonicalFormCompiler {
    /// Reduce `comp` to one compiled unit.
    ///
    /// A function-typed input yields a unit of the placement-stripped
    /// function type. A value yields a niladic unit producing the stripped
    /// value. A value with unbound references is first abstracted over them:
    /// one reference becomes the parameter as is, several become a named
    /// tuple parameter in first-occurrence order.
    pub fn consolidate_and_extract_local_processing(&self, comp: &Comp) -> FederatedResult<Comp> {
        let _span = debug_span!(
            "consolidate_and_extract_local_processing",
            kind = comp.kind().label()
        )
        .entered();

        if let BlockKind::Reference { name } = comp.kind() {
            if comp.type_signature().is_function() {
                return Err(TypeError::FunctionalReference {
                    name: name.to_string(),
                    ty: comp.type_signature().clone(),
                }
                .into());
            }
        }

        let mut names = self.names_for(comp);
        let unbound = unbound_references(comp);
        let subject = if unbound.is_empty() {
            comp.clone()
        } else if comp.type_signature().is_function() {
            return Err(compilation_error(format!(
                "cannot extract local processing from {comp}: \
                 the function refers to unbound names {:?}",
                unbound.keys().map(|n| n.as_str()).collect::<Vec<_>>()
            )));
        } else {
            debug!(unbound = unbound.len(), "lifting open value over its unbound references");
            lift_unbound_references(comp, &unbound, &mut names)?
        };

        let extracted = if subject.type_signature().is_function() {
            self.extract_function(&subject, &mut names)?
        } else {
            self.extract_value(&subject, &mut names)?
        };

        if self.config().verify_extraction {
            if subject.type_signature().is_function() {
                check_extraction_result(&subject, &extracted)?;
            } else {
                let called = BuildingBlock::call(extracted.clone(), None)?;
                check_extraction_result(&subject, &called)?;
            }
        }
        debug!(unit = %extracted, ty = %extracted.type_signature(), "extracted compiled unit");
        Ok(extracted)
    }

    fn extract_function(&self, comp: &Comp, names: &mut NameGenerator) -> FederatedResult<Comp> {
        if comp.is_compiled_unit() {
            return Ok(comp.clone());
        }
        let Some((Some(parameter_type), _)) = comp.type_signature().function_parts() else {
            // Niladic and not a unit: it must reduce to one.
            let reduced = beta_reduce(&strip_placements(comp, names)?, names)?;
            return if reduced.is_compiled_unit() {
                Ok(reduced)
            } else {
                Err(compilation_error(format!(
                    "niladic function {comp} does not reduce to a compiled unit"
                )))
            };
        };
        let lambda = if comp.is_lambda() {
            comp.clone()
        } else {
            // Eta-expand so the body can be reduced.
            let parameter = names.next_name();
            trace!(parameter = %parameter, "eta-expanding function-typed node");
            let reference = BuildingBlock::reference(parameter.clone(), parameter_type.clone());
            BuildingBlock::lambda(
                parameter,
                parameter_type.clone(),
                BuildingBlock::call(comp.clone(), Some(reference))?,
            )
        };
        let local = strip_placements(&lambda, names)?;
        let reduced = eta_reduce_compiled_units(&beta_reduce(&local, names)?)?;
        if reduced.is_compiled_unit() {
            debug!("function reduced to a single compiled unit");
            return Ok(reduced);
        }
        compile_local(&reduced)
    }

    fn extract_value(&self, comp: &Comp, names: &mut NameGenerator) -> FederatedResult<Comp> {
        let local = strip_placements(comp, names)?;
        let reduced = eta_reduce_compiled_units(&beta_reduce(&local, names)?)?;
        if let Some((function, None)) = reduced.call_parts() {
            if function.is_compiled_unit() {
                debug!("value reduced to a single niladic call");
                return Ok(function.clone());
            }
        }
        compile_local(&reduced)
    }
}

/// Reduce `comp` to one compiled unit with the default configuration
pub fn consolidate_and_extract_local_processing(comp: &Comp) -> FederatedResult<Comp> {
    CanonicalFormCompiler::default().consolidate_and_extract_local_processing(comp)
}

/// Verify that `extracted` is a faithful extraction of `original`.
///
/// A function must be extracted to a compiled unit; a value to a call of
/// one. Either way the extracted type must equal the original type with
/// placements stripped.
pub fn check_extraction_result(original: &Comp, extracted: &Comp) -> FederatedResult<()> {
    let original_type = original.type_signature();
    if original_type.is_function() {
        if !extracted.is_compiled_unit() {
            return Err(compilation_error(format!(
                "we have the functional type {original_type}, \
                 but the extracted computation {extracted} is not a compiled unit"
            )));
        }
    } else if extracted.is_compiled_unit() {
        return Err(compilation_error(format!(
            "we have the non-functional type {original_type}, \
             but the extracted computation {extracted} is a compiled unit of type {}",
            extracted.type_signature()
        )));
    } else if !extracted.is_called_compiled_unit() {
        return Err(compilation_error(format!(
            "we have the non-functional type {original_type}, \
             but the extracted computation {extracted} is missing a call to a compiled unit"
        )));
    }
    let expected = original_type.strip_placement();
    if extracted.type_signature() != &expected {
        return Err(compilation_error(format!(
            "extracted computation {extracted} has the incorrect type {}; expected {expected}",
            extracted.type_signature()
        )));
    }
    Ok(())
}

/// Abstract an open value over its unbound references
fn lift_unbound_references(
    comp: &Comp,
    unbound: &IndexMap<CompactString, Type>,
    names: &mut NameGenerator,
) -> FederatedResult<Comp> {
    if unbound.len() == 1 {
        if let Some((name, ty)) = unbound.first() {
            return Ok(BuildingBlock::lambda(name.clone(), ty.clone(), comp.clone()));
        }
    }
    let parameter = names.next_name();
    let parameter_type = Type::NamedTuple(
        unbound
            .iter()
            .map(|(name, ty)| (Some(name.clone()), ty.clone()))
            .collect(),
    );
    let reference = BuildingBlock::reference(parameter.clone(), parameter_type.clone());
    let mut body = comp.clone();
    for (index, name) in unbound.keys().enumerate() {
        let selection = BuildingBlock::selection(reference.clone(), index)?;
        body = substitute(&body, name, &selection, names)?;
    }
    Ok(BuildingBlock::lambda(parameter, parameter_type, body))
}

/// Project placed values to their members and inline structural intrinsics
fn strip_placements(comp: &Comp, names: &mut NameGenerator) -> FederatedResult<Comp> {
    match comp.kind() {
        BlockKind::Reference { name } => {
            let stripped = comp.type_signature().strip_placement();
            if &stripped == comp.type_signature() {
                return Ok(comp.clone());
            }
            Ok(BuildingBlock::reference(name.clone(), stripped))
        }
        BlockKind::Lambda {
            parameter_name,
            parameter_type,
            result,
        } => Ok(BuildingBlock::lambda(
            parameter_name.clone(),
            parameter_type.strip_placement(),
            strip_placements(result, names)?,
        )),
        BlockKind::Call { function, argument } => {
            let BlockKind::Intrinsic { uri } = function.kind() else {
                return map_children(comp, |child| strip_placements(child, names));
            };
            let Some(argument) = argument else {
                return Err(compilation_error(format!(
                    "intrinsic {uri} called without an argument"
                )));
            };
            let argument = strip_placements(argument, names)?;
            inline_intrinsic(*uri, &argument, names)
        }
        BlockKind::Tuple { .. } | BlockKind::Selection { .. } => {
            map_children(comp, |child| strip_placements(child, names))
        }
        BlockKind::Intrinsic { uri } => Err(compilation_error(format!(
            "cannot consolidate a reference to the intrinsic {uri} that is not called"
        ))),
        BlockKind::CompiledUnit { .. } => Ok(comp.clone()),
    }
}

fn inline_intrinsic(
    uri: IntrinsicUri,
    argument: &Comp,
    names: &mut NameGenerator,
) -> FederatedResult<Comp> {
    if !uri.is_structural() {
        return Err(compilation_error(format!(
            "cannot consolidate a call to {uri}: \
             it moves data between placements, so the computation is not local"
        )));
    }
    trace!(intrinsic = %uri, "inlining structural intrinsic");
    match uri {
        IntrinsicUri::FederatedMap
        | IntrinsicUri::FederatedMapAllEqual
        | IntrinsicUri::FederatedApply => {
            let unpacked = unpack_argument(argument, uri, 2, names)?;
            let function = unpacked.elements[0].clone();
            let value = unpacked.elements[1].clone();
            unpacked.bind(BuildingBlock::call(function, Some(value))?)
        }
        _ => Ok(argument.clone()),
    }
}
