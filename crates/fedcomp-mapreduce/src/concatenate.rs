//! Combining two functions of one parameter into one function

use crate::compiler::CanonicalFormCompiler;
use fedcomp_core::{FederatedResult, TypeError};
use fedcomp_ir::tree::{bound_names, substitute};
use fedcomp_ir::{check_has_unique_names, uniquify_reference_names, BuildingBlock, Comp};
use std::collections::HashSet;
use tracing::{debug, debug_span};

impl CanonicalFormCompiler {
    /// `(n -> <a_body[a.p := n], b_body[b.p := n]>)` for a fresh `n`.
    ///
    /// Both inputs must be lambdas over the same parameter type with unique
    /// bound names. Binders of `b` that collide with binders of `a` are
    /// renamed, so the result has unique bound names too.
    pub fn concatenate_function_outputs(&self, a: &Comp, b: &Comp) -> FederatedResult<Comp> {
        let _span = debug_span!("concatenate_function_outputs").entered();

        let (Some((a_parameter, a_type, a_body)), Some((b_parameter, b_type, b_body))) =
            (a.lambda_parts(), b.lambda_parts())
        else {
            let offender = if a.is_lambda() { b } else { a };
            return Err(TypeError::UnexpectedNode {
                expected: "a Lambda",
                found: offender.kind().label().to_string(),
            }
            .into());
        };
        if a_type != b_type {
            return Err(TypeError::Mismatch {
                context: "parameters of concatenated functions",
                expected: a_type.clone(),
                actual: b_type.clone(),
            }
            .into());
        }
        check_has_unique_names(a)?;
        check_has_unique_names(b)?;

        let mut names = self.names_for(a);
        names.reserve_tree(b);
        let shared = names.next_name();
        let shared_reference = BuildingBlock::reference(shared.clone(), a_type.clone());
        let first = substitute(a_body, a_parameter, &shared_reference, &mut names)?;
        let mut second = substitute(b_body, b_parameter, &shared_reference, &mut names)?;

        let first_binders: HashSet<_> = bound_names(&first).into_iter().collect();
        if bound_names(&second).iter().any(|name| first_binders.contains(name)) {
            debug!("renaming binders of the second function that collide with the first");
            second = uniquify_reference_names(&second, &mut names)?;
        }
        Ok(BuildingBlock::lambda(
            shared,
            a_type.clone(),
            BuildingBlock::unnamed_tuple([first, second]),
        ))
    }
}

/// Concatenate the outputs of `a` and `b` with the default configuration
pub fn concatenate_function_outputs(a: &Comp, b: &Comp) -> FederatedResult<Comp> {
    CanonicalFormCompiler::default().concatenate_function_outputs(a, b)
}
