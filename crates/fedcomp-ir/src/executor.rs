//! Executor interface and the reference executor
//!
//! Transformations never run compiled units; executors do. The
//! [`ReferenceExecutor`] understands the payloads produced by
//! [`crate::compiled`] and is used to check that extracted units compute
//! what the original trees computed.

use crate::building_block::{BlockKind, Comp};
use crate::compiled::{LocalProgram, Value};
use compact_str::CompactString;
use fedcomp_core::{ExecutionError, FederatedResult, TypeError};
use tracing::trace;

/// Runs compiled units
pub trait LocalExecutor {
    /// Invoke `unit`; `argument` is present iff the unit takes a parameter
    fn invoke(&self, unit: &Comp, argument: Option<Value>) -> FederatedResult<Value>;
}

/// Environment-passing evaluator for [`LocalProgram`] payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceExecutor;

impl ReferenceExecutor {
    pub fn new() -> Self {
        ReferenceExecutor
    }
}

/// Runtime values: data, tuples that may hold functions, and callables
#[derive(Debug, Clone)]
enum RuntimeValue {
    Data(Value),
    Tuple(Vec<(Option<CompactString>, RuntimeValue)>),
    Closure(Closure),
    Unit(Comp),
}

#[derive(Debug, Clone)]
struct Closure {
    parameter: CompactString,
    body: Comp,
    env: Env,
}

type Env = im::HashMap<CompactString, RuntimeValue>;

impl RuntimeValue {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Tuple(elements) => RuntimeValue::Tuple(
                elements
                    .into_iter()
                    .map(|(name, v)| (name, RuntimeValue::from_value(v)))
                    .collect(),
            ),
            other => RuntimeValue::Data(other),
        }
    }

    fn into_value(self) -> Result<Value, ExecutionError> {
        match self {
            RuntimeValue::Data(value) => Ok(value),
            RuntimeValue::Tuple(elements) => elements
                .into_iter()
                .map(|(name, v)| v.into_value().map(|v| (name, v)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Tuple),
            RuntimeValue::Closure(closure) => Err(ExecutionError::UnexpectedValue {
                expected: "a value",
                found: format!("function ({} -> {})", closure.parameter, closure.body),
            }),
            RuntimeValue::Unit(unit) => Err(ExecutionError::UnexpectedValue {
                expected: "a value",
                found: unit.to_string(),
            }),
        }
    }
}

impl LocalExecutor for ReferenceExecutor {
    fn invoke(&self, unit: &Comp, argument: Option<Value>) -> FederatedResult<Value> {
        let Some(payload) = unit.payload() else {
            return Err(TypeError::UnexpectedNode {
                expected: "a compiled unit",
                found: unit.to_string(),
            }
            .into());
        };
        let takes_argument = matches!(
            unit.type_signature().function_parts(),
            Some((Some(_), _))
        );
        match (takes_argument, argument.is_some()) {
            (true, false) => {
                return Err(ExecutionError::Arity {
                    ty: unit.type_signature().clone(),
                    detail: "without its argument",
                }
                .into())
            }
            (false, true) => {
                return Err(ExecutionError::Arity {
                    ty: unit.type_signature().clone(),
                    detail: "with an argument it does not take",
                }
                .into())
            }
            _ => {}
        }
        trace!(unit = %unit, "invoking compiled unit");
        let program = LocalProgram::decode(payload)?;
        let result = run(program, argument.map(RuntimeValue::from_value))?;
        Ok(result.into_value()?)
    }
}

fn run(
    program: LocalProgram,
    argument: Option<RuntimeValue>,
) -> Result<RuntimeValue, ExecutionError> {
    match program {
        LocalProgram::Constant(value) => Ok(RuntimeValue::Data(value)),
        LocalProgram::Primitive(primitive) => {
            let operands = argument.map(RuntimeValue::into_value).transpose()?;
            match operands {
                Some(Value::Tuple(elements)) if elements.len() == 2 => {
                    Ok(RuntimeValue::Data(primitive.apply(&elements[0].1, &elements[1].1)?))
                }
                other => Err(ExecutionError::UnexpectedValue {
                    expected: "a pair of operands",
                    found: format!("{other:?}"),
                }),
            }
        }
        LocalProgram::Expression(tree) => {
            let env = Env::new();
            let value = eval(&tree, &env)?;
            match argument {
                Some(argument) => apply(value, argument),
                None if tree.type_signature().is_function() => apply_niladic(value),
                None => Ok(value),
            }
        }
    }
}

fn eval(comp: &Comp, env: &Env) -> Result<RuntimeValue, ExecutionError> {
    match comp.kind() {
        BlockKind::Reference { name } => env
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutionError::UnboundName {
                name: name.to_string(),
            }),
        BlockKind::Lambda {
            parameter_name,
            result,
            ..
        } => Ok(RuntimeValue::Closure(Closure {
            parameter: parameter_name.clone(),
            body: result.clone(),
            env: env.clone(),
        })),
        BlockKind::Call { function, argument } => {
            let function = eval(function, env)?;
            match argument {
                Some(argument) => {
                    let argument = eval(argument, env)?;
                    apply(function, argument)
                }
                None => apply_niladic(function),
            }
        }
        BlockKind::Tuple { elements } => elements
            .iter()
            .map(|(name, element)| eval(element, env).map(|v| (name.clone(), v)))
            .collect::<Result<Vec<_>, _>>()
            .map(RuntimeValue::Tuple),
        BlockKind::Selection { source, index } => match eval(source, env)? {
            RuntimeValue::Tuple(mut elements) if *index < elements.len() => {
                Ok(elements.swap_remove(*index).1)
            }
            other => Err(ExecutionError::UnexpectedValue {
                expected: "a tuple with the selected index",
                found: format!("{other:?}"),
            }),
        },
        BlockKind::Intrinsic { uri } => Err(ExecutionError::NonLocal {
            uri: uri.to_string(),
        }),
        BlockKind::CompiledUnit { .. } => Ok(RuntimeValue::Unit(comp.clone())),
    }
}

fn apply(function: RuntimeValue, argument: RuntimeValue) -> Result<RuntimeValue, ExecutionError> {
    match function {
        RuntimeValue::Closure(closure) => {
            let env = closure.env.update(closure.parameter, argument);
            eval(&closure.body, &env)
        }
        RuntimeValue::Unit(unit) => run_unit(&unit, Some(argument)),
        other => Err(ExecutionError::UnexpectedValue {
            expected: "a function",
            found: format!("{other:?}"),
        }),
    }
}

fn apply_niladic(function: RuntimeValue) -> Result<RuntimeValue, ExecutionError> {
    match function {
        RuntimeValue::Unit(unit) => run_unit(&unit, None),
        other => Err(ExecutionError::UnexpectedValue {
            expected: "a niladic compiled unit",
            found: format!("{other:?}"),
        }),
    }
}

fn run_unit(unit: &Comp, argument: Option<RuntimeValue>) -> Result<RuntimeValue, ExecutionError> {
    let payload = unit.payload().ok_or_else(|| ExecutionError::UnexpectedValue {
        expected: "a compiled unit",
        found: unit.to_string(),
    })?;
    run(LocalProgram::decode(payload)?, argument)
}
