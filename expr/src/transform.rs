//! Tree transformations: substitution, type propagation, constant folding
//! and cast insertion.
//!
//! All transformers are pure; they return a new tree and share unchanged
//! subtrees with the input. Trees are immutable, so sharing is safe.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::ast::Expr;
use crate::ast::ops::{BinaryOp, UnaryOp};
use crate::error::EvalError;
use crate::eval::evaluate;
use crate::types::ValueType;
use crate::value::Value;

/// Replaces free symbols with constant values.
///
/// Symbols not named in `bindings` stay free; declared symbol types of the
/// replaced nodes are discarded since the constant carries its own type.
pub fn substitute(expr: &Arc<Expr>, bindings: &HashMap<String, Value>) -> Arc<Expr> {
    match expr.as_ref() {
        Expr::Symbol { name, .. } => match bindings.get(name.as_ref()) {
            Some(value) => Arc::new(Expr::Constant(value.clone())),
            None => Arc::clone(expr),
        },
        _ => Arc::new(expr.map_children(|child| substitute(child, bindings))),
    }
}

/// Replaces free symbols with other expressions.
///
/// The replacement trees may themselves contain free symbols; those are not
/// substituted again, so a binding `x -> x + 1` terminates.
pub fn substitute_exprs(expr: &Arc<Expr>, bindings: &HashMap<String, Arc<Expr>>) -> Arc<Expr> {
    match expr.as_ref() {
        Expr::Symbol { name, .. } => match bindings.get(name.as_ref()) {
            Some(replacement) => Arc::clone(replacement),
            None => Arc::clone(expr),
        },
        _ => Arc::new(expr.map_children(|child| substitute_exprs(child, bindings))),
    }
}

/// Rebuilds symbol nodes with the declared types from `types`.
///
/// Symbols not named keep their current annotation.
pub fn set_types(expr: &Arc<Expr>, types: &HashMap<String, ValueType>) -> Arc<Expr> {
    map_symbol_types(expr, &mut |name, current| {
        types.get(name).copied().or(current)
    })
}

/// Rebuilds symbol nodes with the types of the given values.
pub fn set_types_from(expr: &Arc<Expr>, values: &HashMap<String, Value>) -> Arc<Expr> {
    map_symbol_types(expr, &mut |name, current| {
        values.get(name).map(Value::value_type).or(current)
    })
}

/// Declares one type for several symbols at once.
///
/// With `names == None` every free symbol receives `ty`; otherwise only the
/// named ones do.
pub fn set_types_fixed(expr: &Arc<Expr>, names: Option<&BTreeSet<String>>, ty: ValueType) -> Arc<Expr> {
    map_symbol_types(expr, &mut |name, current| {
        match names {
            Some(names) if !names.contains(name) => current,
            _ => Some(ty),
        }
    })
}

fn map_symbol_types(
    expr: &Arc<Expr>,
    typing: &mut impl FnMut(&str, Option<ValueType>) -> Option<ValueType>,
) -> Arc<Expr> {
    match expr.as_ref() {
        Expr::Symbol { name, ty } => {
            let new_ty = typing(name, *ty);
            if new_ty == *ty {
                Arc::clone(expr)
            } else {
                Arc::new(Expr::Symbol {
                    name: Arc::clone(name),
                    ty: new_ty,
                })
            }
        }
        _ => Arc::new(expr.map_children(|child| map_symbol_types(child, typing))),
    }
}

/// Rewrites the tree top-down.
///
/// `mapping` is offered every node, outermost first. When it returns a
/// replacement, the replacement is taken verbatim and not descended into;
/// otherwise the children are rewritten recursively. Used for wrapping
/// subtrees, e.g. in cache nodes.
pub fn rewrite<F>(expr: &Arc<Expr>, mapping: &mut F) -> Arc<Expr>
where
    F: FnMut(&Arc<Expr>) -> Option<Arc<Expr>>,
{
    if let Some(replacement) = mapping(expr) {
        return replacement;
    }
    Arc::new(expr.map_children(|child| rewrite(child, mapping)))
}

/// Evaluates constant subtrees ahead of time.
///
/// Every node is tried against the empty symbol table, outermost first. A
/// successful evaluation replaces the node with a constant, re-cast to the
/// node's static type when the two differ (so `if_then(true, 1, 2.0)` folds
/// to `1.0`, not `1`). Unbound symbols and missing attributes leave the node
/// in place and folding descends into its children instead.
///
/// # Errors
///
/// Any other fault of a constant subtree, such as division by zero, is a
/// genuine error in the formula and is returned. This holds even inside a
/// lazy chain that might skip the subtree at run time.
pub fn fold_constants(expr: &Arc<Expr>) -> Result<Arc<Expr>, EvalError> {
    if let Expr::Constant(_) = expr.as_ref() {
        return Ok(Arc::clone(expr));
    }
    match evaluate(expr, &()) {
        Ok(value) => {
            let ty = expr.result_type();
            let value = if value.value_type() == ty {
                value
            } else {
                value.cast(ty)?
            };
            Ok(Arc::new(Expr::Constant(value)))
        }
        Err(err) if err.is_unbound() => {
            let mut fault = None;
            let folded = expr.map_children(|child| match fold_constants(child) {
                Ok(folded) => folded,
                Err(err) => {
                    fault.get_or_insert(err);
                    Arc::clone(child)
                }
            });
            match fault {
                None => Ok(Arc::new(folded)),
                Some(err) => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

/// Makes implicit conversions explicit.
///
/// Wherever an operand's static type is strictly below the type the operator
/// works at, a cast node is inserted: logical terms and conditions become
/// `bool`, mixed arithmetic is widened to its join type, `/` and `**`
/// operands become `float`, and call arguments follow the selected function
/// signature. Conversions that could lose information are never inserted;
/// an operand the operator cannot take as-is is left for the evaluating
/// backend to reject or to handle through the object path.
pub fn insert_casts(expr: &Arc<Expr>) -> Arc<Expr> {
    let expr = Arc::new(expr.map_children(|child| insert_casts(child)));
    match expr.as_ref() {
        Expr::Unary {
            op: UnaryOp::Not,
            inner,
        } => Arc::new(Expr::Unary {
            op: UnaryOp::Not,
            inner: coerce(inner, ValueType::Bool),
        }),
        Expr::Binary { op, lhs, rhs } => {
            let operand_ty = binary_operand_type(*op, lhs.result_type(), rhs.result_type());
            match operand_ty {
                Some(ty) => Arc::new(Expr::Binary {
                    op: *op,
                    lhs: widen(lhs, ty),
                    rhs: widen(rhs, ty),
                }),
                None => expr,
            }
        }
        Expr::Logical { op, terms } => Arc::new(Expr::Logical {
            op: *op,
            terms: terms.iter().map(|term| coerce(term, ValueType::Bool)).collect(),
        }),
        Expr::Call {
            function,
            args,
            kwargs,
        } => match expr.function_signature() {
            Some(signature) => {
                let args = args
                    .iter()
                    .zip(&signature.params)
                    .map(|(arg, &param)| {
                        if param == ValueType::Bool {
                            coerce(arg, param)
                        } else {
                            widen(arg, param)
                        }
                    })
                    .collect();
                Arc::new(Expr::Call {
                    function: Arc::clone(function),
                    args,
                    kwargs: kwargs.clone(),
                })
            }
            None => expr,
        },
        _ => expr,
    }
}

/// Operand type a binary operator evaluates at, or `None` when its operands
/// are taken as they come.
fn binary_operand_type(op: BinaryOp, lhs: ValueType, rhs: ValueType) -> Option<ValueType> {
    let ty = match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::FloorDiv | BinaryOp::Rem => {
            lhs.arithmetic_join(rhs)
        }
        BinaryOp::Div | BinaryOp::Pow => {
            if lhs == ValueType::Object || rhs == ValueType::Object {
                ValueType::Object
            } else {
                ValueType::Float
            }
        }
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::BitAnd | BinaryOp::BitXor | BinaryOp::BitOr => {
            ValueType::Int
        }
        BinaryOp::Eq | BinaryOp::Lt | BinaryOp::Le => lhs.join(rhs),
        BinaryOp::In => ValueType::Object,
    };
    (ty != ValueType::Object).then_some(ty)
}

/// Casts unconditionally on any type mismatch; used where the target has a
/// defined conversion from everything, i.e. truthiness.
fn coerce(child: &Arc<Expr>, ty: ValueType) -> Arc<Expr> {
    if child.result_type() == ty {
        Arc::clone(child)
    } else {
        Expr::cast(ty, Arc::clone(child))
    }
}

/// Casts only when the conversion is a lossless promotion.
fn widen(child: &Arc<Expr>, ty: ValueType) -> Arc<Expr> {
    let current = child.result_type();
    if current == ty || current.join(ty) != ty {
        Arc::clone(child)
    } else {
        Expr::cast(ty, Arc::clone(child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ops::BoolOp;
    use assert_matches::assert_matches;

    fn parse(input: &str) -> Arc<Expr> {
        Expr::parse(input).unwrap()
    }

    #[test]
    fn substitution_replaces_named_symbols() {
        let expr = parse("x + y * x");
        let bindings = HashMap::from([("x".to_owned(), Value::Int(2))]);
        let substituted = substitute(&expr, &bindings);

        assert_eq!(substituted, parse("2 + y * 2"));
        assert_eq!(
            substituted.symbol_names().into_iter().collect::<Vec<_>>(),
            ["y"]
        );
    }

    #[test]
    fn substitution_commutes_with_evaluation() {
        let expr = parse("x ** 2 + y");
        let bindings = HashMap::from([("x".to_owned(), Value::Float(1.5))]);
        let substituted = substitute(&expr, &bindings);

        let mut env = HashMap::new();
        env.insert("y".to_owned(), Value::Int(1));
        let partial = evaluate(&substituted, &env).unwrap();
        env.insert("x".to_owned(), Value::Float(1.5));
        let full = evaluate(&expr, &env).unwrap();
        assert_eq!(partial, full);
    }

    #[test]
    fn expression_substitution_shares_the_replacement() {
        let expr = parse("x * x");
        let bindings = HashMap::from([("x".to_owned(), parse("a + 1"))]);
        let substituted = substitute_exprs(&expr, &bindings);
        assert_eq!(substituted, parse("(a + 1) * (a + 1)"));

        // A self-referential binding is applied once, not recursively.
        let bindings = HashMap::from([("x".to_owned(), parse("x + 1"))]);
        let substituted = substitute_exprs(&expr, &bindings);
        assert_eq!(substituted, parse("(x + 1) * (x + 1)"));
    }

    #[test]
    fn declared_types_propagate() {
        let expr = parse("pt + 1");
        assert_eq!(expr.result_type(), ValueType::Object);

        let typed = set_types(&expr, &HashMap::from([("pt".to_owned(), ValueType::Float)]));
        assert_eq!(typed.result_type(), ValueType::Float);

        let values = HashMap::from([("pt".to_owned(), Value::Int(7))]);
        let typed = set_types_from(&expr, &values);
        assert_eq!(typed.result_type(), ValueType::Int);
    }

    #[test]
    fn fixed_types_cover_all_or_selected_symbols() {
        let expr = parse("a + b");
        let typed = set_types_fixed(&expr, None, ValueType::Float);
        assert_eq!(typed.result_type(), ValueType::Float);

        let only_a = BTreeSet::from(["a".to_owned()]);
        let typed = set_types_fixed(&expr, Some(&only_a), ValueType::Float);
        assert_matches!(
            &*typed,
            Expr::Binary { lhs, rhs, .. }
                if lhs.result_type() == ValueType::Float
                    && rhs.result_type() == ValueType::Object
        );
    }

    #[test]
    fn constant_subtrees_fold() {
        let folded = fold_constants(&parse("2 * (3 + 4)")).unwrap();
        assert_matches!(&*folded, Expr::Constant(Value::Int(14)));

        let folded = fold_constants(&parse("x + 2 * 3")).unwrap();
        assert_eq!(folded, parse("x + 6"));
    }

    #[test]
    fn folded_constants_keep_the_static_type() {
        let folded = fold_constants(&parse("if_then(true, 1, 2.0)")).unwrap();
        assert_matches!(&*folded, Expr::Constant(Value::Float(x)) if *x == 1.0);
    }

    #[test]
    fn folding_reports_constant_faults() {
        assert_matches!(
            fold_constants(&parse("x + 1 / 0")),
            Err(EvalError::Numeric(_))
        );
    }

    #[test]
    fn unbound_and_attribute_lookups_survive_folding() {
        let expr = parse("event.pt + 1");
        let folded = fold_constants(&expr).unwrap();
        assert_eq!(folded, expr);

        let expr = parse("'abc'.pt");
        let folded = fold_constants(&expr).unwrap();
        assert_eq!(folded, expr);
    }

    #[test]
    fn mixed_arithmetic_gets_widening_casts() {
        let expr = insert_casts(&parse("1 + 2.5"));
        let expected = Expr::binary(
            BinaryOp::Add,
            Expr::cast(ValueType::Float, Arc::new(Expr::Constant(Value::Int(1)))),
            Arc::new(Expr::Constant(Value::Float(2.5))),
        );
        assert_eq!(expr, expected);

        let div = insert_casts(&parse("6 / 3"));
        assert_matches!(
            &*div,
            Expr::Binary { lhs, rhs, .. }
                if matches!(&**lhs, Expr::Cast { ty: ValueType::Float, .. })
                    && matches!(&**rhs, Expr::Cast { ty: ValueType::Float, .. })
        );
    }

    #[test]
    fn logical_terms_get_truth_casts() {
        let expr = parse("flag and 1");
        let expr = set_types(&expr, &HashMap::from([("flag".to_owned(), ValueType::Bool)]));
        let expr = insert_casts(&expr);
        assert_matches!(
            &*expr,
            Expr::Logical { op: BoolOp::And, terms }
                if matches!(&*terms[0], Expr::Symbol { .. })
                    && matches!(&*terms[1], Expr::Cast { ty: ValueType::Bool, .. })
        );
    }

    #[test]
    fn call_arguments_follow_the_signature() {
        let expr = parse("sqrt(n)");
        let expr = set_types(&expr, &HashMap::from([("n".to_owned(), ValueType::Int)]));
        let expr = insert_casts(&expr);
        assert_matches!(
            &*expr,
            Expr::Call { args, .. }
                if matches!(&*args[0], Expr::Cast { ty: ValueType::Float, .. })
        );
    }

    #[test]
    fn untyped_operands_are_left_alone() {
        let expr = parse("x + 1");
        assert_eq!(insert_casts(&expr), expr);
    }

    #[test]
    fn casts_do_not_narrow() {
        let expr = parse("x & 3");
        let expr = set_types(&expr, &HashMap::from([("x".to_owned(), ValueType::Float)]));
        let with_casts = insert_casts(&expr);
        assert_eq!(with_casts, expr);
    }

    #[test]
    fn rewriting_stops_at_replacements() {
        let expr = parse("(a + b) * (a + b) + a");
        let target = parse("a + b");
        let mut hits = 0;
        let rewritten = rewrite(&expr, &mut |node| {
            (**node == *target).then(|| {
                hits += 1;
                Expr::cached(0, Arc::clone(node))
            })
        });

        assert_eq!(hits, 2);
        assert_ne!(rewritten, expr);
        let mut cached_nodes = 0;
        rewritten.visit(&mut |node| {
            if matches!(node, Expr::Cached { .. }) {
                cached_nodes += 1;
            }
        });
        assert_eq!(cached_nodes, 2);
    }
}
