//! Lowering from expression trees to VM instructions.
//!
//! Instruction selection is driven entirely by static types: subtrees whose
//! operands all carry data types compile to typed opcodes on the primitive
//! stacks, everything else is kept as an expression node and executed by the
//! reference interpreter through [`Op::EvalNode`]. Because the fallback
//! reproduces interpreter semantics by construction, compilation never
//! fails; an untypable formula just compiles to a slower program.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use ntuple_expr::symbols;
use ntuple_expr::transform;
use ntuple_expr::{
    BinaryOp, BoolOp, Builtin, Expr, FnSignature, Function, UnaryOp, Value, ValueType,
};

use crate::program::{CompiledProgram, Op};

/// Compiles expressions into [`CompiledProgram`]s.
///
/// Types declared here are applied to the tree before lowering, in the same
/// way as [`transform::set_types`]; symbols that end up untyped evaluate
/// through the object path.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    default_type: Option<ValueType>,
    symbol_types: HashMap<String, ValueType>,
}

impl Compiler {
    /// Creates a compiler with no declared symbol types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the type of one symbol.
    #[must_use]
    pub fn with_symbol_type(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.symbol_types.insert(name.into(), ty);
        self
    }

    /// Declares the type of every symbol that is neither covered by
    /// [`with_symbol_type`](Self::with_symbol_type) nor already typed in the
    /// tree.
    #[must_use]
    pub fn with_default_type(mut self, ty: ValueType) -> Self {
        self.default_type = Some(ty);
        self
    }

    /// Compiles an expression.
    ///
    /// The program evaluates to the same values and faults as
    /// [`evaluate`](ntuple_expr::evaluate) applied to the tree after type
    /// annotation and cast insertion.
    pub fn compile(&self, expr: &Arc<Expr>) -> CompiledProgram {
        let source = expr.to_string();

        let mut typed = Arc::clone(expr);
        if !self.symbol_types.is_empty() {
            typed = transform::set_types(&typed, &self.symbol_types);
        }
        if let Some(ty) = self.default_type {
            let untyped = untyped_symbols(&typed);
            if !untyped.is_empty() {
                typed = transform::set_types_fixed(&typed, Some(&untyped), ty);
            }
        }
        let typed = transform::insert_casts(&typed);

        let mut codegen = Codegen::default();
        codegen.expr(&typed);
        CompiledProgram {
            ops: codegen.ops,
            nodes: codegen.nodes,
            source,
            result_type: typed.result_type(),
        }
    }
}

fn untyped_symbols(expr: &Expr) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    expr.visit(&mut |node| {
        if let Expr::Symbol { name, ty: None } = node {
            names.insert(name.to_string());
        }
    });
    names
}

fn is_integral(ty: ValueType) -> bool {
    matches!(ty, ValueType::Bool | ValueType::Int)
}

#[derive(Default)]
struct Codegen {
    ops: Vec<Op>,
    nodes: Vec<Arc<Expr>>,
}

impl Codegen {
    fn expr(&mut self, node: &Arc<Expr>) {
        match node.as_ref() {
            Expr::Constant(value) => self.constant(node, value),
            Expr::Symbol { name, ty } => self.symbol(name, *ty),
            Expr::Cast { ty, inner } => {
                self.expr(inner);
                self.cast(inner.result_type(), *ty);
            }
            Expr::Unary { op, inner } => self.unary(node, *op, inner),
            Expr::Binary { op, lhs, rhs } => self.binary(node, *op, lhs, rhs),
            Expr::Logical { op, terms } => self.logical(*op, terms),
            Expr::Call { function, args, .. } => self.call(node, function, args),
            Expr::Cached { slot, inner } => self.cached(*slot, inner),
            // Attributes, subscripts and tuples have no typed lowering.
            _ => self.fallback(node),
        }
    }

    fn push(&mut self, op: Op) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    /// Compiles a node by embedding it for the reference interpreter, then
    /// moves the result onto the stack its static type calls for.
    fn fallback(&mut self, node: &Arc<Expr>) {
        self.nodes.push(Arc::clone(node));
        let id = self.nodes.len() - 1;
        self.push(Op::EvalNode { id });
        self.cast(ValueType::Object, node.result_type());
    }

    fn constant(&mut self, node: &Arc<Expr>, value: &Value) {
        match value {
            Value::Bool(flag) => self.push(Op::PushInt(i64::from(*flag))),
            Value::Int(int) => self.push(Op::PushInt(*int)),
            Value::Float(float) => self.push(Op::PushFloat(*float)),
            // Strings, tuples and functions live on the value stack.
            _ => return self.fallback(node),
        };
    }

    fn symbol(&mut self, name: &str, ty: Option<ValueType>) {
        let slot = symbols::symbol_index(name);
        self.push(match ty {
            Some(ValueType::Bool) => Op::BoolSymbol { slot },
            Some(ValueType::Int) => Op::IntSymbol { slot },
            Some(ValueType::Float) => Op::FloatSymbol { slot },
            Some(ValueType::Object) | None => Op::ObjectSymbol { slot },
        });
    }

    /// Emits the conversion from one stack to another, when one is needed.
    fn cast(&mut self, from: ValueType, to: ValueType) {
        use ValueType::{Bool, Float, Int, Object};

        let op = match (from, to) {
            (Bool | Int, Float) => Op::IntToFloat,
            (Int, Bool) => Op::IntToBool,
            (Float, Int) => Op::FloatToInt,
            (Float, Bool) => Op::FloatToBool,
            (Bool, Object) => Op::BoolToObject,
            (Int, Object) => Op::IntToObject,
            (Float, Object) => Op::FloatToObject,
            (Object, Int) => Op::ObjectToInt,
            (Object, Float) => Op::ObjectToFloat,
            (Object, Bool) => Op::ObjectToBool,
            // Bool already rides the integer stack as 0/1.
            (Bool, Int) | (Bool, Bool) | (Int, Int) | (Float, Float) | (Object, Object) => return,
        };
        self.push(op);
    }

    fn unary(&mut self, node: &Arc<Expr>, op: UnaryOp, inner: &Arc<Expr>) {
        let ty = inner.result_type();
        match op {
            UnaryOp::Not => {
                self.expr(inner);
                self.cast(ty, ValueType::Bool);
                self.push(Op::BoolNot);
            }
            UnaryOp::Neg if is_integral(ty) => {
                self.expr(inner);
                self.push(Op::IntNeg);
            }
            UnaryOp::Neg if ty == ValueType::Float => {
                self.expr(inner);
                self.push(Op::FloatNeg);
            }
            UnaryOp::BitNot if is_integral(ty) => {
                self.expr(inner);
                self.push(Op::IntBitNot);
            }
            // Object negation and `~` on floats fault at runtime.
            _ => self.fallback(node),
        }
    }

    /// Compiles both operands, converted to a common type.
    fn operands(&mut self, lhs: &Arc<Expr>, rhs: &Arc<Expr>, ty: ValueType) {
        self.expr(lhs);
        self.cast(lhs.result_type(), ty);
        self.expr(rhs);
        self.cast(rhs.result_type(), ty);
    }

    fn binary(&mut self, node: &Arc<Expr>, op: BinaryOp, lhs: &Arc<Expr>, rhs: &Arc<Expr>) {
        use ValueType::{Float, Int, Object};

        let (lt, rt) = (lhs.result_type(), rhs.result_type());
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::FloorDiv | BinaryOp::Rem => {
                let joined = lt.arithmetic_join(rt);
                if joined == Object {
                    return self.fallback(node);
                }
                self.operands(lhs, rhs, joined);
                self.push(match (op, joined == Float) {
                    (BinaryOp::Add, true) => Op::FloatAdd,
                    (BinaryOp::Add, false) => Op::IntAdd,
                    (BinaryOp::Sub, true) => Op::FloatSub,
                    (BinaryOp::Sub, false) => Op::IntSub,
                    (BinaryOp::Mul, true) => Op::FloatMul,
                    (BinaryOp::Mul, false) => Op::IntMul,
                    (BinaryOp::FloorDiv, true) => Op::FloatFloorDiv,
                    (BinaryOp::FloorDiv, false) => Op::IntFloorDiv,
                    (BinaryOp::Rem, true) => Op::FloatRem,
                    _ => Op::IntRem,
                });
            }
            BinaryOp::Div | BinaryOp::Pow => {
                if lt == Object || rt == Object {
                    return self.fallback(node);
                }
                self.operands(lhs, rhs, Float);
                self.push(if op == BinaryOp::Div {
                    Op::FloatDiv
                } else {
                    Op::FloatPow
                });
            }
            BinaryOp::Shl
            | BinaryOp::Shr
            | BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor => {
                if !is_integral(lt) || !is_integral(rt) {
                    return self.fallback(node);
                }
                self.operands(lhs, rhs, Int);
                self.push(match op {
                    BinaryOp::Shl => Op::IntShl,
                    BinaryOp::Shr => Op::IntShr,
                    BinaryOp::BitAnd => Op::IntBitAnd,
                    BinaryOp::BitOr => Op::IntBitOr,
                    _ => Op::IntBitXor,
                });
            }
            BinaryOp::Eq | BinaryOp::Lt | BinaryOp::Le => {
                let joined = lt.join(rt);
                if joined == Object {
                    return self.fallback(node);
                }
                let float = joined == Float;
                self.operands(lhs, rhs, if float { Float } else { Int });
                self.push(match (op, float) {
                    (BinaryOp::Eq, true) => Op::FloatEq,
                    (BinaryOp::Eq, false) => Op::IntEq,
                    (BinaryOp::Lt, true) => Op::FloatLt,
                    (BinaryOp::Lt, false) => Op::IntLt,
                    (BinaryOp::Le, true) => Op::FloatLe,
                    _ => Op::IntLe,
                });
            }
            // Membership tests inspect runtime value shapes.
            _ => self.fallback(node),
        }
    }

    /// Compiles a term of a boolean chain: the expression, coerced to its
    /// truth value.
    fn term(&mut self, term: &Arc<Expr>) {
        self.expr(term);
        self.cast(term.result_type(), ValueType::Bool);
    }

    fn logical(&mut self, op: BoolOp, terms: &[Arc<Expr>]) {
        let lazy = |skip| match op {
            BoolOp::And => Op::AndLazy { skip },
            BoolOp::Or => Op::OrLazy { skip },
        };

        self.term(&terms[0]);
        let mut pending = Vec::with_capacity(terms.len() - 1);
        for term in &terms[1..] {
            pending.push(self.push(lazy(0)));
            self.term(term);
        }
        let end = self.ops.len();
        for at in pending {
            self.ops[at] = lazy(end - at - 1);
        }
    }

    fn call(&mut self, node: &Arc<Expr>, function: &Arc<Expr>, args: &[Arc<Expr>]) {
        let (Some(signature), Expr::Constant(Value::Function(Function::Builtin(builtin)))) =
            (node.function_signature(), function.as_ref())
        else {
            // Keyword arguments, native functions and untyped arguments all
            // go through the interpreter.
            return self.fallback(node);
        };

        match *builtin {
            Builtin::IfThen => self.if_then(&signature, args),
            Builtin::Min | Builtin::Max => self.extreme(*builtin, &signature, args),
            Builtin::Hypot => {
                self.float_args(args);
                self.push(Op::Hypot { count: args.len() });
            }
            Builtin::InRange => {
                self.float_args(args);
                self.push(Op::InRange);
            }
            Builtin::Near => {
                self.float_args(args);
                self.push(Op::Near);
            }
            Builtin::GetBit => {
                self.operands(&args[0], &args[1], ValueType::Int);
                self.push(Op::GetBit);
            }
            Builtin::Abs => {
                self.expr(&args[0]);
                self.push(if signature.ret == ValueType::Float {
                    Op::FloatAbs
                } else {
                    Op::IntAbs
                });
            }
            other => {
                let op = match args.len() {
                    1 => Op::CallFloat1(other),
                    2 => Op::CallFloat2(other),
                    3 => Op::CallFloat3(other),
                    _ => return self.fallback(node),
                };
                self.float_args(args);
                self.push(op);
            }
        }
    }

    fn float_args(&mut self, args: &[Arc<Expr>]) {
        for arg in args {
            self.expr(arg);
            self.cast(arg.result_type(), ValueType::Float);
        }
    }

    fn extreme(&mut self, builtin: Builtin, signature: &FnSignature, args: &[Arc<Expr>]) {
        let float = signature.ret == ValueType::Float;
        let target = if float { ValueType::Float } else { ValueType::Int };
        for arg in args {
            self.expr(arg);
            self.cast(arg.result_type(), target);
        }
        let count = args.len();
        self.push(match (builtin == Builtin::Min, float) {
            (true, true) => Op::FloatMin { count },
            (true, false) => Op::IntMin { count },
            (false, true) => Op::FloatMax { count },
            (false, false) => Op::IntMax { count },
        });
    }

    /// Lazy conditional: only the branch selected by the condition runs.
    ///
    /// Layout is condition, a jump-if-true over the false branch, the false
    /// branch, an unconditional jump over the true branch, the true branch.
    fn if_then(&mut self, signature: &FnSignature, args: &[Arc<Expr>]) {
        let branch_ty = signature.ret;

        self.term(&args[0]);
        let cond = self.push(Op::JumpIfTrue { skip: 0 });
        self.expr(&args[2]);
        self.cast(args[2].result_type(), branch_ty);
        let jump = self.push(Op::Jump { skip: 0 });
        self.expr(&args[1]);
        self.cast(args[1].result_type(), branch_ty);

        let end = self.ops.len();
        self.ops[cond] = Op::JumpIfTrue { skip: jump - cond };
        self.ops[jump] = Op::Jump {
            skip: end - jump - 1,
        };
    }

    fn cached(&mut self, slot: usize, inner: &Arc<Expr>) {
        use ValueType::{Bool, Float, Int, Object};

        let ty = inner.result_type();
        let get = self.push(match ty {
            Bool => Op::BoolCacheGet { slot, skip: 0 },
            Int => Op::IntCacheGet { slot, skip: 0 },
            Float => Op::FloatCacheGet { slot, skip: 0 },
            Object => Op::ObjectCacheGet { slot, skip: 0 },
        });
        self.expr(inner);
        self.push(match ty {
            Bool => Op::BoolCacheSet { slot },
            Int => Op::IntCacheSet { slot },
            Float => Op::FloatCacheSet { slot },
            Object => Op::ObjectCacheSet { slot },
        });

        let skip = self.ops.len() - get - 1;
        self.ops[get] = match ty {
            Bool => Op::BoolCacheGet { slot, skip },
            Int => Op::IntCacheGet { slot, skip },
            Float => Op::FloatCacheGet { slot, skip },
            Object => Op::ObjectCacheGet { slot, skip },
        };
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use ntuple_expr::parse_expression;

    use super::*;

    fn float_compiler(names: &[&str]) -> Compiler {
        names.iter().fold(Compiler::new(), |compiler, name| {
            compiler.with_symbol_type(*name, ValueType::Float)
        })
    }

    #[test]
    fn typed_arithmetic_stays_on_primitive_stacks() {
        let expr = parse_expression("px * px + py * py").unwrap();
        let program = float_compiler(&["px", "py"]).compile(&expr);

        assert_eq!(program.result_type(), ValueType::Float);
        assert!(program
            .ops()
            .iter()
            .all(|op| !matches!(op, Op::EvalNode { .. })));
        assert!(program.ops().contains(&Op::FloatMul));
        assert!(program.ops().contains(&Op::FloatAdd));
    }

    #[test]
    fn untyped_trees_compile_to_a_single_fallback() {
        let expr = parse_expression("pt + 1").unwrap();
        let program = Compiler::new().compile(&expr);

        assert_eq!(program.len(), 1);
        assert_matches!(program.ops()[0], Op::EvalNode { id: 0 });
        assert_eq!(program.result_type(), ValueType::Object);
    }

    #[test]
    fn mixed_operands_get_a_conversion() {
        let expr = parse_expression("n + weight").unwrap();
        let program = Compiler::new()
            .with_symbol_type("n", ValueType::Int)
            .with_symbol_type("weight", ValueType::Float)
            .compile(&expr);

        let n = symbols::symbol_index("n");
        let weight = symbols::symbol_index("weight");
        assert_eq!(
            program.ops(),
            [
                Op::IntSymbol { slot: n },
                Op::IntToFloat,
                Op::FloatSymbol { slot: weight },
                Op::FloatAdd,
            ]
        );
    }

    #[test]
    fn default_type_covers_undeclared_symbols() {
        let expr = parse_expression("2 * e / m").unwrap();
        let program = Compiler::new()
            .with_default_type(ValueType::Float)
            .compile(&expr);

        assert!(program.ops().contains(&Op::FloatDiv));
        assert_eq!(program.result_type(), ValueType::Float);
    }

    #[test]
    fn comparisons_pick_the_joined_stack() {
        let ints = parse_expression("n <= limit").unwrap();
        let program = Compiler::new()
            .with_default_type(ValueType::Int)
            .compile(&ints);
        assert!(program.ops().contains(&Op::IntLe));

        let mixed = parse_expression("pt > 30").unwrap();
        let program = float_compiler(&["pt"]).compile(&mixed);
        // `a > b` parses as `b < a`, so the int literal is the left operand.
        assert_eq!(program.ops()[0], Op::PushInt(30));
        assert_eq!(program.ops()[1], Op::IntToFloat);
        assert!(program.ops().contains(&Op::FloatLt));
    }

    #[test]
    fn boolean_chains_lower_to_patched_skips() {
        let expr = parse_expression("a and b and c").unwrap();
        let program = Compiler::new()
            .with_default_type(ValueType::Bool)
            .compile(&expr);

        let slot = |name| symbols::symbol_index(name);
        assert_eq!(
            program.ops(),
            [
                Op::BoolSymbol { slot: slot("a") },
                Op::AndLazy { skip: 3 },
                Op::BoolSymbol { slot: slot("b") },
                Op::AndLazy { skip: 1 },
                Op::BoolSymbol { slot: slot("c") },
            ]
        );
    }

    #[test]
    fn conditionals_jump_over_the_unselected_branch() {
        let expr = parse_expression("if_then(good, x, 0.0)").unwrap();
        let program = Compiler::new()
            .with_symbol_type("good", ValueType::Bool)
            .with_symbol_type("x", ValueType::Float)
            .compile(&expr);

        let good = symbols::symbol_index("good");
        let x = symbols::symbol_index("x");
        assert_eq!(
            program.ops(),
            [
                Op::BoolSymbol { slot: good },
                Op::JumpIfTrue { skip: 2 },
                Op::PushFloat(0.0),
                Op::Jump { skip: 1 },
                Op::FloatSymbol { slot: x },
            ]
        );
    }

    #[test]
    fn extremes_and_norms_take_argument_counts() {
        let expr = parse_expression("max(a, b, 0) + hypot(a, b)").unwrap();
        let program = float_compiler(&["a", "b"]).compile(&expr);

        assert!(program.ops().contains(&Op::FloatMax { count: 3 }));
        assert!(program.ops().contains(&Op::Hypot { count: 2 }));

        let ints = parse_expression("min(run, 1000)").unwrap();
        let program = Compiler::new()
            .with_symbol_type("run", ValueType::Int)
            .compile(&ints);
        assert!(program.ops().contains(&Op::IntMin { count: 2 }));
    }

    #[test]
    fn cache_markers_wrap_the_inner_program() {
        let mut types = HashMap::new();
        types.insert("pt".to_owned(), ValueType::Float);
        let inner = parse_expression("pt * 1.5").unwrap();
        let expr = Expr::cached(3, transform::set_types(&inner, &types));
        let program = Compiler::new().compile(&expr);

        assert_matches!(program.ops()[0], Op::FloatCacheGet { slot: 3, skip } if skip == program.len() - 1);
        assert_matches!(program.ops()[program.len() - 1], Op::FloatCacheSet { slot: 3 });
    }

    #[test]
    fn membership_and_strings_use_the_interpreter() {
        let expr = parse_expression("flavor in (11, 13)").unwrap();
        let program = Compiler::new()
            .with_symbol_type("flavor", ValueType::Int)
            .compile(&expr);

        assert_matches!(program.ops()[0], Op::EvalNode { .. });
        assert_matches!(program.ops()[1], Op::ObjectToBool);
        assert_eq!(program.result_type(), ValueType::Bool);
    }

    #[test]
    fn source_and_disassembly_survive_compilation() {
        let expr = parse_expression("sqrt(px**2 + py**2)").unwrap();
        let program = float_compiler(&["px", "py"]).compile(&expr);

        assert_eq!(program.source(), "sqrt(px ** 2 + py ** 2)");
        assert!(program.to_string().contains("call1 sqrt"));
    }
}
