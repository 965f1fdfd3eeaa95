//! Stack machine executing compiled programs.
//!
//! The machine runs three stacks: integers (carrying booleans as 0/1),
//! floats and boxed values. Typed instructions call the same kernels in
//! [`arith`] as the reference interpreter, and fallback nodes call the
//! interpreter itself, so a program faults exactly where tree evaluation
//! would.

use ntuple_expr::arith;
use ntuple_expr::{evaluate, EvalError, NumericError, Value, ValueType};

use crate::cache::CacheStore;
use crate::frame::Frame;
use crate::program::{CompiledProgram, Op};

/// Executor for [`CompiledProgram`]s.
///
/// A `Vm` owns only its stacks, so one instance can run any number of
/// programs and reusing it across runs avoids reallocation.
#[derive(Debug, Default)]
pub struct Vm {
    ints: Vec<i64>,
    floats: Vec<f64>,
    values: Vec<Value>,
}

impl Vm {
    /// Creates a machine with empty stacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a program that uses no per-row caches.
    ///
    /// # Errors
    ///
    /// Returns the fault the reference interpreter would raise on the same
    /// bindings: an unbound symbol, an operand of an unsuitable type or an
    /// arithmetic error.
    pub fn run(&mut self, program: &CompiledProgram, frame: &Frame) -> Result<Value, EvalError> {
        self.run_cached(program, frame, &mut CacheStore::new())
    }

    /// Runs a program against a store of per-row caches.
    ///
    /// Cache instructions take effect only when the frame carries a row
    /// index; without one every lookup misses and nothing is recorded.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    ///
    /// # Panics
    ///
    /// Panics on malformed programs (stack underflow, cache slots of the
    /// wrong type or rows beyond a cache's size). Programs produced by
    /// [`Compiler`](crate::Compiler) with a matching store do not trigger
    /// this.
    pub fn run_cached(
        &mut self,
        program: &CompiledProgram,
        frame: &Frame,
        caches: &mut CacheStore,
    ) -> Result<Value, EvalError> {
        self.ints.clear();
        self.floats.clear();
        self.values.clear();

        let row = frame.row();
        let ops = &program.ops;
        let mut pc = 0;
        while pc < ops.len() {
            let op = ops[pc];
            pc += 1;
            match op {
                Op::PushInt(value) => self.ints.push(value),
                Op::PushFloat(value) => self.floats.push(value),
                Op::IntSymbol { slot } => self.ints.push(frame.int(slot)?),
                Op::FloatSymbol { slot } => self.floats.push(frame.float(slot)?),
                Op::BoolSymbol { slot } => self.ints.push(i64::from(frame.flag(slot)?)),
                Op::ObjectSymbol { slot } => self.values.push(frame.object(slot)?),

                Op::IntToFloat => {
                    let x = self.pop_int();
                    self.floats.push(x as f64);
                }
                Op::FloatToInt => {
                    let x = self.pop_float();
                    self.ints.push(float_to_int(x)?);
                }
                Op::IntToBool => {
                    let x = self.pop_int();
                    self.ints.push(i64::from(x != 0));
                }
                Op::FloatToBool => {
                    let x = self.pop_float();
                    self.ints.push(i64::from(x != 0.0));
                }
                Op::IntToObject => {
                    let x = self.pop_int();
                    self.values.push(Value::Int(x));
                }
                Op::FloatToObject => {
                    let x = self.pop_float();
                    self.values.push(Value::Float(x));
                }
                Op::BoolToObject => {
                    let x = self.pop_int();
                    self.values.push(Value::Bool(x != 0));
                }
                Op::ObjectToInt => {
                    let value = self.pop_value().cast(ValueType::Int)?;
                    self.ints.push(unwrap_int(&value));
                }
                Op::ObjectToFloat => {
                    let value = self.pop_value().cast(ValueType::Float)?;
                    self.floats.push(unwrap_float(&value));
                }
                Op::ObjectToBool => {
                    let truth = self.pop_value().truth()?;
                    self.ints.push(i64::from(truth));
                }

                Op::IntAdd => self.int_binary(arith::int_add)?,
                Op::IntSub => self.int_binary(arith::int_sub)?,
                Op::IntMul => self.int_binary(arith::int_mul)?,
                Op::IntFloorDiv => self.int_binary(arith::int_floor_div)?,
                Op::IntRem => self.int_binary(arith::int_floor_rem)?,
                Op::IntShl => self.int_binary(arith::int_shl)?,
                Op::IntShr => self.int_binary(arith::int_shr)?,
                Op::IntNeg => {
                    let x = self.pop_int();
                    self.ints.push(arith::int_neg(x)?);
                }
                Op::IntAbs => {
                    let x = self.pop_int();
                    self.ints.push(arith::int_abs(x)?);
                }
                Op::IntBitAnd => {
                    let (lhs, rhs) = self.pop_int_pair();
                    self.ints.push(lhs & rhs);
                }
                Op::IntBitOr => {
                    let (lhs, rhs) = self.pop_int_pair();
                    self.ints.push(lhs | rhs);
                }
                Op::IntBitXor => {
                    let (lhs, rhs) = self.pop_int_pair();
                    self.ints.push(lhs ^ rhs);
                }
                Op::IntBitNot => {
                    let x = self.pop_int();
                    self.ints.push(!x);
                }

                Op::FloatAdd => {
                    let (lhs, rhs) = self.pop_float_pair();
                    self.floats.push(lhs + rhs);
                }
                Op::FloatSub => {
                    let (lhs, rhs) = self.pop_float_pair();
                    self.floats.push(lhs - rhs);
                }
                Op::FloatMul => {
                    let (lhs, rhs) = self.pop_float_pair();
                    self.floats.push(lhs * rhs);
                }
                Op::FloatDiv => self.float_binary(arith::float_div)?,
                Op::FloatFloorDiv => self.float_binary(arith::float_floor_div)?,
                Op::FloatRem => self.float_binary(arith::float_floor_rem)?,
                Op::FloatPow => self.float_binary(arith::float_pow)?,
                Op::FloatNeg => {
                    let x = self.pop_float();
                    self.floats.push(-x);
                }
                Op::FloatAbs => {
                    let x = self.pop_float();
                    self.floats.push(x.abs());
                }

                Op::IntEq => {
                    let (lhs, rhs) = self.pop_int_pair();
                    self.ints.push(i64::from(lhs == rhs));
                }
                Op::IntLt => {
                    let (lhs, rhs) = self.pop_int_pair();
                    self.ints.push(i64::from(lhs < rhs));
                }
                Op::IntLe => {
                    let (lhs, rhs) = self.pop_int_pair();
                    self.ints.push(i64::from(lhs <= rhs));
                }
                Op::FloatEq => {
                    let (lhs, rhs) = self.pop_float_pair();
                    self.ints.push(i64::from(lhs == rhs));
                }
                Op::FloatLt => {
                    let (lhs, rhs) = self.pop_float_pair();
                    let flag = arith::loose_lt(&Value::Float(lhs), &Value::Float(rhs))?;
                    self.ints.push(i64::from(flag));
                }
                Op::FloatLe => {
                    let (lhs, rhs) = self.pop_float_pair();
                    let flag = arith::loose_le(&Value::Float(lhs), &Value::Float(rhs))?;
                    self.ints.push(i64::from(flag));
                }
                Op::BoolNot => {
                    let x = self.pop_int();
                    self.ints.push(i64::from(x == 0));
                }

                Op::CallFloat1(builtin) => {
                    let x = self.pop_float();
                    self.floats.push(builtin.eval_float1(x)?);
                }
                Op::CallFloat2(builtin) => {
                    let (x, y) = self.pop_float_pair();
                    self.floats.push(builtin.eval_float2(x, y)?);
                }
                Op::CallFloat3(builtin) => {
                    let c = self.pop_float();
                    let b = self.pop_float();
                    let a = self.pop_float();
                    self.floats.push(builtin.eval_float3(a, b, c)?);
                }
                Op::IntMin { count } => self.int_extreme(count, true),
                Op::IntMax { count } => self.int_extreme(count, false),
                Op::FloatMin { count } => self.float_extreme(count, true)?,
                Op::FloatMax { count } => self.float_extreme(count, false)?,
                Op::Hypot { count } => {
                    let start = self.floats.len() - count;
                    let norm = arith::hypot_n(&self.floats[start..]);
                    self.floats.truncate(start);
                    self.floats.push(norm);
                }
                Op::GetBit => {
                    let (x, bit) = self.pop_int_pair();
                    self.ints.push(i64::from(arith::get_bit(x, bit)?));
                }
                Op::InRange => {
                    let hi = self.pop_float();
                    let lo = self.pop_float();
                    let x = self.pop_float();
                    self.ints.push(i64::from(arith::in_range(x, lo, hi)));
                }
                Op::Near => {
                    let tol = self.pop_float();
                    let y = self.pop_float();
                    let x = self.pop_float();
                    self.ints.push(i64::from(arith::near(x, y, tol)));
                }

                Op::Jump { skip } => pc += skip,
                Op::JumpIfTrue { skip } => {
                    if self.pop_int() != 0 {
                        pc += skip;
                    }
                }
                Op::AndLazy { skip } => {
                    if self.peek_int() == 0 {
                        pc += skip;
                    } else {
                        self.ints.pop();
                    }
                }
                Op::OrLazy { skip } => {
                    if self.peek_int() != 0 {
                        pc += skip;
                    } else {
                        self.ints.pop();
                    }
                }

                Op::IntCacheGet { slot, skip } => {
                    if let Some(value) = row.and_then(|row| caches.lookup_int(slot, row)) {
                        self.ints.push(value);
                        pc += skip;
                    }
                }
                Op::IntCacheSet { slot } => {
                    if let Some(row) = row {
                        caches.store_int(slot, row, self.peek_int());
                    }
                }
                Op::FloatCacheGet { slot, skip } => {
                    if let Some(value) = row.and_then(|row| caches.lookup_float(slot, row)) {
                        self.floats.push(value);
                        pc += skip;
                    }
                }
                Op::FloatCacheSet { slot } => {
                    if let Some(row) = row {
                        let value = *self.floats.last().expect("float stack underflow");
                        caches.store_float(slot, row, value);
                    }
                }
                Op::BoolCacheGet { slot, skip } => {
                    if let Some(value) = row.and_then(|row| caches.lookup_bool(slot, row)) {
                        self.ints.push(i64::from(value));
                        pc += skip;
                    }
                }
                Op::BoolCacheSet { slot } => {
                    if let Some(row) = row {
                        caches.store_bool(slot, row, self.peek_int() != 0);
                    }
                }
                Op::ObjectCacheGet { slot, skip } => {
                    if let Some(value) = row.and_then(|row| caches.lookup_object(slot, row)) {
                        self.values.push(value);
                        pc += skip;
                    }
                }
                Op::ObjectCacheSet { slot } => {
                    if let Some(row) = row {
                        let value = self.values.last().expect("value stack underflow").clone();
                        caches.store_object(slot, row, value);
                    }
                }

                Op::EvalNode { id } => {
                    let value = evaluate(&program.nodes[id], frame)?;
                    self.values.push(value);
                }
            }
        }

        Ok(match program.result_type {
            ValueType::Bool => Value::Bool(self.pop_int() != 0),
            ValueType::Int => Value::Int(self.pop_int()),
            ValueType::Float => Value::Float(self.pop_float()),
            ValueType::Object => self.pop_value(),
        })
    }

    fn pop_int(&mut self) -> i64 {
        self.ints.pop().expect("int stack underflow")
    }

    fn pop_float(&mut self) -> f64 {
        self.floats.pop().expect("float stack underflow")
    }

    fn pop_value(&mut self) -> Value {
        self.values.pop().expect("value stack underflow")
    }

    fn peek_int(&self) -> i64 {
        *self.ints.last().expect("int stack underflow")
    }

    fn pop_int_pair(&mut self) -> (i64, i64) {
        let rhs = self.pop_int();
        (self.pop_int(), rhs)
    }

    fn pop_float_pair(&mut self) -> (f64, f64) {
        let rhs = self.pop_float();
        (self.pop_float(), rhs)
    }

    fn int_binary(
        &mut self,
        kernel: impl FnOnce(i64, i64) -> Result<i64, NumericError>,
    ) -> Result<(), EvalError> {
        let (lhs, rhs) = self.pop_int_pair();
        self.ints.push(kernel(lhs, rhs)?);
        Ok(())
    }

    fn float_binary(
        &mut self,
        kernel: impl FnOnce(f64, f64) -> Result<f64, NumericError>,
    ) -> Result<(), EvalError> {
        let (lhs, rhs) = self.pop_float_pair();
        self.floats.push(kernel(lhs, rhs)?);
        Ok(())
    }

    fn int_extreme(&mut self, count: usize, pick_less: bool) {
        let start = self.ints.len() - count;
        let mut best = self.ints[start];
        for &candidate in &self.ints[start + 1..] {
            if (pick_less && candidate < best) || (!pick_less && best < candidate) {
                best = candidate;
            }
        }
        self.ints.truncate(start);
        self.ints.push(best);
    }

    /// Left-to-right fold with the `<` kernel, so ties keep the first
    /// argument and NaN operands fault, matching `min`/`max` on trees.
    fn float_extreme(&mut self, count: usize, pick_less: bool) -> Result<(), EvalError> {
        let start = self.floats.len() - count;
        let mut best = self.floats[start];
        for index in start + 1..self.floats.len() {
            let candidate = self.floats[index];
            let replace = if pick_less {
                arith::loose_lt(&Value::Float(candidate), &Value::Float(best))?
            } else {
                arith::loose_lt(&Value::Float(best), &Value::Float(candidate))?
            };
            if replace {
                best = candidate;
            }
        }
        self.floats.truncate(start);
        self.floats.push(best);
        Ok(())
    }
}

fn float_to_int(x: f64) -> Result<i64, EvalError> {
    let value = Value::Float(x).cast(ValueType::Int)?;
    Ok(unwrap_int(&value))
}

fn unwrap_int(value: &Value) -> i64 {
    match value {
        Value::Int(int) => *int,
        _ => unreachable!("cast to int yields an int"),
    }
}

fn unwrap_float(value: &Value) -> f64 {
    match value {
        Value::Float(float) => *float,
        _ => unreachable!("cast to float yields a float"),
    }
}
