//! Definition interpreter
//!
//! Executes method bodies from class definitions against a small in-process
//! heap and a [`Coordinator`], so tests can run transformed output and
//! observe the coordination calls it makes. Calls whose owner is the
//! coordinator binding class dispatch natively onto the coordinator instead
//! of looking up a body.
//!
//! This is a test harness, not a faithful virtual machine: null dereference
//! and type confusion abort execution as machine faults rather than raising
//! catchable throwables. Transformed code never relies on either.

use crate::coordinator::{Coordinator, CoordinatorError};
use crate::value::{InstanceId, Value};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::trace;
use weft_classfile::{
    flags, ClassDef, Const, DescError, Handler, Insn, IntOp, InvokeKind, JumpCond, Label,
    MethodBody, MethodDef, MethodSig, TypeTag,
};

/// Class whose invocations dispatch onto the [`Coordinator`] trait.
pub const COORDINATOR_CLASS: &str = "weft/Coordinator";

/// Execution failures. All are machine faults except [`ExecError::Uncaught`],
/// which reports an in-program throwable escaping the entry frame.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("unknown class {0}")]
    UnknownClass(String),

    #[error("unknown method {class}.{name}{desc}")]
    UnknownMethod {
        class: String,
        name: String,
        desc: String,
    },

    #[error("call to method without a body: {class}.{name}")]
    AbstractCall { class: String, name: String },

    #[error("null reference dereferenced")]
    NullReference,

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("operand type mismatch: expected {0}")]
    Type(&'static str),

    #[error("local slot {0} out of range")]
    BadLocal(u16),

    #[error("branch to unknown label {0}")]
    BadLabel(Label),

    #[error("array index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("call depth limit exceeded")]
    DepthLimit,

    #[error("uncaught exception of class {class}")]
    Uncaught { class: String },

    #[error(transparent)]
    Descriptor(#[from] DescError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

/// In-flight abnormal completion of a frame.
enum Raised {
    /// A throwable raised by `Throw`, candidate for handler dispatch
    Exception(Value),
    /// A machine fault, never catchable
    Fault(ExecError),
}

impl From<ExecError> for Raised {
    fn from(e: ExecError) -> Self {
        Raised::Fault(e)
    }
}

impl From<CoordinatorError> for Raised {
    fn from(e: CoordinatorError) -> Self {
        Raised::Fault(ExecError::Coordinator(e))
    }
}

#[derive(Debug)]
enum HeapObj {
    Object {
        class: String,
        fields: FxHashMap<String, Value>,
    },
    Array {
        elems: Vec<Value>,
    },
}

const MAX_DEPTH: usize = 256;

/// Executes loaded class definitions against a coordinator.
pub struct Machine<'c> {
    classes: FxHashMap<String, ClassDef>,
    heap: FxHashMap<InstanceId, HeapObj>,
    statics: FxHashMap<(String, String), Value>,
    next_id: InstanceId,
    coordinator: &'c dyn Coordinator,
}

impl<'c> Machine<'c> {
    pub fn new(coordinator: &'c dyn Coordinator) -> Self {
        Self {
            classes: FxHashMap::default(),
            heap: FxHashMap::default(),
            statics: FxHashMap::default(),
            next_id: 1,
            coordinator,
        }
    }

    /// Make a class definition available for execution.
    pub fn load(&mut self, class: ClassDef) {
        self.classes.insert(class.name.clone(), class);
    }

    /// Allocate an instance without running a constructor. The class need
    /// not be loaded; unloaded classes carry fields but no behavior.
    pub fn alloc_object(&mut self, class: &str) -> InstanceId {
        self.alloc(HeapObj::Object {
            class: class.to_string(),
            fields: FxHashMap::default(),
        })
    }

    /// Allocate an array holding the given elements.
    pub fn alloc_array(&mut self, elems: Vec<Value>) -> InstanceId {
        self.alloc(HeapObj::Array { elems })
    }

    fn alloc(&mut self, obj: HeapObj) -> InstanceId {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.insert(id, obj);
        id
    }

    /// Class name of a heap object, `None` for arrays or unknown ids.
    pub fn class_of(&self, id: InstanceId) -> Option<&str> {
        match self.heap.get(&id)? {
            HeapObj::Object { class, .. } => Some(class),
            HeapObj::Array { .. } => None,
        }
    }

    /// Read an instance field, if set.
    pub fn field_value(&self, id: InstanceId, field: &str) -> Option<Value> {
        match self.heap.get(&id)? {
            HeapObj::Object { fields, .. } => fields.get(field).cloned(),
            HeapObj::Array { .. } => None,
        }
    }

    /// Write an instance field directly (test setup).
    pub fn set_field(&mut self, id: InstanceId, field: &str, value: Value) {
        if let Some(HeapObj::Object { fields, .. }) = self.heap.get_mut(&id) {
            fields.insert(field.to_string(), value);
        }
    }

    /// Snapshot of an array's elements.
    pub fn array_elems(&self, id: InstanceId) -> Option<Vec<Value>> {
        match self.heap.get(&id)? {
            HeapObj::Array { elems } => Some(elems.clone()),
            HeapObj::Object { .. } => None,
        }
    }

    /// Invoke a method. For instance methods `args[0]` is the receiver.
    pub fn call(
        &mut self,
        class: &str,
        name: &str,
        desc: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, ExecError> {
        match self.exec(class, name, desc, args, 0) {
            Ok(v) => Ok(v),
            Err(Raised::Fault(e)) => Err(e),
            Err(Raised::Exception(v)) => {
                let class = match v {
                    Value::Ref(id) => self
                        .class_of(id)
                        .unwrap_or("<array>")
                        .to_string(),
                    other => format!("<{}>", other),
                };
                Err(ExecError::Uncaught { class })
            }
        }
    }

    /// Walk the superclass chain for a concrete method, returning the
    /// declaring class and a copy of the definition.
    fn find_method(&self, class: &str, name: &str, desc: &str) -> Option<(String, MethodDef)> {
        let mut cursor = Some(class.to_string());
        while let Some(cname) = cursor {
            let def = self.classes.get(&cname)?;
            if let Some(m) = def.method(name, desc) {
                return Some((cname, m.clone()));
            }
            cursor = def.superclass.clone();
        }
        None
    }

    /// Whether `class` is `target` or inherits from it, as far as loaded
    /// definitions allow us to see.
    fn is_subtype(&self, class: &str, target: &str) -> bool {
        let mut cursor = Some(class.to_string());
        while let Some(cname) = cursor {
            if cname == target {
                return true;
            }
            cursor = self
                .classes
                .get(&cname)
                .and_then(|c| c.superclass.clone());
        }
        false
    }

    fn exec(
        &mut self,
        class: &str,
        name: &str,
        desc: &str,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Option<Value>, Raised> {
        if depth > MAX_DEPTH {
            return Err(ExecError::DepthLimit.into());
        }
        let (declaring, method) = match self.find_method(class, name, desc) {
            Some(found) => found,
            None => {
                // Constructors of unmodeled classes behave as no-ops so
                // synthesized throw sites and super() calls can execute.
                if name == "<init>" {
                    return Ok(None);
                }
                return Err(ExecError::UnknownMethod {
                    class: class.to_string(),
                    name: name.to_string(),
                    desc: desc.to_string(),
                }
                .into());
            }
        };
        let body = match &method.body {
            Some(b) => b.clone(),
            None => {
                return Err(ExecError::AbstractCall {
                    class: declaring,
                    name: method.name,
                }
                .into())
            }
        };
        trace!(class = %declaring, method = %method.name, depth, "enter");

        let sig = MethodSig::parse(desc).map_err(ExecError::from)?;
        let is_static = method.access & flags::ACC_STATIC != 0;
        let locals = self.seed_locals(&body, &sig, is_static, args)?;
        self.run_body(&declaring, &body, &sig, locals, depth)
    }

    /// Place arguments into their local slots, honoring wide-value widths.
    fn seed_locals(
        &self,
        body: &MethodBody,
        sig: &MethodSig,
        is_static: bool,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, Raised> {
        let receiver_slots = if is_static { 0 } else { 1 };
        let needed = receiver_slots + sig.param_slots();
        let size = body.max_locals.max(needed) as usize;
        let mut locals = vec![Value::Null; size];

        let mut args = args.into_iter();
        let mut slot = 0usize;
        if !is_static {
            locals[0] = args.next().ok_or(ExecError::StackUnderflow)?;
            slot = 1;
        }
        for param in &sig.params {
            locals[slot] = args.next().ok_or(ExecError::StackUnderflow)?;
            slot += param.width() as usize;
        }
        Ok(locals)
    }

    fn run_body(
        &mut self,
        declaring: &str,
        body: &MethodBody,
        sig: &MethodSig,
        mut locals: Vec<Value>,
        depth: usize,
    ) -> Result<Option<Value>, Raised> {
        let mut positions: FxHashMap<Label, usize> = FxHashMap::default();
        for (i, insn) in body.insns.iter().enumerate() {
            if let Insn::Label(l) = insn {
                positions.insert(*l, i);
            }
        }
        let resolve = |l: Label| -> Result<usize, Raised> {
            positions.get(&l).copied().ok_or(ExecError::BadLabel(l).into())
        };

        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0usize;
        while pc < body.insns.len() {
            let insn = &body.insns[pc];
            let outcome = self.step(insn, &mut stack, &mut locals, depth);
            match outcome {
                Ok(Flow::Next) => pc += 1,
                Ok(Flow::Jump(label)) => pc = resolve(label)?,
                Ok(Flow::Return) => {
                    return match sig.ret {
                        Some(_) => Ok(Some(pop(&mut stack)?)),
                        None => Ok(None),
                    };
                }
                Err(Raised::Exception(thrown)) => {
                    match self.find_handler(&body.handlers, &positions, pc, &thrown)? {
                        Some(target) => {
                            stack.clear();
                            stack.push(thrown);
                            pc = resolve(target)?;
                        }
                        None => {
                            trace!(class = %declaring, pc, "exception escapes frame");
                            return Err(Raised::Exception(thrown));
                        }
                    }
                }
                Err(fault) => return Err(fault),
            }
        }
        // Fell off the end: void methods may omit the trailing return.
        match sig.ret {
            Some(_) => Err(ExecError::StackUnderflow.into()),
            None => Ok(None),
        }
    }

    /// First handler whose range covers `pc` and whose catch type matches,
    /// in the order the handler table declares.
    fn find_handler(
        &self,
        handlers: &[Handler],
        positions: &FxHashMap<Label, usize>,
        pc: usize,
        thrown: &Value,
    ) -> Result<Option<Label>, Raised> {
        let thrown_class = match thrown {
            Value::Ref(id) => self.class_of(*id).map(str::to_string),
            _ => None,
        };
        for h in handlers {
            let start = *positions
                .get(&h.start)
                .ok_or(ExecError::BadLabel(h.start))?;
            let end = *positions.get(&h.end).ok_or(ExecError::BadLabel(h.end))?;
            if pc < start || pc >= end {
                continue;
            }
            let matches = match (&h.catch_type, &thrown_class) {
                (None, _) => true,
                (Some(want), Some(have)) => self.is_subtype(have, want),
                (Some(_), None) => false,
            };
            if matches {
                return Ok(Some(h.target));
            }
        }
        Ok(None)
    }

    fn step(
        &mut self,
        insn: &Insn,
        stack: &mut Vec<Value>,
        locals: &mut [Value],
        depth: usize,
    ) -> Result<Flow, Raised> {
        match insn {
            Insn::Label(_) => {}
            Insn::Const(c) => stack.push(match c {
                Const::Null => Value::Null,
                Const::Int(i) => Value::Int(*i),
                Const::Float(f) => Value::Float(*f),
                Const::Str(s) => Value::Str(s.clone()),
            }),
            Insn::LoadLocal(i) => {
                let v = locals
                    .get(*i as usize)
                    .cloned()
                    .ok_or(ExecError::BadLocal(*i))?;
                stack.push(v);
            }
            Insn::StoreLocal(i) => {
                let v = pop(stack)?;
                *locals.get_mut(*i as usize).ok_or(ExecError::BadLocal(*i))? = v;
            }
            Insn::GetField(fr) => {
                let id = pop_ref(stack)?;
                let v = self
                    .field_value(id, &fr.name)
                    .unwrap_or_else(|| default_value(&fr.desc));
                stack.push(v);
            }
            Insn::PutField(fr) => {
                let v = pop(stack)?;
                let id = pop_ref(stack)?;
                self.set_field(id, &fr.name, v);
            }
            Insn::GetStatic(fr) => {
                let key = (fr.owner.clone(), fr.name.clone());
                let v = self
                    .statics
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| default_value(&fr.desc));
                stack.push(v);
            }
            Insn::PutStatic(fr) => {
                let v = pop(stack)?;
                self.statics.insert((fr.owner.clone(), fr.name.clone()), v);
            }
            Insn::Invoke { kind, target } => {
                if target.owner == COORDINATOR_CLASS {
                    self.invoke_coordinator(&target.name, stack)?;
                } else {
                    self.invoke(*kind, target, stack, depth)?;
                }
            }
            Insn::New(class) => {
                let id = self.alloc_object(class);
                stack.push(Value::Ref(id));
            }
            Insn::Dup => {
                let top = stack.last().cloned().ok_or(ExecError::StackUnderflow)?;
                stack.push(top);
            }
            Insn::Pop => {
                pop(stack)?;
            }
            Insn::Swap => {
                let len = stack.len();
                if len < 2 {
                    return Err(ExecError::StackUnderflow.into());
                }
                stack.swap(len - 1, len - 2);
            }
            Insn::Jump { cond, target } => {
                let taken = match cond {
                    JumpCond::Always => true,
                    JumpCond::IfZero => pop_int(stack)? == 0,
                    JumpCond::IfNonZero => pop_int(stack)? != 0,
                    JumpCond::IfNull => matches!(pop(stack)?, Value::Null),
                    JumpCond::IfNonNull => !matches!(pop(stack)?, Value::Null),
                    JumpCond::IfIntGe => {
                        let v2 = pop_int(stack)?;
                        let v1 = pop_int(stack)?;
                        v1 >= v2
                    }
                };
                if taken {
                    return Ok(Flow::Jump(*target));
                }
            }
            Insn::Return(_) => return Ok(Flow::Return),
            Insn::Throw => {
                let v = pop(stack)?;
                if matches!(v, Value::Null) {
                    return Err(ExecError::NullReference.into());
                }
                return Err(Raised::Exception(v));
            }
            // Local monitors are not modeled; coordination visibility comes
            // from the explicit monitor_enter/monitor_exit call-outs the
            // pipeline injects alongside these.
            Insn::MonitorEnter | Insn::MonitorExit => {
                pop_ref(stack)?;
            }
            Insn::InstanceOf(class) => {
                let v = pop(stack)?;
                let is = match v {
                    Value::Ref(id) => self
                        .class_of(id)
                        .map(|c| self.is_subtype(c, class))
                        .unwrap_or(false),
                    _ => false,
                };
                stack.push(Value::Int(is as i64));
            }
            Insn::CheckCast(_) => {
                // Trusted: transformed code only casts what it has verified.
            }
            Insn::ArrayLoad(_) => {
                let index = pop_int(stack)?;
                let id = pop_ref(stack)?;
                let v = self.array_get(id, index)?;
                stack.push(v);
            }
            Insn::ArrayStore(_) => {
                let v = pop(stack)?;
                let index = pop_int(stack)?;
                let id = pop_ref(stack)?;
                self.array_set(id, index, v)?;
            }
            Insn::ArrayLen => {
                let id = pop_ref(stack)?;
                let len = match self.heap.get(&id) {
                    Some(HeapObj::Array { elems }) => elems.len(),
                    _ => return Err(ExecError::Type("array").into()),
                };
                stack.push(Value::Int(len as i64));
            }
            Insn::NewArray(elem) => {
                let count = pop_int(stack)?;
                if count < 0 {
                    return Err(ExecError::IndexOutOfBounds {
                        index: count,
                        len: 0,
                    }
                    .into());
                }
                let fill = default_for_tag(elem);
                let id = self.alloc_array(vec![fill; count as usize]);
                stack.push(Value::Ref(id));
            }
            Insn::Arith(op) => {
                let v2 = pop_int(stack)?;
                let v1 = pop_int(stack)?;
                stack.push(Value::Int(match op {
                    IntOp::Add => v1.wrapping_add(v2),
                    IntOp::Sub => v1.wrapping_sub(v2),
                }));
            }
        }
        Ok(Flow::Next)
    }

    fn array_get(&self, id: InstanceId, index: i64) -> Result<Value, Raised> {
        match self.heap.get(&id) {
            Some(HeapObj::Array { elems }) => {
                let slot = usize::try_from(index)
                    .ok()
                    .filter(|i| *i < elems.len())
                    .ok_or(ExecError::IndexOutOfBounds {
                        index,
                        len: elems.len(),
                    })?;
                Ok(elems[slot].clone())
            }
            _ => Err(ExecError::Type("array").into()),
        }
    }

    fn array_set(&mut self, id: InstanceId, index: i64, value: Value) -> Result<(), Raised> {
        match self.heap.get_mut(&id) {
            Some(HeapObj::Array { elems }) => {
                let len = elems.len();
                let slot = usize::try_from(index)
                    .ok()
                    .filter(|i| *i < len)
                    .ok_or(ExecError::IndexOutOfBounds { index, len })?;
                elems[slot] = value;
                Ok(())
            }
            _ => Err(ExecError::Type("array").into()),
        }
    }

    /// Ordinary invocation: pop arguments, dispatch, run, push any result.
    fn invoke(
        &mut self,
        kind: InvokeKind,
        target: &weft_classfile::MethodRef,
        stack: &mut Vec<Value>,
        depth: usize,
    ) -> Result<(), Raised> {
        // Minimal string intrinsic so generated per-field dispatch can
        // compare member names without a modeled string class.
        if target.owner == "java/lang/String" && target.name == "equals" {
            let arg = pop(stack)?;
            let recv = pop(stack)?;
            stack.push(Value::Int((recv == arg) as i64));
            return Ok(());
        }

        let sig = MethodSig::parse(&target.desc).map_err(ExecError::from)?;
        let mut args = pop_n(stack, sig.params.len())?;
        let receiver = match kind {
            InvokeKind::Static => None,
            _ => Some(pop(stack)?),
        };

        let dispatch_class = match kind {
            InvokeKind::Static | InvokeKind::Special => target.owner.clone(),
            InvokeKind::Virtual | InvokeKind::Interface => match &receiver {
                Some(Value::Ref(id)) => self
                    .class_of(*id)
                    .map(str::to_string)
                    .unwrap_or_else(|| target.owner.clone()),
                Some(Value::Null) | None => return Err(ExecError::NullReference.into()),
                // Non-heap receivers (strings) dispatch on the static owner.
                Some(_) => target.owner.clone(),
            },
        };

        if let Some(r) = receiver {
            args.insert(0, r);
        }
        let result = self.exec(&dispatch_class, &target.name, &target.desc, args, depth + 1)?;
        match (sig.ret, result) {
            (Some(_), Some(v)) => stack.push(v),
            (Some(_), None) => {
                // Unmodeled constructor fallthrough never reaches here: only
                // value-returning methods can leave a result expectation.
                return Err(ExecError::Type("return value").into());
            }
            (None, _) => {}
        }
        Ok(())
    }

    /// Native dispatch for the coordinator binding class.
    fn invoke_coordinator(&mut self, name: &str, stack: &mut Vec<Value>) -> Result<(), Raised> {
        match name {
            "isManaged" => {
                let managed = match pop(stack)? {
                    Value::Ref(id) => self.coordinator.is_managed(id),
                    _ => false,
                };
                stack.push(Value::Int(managed as i64));
            }
            "isRecognized" => {
                let recognized = match pop(stack)? {
                    Value::Ref(id) => self
                        .class_of(id)
                        .map(|c| self.coordinator.is_recognized_type(c))
                        .unwrap_or(false),
                    _ => false,
                };
                stack.push(Value::Int(recognized as i64));
            }
            "beginLock" => {
                let level = pop_int(stack)? as i32;
                let lock = pop_str(stack)?;
                self.coordinator.begin_lock(&lock, level)?;
            }
            "commitLock" => {
                let lock = pop_str(stack)?;
                self.coordinator.commit_lock(&lock)?;
            }
            "monitorEnter" => {
                let level = pop_int(stack)? as i32;
                let id = pop_ref(stack)?;
                self.coordinator.monitor_enter(id, level)?;
            }
            "monitorExit" => {
                let id = pop_ref(stack)?;
                self.coordinator.monitor_exit(id)?;
            }
            "fieldChanged" => {
                let index = pop_int(stack)?;
                let value = pop(stack)?;
                let field = pop_str(stack)?;
                let owner = pop_str(stack)?;
                self.coordinator.field_changed(&owner, &field, &value, index)?;
            }
            "logicalInvoke" => {
                let args_array = pop_ref(stack)?;
                let op = pop_str(stack)?;
                let id = pop_ref(stack)?;
                let elems = self
                    .array_elems(args_array)
                    .ok_or(ExecError::Type("array"))?;
                self.coordinator.logical_invoke(id, &op, &elems)?;
            }
            "checkWriteAccess" => {
                let id = pop_ref(stack)?;
                self.coordinator.check_write_access(id)?;
            }
            "resolveReference" => {
                let field = pop_str(stack)?;
                let id = pop_ref(stack)?;
                self.coordinator.resolve_reference(id, &field)?;
            }
            "resolvePlaceholder" => {
                let id = pop_int(stack)?;
                let v = self.coordinator.resolve_placeholder(id as u64)?;
                stack.push(v);
            }
            other => {
                return Err(ExecError::UnknownMethod {
                    class: COORDINATOR_CLASS.to_string(),
                    name: other.to_string(),
                    desc: String::new(),
                }
                .into())
            }
        }
        Ok(())
    }
}

enum Flow {
    Next,
    Jump(Label),
    Return,
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, Raised> {
    stack.pop().ok_or_else(|| ExecError::StackUnderflow.into())
}

fn pop_n(stack: &mut Vec<Value>, n: usize) -> Result<Vec<Value>, Raised> {
    if stack.len() < n {
        return Err(ExecError::StackUnderflow.into());
    }
    Ok(stack.split_off(stack.len() - n))
}

fn pop_int(stack: &mut Vec<Value>) -> Result<i64, Raised> {
    match pop(stack)? {
        Value::Int(i) => Ok(i),
        _ => Err(ExecError::Type("int").into()),
    }
}

fn pop_str(stack: &mut Vec<Value>) -> Result<String, Raised> {
    match pop(stack)? {
        Value::Str(s) => Ok(s),
        _ => Err(ExecError::Type("string").into()),
    }
}

fn pop_ref(stack: &mut Vec<Value>) -> Result<InstanceId, Raised> {
    match pop(stack)? {
        Value::Ref(id) => Ok(id),
        Value::Null => Err(ExecError::NullReference.into()),
        _ => Err(ExecError::Type("reference").into()),
    }
}

/// Zero value for a field descriptor.
fn default_value(desc: &str) -> Value {
    match TypeTag::parse(desc) {
        Ok(tag) => default_for_tag(&tag),
        Err(_) => Value::Null,
    }
}

fn default_for_tag(tag: &TypeTag) -> Value {
    match tag {
        TypeTag::Float | TypeTag::Double => Value::Float(0.0),
        TypeTag::Reference(_) | TypeTag::Array(_) => Value::Null,
        _ => Value::Int(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::NullCoordinator;
    use crate::recording::{CoordinatorEvent, RecordingCoordinator};
    use weft_classfile::{FieldRef, MethodRef};

    fn method(name: &str, desc: &str, access: u32, body: MethodBody) -> MethodDef {
        MethodDef {
            access,
            name: name.to_string(),
            desc: desc.to_string(),
            signature: None,
            exceptions: Vec::new(),
            body: Some(body),
        }
    }

    fn class_with(name: &str, methods: Vec<MethodDef>) -> ClassDef {
        let mut c = ClassDef::new(name);
        c.methods = methods;
        c
    }

    #[test]
    fn static_add_returns_sum() {
        let body = MethodBody {
            insns: vec![
                Insn::LoadLocal(0),
                Insn::LoadLocal(1),
                Insn::Arith(IntOp::Add),
                Insn::Return(Some(TypeTag::Int)),
            ],
            max_locals: 2,
            ..Default::default()
        };
        let class = class_with(
            "t/Math",
            vec![method("add", "(II)I", flags::ACC_PUBLIC | flags::ACC_STATIC, body)],
        );
        let c = NullCoordinator;
        let mut m = Machine::new(&c);
        m.load(class);
        let out = m
            .call("t/Math", "add", "(II)I", vec![Value::Int(2), Value::Int(40)])
            .unwrap();
        assert_eq!(out, Some(Value::Int(42)));
    }

    #[test]
    fn fields_default_to_zero_and_persist() {
        let getter = MethodBody {
            insns: vec![
                Insn::LoadLocal(0),
                Insn::GetField(FieldRef::new("t/Box", "n", "I")),
                Insn::Return(Some(TypeTag::Int)),
            ],
            max_locals: 1,
            ..Default::default()
        };
        let setter = MethodBody {
            insns: vec![
                Insn::LoadLocal(0),
                Insn::LoadLocal(1),
                Insn::PutField(FieldRef::new("t/Box", "n", "I")),
                Insn::Return(None),
            ],
            max_locals: 2,
            ..Default::default()
        };
        let class = class_with(
            "t/Box",
            vec![
                method("get", "()I", flags::ACC_PUBLIC, getter),
                method("set", "(I)V", flags::ACC_PUBLIC, setter),
            ],
        );
        let c = NullCoordinator;
        let mut m = Machine::new(&c);
        m.load(class);
        let id = m.alloc_object("t/Box");
        let this = Value::Ref(id);
        assert_eq!(
            m.call("t/Box", "get", "()I", vec![this.clone()]).unwrap(),
            Some(Value::Int(0))
        );
        m.call("t/Box", "set", "(I)V", vec![this.clone(), Value::Int(7)])
            .unwrap();
        assert_eq!(
            m.call("t/Box", "get", "()I", vec![this]).unwrap(),
            Some(Value::Int(7))
        );
    }

    #[test]
    fn virtual_dispatch_picks_runtime_class() {
        let base_body = MethodBody {
            insns: vec![Insn::Const(Const::Int(1)), Insn::Return(Some(TypeTag::Int))],
            max_locals: 1,
            ..Default::default()
        };
        let sub_body = MethodBody {
            insns: vec![Insn::Const(Const::Int(2)), Insn::Return(Some(TypeTag::Int))],
            max_locals: 1,
            ..Default::default()
        };
        let caller_body = MethodBody {
            insns: vec![
                Insn::LoadLocal(1),
                Insn::Invoke {
                    kind: InvokeKind::Virtual,
                    target: MethodRef::new("t/Base", "tag", "()I"),
                },
                Insn::Return(Some(TypeTag::Int)),
            ],
            max_locals: 2,
            ..Default::default()
        };
        let base = class_with("t/Base", vec![method("tag", "()I", flags::ACC_PUBLIC, base_body)]);
        let mut sub = class_with("t/Sub", vec![method("tag", "()I", flags::ACC_PUBLIC, sub_body)]);
        sub.superclass = Some("t/Base".to_string());
        let caller = class_with(
            "t/Caller",
            vec![method(
                "probe",
                "(Lt/Base;)I",
                flags::ACC_PUBLIC,
                caller_body,
            )],
        );
        let c = NullCoordinator;
        let mut m = Machine::new(&c);
        m.load(base);
        m.load(sub);
        m.load(caller);
        let caller_id = m.alloc_object("t/Caller");
        let sub_id = m.alloc_object("t/Sub");
        let out = m
            .call(
                "t/Caller",
                "probe",
                "(Lt/Base;)I",
                vec![Value::Ref(caller_id), Value::Ref(sub_id)],
            )
            .unwrap();
        assert_eq!(out, Some(Value::Int(2)));
    }

    #[test]
    fn handler_order_decides_dispatch() {
        // Two handlers cover the throw; the first in table order wins.
        let l = |n| Label(n);
        let body = MethodBody {
            insns: vec![
                Insn::Label(l(0)),
                Insn::New("java/lang/IllegalStateException".to_string()),
                Insn::Throw,
                Insn::Label(l(1)),
                Insn::Label(l(2)),
                Insn::Pop,
                Insn::Const(Const::Int(10)),
                Insn::Return(Some(TypeTag::Int)),
                Insn::Label(l(3)),
                Insn::Pop,
                Insn::Const(Const::Int(20)),
                Insn::Return(Some(TypeTag::Int)),
            ],
            handlers: vec![
                Handler {
                    start: l(0),
                    end: l(1),
                    target: l(2),
                    catch_type: None,
                    order: 0,
                },
                Handler {
                    start: l(0),
                    end: l(1),
                    target: l(3),
                    catch_type: None,
                    order: 1,
                },
            ],
            max_locals: 1,
            ..Default::default()
        };
        let class = class_with(
            "t/Catcher",
            vec![method("go", "()I", flags::ACC_PUBLIC | flags::ACC_STATIC, body)],
        );
        let c = NullCoordinator;
        let mut m = Machine::new(&c);
        m.load(class);
        assert_eq!(
            m.call("t/Catcher", "go", "()I", vec![]).unwrap(),
            Some(Value::Int(10))
        );
    }

    #[test]
    fn uncaught_exception_reports_class() {
        let body = MethodBody {
            insns: vec![
                Insn::New("java/lang/UnsupportedOperationException".to_string()),
                Insn::Throw,
            ],
            max_locals: 1,
            ..Default::default()
        };
        let class = class_with(
            "t/Thrower",
            vec![method("go", "()V", flags::ACC_PUBLIC | flags::ACC_STATIC, body)],
        );
        let c = NullCoordinator;
        let mut m = Machine::new(&c);
        m.load(class);
        let err = m.call("t/Thrower", "go", "()V", vec![]).unwrap_err();
        match err {
            ExecError::Uncaught { class } => {
                assert_eq!(class, "java/lang/UnsupportedOperationException");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn coordinator_calls_dispatch_natively() {
        let body = MethodBody {
            insns: vec![
                Insn::Const(Const::Str("^orders".to_string())),
                Insn::Const(Const::Int(2)),
                Insn::Invoke {
                    kind: InvokeKind::Static,
                    target: MethodRef::new(
                        COORDINATOR_CLASS,
                        "beginLock",
                        "(Ljava/lang/String;I)V",
                    ),
                },
                Insn::LoadLocal(0),
                Insn::Const(Const::Str("add(Ljava/lang/Object;)Z".to_string())),
                Insn::Const(Const::Int(1)),
                Insn::NewArray(TypeTag::Reference("java/lang/Object".to_string())),
                Insn::Dup,
                Insn::Const(Const::Int(0)),
                Insn::Const(Const::Str("x".to_string())),
                Insn::ArrayStore(TypeTag::Reference("java/lang/Object".to_string())),
                Insn::Invoke {
                    kind: InvokeKind::Static,
                    target: MethodRef::new(
                        COORDINATOR_CLASS,
                        "logicalInvoke",
                        "(Ljava/lang/Object;Ljava/lang/String;[Ljava/lang/Object;)V",
                    ),
                },
                Insn::Const(Const::Str("^orders".to_string())),
                Insn::Invoke {
                    kind: InvokeKind::Static,
                    target: MethodRef::new(COORDINATOR_CLASS, "commitLock", "(Ljava/lang/String;)V"),
                },
                Insn::Return(None),
            ],
            max_locals: 1,
            ..Default::default()
        };
        let class = class_with("t/Ops", vec![method("go", "()V", flags::ACC_PUBLIC, body)]);
        let rec = RecordingCoordinator::new();
        let mut m = Machine::new(&rec);
        m.load(class);
        let id = m.alloc_object("t/Ops");
        m.call("t/Ops", "go", "()V", vec![Value::Ref(id)]).unwrap();
        let events = rec.events();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            CoordinatorEvent::BeginLock {
                name: "^orders".to_string(),
                level: 2
            }
        );
        assert_eq!(
            events[1],
            CoordinatorEvent::LogicalInvoke {
                instance: id,
                operation: "add(Ljava/lang/Object;)Z".to_string(),
                args: vec![Value::Str("x".to_string())],
            }
        );
        assert_eq!(
            events[2],
            CoordinatorEvent::CommitLock {
                name: "^orders".to_string()
            }
        );
    }

    #[test]
    fn loop_sums_array_elements() {
        let l = |n| Label(n);
        // sum = 0; i = 0; while !(i >= len) { sum += a[i]; i += 1 }
        let body = MethodBody {
            insns: vec![
                Insn::Const(Const::Int(0)),
                Insn::StoreLocal(1),
                Insn::Const(Const::Int(0)),
                Insn::StoreLocal(2),
                Insn::Label(l(0)),
                Insn::LoadLocal(2),
                Insn::LoadLocal(0),
                Insn::ArrayLen,
                Insn::Jump {
                    cond: JumpCond::IfIntGe,
                    target: l(1),
                },
                Insn::LoadLocal(1),
                Insn::LoadLocal(0),
                Insn::LoadLocal(2),
                Insn::ArrayLoad(TypeTag::Int),
                Insn::Arith(IntOp::Add),
                Insn::StoreLocal(1),
                Insn::LoadLocal(2),
                Insn::Const(Const::Int(1)),
                Insn::Arith(IntOp::Add),
                Insn::StoreLocal(2),
                Insn::Jump {
                    cond: JumpCond::Always,
                    target: l(0),
                },
                Insn::Label(l(1)),
                Insn::LoadLocal(1),
                Insn::Return(Some(TypeTag::Int)),
            ],
            max_locals: 3,
            ..Default::default()
        };
        let class = class_with(
            "t/Sum",
            vec![method("sum", "([I)I", flags::ACC_PUBLIC | flags::ACC_STATIC, body)],
        );
        let c = NullCoordinator;
        let mut m = Machine::new(&c);
        m.load(class);
        let arr = m.alloc_array(vec![Value::Int(3), Value::Int(4), Value::Int(5)]);
        assert_eq!(
            m.call("t/Sum", "sum", "([I)I", vec![Value::Ref(arr)]).unwrap(),
            Some(Value::Int(12))
        );
    }
}
