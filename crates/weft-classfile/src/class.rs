//! Class definition model
//!
//! A [`ClassDef`] is the unit of transformation: identity, field and method
//! declarations, with each method body held as an ordered instruction stream
//! over named labels. The model is fully editable and serde-serializable,
//! which is also the interchange form used by the CLI.

use crate::types::TypeTag;
use serde::{Deserialize, Serialize};

/// An opaque branch label within one method body.
///
/// A label must appear exactly once as an [`Insn::Label`] in the stream it
/// is referenced from; structural validation enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label(pub u32);

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Allocates labels guaranteed not to collide with an existing body.
#[derive(Debug)]
pub struct LabelAlloc {
    next: u32,
}

impl LabelAlloc {
    /// Start allocating from zero (for freshly synthesized bodies).
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Start allocating above every label already present in `body`.
    pub fn above(body: &MethodBody) -> Self {
        let mut max = 0u32;
        for insn in &body.insns {
            if let Insn::Label(Label(id)) = insn {
                max = max.max(id + 1);
            }
        }
        Self { next: max }
    }

    /// Hand out a fresh label.
    pub fn fresh(&mut self) -> Label {
        let l = Label(self.next);
        self.next += 1;
        l
    }
}

impl Default for LabelAlloc {
    fn default() -> Self {
        Self::new()
    }
}

/// A constant pushed onto the operand stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Const {
    Null,
    /// Integer-family constant (boolean through long)
    Int(i64),
    /// Floating constant (float or double)
    Float(f64),
    Str(String),
}

/// Reference to a field by owner, name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
    pub desc: String,
}

impl FieldRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            desc: desc.into(),
        }
    }
}

/// Reference to a method by owner, name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub desc: String,
}

impl MethodRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            desc: desc.into(),
        }
    }
}

impl std::fmt::Display for MethodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.desc)
    }
}

/// Invocation dispatch kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvokeKind {
    Virtual,
    /// Direct dispatch: constructors, private methods, super calls
    Special,
    Static,
    Interface,
}

/// Branch condition. Conditional jumps consume the top stack value;
/// the two-operand integer compare consumes two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JumpCond {
    Always,
    /// Integer top of stack equals zero (false)
    IfZero,
    /// Integer top of stack is nonzero (true)
    IfNonZero,
    IfNull,
    IfNonNull,
    /// value1 >= value2 over the top two integers
    IfIntGe,
}

/// Integer arithmetic, two operands, one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntOp {
    Add,
    Sub,
}

/// One instruction in a method body stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Insn {
    /// Marks a branch/handler target position
    Label(Label),
    /// Push a constant
    Const(Const),
    /// Load local variable slot
    LoadLocal(u16),
    /// Store to local variable slot
    StoreLocal(u16),
    GetField(FieldRef),
    PutField(FieldRef),
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    Invoke {
        kind: InvokeKind,
        target: MethodRef,
    },
    /// Allocate an uninitialized instance of the named class
    New(String),
    Dup,
    Pop,
    Swap,
    Jump {
        cond: JumpCond,
        target: Label,
    },
    /// Return, with the value type carried for emission symmetry
    Return(Option<TypeTag>),
    Throw,
    MonitorEnter,
    MonitorExit,
    InstanceOf(String),
    CheckCast(String),
    /// array, index -> value
    ArrayLoad(TypeTag),
    /// array, index, value ->
    ArrayStore(TypeTag),
    ArrayLen,
    /// count -> array of element type
    NewArray(TypeTag),
    /// value1, value2 -> result
    Arith(IntOp),
}

impl Insn {
    /// True for instructions that leave the method.
    pub fn is_exit(&self) -> bool {
        matches!(self, Insn::Return(_) | Insn::Throw)
    }
}

/// Exception handler range over labels, with original declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handler {
    pub start: Label,
    pub end: Label,
    pub target: Label,
    /// `None` catches everything
    pub catch_type: Option<String>,
    /// Position in the source declaration order, used as the final tiebreak
    pub order: u32,
}

/// Debug metadata naming a local variable slot over a label range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSlot {
    pub index: u16,
    pub name: String,
    pub desc: String,
    pub start: Label,
    pub end: Label,
}

/// An editable method body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MethodBody {
    pub insns: Vec<Insn>,
    pub handlers: Vec<Handler>,
    pub locals: Vec<LocalSlot>,
    pub max_locals: u16,
}

impl MethodBody {
    /// Reserve an additional local slot block, returning its base index.
    pub fn new_local(&mut self, width: u16) -> u16 {
        let idx = self.max_locals;
        self.max_locals += width;
        idx
    }
}

/// A declared method, abstract when `body` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub access: u32,
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// `name` + `desc`, the key logical operations are identified by.
    pub fn sig_key(&self) -> String {
        format!("{}{}", self.name, self.desc)
    }
}

/// A declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub access: u32,
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
}

/// A complete class definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    /// Format version of the source definition
    pub version: u32,
    pub access: u32,
    /// Internal (slash-separated) name
    pub name: String,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    /// Enclosing class internal name, for nested identities
    pub inner_of: Option<String>,
}

impl ClassDef {
    /// A minimal class extending `java/lang/Object`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: 50,
            access: crate::types::flags::ACC_PUBLIC,
            name: name.into(),
            superclass: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            inner_of: None,
        }
    }

    pub fn method(&self, name: &str, desc: &str) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.desc == desc)
    }

    pub fn method_mut(&mut self, name: &str, desc: &str) -> Option<&mut MethodDef> {
        self.methods
            .iter_mut()
            .find(|m| m.name == name && m.desc == desc)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_method_named(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m.name == name)
    }

    /// All constructors, i.e. methods named `<init>`.
    pub fn constructors(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods.iter().filter(|m| m.name == "<init>")
    }
}
