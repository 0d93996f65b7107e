//! Runtime values

/// Identifies an object instance for coordination purposes.
pub type InstanceId = u64;

/// A runtime value flowing through coordination call-outs and the
/// interpreter's operand stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    /// Integer family (boolean through long)
    Int(i64),
    /// Floating family
    Float(f64),
    Str(String),
    /// Heap reference
    Ref(InstanceId),
}

impl Value {
    /// Truthiness for conditional branches: nonzero integer.
    pub fn as_truth(&self) -> bool {
        matches!(self, Value::Int(n) if *n != 0)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Ref(id) => write!(f, "@{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(Value::Int(1).as_truth());
        assert!(!Value::Int(0).as_truth());
        assert!(!Value::Null.as_truth());
    }
}
