//! Type descriptors
//!
//! Field and method descriptors use the compact slash-and-semicolon syntax
//! of the source runtime (`I`, `J`, `Ljava/lang/Object;`, `(I[J)V`), since
//! logical operation names carry full descriptors on the wire.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access flag bitmask constants
pub mod flags {
    /// Publicly accessible
    pub const ACC_PUBLIC: u32 = 0x0001;
    /// Private to the declaring class
    pub const ACC_PRIVATE: u32 = 0x0002;
    /// Protected
    pub const ACC_PROTECTED: u32 = 0x0004;
    /// Static member
    pub const ACC_STATIC: u32 = 0x0008;
    /// Final
    pub const ACC_FINAL: u32 = 0x0010;
    /// Synchronized method
    pub const ACC_SYNCHRONIZED: u32 = 0x0020;
    /// Volatile field
    pub const ACC_VOLATILE: u32 = 0x0040;
    /// Transient field
    pub const ACC_TRANSIENT: u32 = 0x0080;
    /// Native method
    pub const ACC_NATIVE: u32 = 0x0100;
    /// Interface
    pub const ACC_INTERFACE: u32 = 0x0200;
    /// Abstract
    pub const ACC_ABSTRACT: u32 = 0x0400;
    /// Compiler/transformer synthesized member
    pub const ACC_SYNTHETIC: u32 = 0x1000;
}

/// Descriptor parse errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescError {
    /// Empty or truncated descriptor
    #[error("truncated descriptor: {0:?}")]
    Truncated(String),

    /// Unknown type character
    #[error("unknown type character {ch:?} in {desc:?}")]
    UnknownTag { ch: char, desc: String },

    /// Method descriptor missing parentheses
    #[error("malformed method descriptor: {0:?}")]
    Malformed(String),
}

/// A field or value type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Object type with internal (slash-separated) name
    Reference(String),
    /// Array of element type
    Array(Box<TypeTag>),
}

impl TypeTag {
    /// Parse a single field descriptor such as `I` or `Ljava/util/Map;`.
    pub fn parse(desc: &str) -> Result<TypeTag, DescError> {
        let mut chars = desc.chars();
        let tag = Self::parse_from(&mut chars, desc)?;
        if chars.next().is_some() {
            return Err(DescError::Malformed(desc.to_string()));
        }
        Ok(tag)
    }

    fn parse_from(chars: &mut std::str::Chars<'_>, desc: &str) -> Result<TypeTag, DescError> {
        let ch = chars
            .next()
            .ok_or_else(|| DescError::Truncated(desc.to_string()))?;
        Ok(match ch {
            'Z' => TypeTag::Boolean,
            'B' => TypeTag::Byte,
            'C' => TypeTag::Char,
            'S' => TypeTag::Short,
            'I' => TypeTag::Int,
            'J' => TypeTag::Long,
            'F' => TypeTag::Float,
            'D' => TypeTag::Double,
            'L' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some(';') => break,
                        Some(c) => name.push(c),
                        None => return Err(DescError::Truncated(desc.to_string())),
                    }
                }
                TypeTag::Reference(name)
            }
            '[' => TypeTag::Array(Box::new(Self::parse_from(chars, desc)?)),
            other => {
                return Err(DescError::UnknownTag {
                    ch: other,
                    desc: desc.to_string(),
                })
            }
        })
    }

    /// Render back to descriptor syntax.
    pub fn descriptor(&self) -> String {
        match self {
            TypeTag::Boolean => "Z".to_string(),
            TypeTag::Byte => "B".to_string(),
            TypeTag::Char => "C".to_string(),
            TypeTag::Short => "S".to_string(),
            TypeTag::Int => "I".to_string(),
            TypeTag::Long => "J".to_string(),
            TypeTag::Float => "F".to_string(),
            TypeTag::Double => "D".to_string(),
            TypeTag::Reference(name) => format!("L{};", name),
            TypeTag::Array(elem) => format!("[{}", elem.descriptor()),
        }
    }

    /// Number of local variable slots a value of this type occupies.
    pub fn width(&self) -> u16 {
        match self {
            TypeTag::Long | TypeTag::Double => 2,
            _ => 1,
        }
    }

    /// True for object and array types.
    pub fn is_reference(&self) -> bool {
        matches!(self, TypeTag::Reference(_) | TypeTag::Array(_))
    }
}

/// Parsed method signature: parameter types and optional return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig {
    pub params: Vec<TypeTag>,
    /// `None` means void
    pub ret: Option<TypeTag>,
}

impl MethodSig {
    /// Parse a method descriptor like `(ILjava/lang/Object;)Z`.
    pub fn parse(desc: &str) -> Result<MethodSig, DescError> {
        let inner = desc
            .strip_prefix('(')
            .ok_or_else(|| DescError::Malformed(desc.to_string()))?;
        let close = inner
            .find(')')
            .ok_or_else(|| DescError::Malformed(desc.to_string()))?;
        let (args, ret) = inner.split_at(close);
        let ret = &ret[1..];

        let mut params = Vec::new();
        let mut chars = args.chars();
        while !chars.as_str().is_empty() {
            params.push(TypeTag::parse_from(&mut chars, desc)?);
        }

        let ret = if ret == "V" {
            None
        } else {
            Some(TypeTag::parse(ret)?)
        };
        Ok(MethodSig { params, ret })
    }

    /// Render back to descriptor syntax.
    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for p in &self.params {
            out.push_str(&p.descriptor());
        }
        out.push(')');
        match &self.ret {
            Some(tag) => out.push_str(&tag.descriptor()),
            None => out.push('V'),
        }
        out
    }

    /// Total local slots the parameters occupy, excluding the receiver.
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(TypeTag::width).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_primitive_descriptors() {
        assert_eq!(TypeTag::parse("I").unwrap(), TypeTag::Int);
        assert_eq!(TypeTag::parse("J").unwrap(), TypeTag::Long);
        assert_eq!(TypeTag::parse("Z").unwrap(), TypeTag::Boolean);
    }

    #[test]
    fn parse_reference_and_array() {
        assert_eq!(
            TypeTag::parse("Ljava/lang/Object;").unwrap(),
            TypeTag::Reference("java/lang/Object".to_string())
        );
        assert_eq!(
            TypeTag::parse("[[I").unwrap(),
            TypeTag::Array(Box::new(TypeTag::Array(Box::new(TypeTag::Int))))
        );
    }

    #[test]
    fn descriptor_round_trip() {
        for desc in ["I", "J", "Ljava/util/Map;", "[Ljava/lang/String;", "[[D"] {
            assert_eq!(TypeTag::parse(desc).unwrap().descriptor(), desc);
        }
    }

    #[test]
    fn parse_method_descriptor() {
        let sig = MethodSig::parse("(ILjava/lang/Object;[J)Z").unwrap();
        assert_eq!(sig.params.len(), 3);
        assert_eq!(sig.ret, Some(TypeTag::Boolean));
        assert_eq!(sig.descriptor(), "(ILjava/lang/Object;[J)Z");
    }

    #[test]
    fn void_return() {
        let sig = MethodSig::parse("()V").unwrap();
        assert!(sig.params.is_empty());
        assert_eq!(sig.ret, None);
    }

    #[test]
    fn wide_params_take_two_slots() {
        let sig = MethodSig::parse("(JID)V").unwrap();
        assert_eq!(sig.param_slots(), 5);
    }

    #[test]
    fn reject_malformed() {
        assert!(TypeTag::parse("Q").is_err());
        assert!(TypeTag::parse("Ljava/lang/Object").is_err());
        assert!(MethodSig::parse("IV").is_err());
    }
}
