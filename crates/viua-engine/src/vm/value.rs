//! Dynamic value model
//!
//! Values are a tagged variant with an inherent capability set
//! (`type_name`, `str_value`, `repr`, `boolean`, `deep_copy`, `bases`,
//! `inheritance_chain`) instead of open inheritance. Register slots hold
//! `ValueCell` handles; a slot flagged `REFERENCE` shares its cell with
//! the slot it aliases, so overwriting one never invalidates the other.

use crate::vm::registers::RegisterSet;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a value stored in a register slot
pub type ValueCell = Rc<RefCell<Value>>;

/// Wrap a value into a fresh cell
pub fn cell(value: Value) -> ValueCell {
    Rc::new(RefCell::new(value))
}

/// Runtime type descriptor: bases, attached methods, class name
///
/// Built by the `class`/`derive`/`attach` instructions and installed
/// into the machine's typesystem by `register`.
#[derive(Debug, Clone, Default)]
pub struct Prototype {
    pub name: String,
    pub ancestors: Vec<String>,
    /// Method name mapped to the implementing function's name
    pub methods: FxHashMap<String, String>,
}

impl Prototype {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ancestors: Vec::new(),
            methods: FxHashMap::default(),
        }
    }

    /// Record `base` as a supertype
    pub fn derive(&mut self, base: impl Into<String>) {
        self.ancestors.push(base.into());
    }

    /// Record a method binding
    pub fn attach(&mut self, function_name: impl Into<String>, method_name: impl Into<String>) {
        self.methods
            .insert(method_name.into(), function_name.into());
    }
}

/// A value held in a register
#[derive(Debug)]
pub enum Value {
    Integer(i32),
    Float(f32),
    Byte(u8),
    Boolean(bool),
    Str(String),
    Vector(Vec<ValueCell>),
    /// A named function usable through `fcall`
    Function(String),
    /// A function together with registers captured by `clbind`
    Closure {
        function_name: String,
        registers: RegisterSet,
    },
    /// Explicit pointer to another slot's value, created by `ptr`
    Pointer(ValueCell),
    Prototype(Prototype),
    /// Instance of a user-registered class
    Object {
        class_name: String,
    },
    /// Machine-thrown exception payload
    Exception {
        kind: String,
        message: String,
    },
}

impl Value {
    /// The value's dynamic type name
    pub fn type_name(&self) -> &str {
        match self {
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::Byte(_) => "Byte",
            Value::Boolean(_) => "Boolean",
            Value::Str(_) => "String",
            Value::Vector(_) => "Vector",
            Value::Function(_) => "Function",
            Value::Closure { .. } => "Closure",
            Value::Pointer(_) => "Pointer",
            Value::Prototype(_) => "Prototype",
            Value::Object { class_name } => class_name,
            Value::Exception { kind, .. } => kind,
        }
    }

    /// Human-oriented text used by `print` and `echo`
    pub fn str_value(&self) -> String {
        match self {
            Value::Integer(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Byte(b) => b.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Str(s) => s.clone(),
            Value::Vector(items) => {
                let parts: Vec<String> =
                    items.iter().map(|item| item.borrow().repr()).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Function(name) => format!("Function: {}", name),
            Value::Closure { function_name, .. } => format!("Closure: {}", function_name),
            Value::Pointer(target) => format!("Pointer to {}", target.borrow().type_name()),
            Value::Prototype(proto) => format!("Prototype for {}", proto.name),
            Value::Object { class_name } => format!("Object of {}", class_name),
            Value::Exception { message, .. } => message.clone(),
        }
    }

    /// Programmer-oriented text; quotes strings, otherwise `str_value`
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", s),
            _ => self.str_value(),
        }
    }

    /// Boolean coercion used by `branch` and `bool`
    pub fn boolean(&self) -> bool {
        match self {
            Value::Integer(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Byte(b) => *b != 0,
            Value::Boolean(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Vector(items) => !items.is_empty(),
            _ => true,
        }
    }

    /// Produce an owned deep clone
    ///
    /// Vectors clone their elements into fresh cells; closures clone
    /// their captured register set; pointers stay aliased to their
    /// target (copying a pointer copies the pointer, not the pointee).
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Integer(n) => Value::Integer(*n),
            Value::Float(f) => Value::Float(*f),
            Value::Byte(b) => Value::Byte(*b),
            Value::Boolean(b) => Value::Boolean(*b),
            Value::Str(s) => Value::Str(s.clone()),
            Value::Vector(items) => Value::Vector(
                items
                    .iter()
                    .map(|item| cell(item.borrow().deep_copy()))
                    .collect(),
            ),
            Value::Function(name) => Value::Function(name.clone()),
            Value::Closure {
                function_name,
                registers,
            } => Value::Closure {
                function_name: function_name.clone(),
                registers: registers.deep_copy(),
            },
            Value::Pointer(target) => Value::Pointer(Rc::clone(target)),
            Value::Prototype(proto) => Value::Prototype(proto.clone()),
            Value::Object { class_name } => Value::Object {
                class_name: class_name.clone(),
            },
            Value::Exception { kind, message } => Value::Exception {
                kind: kind.clone(),
                message: message.clone(),
            },
        }
    }

    /// Direct supertypes of this value's type
    pub fn bases(&self) -> Vec<String> {
        match self {
            Value::Exception { kind, .. } if kind != "Exception" => {
                vec!["Exception".to_string()]
            }
            _ => vec!["Type".to_string()],
        }
    }

    /// Type name followed by every supertype, most-derived first
    ///
    /// User-registered classes resolve their chain through the machine's
    /// typesystem instead; this covers the built-in variants.
    pub fn inheritance_chain(&self) -> Vec<String> {
        let mut chain = vec![self.type_name().to_string()];
        for base in self.bases() {
            if !chain.contains(&base) {
                chain.push(base);
            }
        }
        if !chain.contains(&"Type".to_string()) {
            chain.push("Type".to_string());
        }
        chain
    }

    /// The integer payload, if this is an Integer
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Integer(1).type_name(), "Integer");
        assert_eq!(Value::Str("x".into()).type_name(), "String");
        assert_eq!(
            Value::Object {
                class_name: "Account".into()
            }
            .type_name(),
            "Account"
        );
        assert_eq!(
            Value::Exception {
                kind: "OutOfRange".into(),
                message: String::new()
            }
            .type_name(),
            "OutOfRange"
        );
    }

    #[test]
    fn test_str_and_repr() {
        assert_eq!(Value::Integer(42).str_value(), "42");
        assert_eq!(Value::Str("boom".into()).str_value(), "boom");
        assert_eq!(Value::Str("boom".into()).repr(), "\"boom\"");

        let vector = Value::Vector(vec![cell(Value::Integer(1)), cell(Value::Str("a".into()))]);
        assert_eq!(vector.str_value(), "[1, \"a\"]");
    }

    #[test]
    fn test_boolean_coercion() {
        assert!(Value::Integer(1).boolean());
        assert!(!Value::Integer(0).boolean());
        assert!(!Value::Str(String::new()).boolean());
        assert!(Value::Boolean(true).boolean());
        assert!(!Value::Boolean(false).boolean());
        assert!(Value::Function("f".into()).boolean());
    }

    #[test]
    fn test_deep_copy_vector_is_detached() {
        let shared = cell(Value::Integer(1));
        let vector = Value::Vector(vec![Rc::clone(&shared)]);
        let copied = vector.deep_copy();

        *shared.borrow_mut() = Value::Integer(99);
        match copied {
            Value::Vector(items) => {
                assert_eq!(items[0].borrow().as_integer(), Some(1));
            }
            _ => panic!("expected vector"),
        }
    }

    #[test]
    fn test_inheritance_chain() {
        assert_eq!(Value::Integer(1).inheritance_chain(), vec!["Integer", "Type"]);
        assert_eq!(
            Value::Exception {
                kind: "OutOfRange".into(),
                message: String::new()
            }
            .inheritance_chain(),
            vec!["OutOfRange", "Exception", "Type"]
        );
        assert_eq!(
            Value::Exception {
                kind: "Exception".into(),
                message: String::new()
            }
            .inheritance_chain(),
            vec!["Exception", "Type"]
        );
    }
}
