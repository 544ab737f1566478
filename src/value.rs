// ABOUTME: Runtime value model -- every Zephyr value, shared by Rc, plus the
// ABOUTME: class/instance/module/promise descriptors the evaluator operates on.

use crate::ast::{FunctionDecl, InterfaceMethodSig, LambdaBody, MemberVarDecl, Param};
use crate::env::Environment;
use crate::error::{SourceSpan, ZephyrError};
use crate::integer::Integer;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

/// A user-defined `func` declaration bound to the scope it was declared in.
/// Methods reuse this too: their `closure` is the class's defining scope.
#[derive(Clone)]
pub struct FunctionValue {
    pub decl: Rc<FunctionDecl>,
    pub closure: Rc<Environment>,
}

impl FunctionValue {
    pub fn name(&self) -> &str {
        &self.decl.name
    }
}

/// A lambda instance. Each evaluation of a `Lambda` AST node produces a new
/// `LambdaValue` with its own `captures` scope, so two lambdas returned from
/// two different calls never share mutable state through the closure chain
/// even though the `body` AST itself is shared (it is immutable).
pub struct LambdaValue {
    pub params: Vec<Param>,
    pub body: Rc<LambdaBody>,
    pub is_async: bool,
    pub captures: Rc<Environment>,
}

/// A single overload: parameters plus the function value invoked for it.
/// Held in `ClassValue::methods` and in overload groups bound in scopes.
#[derive(Clone)]
pub struct Overload {
    pub function: Rc<FunctionValue>,
}

pub struct ClassValue {
    pub name: String,
    pub parent: RefCell<Option<Rc<ClassValue>>>,
    pub interfaces: RefCell<Vec<Rc<InterfaceValue>>>,
    pub members: Vec<MemberVarDecl>,
    pub methods: RefCell<HashMap<String, Vec<Overload>>>,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_internal: bool,
    /// Set once at class-definition time if an inherited abstract method was
    /// not overridden; instantiation of such a class is a `TypeError`.
    pub invalid_init: Cell<bool>,
    /// The scope active when `class C { ... }` was evaluated -- used to
    /// evaluate member-variable default expressions at instantiation time,
    /// the same way a method's `closure` anchors its free variables.
    pub closure: Rc<Environment>,
}

impl ClassValue {
    /// Child-first search for a method overload group, walking the parent
    /// chain. Used for ordinary `self.m(...)` dispatch.
    pub fn find_method(self: &Rc<Self>, name: &str) -> Option<(Rc<ClassValue>, Vec<Overload>)> {
        if let Some(overloads) = self.methods.borrow().get(name) {
            return Some((self.clone(), overloads.clone()));
        }
        self.parent.borrow().as_ref().and_then(|p| p.find_method(name))
    }

    /// Whether this class (or an ancestor) declares `interface_name`.
    pub fn implements(&self, interface_name: &str) -> bool {
        if self.interfaces.borrow().iter().any(|i| i.name == interface_name) {
            return true;
        }
        match self.parent.borrow().as_ref() {
            Some(p) => p.implements(interface_name),
            None => false,
        }
    }

    pub fn is_subclass_of(&self, name: &str) -> bool {
        if self.name == name {
            return true;
        }
        match self.parent.borrow().as_ref() {
            Some(p) => p.is_subclass_of(name),
            None => false,
        }
    }
}

pub struct InstanceValue {
    pub class: Rc<ClassValue>,
    pub members: RefCell<HashMap<String, Value>>,
    pub const_members: RefCell<HashSet<String>>,
}

pub struct InterfaceValue {
    pub name: String,
    pub is_internal: bool,
    pub methods: Vec<InterfaceMethodSig>,
}

/// A declared `enum`'s type object: the name bound in scope (`Color` in
/// `enum Color { Red, Green }`), carrying each variant's tag order and
/// parameter names so `ColorName.Pair(1, 2)`-style construction can
/// arity-check against them.
pub struct EnumTypeValue {
    pub name: String,
    pub variants: Vec<(String, Vec<String>)>,
}

impl EnumTypeValue {
    pub fn variant(&self, name: &str) -> Option<(usize, &[String])> {
        self.variants.iter().position(|(n, _)| n == name).map(|i| (i, self.variants[i].1.as_slice()))
    }
}

/// A constructed enum value, e.g. `Color.Red` or `Shape.Pair(1, 2)`.
/// Compared structurally (same enum, same tag, same data) rather than by
/// identity -- see `Value::is_identical`.
pub struct EnumVariantValue {
    pub enum_name: String,
    pub variant_name: String,
    pub variant_index: usize,
    pub data: Vec<Value>,
}

pub struct ModuleValue {
    pub name: String,
    pub canonical_path: PathBuf,
    pub source: String,
    pub exports: RefCell<HashMap<String, Value>>,
    pub executed: Cell<bool>,
    pub global_scope: RefCell<Option<Rc<Environment>>>,
}

/// Value bound for `import x from mod as alias` -- a module handle filtered
/// to the named symbols, versus a full `import mod` handle with no filter.
pub struct ModuleHandleValue {
    pub module: Rc<ModuleValue>,
    pub whitelist: Option<Vec<String>>,
}

impl ModuleHandleValue {
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(list) = &self.whitelist {
            if !list.iter().any(|n| n == name) {
                return None;
            }
        }
        self.module.exports.borrow().get(name).cloned()
    }
}

#[derive(Clone)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(String),
}

pub struct PromiseValue {
    pub state: PromiseState,
    /// (on_fulfilled, on_rejected) pairs registered via `.then`/`.catch`,
    /// fired and cleared once the promise settles.
    pub callbacks: Vec<(Option<Value>, Option<Value>)>,
}

impl PromiseValue {
    pub fn pending() -> Self {
        PromiseValue { state: PromiseState::Pending, callbacks: Vec::new() }
    }
}

/// A builtin's implementation. The third argument lets a builtin invoke an
/// arbitrary callable value (a function, lambda, or class constructor) the
/// same way the evaluator would -- used by `map`/`filter`/`reduce`/`all` to
/// call back into user code without this module depending on `crate::eval`.
pub type CallValueFn<'a> = dyn Fn(&Value, &[Value], SourceSpan) -> Result<Value, ZephyrError> + 'a;
pub type BuiltinFn = dyn Fn(&[Value], SourceSpan, &CallValueFn<'_>) -> Result<Value, ZephyrError>;

pub struct BuiltinFunction {
    pub name: String,
    pub func: Box<BuiltinFn>,
}

#[derive(Clone)]
pub enum Value {
    Int(Integer),
    Float(f64),
    Bool(bool),
    None,
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    /// Insertion-order map: a `Vec`-backed association list rather than a
    /// hash map, since iteration order is part of the observable (if
    /// unspecified-which-order) semantics described in spec.md 4.5/9.
    Dict(Rc<RefCell<Vec<(Rc<str>, Value)>>>),
    Function(Rc<FunctionValue>),
    /// A name bound to more than one overload; plain `Value::Function` is
    /// used for the common single-overload case.
    OverloadSet(Rc<RefCell<Vec<Overload>>>),
    Lambda(Rc<LambdaValue>),
    Class(Rc<ClassValue>),
    Instance(Rc<InstanceValue>),
    Interface(Rc<InterfaceValue>),
    Enum(Rc<EnumTypeValue>),
    EnumVariant(Rc<EnumVariantValue>),
    Module(Rc<ModuleValue>),
    ModuleHandle(Rc<ModuleHandleValue>),
    Promise(Rc<RefCell<PromiseValue>>),
    Builtin(Rc<BuiltinFunction>),
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Value {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn dict(items: Vec<(Rc<str>, Value)>) -> Value {
        Value::Dict(Rc::new(RefCell::new(items)))
    }

    /// `type_name()` per spec.md 3.2: integers report their exact kind
    /// suffix (or `"int"` for `default_int`/`i32`).
    pub fn type_name(&self) -> String {
        match self {
            Value::Int(i) => i.type_name().to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::None => "none".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::Function(_) | Value::OverloadSet(_) => "function".to_string(),
            Value::Lambda(_) => "lambda".to_string(),
            Value::Class(c) => c.name.clone(),
            Value::Instance(i) => i.class.name.clone(),
            Value::Interface(i) => i.name.clone(),
            Value::Enum(e) => e.name.clone(),
            Value::EnumVariant(v) => v.enum_name.clone(),
            Value::Module(_) | Value::ModuleHandle(_) => "module".to_string(),
            Value::Promise(_) => "promise".to_string(),
            Value::Builtin(_) => "builtin".to_string(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::None => false,
            Value::Int(i) => i.value() != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            _ => true,
        }
    }

    /// Identity comparison for the `is` operator. Heap-allocated variants
    /// compare by `Rc` pointer; primitives compare by value. Per spec.md 9's
    /// open question, strings are not interned, so two freshly constructed
    /// equal strings are not `is`-identical unless they share an `Rc<str>`.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a.value() == b.value() && a.kind() == b.kind(),
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Enum(a), Value::Enum(b)) => Rc::ptr_eq(a, b),
            (Value::EnumVariant(a), Value::EnumVariant(b)) => {
                a.enum_name == b.enum_name
                    && a.variant_index == b.variant_index
                    && a.data.len() == b.data.len()
                    && a.data.iter().zip(b.data.iter()).all(|(x, y)| x.is_identical(y))
            }
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<&Integer> {
        match self {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i.value()),
            Value::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Bool(b) => write!(f, "{}", b),
            Value::None => write!(f, "none"),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Dict(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Function(func) => write!(f, "<function {}>", func.name()),
            Value::OverloadSet(set) => {
                let name = set.borrow().first().map(|o| o.function.name().to_string());
                write!(f, "<function {}>", name.unwrap_or_default())
            }
            Value::Lambda(_) => write!(f, "<lambda>"),
            Value::Class(c) => write!(f, "<class {}>", c.name),
            Value::Instance(i) => write!(f, "<{} instance>", i.class.name),
            Value::Interface(i) => write!(f, "<interface {}>", i.name),
            Value::Enum(e) => write!(f, "<enum {}>", e.name),
            Value::EnumVariant(v) => {
                write!(f, "{}.{}", v.enum_name, v.variant_name)?;
                if !v.data.is_empty() {
                    write!(f, "(")?;
                    for (i, item) in v.data.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", item)?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
            Value::Module(m) => write!(f, "<module {}>", m.name),
            Value::ModuleHandle(h) => write!(f, "<module {}>", h.module.name),
            Value::Promise(_) => write!(f, "<promise>"),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({}: {})", self.type_name(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integer::IntegerKind;

    #[test]
    fn type_name_matches_int_kind() {
        let default = Value::Int(Integer::default_int(1));
        assert_eq!(default.type_name(), "int");
        let u8v = Value::Int(Integer::new(1, IntegerKind::U8).unwrap());
        assert_eq!(u8v.type_name(), "u8");
    }

    #[test]
    fn lists_are_reference_identical_not_value_identical() {
        let a = Value::list(vec![Value::Int(Integer::default_int(1))]);
        let b = a.clone();
        let c = Value::list(vec![Value::Int(Integer::default_int(1))]);
        assert!(a.is_identical(&b));
        assert!(!a.is_identical(&c));
    }

    #[test]
    fn display_formats_dict_and_list() {
        let list = Value::list(vec![Value::Bool(true), Value::None]);
        assert_eq!(format!("{}", list), "[true, none]");
    }
}
