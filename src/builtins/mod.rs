// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The built-in registry: four independently-queryable tables mapping
//! well-known names to pre-written opcode-generating functions.
//!
//! Everything here is data, assembled once at [`crate::Compilation`]
//! construction. Adding a new built-in is writing one more generator
//! function and one more table row (see [`generators`]) — the lowering
//! passes in [`crate::lower`] never special-case a built-in name directly.

mod generators;

use std::collections::HashMap;

use crate::scope::Scope;
use crate::types::{Instr, Opcode, TypeTag, ValType};

/// A named constant or host-imported value available as a bare identifier.
#[derive(Clone, Copy)]
pub struct BuiltinVar {
    pub valtype: ValType,
    pub type_tag: TypeTag,
    /// Produces the instructions that push this value's payload (the type
    /// tag is pushed separately by the caller from `type_tag`).
    pub generator: fn() -> Vec<Instr>,
}

bitflags::bitflags! {
    /// Flags describing a built-in function's calling convention.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct FunctionFlags: u8 {
        /// Only valid when the module valtype is a float type.
        const FLOAT_ONLY = 0b001;
        /// Arguments are pushed as typed *(payload, type)* pairs rather than
        /// bare payloads.
        const TYPED_PARAMS = 0b010;
        /// The callee itself sets `#last_type`; the caller does not need to
        /// infer a static result type.
        const TYPED_RETURN = 0b100;
    }
}

/// A pre-written built-in function body.
#[derive(Clone, Copy)]
pub struct BuiltinFunction {
    pub params: &'static [ValType],
    pub results: &'static [ValType],
    pub flags: FunctionFlags,
    pub generator: fn() -> Vec<Instr>,
}

/// Context handed to a prototype-method generator: the receiver pointer
/// local, a length-accessor bundle (so the generator need not know how the
/// receiver's length is computed), the already-lowered argument
/// instructions, and the enclosing function's scope for fresh-local
/// allocation.
pub struct PrototypeCallContext<'a> {
    pub receiver_ptr: crate::types::LocalIdx,
    pub length: &'a dyn Fn(crate::types::LocalIdx) -> Vec<Instr>,
    pub arguments: Vec<Instr>,
    /// Byte width of one element slot, resolved from the module valtype.
    pub elem_size: u32,
    /// Store opcode matching the module valtype, for writing an element.
    pub store_op: Opcode,
    pub scope: &'a mut Scope,
}

pub type PrototypeGenerator = fn(&mut PrototypeCallContext) -> Vec<Instr>;

/// One candidate implementation of a prototype method for a given receiver
/// type tag.
#[derive(Clone, Copy)]
pub struct PrototypeMethod {
    pub generator: PrototypeGenerator,
    pub return_type: TypeTag,
}

/// An internal constructor (`Array`, `Array.of`, …): a generator plus the
/// type tag of the value it produces.
#[derive(Clone, Copy)]
pub struct InternalConstructor {
    pub generator: fn(arguments: Vec<Instr>) -> Vec<Instr>,
    pub result_type: TypeTag,
}

/// The four independently-queryable built-in tables.
pub struct BuiltinRegistry {
    vars: HashMap<&'static str, BuiltinVar>,
    funcs: HashMap<&'static str, BuiltinFunction>,
    prototype_funcs: HashMap<(TypeTag, &'static str), PrototypeMethod>,
    constructors: HashMap<&'static str, InternalConstructor>,
}

impl BuiltinRegistry {
    /// Builds the fixed table of built-ins. Called once per `Compilation`.
    pub fn new() -> Self {
        let mut registry = Self {
            vars: HashMap::new(),
            funcs: HashMap::new(),
            prototype_funcs: HashMap::new(),
            constructors: HashMap::new(),
        };
        generators::register_all(&mut registry);
        registry
    }

    pub fn register_var(&mut self, name: &'static str, var: BuiltinVar) {
        self.vars.insert(name, var);
    }

    pub fn register_func(&mut self, name: &'static str, func: BuiltinFunction) {
        self.funcs.insert(name, func);
    }

    pub fn register_prototype_method(
        &mut self,
        type_tag: TypeTag,
        name: &'static str,
        method: PrototypeMethod,
    ) {
        self.prototype_funcs.insert((type_tag, name), method);
    }

    pub fn register_constructor(&mut self, name: &'static str, ctor: InternalConstructor) {
        self.constructors.insert(name, ctor);
    }

    pub fn var(&self, name: &str) -> Option<&BuiltinVar> {
        self.vars.get(name)
    }

    pub fn func(&self, name: &str) -> Option<&BuiltinFunction> {
        self.funcs.get(name)
    }

    pub fn constructor(&self, name: &str) -> Option<&InternalConstructor> {
        self.constructors.get(name)
    }

    /// All registered candidates for a prototype method name, across every
    /// type tag that implements it — used to drive the leading type-switch
    /// at a prototype dispatch call site.
    pub fn prototype_candidates(&self, name: &str) -> Vec<(TypeTag, &PrototypeMethod)> {
        self.prototype_funcs
            .iter()
            .filter(|((_, method_name), _)| *method_name == name)
            .map(|((tag, _), method)| (*tag, method))
            .collect()
    }

    /// The single-candidate fast path (§9, "Prototype-method single-candidate
    /// fast path"): when exactly one type implements `name`, its
    /// `return_type` is used as the statically-known result type.
    pub fn prototype_known_return_type(&self, name: &str) -> Option<TypeTag> {
        let mut candidates = self.prototype_candidates(name).into_iter();
        let (_, first) = candidates.next()?;
        if candidates.next().is_some() {
            return None;
        }
        Some(first.return_type)
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn math_max_is_registered_as_a_builtin_function() {
        let registry = BuiltinRegistry::new();
        assert!(registry.func("__Math_max").is_some());
    }

    #[test]
    fn array_push_has_a_single_prototype_candidate() {
        let registry = BuiltinRegistry::new();
        assert_eq!(registry.prototype_known_return_type("push"), Some(TypeTag::Number));
    }

    #[test]
    fn array_constructor_is_registered() {
        let registry = BuiltinRegistry::new();
        assert!(registry.constructor("Array").is_some());
    }
}
