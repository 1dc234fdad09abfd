use crate::model::{GenericType, Multiplicity};

use super::context::ContextId;

/// Which context resolves a non-concrete binding value.
///
/// `Owner` is the context holding the binding. An indirection can only name a
/// different context, so resolution never loops back onto the same frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Owner,
    Scope(ContextId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding<V> {
    value: V,
    target: Target,
    terminal: bool,
}

pub type TypeBinding = Binding<GenericType>;
pub type MultiplicityBinding = Binding<Multiplicity>;

impl<V> Binding<V> {
    /// `owner` is the context the binding is stored in; a target equal to it is
    /// recorded as `Target::Owner`.
    pub fn new(value: V, target: ContextId, owner: ContextId, terminal: bool) -> Self {
        let target = if target == owner { Target::Owner } else { Target::Scope(target) };
        Self { value, target, terminal }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn target_context(&self, owner: ContextId) -> ContextId {
        match self.target {
            Target::Owner => owner,
            Target::Scope(id) => id,
        }
    }

    /// The other context to consult when the value is an unresolved reference.
    pub fn indirection(&self) -> Option<ContextId> {
        match self.target {
            Target::Owner => None,
            Target::Scope(id) => Some(id),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }
}
