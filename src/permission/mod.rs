//! Flags, options and context-scoped permission resolution

pub mod flags;
pub mod manager;
pub mod options;
pub mod pending;
pub mod resolver;
pub mod store;

pub use flags::{Flag, FlagDefinition, FlagRegistry};
pub use manager::PermissionManager;
pub use options::{ClaimOption, OptionDefinition, OptionKind, OptionRegistry, OptionValue};
pub use pending::PendingMutation;
pub use resolver::{ContextResolver, FlagQuery};
pub use store::{
    MemoryPermissionBackend, PermissionBackend, PermissionChange, PermissionEntry, PermissionKey,
    PermissionStore, PermissionSubject, StoredValue,
};
