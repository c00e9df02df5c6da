//! Adapters implementing the domain's port traits against concrete external
//! systems.

pub mod durability;
pub mod llm;
pub mod notifier;
pub mod sqlite;
pub mod tools;
