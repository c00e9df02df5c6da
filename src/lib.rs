//! fleetctl-orchestrator - AI task orchestration for fleet remediation
//!
//! Classifies operator intent into a typed task, plans a multi-phase
//! remediation with an LLM-backed planner loop, routes it through
//! human-in-the-loop approval, and executes it against fleet assets with
//! durable, resumable phases.
//!
//! Layout follows a hexagonal split:
//! - `domain` — entities, value objects, and port traits; no infrastructure.
//! - `application` — the nine core components (C1-C9) and the composition
//!   root (`Orchestrator`) that wires them to concrete adapters.
//! - `adapters` — port implementations against SQLite, an LLM provider,
//!   cloud/k8s tool handlers, durability backends, and notifications.
//! - `infrastructure` — cross-cutting concerns: config loading, logging,
//!   and shared retry/rate-limit primitives.
//! - `cli` / `interfaces::http` — the two front doors the binary exposes
//!   onto `Orchestrator`.

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;

pub use application::Orchestrator;
pub use domain::{DomainError, DomainResult, OrchestratorError, OrchestratorResult};
