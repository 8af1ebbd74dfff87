pub mod advisor;
pub mod analyzer;
pub mod checker;
pub mod config;
pub mod discovery;
pub mod graph;
pub mod pipeline;
pub mod types;

pub use advisor::OllamaAdvisor;
pub use analyzer::{ScriptLanguage, ToolCommand};
pub use checker::ScriptChecker;
pub use config::Config;
pub use graph::{DependencyGraph, ExecutionOrder};
pub use pipeline::{ExecutionPlan, Orchestrator, RunOptions};
pub use types::*;
