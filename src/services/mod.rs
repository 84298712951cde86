//! Services: local repair-tool execution and the workflow registry.

pub mod repair_executor;
pub mod workflow_registry;

pub use repair_executor::{
    execute_from_context, execute_planned_repairs, FnTool, RepairTool, ToolError, ToolRegistry,
};
pub use workflow_registry::{WorkflowInfo, WorkflowRegistry};
