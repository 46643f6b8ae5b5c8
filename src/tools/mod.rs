pub mod calculate;
pub mod echo;
pub mod executor;
pub mod function;
pub mod registry;
pub mod schema;

pub use calculate::CalculateTool;
pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use function::{to_json_or_string, FunctionTool, TypedTool};
pub use registry::{Tool, ToolRegistry};
pub use schema::{
    empty_object_schema, params_to_json_schema, schema_for_args, ParamSpec, ParamType, ToolSpec,
};
