pub mod echo;
pub mod executor;
pub mod markers;
pub mod records;
pub mod registry;
pub mod schema;

pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use markers::ErrorMarkers;
pub use records::{RecordsTool, RecordsToolConfig};
pub use registry::{Tool, ToolRegistry, ToolSpec};
pub use schema::plan_schema_json;
