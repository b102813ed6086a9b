/// Immediate module - legacy begin/end drawing on top of the command graph
///
/// `ImmediateSession` accumulates vertices into regions reserved from an
/// `ImmediateBufferPool`, converts them with a `VertexFormatConverter` when
/// needed and submits one `DrawNode` per session. `DrawingContext` bundles a
/// session with its `DeviceContext`.

pub mod config;
pub mod buffer_pool;
pub mod session;
pub mod drawing_context;

pub use config::*;
pub use buffer_pool::*;
pub use session::*;
pub use drawing_context::*;
