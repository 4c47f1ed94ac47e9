mod dispatcher;
mod routing;
mod writer;

pub use dispatcher::{DialogDispatcher, Outcome};
pub use routing::RoutingTable;
pub use writer::{FILE_EXTENSION, FileSink, file_name};
