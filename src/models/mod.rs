pub mod report;
pub mod request;
pub mod response;

pub use report::{BatchSummary, RequestReport};
pub use request::{BuildError, HttpRequest, RequestError};
pub use response::HttpResponse;
