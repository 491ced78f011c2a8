pub mod http;
pub mod traits;

pub use http::ReqwestTransport;
pub use traits::{HttpResponse, HttpTransport, IngestRequest};
