pub mod error;
pub mod fetch;
pub mod layer_fetcher;
pub mod mesh;
pub mod req_resp;
pub mod sync;
pub mod transport;
pub mod types;
