//! Stock client implementations

mod anonymous;
mod header;
mod redirect;

pub use anonymous::AnonymousClient;
pub use header::HeaderClient;
pub use redirect::RedirectClient;
