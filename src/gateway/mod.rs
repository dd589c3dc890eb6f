//! Browser-facing view of the archive: prefix listings and the object proxy.

pub mod listing;
pub mod proxy;

pub use listing::{list_prefix, render_listing, ListingLinks, ListingPage};
pub use proxy::{fetch, Fetched};
