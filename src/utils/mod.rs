pub mod image;
pub mod middleware;
pub mod serde_helpers;
pub mod validation;
