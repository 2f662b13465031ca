pub mod callback;
pub mod metadata;
pub mod request;
pub mod slo;
pub mod spslo;
