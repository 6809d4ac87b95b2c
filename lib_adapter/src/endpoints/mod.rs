//! # Endpoint Types Module
//!
//! Everything needed to turn a raw endpoint response into a typed topic value.
//!
//! ## Contained Modules:
//! - **`endpoint_type`**: the closed set of producing types (JSON, plain text,
//!   binary), their content-type predicates and decoders.
//! - **`resolver`**: the immutable identifier table built once at startup,
//!   used to resolve declared "produces" values, infer types from content
//!   types and validate compatibility.
//! - **`value`**: the decoded value published to a topic and the charset-aware
//!   text decoding shared by the text based types.

/// The closed set of producing types.
pub mod endpoint_type;
/// Identifier lookup, inference and validation.
pub mod resolver;
/// Decoded topic values.
pub mod value;

pub use endpoint_type::EndpointType;
pub use resolver::{EndpointTypeResolver, Produces};
pub use value::TopicValue;
