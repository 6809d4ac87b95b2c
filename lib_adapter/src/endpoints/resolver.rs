use std::collections::HashMap;

use super::endpoint_type::EndpointType;
use crate::error::{AdapterError, AdapterResult};
use crate::model::AUTO_PRODUCES;

/// The producing type an endpoint declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Produces {
    /// Inferred from the content type of the first successful response.
    Auto,
    /// Fixed by configuration.
    Declared(EndpointType),
}

/// # Endpoint Type Resolver
///
/// An immutable identifier table, built once at startup and shared by every
/// session. Lookups are case-insensitive.
#[derive(Debug, Clone)]
pub struct EndpointTypeResolver {
    /// Identifier (lower case) to type.
    by_identifier: HashMap<String, EndpointType>,
    /// Registered types in inference order.
    order: Vec<EndpointType>,
}

impl EndpointTypeResolver {
    /// Builds the table of the three standard types.
    pub fn new() -> AdapterResult<Self> {
        Self::with_types(&EndpointType::INFERENCE_ORDER)
    }

    /// Builds a table from `types`, which also fixes the inference order.
    ///
    /// # Errors
    /// `AdapterError::DuplicateIdentifier` if two types (or the same type
    /// registered twice) claim one identifier.
    pub fn with_types(types: &[EndpointType]) -> AdapterResult<Self> {
        let mut by_identifier = HashMap::new();
        for endpoint_type in types {
            for identifier in endpoint_type.identifiers() {
                if by_identifier
                    .insert(identifier.to_ascii_lowercase(), *endpoint_type)
                    .is_some()
                {
                    return Err(AdapterError::DuplicateIdentifier {
                        identifier: identifier.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            by_identifier,
            order: types.to_vec(),
        })
    }

    /// Looks up a type by name or media type.
    ///
    /// # Errors
    /// `AdapterError::UnknownType` if nothing is registered for the identifier.
    pub fn resolve(&self, identifier: &str) -> AdapterResult<EndpointType> {
        self.by_identifier
            .get(&identifier.trim().to_ascii_lowercase())
            .copied()
            .ok_or_else(|| AdapterError::UnknownType(identifier.to_string()))
    }

    /// Interprets a "produces" value, which is either `auto` or an identifier.
    pub fn produces(&self, identifier: &str) -> AdapterResult<Produces> {
        if identifier.trim().eq_ignore_ascii_case(AUTO_PRODUCES) {
            Ok(Produces::Auto)
        } else {
            self.resolve(identifier).map(Produces::Declared)
        }
    }

    /// The first registered type able to handle the content type. Binary when
    /// there is no content type or nothing more specific matches.
    pub fn infer(&self, content_type: Option<&str>) -> EndpointType {
        content_type
            .and_then(|ct| self.order.iter().copied().find(|t| t.can_handle(ct)))
            .unwrap_or(EndpointType::Binary)
    }

    /// Checks that a response with `content_type` can be decoded as `declared`.
    /// A response without a content type is assumed to be compatible.
    ///
    /// # Errors
    /// `AdapterError::ContentTypeMismatch` when `declared` cannot handle it.
    pub fn validate(&self, declared: EndpointType, content_type: Option<&str>) -> AdapterResult<()> {
        match content_type {
            Some(observed) if !declared.can_handle(observed) => Err(AdapterError::ContentTypeMismatch {
                declared,
                observed: observed.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> EndpointTypeResolver {
        EndpointTypeResolver::new().unwrap()
    }

    #[test]
    fn resolves_names_and_media_types() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("json").unwrap(), EndpointType::Json);
        assert_eq!(resolver.resolve("Application/JSON").unwrap(), EndpointType::Json);
        assert_eq!(resolver.resolve(" string ").unwrap(), EndpointType::PlainText);
        assert_eq!(resolver.resolve("application/octet-stream").unwrap(), EndpointType::Binary);
        assert_eq!(
            resolver.resolve("xml").unwrap_err(),
            AdapterError::UnknownType("xml".to_string())
        );
    }

    #[test]
    fn produces_recognises_auto() {
        let resolver = resolver();
        assert_eq!(resolver.produces("auto").unwrap(), Produces::Auto);
        assert_eq!(resolver.produces("AUTO").unwrap(), Produces::Auto);
        assert_eq!(resolver.produces("binary").unwrap(), Produces::Declared(EndpointType::Binary));
        assert!(resolver.produces("yaml").is_err());
    }

    #[test]
    fn duplicate_identifiers_are_rejected() {
        let err = EndpointTypeResolver::with_types(&[EndpointType::Json, EndpointType::Json]).unwrap_err();
        assert!(matches!(err, AdapterError::DuplicateIdentifier { .. }));
    }

    #[test]
    fn infers_the_most_specific_type() {
        let resolver = resolver();
        assert_eq!(resolver.infer(Some("application/json")), EndpointType::Json);
        assert_eq!(resolver.infer(Some("text/plain")), EndpointType::PlainText);
        assert_eq!(resolver.infer(Some("application/octet-stream")), EndpointType::Binary);
        assert_eq!(resolver.infer(Some("anything/else")), EndpointType::Binary);
        assert_eq!(resolver.infer(None), EndpointType::Binary);
    }

    #[test]
    fn validates_declared_types() {
        let resolver = resolver();
        assert!(matches!(
            resolver.validate(EndpointType::Json, Some("text/plain")),
            Err(AdapterError::ContentTypeMismatch { .. })
        ));
        assert!(resolver.validate(EndpointType::PlainText, Some("application/json")).is_ok());
        assert!(resolver.validate(EndpointType::Binary, Some("image/png")).is_ok());
        assert!(resolver.validate(EndpointType::Binary, Some("text/plain")).is_ok());
        assert!(resolver.validate(EndpointType::Json, None).is_ok());
    }
}
