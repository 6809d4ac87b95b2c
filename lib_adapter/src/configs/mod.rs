//! # Adapter Model Configuration
//!
//! Reads the list of services to poll from a JSON5 file and checks it before
//! any session is built, so a broken file is reported in one go instead of
//! service by service.
//!
//! ```json5
//! {
//!   topicRetention: "removeWhenUnused",
//!   services: [{
//!     name: "weather",
//!     host: "api.example.com",
//!     topicPathRoot: "rest/weather",
//!     pollPeriodMs: 30000,
//!     endpoints: [
//!       { name: "now", url: "/v1/now", topicPath: "now", produces: "json" },
//!     ],
//!   }],
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::endpoints::EndpointTypeResolver;
use crate::model::ServiceDescriptor;
use crate::topics::TopicRetention;

/// # Configuration Error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The model file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid JSON5 or does not match the model.
    #[error("Failed to parse the adapter model: {0}")]
    Parse(String),

    /// Two services share a name.
    #[error("Service {0} is defined more than once")]
    DuplicateService(String),

    /// Two endpoints of one service share a name.
    #[error("Endpoint {endpoint} is defined more than once in service {service}")]
    DuplicateEndpoint {
        /// Owning service.
        service: String,
        /// Repeated endpoint name.
        endpoint: String,
    },

    /// A required field is empty.
    #[error("Service {service} has an empty {field}")]
    EmptyField {
        /// Offending service.
        service: String,
        /// Field name.
        field: &'static str,
    },

    /// An endpoint declares a "produces" value nothing is registered for.
    #[error("Endpoint {endpoint} of service {service} produces unknown type {produces}")]
    UnknownProduces {
        /// Owning service.
        service: String,
        /// Endpoint name.
        endpoint: String,
        /// The declared value.
        produces: String,
    },
}

/// # Adapter Model
///
/// Everything the adapter polls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterModel {
    /// Retention strategy of endpoint topics.
    #[serde(default)]
    pub topic_retention: TopicRetention,
    /// The services to poll.
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
}

impl AdapterModel {
    /// Parses a model from JSON5 text without validating it.
    pub fn from_json5(text: &str) -> Result<Self, ConfigError> {
        json5::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks names, required service and endpoint fields, and "produces"
    /// values.
    pub fn validate(&self, resolver: &EndpointTypeResolver) -> Result<(), ConfigError> {
        let mut service_names = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(ConfigError::EmptyField {
                    service: service.name.clone(),
                    field: "name",
                });
            }
            if !service_names.insert(service.name.as_str()) {
                return Err(ConfigError::DuplicateService(service.name.clone()));
            }
            for (field, value) in [("host", &service.host), ("topicPathRoot", &service.topic_path_root)] {
                if value.trim().is_empty() {
                    return Err(ConfigError::EmptyField {
                        service: service.name.clone(),
                        field,
                    });
                }
            }

            let mut endpoint_names = HashSet::new();
            for endpoint in &service.endpoints {
                // A topic path of only slashes would publish at the service root.
                let topic_path = endpoint.topic_path.trim().trim_matches('/');
                for (field, value) in [
                    ("endpoint name", endpoint.name.trim()),
                    ("endpoint url", endpoint.url.trim()),
                    ("endpoint topicPath", topic_path),
                ] {
                    if value.is_empty() {
                        return Err(ConfigError::EmptyField {
                            service: service.name.clone(),
                            field,
                        });
                    }
                }
                if !endpoint_names.insert(endpoint.name.as_str()) {
                    return Err(ConfigError::DuplicateEndpoint {
                        service: service.name.clone(),
                        endpoint: endpoint.name.clone(),
                    });
                }
                if resolver.produces(&endpoint.produces).is_err() {
                    return Err(ConfigError::UnknownProduces {
                        service: service.name.clone(),
                        endpoint: endpoint.name.clone(),
                        produces: endpoint.produces.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Reads, parses and validates the model file at `path`.
pub fn load_model(path: &Path, resolver: &EndpointTypeResolver) -> Result<AdapterModel, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let model = AdapterModel::from_json5(&text)?;
    model.validate(resolver)?;
    log::debug!("Loaded {} service(s) from {}", model.services.len(), path.display());
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EndpointDescriptor;
    use std::io::Write;
    use std::time::Duration;

    const MODEL: &str = r#"
    // Two services, one with credentials.
    {
      topicRetention: "pinnedToSession",
      services: [
        {
          name: "weather",
          host: "api.example.com",
          topicPathRoot: "rest/weather",
          pollPeriodMs: 30000,
          endpoints: [
            { name: "now", url: "/v1/now", topicPath: "now", produces: "json" },
            { name: "icon", url: "/v1/icon", topicPath: "icon", produces: "image/png", },
          ],
        },
        {
          name: "clock",
          host: "localhost",
          port: 8080,
          secure: false,
          topicPathRoot: "rest/clock",
          credentials: { username: "u", password: "p" },
          endpoints: [{ name: "ts", url: "/ts", topicPath: "ts", pollPeriodMs: 1000 }],
        },
      ],
    }
    "#;

    fn resolver() -> EndpointTypeResolver {
        EndpointTypeResolver::new().unwrap()
    }

    #[test]
    fn parses_json5_with_defaults() {
        let model = AdapterModel::from_json5(MODEL).unwrap();

        assert_eq!(model.topic_retention, TopicRetention::PinnedToSession);
        assert_eq!(model.services.len(), 2);
        let weather = &model.services[0];
        assert_eq!(weather.port, 443);
        assert!(weather.secure);
        assert_eq!(weather.poll_period(), Duration::from_secs(30));
        let clock = &model.services[1];
        assert_eq!(clock.origin(), "http://localhost:8080");
        assert!(clock.endpoints[0].is_auto());
        assert_eq!(clock.effective_period(&clock.endpoints[0]), Duration::from_secs(1));
    }

    #[test]
    fn rejects_unknown_produces_values() {
        let model = AdapterModel::from_json5(MODEL).unwrap();
        let err = model.validate(&resolver()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownProduces { ref endpoint, .. } if endpoint == "icon"
        ));
    }

    #[test]
    fn rejects_duplicate_names_and_empty_fields() {
        let service = ServiceDescriptor::new("a", "h", "root");
        let mut model = AdapterModel {
            services: vec![service.clone(), service.clone()],
            ..AdapterModel::default()
        };
        assert!(matches!(model.validate(&resolver()), Err(ConfigError::DuplicateService(_))));

        model.services = vec![ServiceDescriptor::new("a", "h", " ")];
        assert!(matches!(
            model.validate(&resolver()),
            Err(ConfigError::EmptyField { field: "topicPathRoot", .. })
        ));

        let endpoint = EndpointDescriptor::new("e", "/e", "e", "auto");
        model.services = vec![service.with_endpoint(endpoint.clone()).with_endpoint(endpoint)];
        assert!(matches!(
            model.validate(&resolver()),
            Err(ConfigError::DuplicateEndpoint { .. })
        ));
    }

    #[test]
    fn rejects_endpoints_without_a_url_or_topic_path() {
        let service = ServiceDescriptor::new("a", "h", "root");
        let mut model = AdapterModel::default();
        for (endpoint, field) in [
            (EndpointDescriptor::new("e", "", "e", "auto"), "endpoint url"),
            (EndpointDescriptor::new("e", "/e", "", "auto"), "endpoint topicPath"),
            (EndpointDescriptor::new("e", "/e", " / ", "auto"), "endpoint topicPath"),
            (EndpointDescriptor::new(" ", "/e", "e", "auto"), "endpoint name"),
        ] {
            model.services = vec![service.clone().with_endpoint(endpoint)];
            match model.validate(&resolver()) {
                Err(ConfigError::EmptyField { service: owner, field: found }) => {
                    assert_eq!(owner, "a");
                    assert_eq!(found, field);
                }
                other => panic!("expected an empty {} error, got {:?}", field, other),
            }
        }

        let err = AdapterModel::from_json5(
            r#"{ services: [{ name: "s", host: "h", topicPathRoot: "r", endpoints: [{ name: "e", url: "/e", topicPath: "" }] }] }"#,
        )
        .and_then(|model| model.validate(&resolver()));
        assert_eq!(err.unwrap_err().to_string(), "Service s has an empty endpoint topicPath");
    }

    #[test]
    fn loads_and_validates_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ services: [{{ name: "s", host: "h", topicPathRoot: "r", endpoints: [{{ name: "e", url: "/e", topicPath: "e" }}] }}] }}"#
        )
        .unwrap();

        let model = load_model(file.path(), &resolver()).unwrap();
        assert_eq!(model.topic_retention, TopicRetention::RemoveWhenUnused);
        assert_eq!(model.services[0].endpoints[0].name, "e");

        let missing = load_model(Path::new("/definitely/not/here.json5"), &resolver());
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
        assert!(matches!(AdapterModel::from_json5("{ services: ["), Err(ConfigError::Parse(_))));
    }
}
