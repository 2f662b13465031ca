use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// The identity record produced by a successful authentication callback.
/// Inserted into the request's extensions for the wrapped application;
/// nothing but the principal id outlives the request.
#[derive(Debug, Clone, Serialize)]
pub struct SamlIdentity {
    /// Validated Subject identifier. Never empty.
    pub principal_id: String,
    /// Normalized identity fields resolved via the configured candidate
    /// lists. Unmatched fields are present with a `None` value.
    pub attributes: HashMap<String, Option<String>>,
    /// The unmodified assertion attribute set.
    pub raw_attributes: HashMap<String, String>,
    /// The validated response document, retained for extension use.
    #[serde(skip)]
    pub raw_response: Arc<str>,
}

impl SamlIdentity {
    pub fn attribute(&self, field: &str) -> Option<&str> {
        self.attributes.get(field)?.as_deref()
    }
}
