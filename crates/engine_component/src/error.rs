//! Component-level error types.

/// Errors raised by a component type's capability contract.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// The payload was rejected by the type's `validate` predicate.
    #[error("invalid '{component}' component: {reason}")]
    Validation {
        /// Type name of the rejected component.
        component: String,
        /// Reason given by the validator.
        reason: String,
    },

    /// The payload could not be turned into a keyed record.
    #[error("failed to encode '{component}' component: {source}")]
    Encode {
        /// Type name of the component.
        component: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// A keyed record could not be turned back into the component type.
    #[error("failed to decode '{component}' component: {reason}")]
    Decode {
        /// Type name of the component.
        component: String,
        /// Why decoding failed.
        reason: String,
    },
}

impl ComponentError {
    /// Returns the component type name this error refers to.
    #[must_use]
    pub fn component(&self) -> &str {
        match self {
            Self::Validation { component, .. }
            | Self::Encode { component, .. }
            | Self::Decode { component, .. } => component,
        }
    }
}
