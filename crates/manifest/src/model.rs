use serde::{Deserialize, Serialize};

const DOCUMENT_MIME_TYPE: &str = "text/html";

/// When a paywall should be served from its archive.
///
/// Carried through downloads untouched; deciding what to do with it is the
/// caller's business.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Usage {
    #[default]
    #[serde(alias = "always")]
    Always,
    #[serde(alias = "never")]
    Never,
    #[serde(alias = "ifAvailable", alias = "if_available")]
    IfAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSpec {
    pub url: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    pub url: String,
    pub mime_type: String,
}

impl ResourceSpec {
    pub fn new(url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Declarative description of what to download for one archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebArchiveManifest {
    #[serde(alias = "use", default)]
    pub usage: Usage,
    pub document: DocumentSpec,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
}

impl WebArchiveManifest {
    /// A manifest naming only an HTML document; everything else is discovered.
    pub fn single_document(url: impl Into<String>) -> Self {
        Self {
            usage: Usage::Always,
            document: DocumentSpec {
                url: url.into(),
                mime_type: DOCUMENT_MIME_TYPE.to_string(),
            },
            resources: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialise_camel_case_with_use_alias() {
        let manifest: WebArchiveManifest = serde_json::from_str(
            r#"{
                "use": "IF_AVAILABLE",
                "document": {"url": "https://example.com/p", "mimeType": "text/html"},
                "resources": [{"url": "https://cdn.example.com/a.css", "mimeType": "text/css"}]
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.usage, Usage::IfAvailable);
        assert_eq!(manifest.document.url, "https://example.com/p");
        assert_eq!(manifest.resources, vec![ResourceSpec::new("https://cdn.example.com/a.css", "text/css")]);
    }

    #[test]
    fn usage_and_resources_are_optional() {
        let manifest: WebArchiveManifest =
            serde_json::from_str(r#"{"document": {"url": "https://example.com/", "mimeType": "text/html"}}"#).unwrap();
        assert_eq!(manifest.usage, Usage::Always);
        assert!(manifest.resources.is_empty());
    }

    #[test]
    fn single_document() {
        let manifest = WebArchiveManifest::single_document("https://example.com/p");
        assert_eq!(manifest.usage, Usage::Always);
        assert_eq!(manifest.document.mime_type, "text/html");
        assert!(manifest.resources.is_empty());
    }
}
