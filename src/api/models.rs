use serde::Deserialize;

pub const ADMINISTRATIVE_CONTACT: &str = "ADMINISTRATIVE_POINT_OF_CONTACT";
pub const DWCA_ENDPOINT_MARKER: &str = "/archive.do?r=";

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<DatasetHit>,
}

/// A search hit; only the key is needed before fetching the full record.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetHit {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetRecord {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

impl DatasetRecord {
    /// The IPT Darwin Core Archive endpoint, if the dataset is published through one.
    pub fn dwca_endpoint(&self) -> Option<&str> {
        self.endpoints
            .iter()
            .map(|e| e.url.as_str())
            .find(|url| url.contains(DWCA_ENDPOINT_MARKER))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Vec<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl Contact {
    pub fn is_administrative(&self) -> bool {
        self.kind.as_deref() == Some(ADMINISTRATIVE_CONTACT)
    }

    pub fn primary_email(&self) -> Option<&str> {
        self.email
            .iter()
            .map(|e| e.trim())
            .find(|e| !e.is_empty())
    }

    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        )
        .trim()
        .to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiteratureSearchResponse {
    #[serde(default)]
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = r#"{
        "key": "e45c7d91-81c6-4455-86e3-2965a5739b1f",
        "title": "Vascular plant herbarium, Oslo",
        "endpoints": [
            {"key": 1, "type": "EML", "url": "https://ipt.example.org/eml.do?r=o-vascular"},
            {"key": 2, "type": "DWC_ARCHIVE", "url": "https://ipt.example.org/archive.do?r=o-vascular"}
        ],
        "contacts": [
            {"type": "ADMINISTRATIVE_POINT_OF_CONTACT", "firstName": "Kari", "lastName": "Nordmann",
             "email": ["kari@example.org", "k.nordmann@example.org"]},
            {"type": "METADATA_AUTHOR", "firstName": "Ola", "email": ["ola@example.org"]},
            {"type": "ADMINISTRATIVE_POINT_OF_CONTACT", "lastName": "Helpdesk"}
        ]
    }"#;

    #[test]
    fn decodes_dataset_detail() {
        let record: DatasetRecord = serde_json::from_str(DETAIL).unwrap();
        assert_eq!(record.title, "Vascular plant herbarium, Oslo");
        assert_eq!(record.contacts.len(), 3);
        assert_eq!(
            record.dwca_endpoint(),
            Some("https://ipt.example.org/archive.do?r=o-vascular")
        );

        let kari = &record.contacts[0];
        assert!(kari.is_administrative());
        assert_eq!(kari.primary_email(), Some("kari@example.org"));
        assert_eq!(kari.display_name(), "Kari Nordmann");

        let helpdesk = &record.contacts[2];
        assert_eq!(helpdesk.primary_email(), None);
        assert_eq!(helpdesk.display_name(), "Helpdesk");
    }

    #[test]
    fn dataset_without_ipt_endpoint() {
        let record: DatasetRecord =
            serde_json::from_str(r#"{"key": "k", "title": "t", "endpoints": [{"url": "https://x.org/data.zip"}]}"#)
                .unwrap();
        assert_eq!(record.dwca_endpoint(), None);
    }
}
