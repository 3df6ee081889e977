use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use minijinja::{context, AutoEscape, Environment};
use serde::Serialize;

use crate::contacts::CuratorContact;
use crate::error::{AppError, Result};

pub const OCCURRENCE_SEARCH_URL: &str = "https://www.gbif.org/occurrence/search";

/// Everything a curator is told about one dataset. Shared between every
/// curator of that dataset and never modified after it is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub key: String,
    pub title: String,
    pub citation_count: u64,
    /// `None` when the statistics page could not be read.
    pub new_records: Option<i64>,
    pub bionomia_count: Option<usize>,
    pub stats_image: Option<String>,
    pub bionomia_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Curator {
    pub email: String,
    pub name: String,
    pub datasets: Vec<Arc<DatasetSummary>>,
}

/// Dataset summaries grouped by curator email, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct CuratorInbox {
    curators: Vec<Curator>,
}

impl CuratorInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `summary` to the bucket of `contact`. The first contact seen for an
    /// address names the bucket.
    pub fn deliver(&mut self, contact: &CuratorContact, summary: Arc<DatasetSummary>) {
        match self.curators.iter_mut().find(|c| c.email == contact.email) {
            Some(curator) => {
                if !curator.datasets.iter().any(|d| d.key == summary.key) {
                    curator.datasets.push(summary);
                }
            }
            None => self.curators.push(Curator {
                email: contact.email.clone(),
                name: contact.name.clone(),
                datasets: vec![summary],
            }),
        }
    }

    pub fn curators(&self) -> &[Curator] {
        &self.curators
    }

    pub fn len(&self) -> usize {
        self.curators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curators.is_empty()
    }
}

impl IntoIterator for CuratorInbox {
    type Item = Curator;
    type IntoIter = std::vec::IntoIter<Curator>;

    fn into_iter(self) -> Self::IntoIter {
        self.curators.into_iter()
    }
}

/// Occurrence search across every dataset in the report.
pub fn all_datasets_link(datasets: &[Arc<DatasetSummary>]) -> String {
    let query = datasets
        .iter()
        .map(|d| format!("dataset_key={}", d.key))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", OCCURRENCE_SEARCH_URL, query)
}

pub fn subject_line(today: NaiveDate) -> String {
    format!("Your {} GBIF dataset status update", today.format("%b %Y"))
}

/// The HTML email body template.
#[derive(Debug, Clone)]
pub struct ReportTemplate {
    source: String,
}

impl ReportTemplate {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self { source: source.into() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            AppError::Template(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(Self::from_source(source))
    }

    pub fn render(&self, curator: &Curator, today: NaiveDate) -> Result<String> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        let template = env.template_from_str(&self.source)?;

        let datasets: Vec<&DatasetSummary> = curator.datasets.iter().map(|d| d.as_ref()).collect();
        Ok(template.render(context! {
            name => &curator.name,
            all_datasets_link => all_datasets_link(&curator.datasets),
            datasets => datasets,
            date => today.format("%B %Y").to_string(),
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(key: &str) -> Arc<DatasetSummary> {
        Arc::new(DatasetSummary {
            key: key.to_string(),
            title: format!("Dataset {}", key),
            citation_count: 3,
            new_records: Some(120),
            bionomia_count: Some(40),
            stats_image: Some(format!("https://minio.example.org/misc/static/{}/plot_2024-05.svg", key)),
            bionomia_url: format!("https://bionomia.net/dataset/{}/missing_attributions.csv.zip", key),
        })
    }

    fn contact(name: &str, email: &str) -> CuratorContact {
        CuratorContact { name: name.into(), email: email.into() }
    }

    fn may() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 14).unwrap()
    }

    #[test]
    fn groups_by_email_in_discovery_order() {
        let mut inbox = CuratorInbox::new();
        inbox.deliver(&contact("Kari", "kari@example.org"), summary("a"));
        inbox.deliver(&contact("Ola", "ola@example.org"), summary("a"));
        inbox.deliver(&contact("Kari N.", "kari@example.org"), summary("b"));

        assert_eq!(inbox.len(), 2);
        let kari = &inbox.curators()[0];
        assert_eq!(kari.name, "Kari");
        let keys: Vec<&str> = kari.datasets.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn same_dataset_twice_is_listed_once() {
        let mut inbox = CuratorInbox::new();
        let shared = summary("a");
        inbox.deliver(&contact("Kari", "kari@example.org"), shared.clone());
        inbox.deliver(&contact("Kari", "kari@example.org"), shared);
        assert_eq!(inbox.curators()[0].datasets.len(), 1);
    }

    #[test]
    fn links_every_dataset() {
        assert_eq!(
            all_datasets_link(&[summary("a"), summary("b")]),
            "https://www.gbif.org/occurrence/search?dataset_key=a&dataset_key=b"
        );
    }

    #[test]
    fn subject_uses_short_month() {
        assert_eq!(subject_line(may()), "Your May 2024 GBIF dataset status update");
    }

    #[test]
    fn renders_named_placeholders() {
        let template = ReportTemplate::from_source(
            "Hi {{ name }} ({{ date }}): {% for d in datasets %}[{{ d.title }}:{{ d.new_records }}]{% endfor %}",
        );
        let curator = Curator {
            email: "kari@example.org".into(),
            name: "Kari <Admin>".into(),
            datasets: vec![summary("a")],
        };
        let html = template.render(&curator, may()).unwrap();
        assert_eq!(
            html,
            "Hi Kari &lt;Admin&gt; (May 2024): [Dataset a:120]"
        );
    }

    #[test]
    fn bundled_template_renders() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates/report.html");
        let template = ReportTemplate::load(&path).unwrap();
        let curator = Curator {
            email: "kari@example.org".into(),
            name: "Kari".into(),
            datasets: vec![summary("a"), summary("b")],
        };
        let html = template.render(&curator, may()).unwrap();
        assert!(html.contains("Dataset a"));
        assert!(html.contains("Dataset b"));
        assert!(html.contains("May 2024"));
    }
}
