use crate::api::models::DatasetRecord;

/// An administrative contact that can actually be mailed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuratorContact {
    pub name: String,
    pub email: String,
}

/// Administrative points of contact carrying an email address, in record order.
/// An empty result means the dataset has nobody to report to.
pub fn resolve_curators(record: &DatasetRecord) -> Vec<CuratorContact> {
    record
        .contacts
        .iter()
        .filter(|c| c.is_administrative())
        .filter_map(|c| {
            c.primary_email().map(|email| CuratorContact {
                name: c.display_name(),
                email: email.to_string(),
            })
        })
        .collect()
}
