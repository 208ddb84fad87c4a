use grantwise_types::GrantEntry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An opportunity as collected from an external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdaterEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub description: String,
    #[serde(default)]
    pub disciplines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligibility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_tips: Option<String>,
    #[serde(default)]
    pub deadlines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub source_url: String,
    pub last_updated: String,
    /// Content hash used to detect changes between runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl UpdaterEntry {
    /// A bare entry with id, type and timestamp filled in.
    pub fn new(name: &str, description: String, source_name: &str, source_url: &str) -> Self {
        Self {
            id: generate_id(name, source_name),
            kind: infer_kind(name).to_string(),
            name: name.to_string(),
            organization: None,
            location: None,
            description,
            disciplines: Vec::new(),
            duration: None,
            amount: None,
            benefits: Vec::new(),
            eligibility: None,
            application_tips: None,
            deadlines: Vec::new(),
            website: None,
            source_url: source_url.to_string(),
            last_updated: chrono::Utc::now().to_rfc3339(),
            hash: None,
        }
    }

    /// Fills in `hash` from the current content.
    pub fn seal(mut self) -> Self {
        self.hash = Some(content_hash(&self));
        self
    }

    /// Maps to the ingestion model. `fallback_organization` is used when
    /// the source did not name one.
    pub fn to_grant_entry(&self, fallback_organization: &str) -> GrantEntry {
        GrantEntry {
            id: self.id.clone(),
            name: self.name.clone(),
            organization: self
                .organization
                .clone()
                .unwrap_or_else(|| fallback_organization.to_string()),
            description: self.description.clone(),
            kind: self.kind.clone(),
            disciplines: self.disciplines.clone(),
            location: self.location.clone(),
            deadline: self.deadlines.first().cloned(),
            duration: self.duration.clone(),
            funding_amount: self.amount.clone(),
            eligibility: self.eligibility.clone(),
            application_requirements: None,
            website: self.website.clone(),
            contact: None,
            benefits: (!self.benefits.is_empty()).then(|| self.benefits.clone()),
            selection_criteria: None,
            past_recipients: None,
            tips: self.application_tips.clone(),
            tags: None,
            last_updated: Some(self.last_updated.clone()),
        }
    }
}

/// First 12 hex chars of SHA-256(`"<name>_<source>"`), both lowercased.
pub fn generate_id(name: &str, source_name: &str) -> String {
    let digest = Sha256::digest(
        format!("{}_{}", name.to_lowercase(), source_name.to_lowercase()).as_bytes(),
    );
    let mut id = hex::encode(digest);
    id.truncate(12);
    id
}

/// SHA-256 over the fields whose change counts as an update.
pub fn content_hash(entry: &UpdaterEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.name.as_bytes());
    hasher.update(entry.description.as_bytes());
    hasher.update(entry.location.as_deref().unwrap_or("").as_bytes());
    for deadline in &entry.deadlines {
        hasher.update(deadline.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// `grant` when the name mentions a grant, award or fund; otherwise
/// `residency`.
pub fn infer_kind(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if ["grant", "award", "fund"].iter().any(|w| lower.contains(w)) {
        "grant"
    } else {
        "residency"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_ignore_case() {
        assert_eq!(generate_id("Saari", "ResArtis"), generate_id("SAARI", "resartis"));
        assert_eq!(generate_id("Saari", "ResArtis").len(), 12);
        assert_ne!(generate_id("Saari", "ResArtis"), generate_id("Saari", "TransArtists"));
    }

    #[test]
    fn kind_from_name() {
        assert_eq!(infer_kind("Emerging Artist Award"), "grant");
        assert_eq!(infer_kind("Project Funding Round"), "grant");
        assert_eq!(infer_kind("Saari Residence"), "residency");
    }

    #[test]
    fn hash_tracks_content_fields_only() {
        let base = UpdaterEntry::new("Saari", "Studio".into(), "Src", "http://src").seal();
        let mut touched = base.clone();
        touched.website = Some("http://elsewhere".into());
        touched.last_updated = "later".into();
        assert_eq!(content_hash(&touched), base.hash.clone().unwrap());

        touched.deadlines.push("2025-01-01".into());
        assert_ne!(content_hash(&touched), base.hash.unwrap());
    }

    #[test]
    fn grant_entry_mapping() {
        let mut entry = UpdaterEntry::new("Big Fund", "Money".into(), "Creative Capital", "http://cc");
        entry.amount = Some("$50,000".into());
        entry.deadlines = vec!["March 1".into(), "Sept 1".into()];
        entry.application_tips = Some("Apply early".into());

        let grant = entry.to_grant_entry("Creative Capital");
        assert_eq!(grant.organization, "Creative Capital");
        assert_eq!(grant.kind, "grant");
        assert_eq!(grant.funding_amount.as_deref(), Some("$50,000"));
        assert_eq!(grant.deadline.as_deref(), Some("March 1"));
        assert_eq!(grant.tips.as_deref(), Some("Apply early"));
        assert!(grant.benefits.is_none());
    }
}
