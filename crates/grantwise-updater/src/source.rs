use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// HTML listing page scraped with CSS selectors.
    Scrape,
    /// RSS 2.0 or Atom feed.
    Rss,
    /// JSON API returning `{"results": [...]}`.
    Api,
}

/// Where opportunities are collected from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    /// CSS selectors keyed by field: `listing`, `name`, `location`,
    /// `description`, `deadline`, `amount`, `disciplines`, `link`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

impl DataSource {
    pub fn selector(&self, field: &str) -> Option<&str> {
        self.selectors
            .as_ref()
            .and_then(|s| s.get(field))
            .map(String::as_str)
    }
}

fn scrape(name: &str, url: &str, selectors: &[(&str, &str)]) -> DataSource {
    DataSource {
        name: name.to_string(),
        url: url.to_string(),
        kind: SourceKind::Scrape,
        selectors: Some(
            selectors
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        api_key: None,
        enabled: true,
    }
}

/// Residency aggregators and grant listings checked on every update.
pub fn builtin_sources() -> Vec<DataSource> {
    vec![
        scrape(
            "TransArtists",
            "https://www.transartists.org/air",
            &[
                ("listing", ".air-listing"),
                ("name", ".air-title"),
                ("location", ".air-location"),
                ("deadline", ".air-deadline"),
                ("description", ".air-description"),
            ],
        ),
        DataSource {
            name: "ResArtis RSS".to_string(),
            url: "https://resartis.org/feed/".to_string(),
            kind: SourceKind::Rss,
            selectors: None,
            api_key: None,
            enabled: true,
        },
        scrape(
            "Alliance of Artists Communities",
            "https://www.artistcommunities.org/residencies",
            &[
                ("listing", ".residency-item"),
                ("name", ".residency-name"),
                ("location", ".residency-location"),
                ("disciplines", ".residency-disciplines"),
            ],
        ),
        scrape(
            "Res Artist",
            "https://resartist.com/en/residencies/",
            &[
                ("listing", ".residency-card"),
                ("name", ".card-title"),
                ("location", ".card-location"),
                ("deadline", ".card-deadline"),
            ],
        ),
        scrape(
            "Creative Capital",
            "https://creative-capital.org/grants/",
            &[
                ("listing", ".grant-item"),
                ("name", ".grant-title"),
                ("amount", ".grant-amount"),
                ("deadline", ".grant-deadline"),
            ],
        ),
    ]
}

/// Built-in sources followed by any custom sources in `custom_json`, a
/// JSON array of source objects. Unparseable input is logged and skipped.
pub fn load_sources(custom_json: Option<&str>) -> Vec<DataSource> {
    let mut sources = builtin_sources();
    let Some(raw) = custom_json.map(str::trim).filter(|s| !s.is_empty()) else {
        return sources;
    };

    let items = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            tracing::error!("custom data sources must be a JSON array");
            return sources;
        }
        Err(e) => {
            tracing::error!(error = %e, "error loading custom data sources");
            return sources;
        }
    };

    for item in items {
        match serde_json::from_value::<DataSource>(item) {
            Ok(source) => {
                tracing::info!(name = %source.name, kind = ?source.kind, "loaded custom data source");
                sources.push(source);
            }
            Err(e) => tracing::error!(error = %e, "skipping invalid custom data source"),
        }
    }
    sources
}
