//! Organization profile and website scan data models.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Organization details collected on the setup step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationProfile {
    pub name: String,
    pub website_url: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Partial profile edit. `Some` fields overwrite, `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}

impl OrganizationProfile {
    /// Merge a partial update field by field.
    pub fn merge(&mut self, update: ProfileUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(url) = update.website_url {
            self.website_url = url;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(meta) = update.meta_description {
            self.meta_description = Some(meta);
        }
        if let Some(industry) = update.industry {
            self.industry = Some(industry);
        }
        if let Some(keywords) = update.keywords {
            self.keywords = keywords;
        }
    }
}

/// Scan status of a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Pending,
    Scraped,
    Failed,
}

impl std::fmt::Display for PageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Scraped => write!(f, "scraped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Page-level metadata captured by the crawler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    pub language: String,
    pub primary_topic: String,
}

/// What kind of business entity a chunk describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    About,
    Product,
    Service,
    Contact,
    Testimonial,
    Statistic,
    Other,
}

/// Extracted chunk body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChunkContent {
    Text { text: String },
    List { items: Vec<String> },
    Statistic { label: String, value: String },
    Testimonial { quote: String, author: String },
}

/// A discrete piece of extracted page content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChunk {
    pub id: String,
    pub content: ChunkContent,
    /// Extraction confidence in `[0, 1]`.
    pub confidence_score: f32,
    /// Where on the page the chunk came from.
    pub source_selector: String,
    pub keywords: BTreeSet<String>,
    pub entity_type: EntityType,
}

/// One page delivered by the crawler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageScanRecord {
    pub url: String,
    pub status: PageStatus,
    /// Per-page progress, 0–100.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PageMetadata>,
    #[serde(default)]
    pub content_chunks: Vec<ContentChunk>,
}

/// Running analysis shown next to the scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebsiteAnalysisSummary {
    pub total_pages: u32,
    pub scraped_pages: u32,
    pub primary_topics: Vec<String>,
    pub keyword_frequency: BTreeMap<String, u32>,
    pub training_completion_percent: u8,
}

impl WebsiteAnalysisSummary {
    /// Count one more arrived page against a batch of `batch_size`.
    pub fn record_arrival(&mut self, batch_size: usize) {
        self.scraped_pages += 1;
        self.training_completion_percent = completion_percent(self.scraped_pages, batch_size);
    }

    /// Zero the per-run counters, keeping the insight seed.
    pub fn reset_progress(&mut self) {
        self.scraped_pages = 0;
        self.training_completion_percent = 0;
    }
}

/// `floor(arrived / batch_size * 100)`, capped at 100.
pub fn completion_percent(arrived: u32, batch_size: usize) -> u8 {
    if batch_size == 0 {
        return 100;
    }
    let percent = (u64::from(arrived) * 100) / batch_size as u64;
    percent.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_only_touches_given_fields() {
        let mut profile = OrganizationProfile {
            name: "Acme".to_string(),
            description: "Widgets".to_string(),
            ..Default::default()
        };
        profile.merge(ProfileUpdate {
            website_url: Some("https://acme.test".to_string()),
            keywords: Some(vec!["widgets".to_string()]),
            ..Default::default()
        });

        assert_eq!(profile.name, "Acme");
        assert_eq!(profile.description, "Widgets");
        assert_eq!(profile.website_url, "https://acme.test");
        assert_eq!(profile.keywords, vec!["widgets"]);
        assert!(profile.meta_description.is_none());
    }

    #[test]
    fn completion_percent_floors() {
        assert_eq!(completion_percent(0, 4), 0);
        assert_eq!(completion_percent(1, 4), 25);
        assert_eq!(completion_percent(1, 3), 33);
        assert_eq!(completion_percent(2, 3), 66);
        assert_eq!(completion_percent(3, 3), 100);
        assert_eq!(completion_percent(5, 3), 100);
    }

    #[test]
    fn record_arrival_tracks_batch_not_total() {
        let mut analysis = WebsiteAnalysisSummary {
            total_pages: 15,
            ..Default::default()
        };
        analysis.record_arrival(4);
        assert_eq!(analysis.scraped_pages, 1);
        assert_eq!(analysis.training_completion_percent, 25);
        analysis.record_arrival(4);
        analysis.record_arrival(4);
        analysis.record_arrival(4);
        assert_eq!(analysis.training_completion_percent, 100);
        assert_eq!(analysis.total_pages, 15);

        analysis.reset_progress();
        assert_eq!(analysis.scraped_pages, 0);
        assert_eq!(analysis.training_completion_percent, 0);
    }

    #[test]
    fn chunk_content_is_tagged() {
        let content = ChunkContent::Statistic {
            label: "Customers".to_string(),
            value: "10k".to_string(),
        };
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["type"], "statistic");
        assert_eq!(json["label"], "Customers");
    }

    #[test]
    fn page_status_display_matches_serde() {
        for status in [PageStatus::Pending, PageStatus::Scraped, PageStatus::Failed] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(format!("\"{status}\""), json);
        }
    }
}
