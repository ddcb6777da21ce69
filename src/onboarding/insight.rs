//! Website insight lookup: the stand-in for fetching a site's metadata.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::model::{OrganizationProfile, WebsiteAnalysisSummary};
use crate::random::RandomSource;

/// Descriptive record for a website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteInsight {
    pub meta_description: String,
    pub industry: String,
    pub keywords: Vec<String>,
    pub primary_topics: Vec<String>,
}

impl WebsiteInsight {
    /// Record returned for any URL not in the table.
    pub fn fallback() -> Self {
        Self {
            meta_description: "Company description not available".to_string(),
            industry: "Unspecified".to_string(),
            keywords: Vec::new(),
            primary_topics: Vec::new(),
        }
    }

    /// Copy the derived metadata into the profile.
    pub fn apply_to(&self, profile: &mut OrganizationProfile) {
        profile.meta_description = Some(self.meta_description.clone());
        profile.industry = Some(self.industry.clone());
        profile.keywords = self.keywords.clone();
    }

    /// Initial analysis for a scan of this site.
    pub fn seed_analysis(
        &self,
        total_pages: u32,
        frequency_ceiling: u32,
        random: &dyn RandomSource,
    ) -> WebsiteAnalysisSummary {
        WebsiteAnalysisSummary {
            total_pages,
            scraped_pages: 0,
            primary_topics: self.primary_topics.clone(),
            keyword_frequency: self
                .keywords
                .iter()
                .map(|k| (k.clone(), random.below(frequency_ceiling)))
                .collect(),
            training_completion_percent: 0,
        }
    }
}

/// Lookup seam; a real metadata fetcher can replace the static table.
pub trait InsightProvider: Send + Sync {
    /// Never fails: unknown sites get a fallback record.
    fn lookup(&self, url: &str) -> WebsiteInsight;
}

/// Fixed table keyed by exact URL string.
pub struct StaticInsights {
    table: HashMap<String, WebsiteInsight>,
}

impl StaticInsights {
    pub fn new(table: HashMap<String, WebsiteInsight>) -> Self {
        Self { table }
    }
}

impl Default for StaticInsights {
    fn default() -> Self {
        let mut table = HashMap::new();
        table.insert(
            "https://example.com".to_string(),
            WebsiteInsight {
                meta_description: "Leading technology solutions for modern businesses"
                    .to_string(),
                industry: "Technology".to_string(),
                keywords: vec![
                    "innovation".to_string(),
                    "digital transformation".to_string(),
                    "software solutions".to_string(),
                ],
                primary_topics: vec![
                    "Cloud Computing".to_string(),
                    "AI".to_string(),
                    "Enterprise Solutions".to_string(),
                ],
            },
        );
        Self { table }
    }
}

impl InsightProvider for StaticInsights {
    fn lookup(&self, url: &str) -> WebsiteInsight {
        self.table
            .get(url)
            .cloned()
            .unwrap_or_else(WebsiteInsight::fallback)
    }
}
