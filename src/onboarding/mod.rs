//! Onboarding system: sign-up through chatbot integration.
//!
//! A new customer registers, verifies their email, describes their
//! organization while the website is scanned for training data, installs the
//! chat widget and waits for it to be detected. Each customer gets an
//! [`OnboardingSession`]; the scan and the detection run as simulated,
//! timer-driven engines inside it.

pub mod detection;
pub mod embed;
pub mod events;
pub mod insight;
pub mod model;
pub mod registry;
pub mod routes;
pub mod session;
pub mod state;
pub mod training;

pub use detection::{DetectionEngine, IntegrationState};
pub use embed::{EmbedSnippet, WidgetTheme};
pub use events::SessionEvent;
pub use insight::{InsightProvider, StaticInsights, WebsiteInsight};
pub use model::{OrganizationProfile, PageScanRecord, ProfileUpdate, WebsiteAnalysisSummary};
pub use registry::SessionRegistry;
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use session::{OnboardingSession, OrganizationSubmission, SessionDeps, SessionSnapshot};
pub use state::OnboardingStep;
pub use training::{AggregationMode, TrainingEngine, TrainingStatus};
