//! Chatbot embed snippet handed to the customer.

use serde::{Deserialize, Serialize};

/// The snippet exactly as customers have always received it.
pub const REFERENCE_SNIPPET: &str = r#"<script src="https://cdn.beyondchats.com/widget.js"></script>
<script>
  window.BeyondChats.init({
    organizationId: 'YOUR_ORG_ID',
    theme: 'light'
  });
</script>"#;

/// Widget colour scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetTheme {
    #[default]
    Light,
    Dark,
}

impl std::fmt::Display for WidgetTheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Dark => write!(f, "dark"),
        }
    }
}

impl std::str::FromStr for WidgetTheme {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(format!("unknown widget theme: {other}")),
        }
    }
}

/// Parameters of the embed snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedSnippet {
    /// Host under `cdn.` serving `widget.js`.
    pub widget_host: String,
    pub organization_id: String,
    pub theme: WidgetTheme,
}

impl Default for EmbedSnippet {
    fn default() -> Self {
        Self {
            widget_host: "beyondchats.com".to_string(),
            organization_id: "YOUR_ORG_ID".to_string(),
            theme: WidgetTheme::Light,
        }
    }
}

impl EmbedSnippet {
    /// Render the script tags. Defaults reproduce [`REFERENCE_SNIPPET`].
    pub fn render(&self) -> String {
        format!(
            "<script src=\"https://cdn.{host}/widget.js\"></script>\n\
             <script>\n  \
             window.BeyondChats.init({{\n    \
             organizationId: '{org}',\n    \
             theme: '{theme}'\n  \
             }});\n\
             </script>",
            host = self.widget_host,
            org = self.organization_id,
            theme = self.theme,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_render_is_verbatim() {
        assert_eq!(EmbedSnippet::default().render(), REFERENCE_SNIPPET);
    }

    #[test]
    fn custom_values_are_substituted() {
        let snippet = EmbedSnippet {
            widget_host: "widgets.test".to_string(),
            organization_id: "org_42".to_string(),
            theme: WidgetTheme::Dark,
        }
        .render();
        assert!(snippet.starts_with("<script src=\"https://cdn.widgets.test/widget.js\"></script>\n"));
        assert!(snippet.contains("organizationId: 'org_42',"));
        assert!(snippet.contains("theme: 'dark'"));
        assert_eq!(snippet.lines().count(), REFERENCE_SNIPPET.lines().count());
    }

    #[test]
    fn theme_parse() {
        assert_eq!("dark".parse::<WidgetTheme>().unwrap(), WidgetTheme::Dark);
        assert!("blue".parse::<WidgetTheme>().is_err());
    }
}
