use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of an installed plugin: the pair (`internal_name`, `version_code`).
///
/// Two loaded plugins with the same identity are the same plugin, whatever
/// their other metadata says.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginIdentity {
    pub internal_name: String,
    pub version_code: u32,
}

impl PluginIdentity {
    pub fn new(internal_name: impl Into<String>, version_code: u32) -> Self {
        Self {
            internal_name: internal_name.into(),
            version_code,
        }
    }

    /// Deterministic directory name under the installation root.
    pub fn storage_name(&self) -> String {
        format!("{}-{}", self.internal_name, self.version_code)
    }
}

impl fmt::Display for PluginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (v{})", self.internal_name, self.version_code)
    }
}

/// Immutable identity and metadata of a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    internal_name: String,
    version_code: u32,
    #[serde(rename = "version")]
    version_label: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    contacts: Vec<String>,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "configPanel")]
    has_configuration_panel: bool,
}

impl PluginDescriptor {
    pub fn new(
        internal_name: impl Into<String>,
        version_code: u32,
        version_label: impl Into<String>,
    ) -> Self {
        Self {
            internal_name: internal_name.into(),
            version_code,
            version_label: version_label.into(),
            authors: Vec::new(),
            contacts: Vec::new(),
            description: String::new(),
            has_configuration_panel: false,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contacts.push(contact.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_configuration_panel(mut self) -> Self {
        self.has_configuration_panel = true;
        self
    }

    pub fn internal_name(&self) -> &str {
        &self.internal_name
    }

    pub fn version_code(&self) -> u32 {
        self.version_code
    }

    pub fn version_label(&self) -> &str {
        &self.version_label
    }

    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    pub fn contacts(&self) -> &[String] {
        &self.contacts
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn has_configuration_panel(&self) -> bool {
        self.has_configuration_panel
    }

    pub fn identity(&self) -> PluginIdentity {
        PluginIdentity::new(self.internal_name.clone(), self.version_code)
    }

    /// Checks that the internal name can name an installation directory.
    pub fn validate_name(&self) -> Result<(), String> {
        let name = self.internal_name.as_str();
        if name.trim().is_empty() {
            return Err("must not be empty".into());
        }
        if name.starts_with('.') {
            return Err("must not start with '.'".into());
        }
        if name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err("must not contain path separators or control characters".into());
        }
        Ok(())
    }

    /// Sections shown next to the plugin list, in display order. Author and
    /// contact sections are omitted when empty.
    pub fn details(&self) -> Vec<DetailSection> {
        let mut sections = vec![DetailSection::new(
            DetailKind::Version,
            vec![self.version_label.clone()],
        )];
        if !self.authors.is_empty() {
            sections.push(DetailSection::new(
                DetailKind::Authors,
                self.authors.clone(),
            ));
        }
        if !self.contacts.is_empty() {
            sections.push(DetailSection::new(
                DetailKind::Contacts,
                self.contacts.clone(),
            ));
        }
        sections.push(DetailSection::new(
            DetailKind::Description,
            vec![self.description.clone()],
        ));
        sections
    }
}

impl fmt::Display for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.internal_name, self.version_label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailKind {
    Version,
    Authors,
    Contacts,
    Description,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailSection {
    pub kind: DetailKind,
    pub lines: Vec<String>,
}

impl DetailSection {
    fn new(kind: DetailKind, lines: Vec<String>) -> Self {
        Self { kind, lines }
    }
}
