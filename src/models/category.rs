//! Legislation categories and the search form each one is reached through.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::request::RequestError;

/// Type of legal instrument to crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Kanun
    Statute,
    /// Cumhurbaşkanlığı Kararnamesi
    PresidentialDecree,
    /// Cumhurbaşkanlığı ve Bakanlar Kurulu Yönetmeliği
    PresidentialRegulation,
    /// Kanun Hükmünde Kararname
    DecreeLaw,
    /// Tüzük
    Bylaw,
    /// Kurum ve Kuruluş Yönetmeliği
    InstitutionalRegulation,
    /// Tebliğ
    Communique,
}

/// Registry listings that only publish metadata, never full text.
const METADATA_ONLY: &[&str] = &["Cumhurbaşkanı Kararları", "Cumhurbaşkanlığı Genelgeleri"];

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Statute,
        Category::PresidentialDecree,
        Category::PresidentialRegulation,
        Category::DecreeLaw,
        Category::Bylaw,
        Category::InstitutionalRegulation,
        Category::Communique,
    ];

    /// Short identifier used on the command line and in config files.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Statute => "statute",
            Self::PresidentialDecree => "presidential-decree",
            Self::PresidentialRegulation => "presidential-regulation",
            Self::DecreeLaw => "decree-law",
            Self::Bylaw => "bylaw",
            Self::InstitutionalRegulation => "institutional-regulation",
            Self::Communique => "communique",
        }
    }

    /// Name the registry uses for a single instrument of this type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Statute => "Kanun",
            Self::PresidentialDecree => "Cumhurbaşkanlığı Kararnamesi",
            Self::PresidentialRegulation => "Cumhurbaşkanlığı ve Bakanlar Kurulu Yönetmeliği",
            Self::DecreeLaw => "Kanun Hükmünde Kararname",
            Self::Bylaw => "Tüzük",
            Self::InstitutionalRegulation => "Kurum ve Kuruluş Yönetmeliği",
            Self::Communique => "Tebliğ",
        }
    }

    fn default_form(&self) -> CategoryForm {
        let (link_title, form_id) = match self {
            Self::Statute => ("Kanunlar", "kanunlar_form"),
            Self::PresidentialDecree => (
                "Cumhurbaşkanlığı Kararnameleri",
                "cumhurbaskanligiKararnameleri_form",
            ),
            Self::PresidentialRegulation => (
                "Cumhurbaşkanlığı ve Bakanlar Kurulu Yönetmelikleri",
                "cumhurbaskanligiveBakanlarKuruluYonetmelikleri_form",
            ),
            Self::DecreeLaw => (
                "Kanun Hükmünde Kararnameler",
                "kanunHukmundeKararnameler_form",
            ),
            Self::Bylaw => ("Tüzükler", "tuzukler_form"),
            Self::InstitutionalRegulation => (
                "Kurum Kuruluş ve Üniversite Yönetmelikleri",
                "kurumKurulusVeUniversiteYonetmelikleri_form",
            ),
            Self::Communique => ("Tebliğler", "tebligler_form"),
        };
        CategoryForm {
            link_title: link_title.to_string(),
            form_id: form_id.to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Category {
    type Err = RequestError;

    /// Accepts either the slug or the registry's Turkish name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(category) = Self::ALL
            .iter()
            .find(|c| c.slug().eq_ignore_ascii_case(s) || c.display_name() == s)
        {
            return Ok(*category);
        }
        if METADATA_ONLY.contains(&s) {
            return Err(RequestError::FullTextUnsupported(s.to_string()));
        }
        Err(RequestError::UnknownCategory(s.to_string()))
    }
}

/// Selectors that lead to a category's search form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryForm {
    /// `title` attribute of the navigation link that opens the form.
    pub link_title: String,
    /// DOM id of the search form.
    pub form_id: String,
}

impl CategoryForm {
    /// CSS selector for the navigation link.
    pub fn link_selector(&self) -> String {
        format!("a[title=\"{}\"]", self.link_title)
    }

    /// CSS selector for the form, or for a field nested inside it.
    pub fn scoped(&self, field_selector: &str) -> String {
        format!("#{} {}", self.form_id, field_selector)
    }
}

/// Partial override of a category's form, as written in a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFormOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
}

/// Immutable lookup from category to its form selectors.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    forms: HashMap<Category, CategoryForm>,
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CategoryTable {
    /// Table with the registry's current form identifiers.
    pub fn builtin() -> Self {
        Self {
            forms: Category::ALL
                .iter()
                .map(|c| (*c, c.default_form()))
                .collect(),
        }
    }

    /// Built-in table with config overrides applied, keyed by slug or name.
    pub fn with_overrides(
        overrides: &HashMap<String, CategoryFormOverride>,
    ) -> Result<Self, RequestError> {
        let mut table = Self::builtin();
        for (key, patch) in overrides {
            let category: Category = key.parse()?;
            let form = table
                .forms
                .entry(category)
                .or_insert_with(|| category.default_form());
            if let Some(ref link_title) = patch.link_title {
                form.link_title = link_title.clone();
            }
            if let Some(ref form_id) = patch.form_id {
                form.form_id = form_id.clone();
            }
        }
        Ok(table)
    }

    pub fn form(&self, category: Category) -> Option<&CategoryForm> {
        self.forms.get(&category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slug_and_display_name() {
        assert_eq!("statute".parse::<Category>().unwrap(), Category::Statute);
        assert_eq!("Kanun".parse::<Category>().unwrap(), Category::Statute);
        assert_eq!("Tebliğ".parse::<Category>().unwrap(), Category::Communique);
        assert_eq!(
            "DECREE-LAW".parse::<Category>().unwrap(),
            Category::DecreeLaw
        );
    }

    #[test]
    fn test_parse_rejects_metadata_only_listing() {
        let err = "Cumhurbaşkanlığı Genelgeleri".parse::<Category>().unwrap_err();
        assert!(matches!(err, RequestError::FullTextUnsupported(_)));
        let err = "treaty".parse::<Category>().unwrap_err();
        assert!(matches!(err, RequestError::UnknownCategory(_)));
    }

    #[test]
    fn test_builtin_table_covers_every_category() {
        let table = CategoryTable::builtin();
        for category in Category::ALL {
            assert!(table.form(category).is_some(), "{}", category.slug());
        }
        let statute = table.form(Category::Statute).unwrap();
        assert_eq!(statute.form_id, "kanunlar_form");
        assert_eq!(statute.link_selector(), "a[title=\"Kanunlar\"]");
        assert_eq!(statute.scoped("#btnSearch"), "#kanunlar_form #btnSearch");
    }

    #[test]
    fn test_overrides_patch_single_field() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "bylaw".to_string(),
            CategoryFormOverride {
                link_title: None,
                form_id: Some("tuzuk_form_v2".to_string()),
            },
        );
        let table = CategoryTable::with_overrides(&overrides).unwrap();
        let bylaw = table.form(Category::Bylaw).unwrap();
        assert_eq!(bylaw.form_id, "tuzuk_form_v2");
        assert_eq!(bylaw.link_title, "Tüzükler");
    }

    #[test]
    fn test_overrides_reject_unknown_key() {
        let mut overrides = HashMap::new();
        overrides.insert("nope".to_string(), CategoryFormOverride::default());
        assert!(CategoryTable::with_overrides(&overrides).is_err());
    }
}
