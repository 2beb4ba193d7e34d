//! Resolves applications to a category and icon. The tracking core only knows the
//! [CategoryResolver] contract; [CategoryTable] is the bundled rule-based implementation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub const OTHER_CATEGORY: &str = "other";
pub const DEFAULT_ICON: &str = "application-default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInfo {
    pub icon: Arc<str>,
    pub category: Arc<str>,
    pub is_recognized: bool,
}

impl CategoryInfo {
    pub fn unrecognized() -> Self {
        Self {
            icon: DEFAULT_ICON.into(),
            category: OTHER_CATEGORY.into(),
            is_recognized: false,
        }
    }
}

/// Maps an application to its category. Implementations never fail: anything they don't know
/// is [CategoryInfo::unrecognized].
pub trait CategoryResolver: Send + Sync {
    fn resolve(&self, bundle_id: &str, display_name: &str) -> CategoryInfo;
}

/// Single lookup rule. `pattern` is matched case-insensitively against the bundle id and then
/// the display name. A `*` matches any run of characters, otherwise the pattern matches as a
/// substring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub pattern: String,
    pub category: String,
    #[serde(default = "default_icon")]
    pub icon: String,
}

fn default_icon() -> String {
    DEFAULT_ICON.to_string()
}

impl CategoryRule {
    pub fn new(pattern: &str, category: &str, icon: &str) -> Self {
        Self {
            pattern: pattern.into(),
            category: category.into(),
            icon: icon.into(),
        }
    }

    fn matches(&self, text: &str) -> bool {
        let pattern = self.pattern.to_lowercase();
        let text = text.to_lowercase();

        if !pattern.contains('*') {
            return text.contains(&pattern);
        }

        let mut position = 0;
        for part in pattern.split('*').filter(|v| !v.is_empty()) {
            match text[position..].find(part) {
                Some(found) => position += found + part.len(),
                None => return false,
            }
        }
        true
    }
}

const BUILTIN_RULES: &[(&str, &str, &str)] = &[
    ("vscode", "development", "code"),
    ("code", "development", "code"),
    ("jetbrains", "development", "code"),
    ("xcode", "development", "code"),
    ("nvim", "development", "terminal"),
    ("vim", "development", "terminal"),
    ("emacs", "development", "code"),
    ("terminal", "development", "terminal"),
    ("iterm", "development", "terminal"),
    ("alacritty", "development", "terminal"),
    ("kitty", "development", "terminal"),
    ("wezterm", "development", "terminal"),
    ("konsole", "development", "terminal"),
    ("notion", "productivity", "notes"),
    ("obsidian", "productivity", "notes"),
    ("libreoffice", "productivity", "document"),
    ("microsoft.word", "productivity", "document"),
    ("microsoft.excel", "productivity", "spreadsheet"),
    ("figma", "design", "palette"),
    ("sketch", "design", "palette"),
    ("gimp", "design", "palette"),
    ("inkscape", "design", "palette"),
    ("blender", "design", "palette"),
    ("spotify", "media", "music"),
    ("vlc", "media", "video"),
    ("netflix", "media", "video"),
    ("steam", "media", "game"),
    ("slack", "communication", "chat"),
    ("discord", "communication", "chat"),
    ("telegram", "communication", "chat"),
    ("teams", "communication", "chat"),
    ("zoom", "communication", "video-call"),
    ("thunderbird", "communication", "mail"),
    ("mail", "communication", "mail"),
];

/// Ordered rule table. The first matching rule wins, user rules are consulted before the
/// built-in ones.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    rules: Vec<CategoryRule>,
}

impl CategoryTable {
    pub fn builtin() -> Self {
        Self::with_rules(vec![])
    }

    pub fn with_rules(user_rules: Vec<CategoryRule>) -> Self {
        let builtin = BUILTIN_RULES
            .iter()
            .map(|(pattern, category, icon)| CategoryRule::new(pattern, category, icon));
        Self {
            rules: user_rules.into_iter().chain(builtin).collect(),
        }
    }

    fn find(&self, text: &str) -> Option<&CategoryRule> {
        self.rules.iter().find(|rule| rule.matches(text))
    }
}

impl CategoryResolver for CategoryTable {
    fn resolve(&self, bundle_id: &str, display_name: &str) -> CategoryInfo {
        match self.find(bundle_id).or_else(|| self.find(display_name)) {
            Some(rule) => CategoryInfo {
                icon: rule.icon.as_str().into(),
                category: rule.category.as_str().into(),
                is_recognized: true,
            },
            None => CategoryInfo::unrecognized(),
        }
    }
}

#[cfg(test)]
mod category_tests {
    use super::{CategoryResolver, CategoryRule, CategoryTable};

    #[test]
    fn builtin_rules_recognize_common_apps() {
        let table = CategoryTable::builtin();

        let editor = table.resolve("com.microsoft.VSCode", "Code");
        assert!(editor.is_recognized);
        assert_eq!(&*editor.category, "development");

        let chat = table.resolve("/usr/bin/slack", "slack");
        assert_eq!(&*chat.category, "communication");
    }

    #[test]
    fn unknown_app_is_other_with_default_icon() {
        let info = CategoryTable::builtin().resolve("org.example.unknown", "Unknown");
        assert!(!info.is_recognized);
        assert_eq!(&*info.category, "other");
        assert_eq!(&*info.icon, "application-default");
    }

    #[test]
    fn display_name_is_used_when_bundle_id_does_not_match() {
        let info = CategoryTable::builtin().resolve("/opt/app/bin/launcher", "Figma");
        assert_eq!(&*info.category, "design");
    }

    #[test]
    fn user_rules_take_precedence() {
        let table = CategoryTable::with_rules(vec![CategoryRule::new(
            "slack",
            "productivity",
            "briefcase",
        )]);
        assert_eq!(&*table.resolve("com.tinyspeck.slackmacgap", "Slack").category, "productivity");
    }

    #[test]
    fn wildcard_patterns_match_in_order() {
        let table = CategoryTable::with_rules(vec![CategoryRule::new(
            "org.*.browser",
            "media",
            "globe",
        )]);
        assert_eq!(&*table.resolve("org.mozilla.browser", "Firefox").category, "media");
        assert!(!table.resolve("browser.org", "Browser").is_recognized);
    }
}
