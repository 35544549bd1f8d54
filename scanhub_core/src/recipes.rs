//! Static descriptions of the scanner types the fleet can run: how to
//! launch one and how to find its processes. Read-only configuration.

use std::collections::BTreeMap;

/// How to launch and identify one scanner type.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub key: String,
    /// Launch target; the interpreter is chosen from its file type.
    pub target: String,
    /// Substring matched against full command lines to find running
    /// instances.
    pub process_pattern: String,
    /// Credentials reference handed to the worker.
    pub creds_file: String,
    pub extra_args: Vec<String>,
}

impl Recipe {
    /// The builtin shape: one shared worker binary, distinguished by its
    /// `--vpn-type` argument.
    fn worker(key: &str) -> Self {
        Self {
            key: key.to_string(),
            target: "scanhub_worker".to_string(),
            process_pattern: format!("scanhub_worker --vpn-type {key}"),
            creds_file: format!("creds/{key}.txt"),
            extra_args: vec!["--vpn-type".to_string(), key.to_string()],
        }
    }
}

/// The known scanner types, keyed by name. Iteration order is stable.
#[derive(Debug, Clone, Default)]
pub struct RecipeSet {
    recipes: BTreeMap<String, Recipe>,
}

impl RecipeSet {
    /// The six scanner types the fleet ships with.
    pub fn builtin() -> Self {
        Self::from_recipes(
            ["fortinet", "paloalto", "sonicwall", "cisco", "sophos", "watchguard"]
                .into_iter()
                .map(Recipe::worker),
        )
    }

    pub fn from_recipes(recipes: impl IntoIterator<Item = Recipe>) -> Self {
        Self {
            recipes: recipes
                .into_iter()
                .map(|r| (r.key.clone(), r))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Recipe> {
        self.recipes.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.values()
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}
