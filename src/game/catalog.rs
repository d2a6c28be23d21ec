//! Category Catalog
//!
//! The fixed set of selectable categories for a server instance.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::error::MatchError;

/// Category identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub u32);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A selectable question category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Identifier.
    pub id: CategoryId,
    /// Display name.
    pub name: String,
    /// One-line description shown on the selection screen.
    pub description: String,
    /// Icon reference (emoji or asset key).
    pub icon: String,
}

impl Category {
    /// Create a category.
    pub fn new(id: u32, name: &str, description: &str, icon: &str) -> Self {
        Self {
            id: CategoryId(id),
            name: name.to_string(),
            description: description.to_string(),
            icon: icon.to_string(),
        }
    }
}

/// Presentation metadata for well-known category names.
const KNOWN_CATEGORIES: [(&str, &str, &str); 5] = [
    ("Science", "Test your knowledge of scientific facts and discoveries", "🔬"),
    ("History", "Journey through time with historical questions", "📜"),
    ("Geography", "Explore the world with geography questions", "🌍"),
    ("Entertainment", "Test your knowledge of movies, music, and pop culture", "🎬"),
    ("Sports", "Challenge yourself with sports trivia", "⚽"),
];

/// Immutable set of categories, ordered by id.
#[derive(Clone, Debug, Default)]
pub struct CategoryCatalog {
    categories: Vec<Category>,
}

impl CategoryCatalog {
    /// Build a catalog. Duplicate ids keep the first entry.
    pub fn new(mut categories: Vec<Category>) -> Self {
        categories.sort_by_key(|c| c.id);
        categories.dedup_by_key(|c| c.id);
        Self { categories }
    }

    /// Build a catalog from bare names, assigning ids 1.. in order.
    ///
    /// Names matching a well-known category pick up its description and icon.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let categories = names.iter()
            .enumerate()
            .map(|(i, name)| {
                let name = name.as_ref();
                let (description, icon) = KNOWN_CATEGORIES.iter()
                    .find(|(known, _, _)| known.eq_ignore_ascii_case(name))
                    .map(|(_, d, i)| (*d, *i))
                    .unwrap_or(("", "❓"));
                Category::new(i as u32 + 1, name, description, icon)
            })
            .collect();
        Self::new(categories)
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Look up a category by id.
    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.categories
            .binary_search_by_key(&id, |c| c.id)
            .ok()
            .map(|idx| &self.categories[idx])
    }

    /// Look up a category by name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Iterate categories in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    /// Draw `count` distinct categories without replacement.
    pub fn sample_categories(
        &self,
        count: usize,
        rng: &mut DeterministicRng,
    ) -> Result<Vec<Category>, MatchError> {
        self.sample_categories_where(count, rng, |_| true)
    }

    /// Draw `count` distinct categories from those accepted by `eligible`.
    ///
    /// `available` in the error counts eligible categories only.
    pub fn sample_categories_where(
        &self,
        count: usize,
        rng: &mut DeterministicRng,
        eligible: impl Fn(&Category) -> bool,
    ) -> Result<Vec<Category>, MatchError> {
        let pool: Vec<&Category> = self.categories.iter().filter(|&c| eligible(c)).collect();
        let picked = rng.sample_indices(pool.len(), count)
            .ok_or(MatchError::InsufficientCategories {
                requested: count,
                available: pool.len(),
            })?;

        Ok(picked.into_iter().map(|i| pool[i].clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> CategoryCatalog {
        CategoryCatalog::from_names(&["Science", "History", "Geography", "Entertainment", "Sports"])
    }

    #[test]
    fn test_from_names_assigns_metadata() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 5);

        let science = catalog.get(CategoryId(1)).unwrap();
        assert_eq!(science.name, "Science");
        assert_eq!(science.icon, "🔬");

        let custom = CategoryCatalog::from_names(&["Mythology"]);
        assert_eq!(custom.get(CategoryId(1)).unwrap().icon, "❓");
    }

    #[test]
    fn test_sample_distinct() {
        let catalog = catalog();
        let mut rng = DeterministicRng::new(9);

        for _ in 0..100 {
            let offer = catalog.sample_categories(3, &mut rng).unwrap();
            assert_eq!(offer.len(), 3);
            assert_ne!(offer[0].id, offer[1].id);
            assert_ne!(offer[1].id, offer[2].id);
            assert_ne!(offer[0].id, offer[2].id);
        }
    }

    #[test]
    fn test_sample_insufficient() {
        let catalog = CategoryCatalog::from_names(&["Science", "History"]);
        let mut rng = DeterministicRng::new(1);

        let result = catalog.sample_categories(3, &mut rng);
        assert_eq!(
            result,
            Err(MatchError::InsufficientCategories { requested: 3, available: 2 })
        );
    }

    #[test]
    fn test_sample_where_skips_ineligible() {
        let catalog = catalog();
        let mut rng = DeterministicRng::new(4);

        for _ in 0..50 {
            let offer = catalog
                .sample_categories_where(3, &mut rng, |c| c.id != CategoryId(2) && c.id != CategoryId(4))
                .unwrap();
            let mut ids: Vec<u32> = offer.iter().map(|c| c.id.0).collect();
            ids.sort();
            assert_eq!(ids, vec![1, 3, 5]);
        }

        let result = catalog.sample_categories_where(3, &mut rng, |c| c.id.0 > 3);
        assert_eq!(
            result,
            Err(MatchError::InsufficientCategories { requested: 3, available: 2 })
        );
    }

    #[test]
    fn test_lookup() {
        let catalog = catalog();
        assert_eq!(catalog.find_by_name("sports").unwrap().id, CategoryId(5));
        assert!(catalog.get(CategoryId(42)).is_none());
    }
}
