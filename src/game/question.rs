//! Question Bank
//!
//! Immutable trivia content shared by every match on the server, plus the
//! per-match [`QuestionDeck`] that guarantees a question is issued at most
//! once within one match.
//!
//! Content is loaded from the Open Trivia DB JSON layout:
//!
//! ```json
//! {"results": [{"category": "Science", "question": "...", "difficulty": "easy",
//!               "correct_answer": "...", "incorrect_answers": ["...", "..."]}]}
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::catalog::{CategoryCatalog, CategoryId};
use crate::game::error::{ContentError, MatchError};

/// Content bundled with the server binary.
const BUNDLED_QUESTIONS: &str = include_str!("../../data/questions.json");

/// Question identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub u32);

/// Question difficulty as tagged by the content source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Easy.
    Easy,
    /// Medium.
    #[default]
    Medium,
    /// Hard.
    Hard,
}

/// A multiple-choice question with exactly one correct choice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Identifier, unique within the bank.
    pub id: QuestionId,
    /// Prompt text.
    pub prompt: String,
    /// Choices in presentation order.
    pub choices: Vec<String>,
    /// Index of the correct choice.
    pub correct_index: u8,
    /// Owning category.
    pub category: CategoryId,
    /// Difficulty.
    pub difficulty: Difficulty,
}

impl Question {
    /// Create a validated question.
    pub fn new(
        id: u32,
        prompt: impl Into<String>,
        choices: Vec<String>,
        correct_index: u8,
        category: CategoryId,
        difficulty: Difficulty,
    ) -> Result<Self, ContentError> {
        if choices.len() < 2 {
            return Err(ContentError::InvalidQuestion {
                id,
                reason: format!("needs at least 2 choices, has {}", choices.len()),
            });
        }
        if choices.len() > u8::MAX as usize {
            return Err(ContentError::InvalidQuestion {
                id,
                reason: "too many choices".to_string(),
            });
        }
        if correct_index as usize >= choices.len() {
            return Err(ContentError::InvalidQuestion {
                id,
                reason: format!("correct index {} out of range", correct_index),
            });
        }

        Ok(Self {
            id: QuestionId(id),
            prompt: prompt.into(),
            choices,
            correct_index,
            category,
            difficulty,
        })
    }

    /// Number of choices.
    pub fn choice_count(&self) -> usize {
        self.choices.len()
    }

    /// Participant-facing view (no answer key).
    pub fn view(&self) -> QuestionView {
        QuestionView {
            id: self.id,
            prompt: self.prompt.clone(),
            choices: self.choices.clone(),
            category: self.category,
        }
    }
}

/// What a participant is allowed to see of a pending question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    /// Identifier.
    pub id: QuestionId,
    /// Prompt text.
    pub prompt: String,
    /// Choices in presentation order.
    pub choices: Vec<String>,
    /// Owning category.
    pub category: CategoryId,
}

/// All questions on the server, grouped by category.
#[derive(Clone, Debug, Default)]
pub struct QuestionBank {
    by_category: BTreeMap<CategoryId, Vec<Arc<Question>>>,
    total: usize,
}

impl QuestionBank {
    /// Build a bank, checking every question against the catalog.
    pub fn new(questions: Vec<Question>, catalog: &CategoryCatalog) -> Result<Self, ContentError> {
        let mut by_category: BTreeMap<CategoryId, Vec<Arc<Question>>> = BTreeMap::new();
        let total = questions.len();

        for question in questions {
            if catalog.get(question.category).is_none() {
                return Err(ContentError::UnknownCategory(question.category));
            }
            by_category.entry(question.category)
                .or_default()
                .push(Arc::new(question));
        }

        Ok(Self { by_category, total })
    }

    /// Total number of questions.
    pub fn len(&self) -> usize {
        self.total
    }

    /// Whether the bank holds no questions.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// All questions in a category, in load order.
    pub fn questions_in(&self, category: CategoryId) -> &[Arc<Question>] {
        self.by_category.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Per-match view of the bank that never issues the same question twice.
#[derive(Clone, Debug)]
pub struct QuestionDeck {
    bank: Arc<QuestionBank>,
    issued: BTreeSet<QuestionId>,
}

impl QuestionDeck {
    /// Fresh deck over a shared bank.
    pub fn new(bank: Arc<QuestionBank>) -> Self {
        Self {
            bank,
            issued: BTreeSet::new(),
        }
    }

    /// Questions still available in a category for this match.
    pub fn remaining_in(&self, category: CategoryId) -> usize {
        self.bank.questions_in(category)
            .iter()
            .filter(|q| !self.issued.contains(&q.id))
            .count()
    }

    /// Issue `count` unissued questions from `category`.
    ///
    /// Nothing is marked as issued when the request fails.
    pub fn issue_questions(
        &mut self,
        category: CategoryId,
        count: usize,
        rng: &mut DeterministicRng,
    ) -> Result<Vec<Arc<Question>>, MatchError> {
        let available: Vec<&Arc<Question>> = self.bank.questions_in(category)
            .iter()
            .filter(|q| !self.issued.contains(&q.id))
            .collect();

        let picked = rng.sample_indices(available.len(), count)
            .ok_or(MatchError::InsufficientQuestions {
                category,
                requested: count,
                available: available.len(),
            })?;

        let questions: Vec<Arc<Question>> = picked.into_iter()
            .map(|i| Arc::clone(available[i]))
            .collect();

        for question in &questions {
            self.issued.insert(question.id);
        }

        Ok(questions)
    }
}

// =============================================================================
// CONTENT LOADING
// =============================================================================

#[derive(Deserialize)]
struct OpenTriviaFile {
    results: Vec<OpenTriviaItem>,
}

#[derive(Deserialize)]
struct OpenTriviaItem {
    category: String,
    question: String,
    #[serde(default)]
    difficulty: Difficulty,
    correct_answer: String,
    incorrect_answers: Vec<String>,
}

/// A catalog and the bank built against it.
#[derive(Clone, Debug)]
pub struct TriviaContent {
    /// Categories found in the content.
    pub catalog: CategoryCatalog,
    /// Questions found in the content.
    pub bank: QuestionBank,
}

impl TriviaContent {
    /// Build content from one or more Open Trivia DB documents.
    ///
    /// Categories get ids in order of first appearance. The correct answer
    /// is shuffled among the incorrect ones with a seeded RNG, so the same
    /// files and seed always produce the same bank.
    pub fn from_open_trivia_json<S: AsRef<str>>(documents: &[S], seed: u64) -> Result<Self, ContentError> {
        let mut items = Vec::new();
        for doc in documents {
            let file: OpenTriviaFile = serde_json::from_str(doc.as_ref())?;
            items.extend(file.results);
        }

        let mut names: Vec<String> = Vec::new();
        for item in &items {
            let name = decode_entities(&item.category);
            if !names.contains(&name) {
                names.push(name);
            }
        }
        let catalog = CategoryCatalog::from_names(&names);

        let mut rng = DeterministicRng::new(seed);
        let mut questions = Vec::with_capacity(items.len());

        for (idx, item) in items.into_iter().enumerate() {
            let id = idx as u32 + 1;
            let category = catalog.find_by_name(&decode_entities(&item.category))
                .map(|c| c.id)
                .ok_or_else(|| ContentError::InvalidQuestion {
                    id,
                    reason: format!("category {:?} missing from catalog", item.category),
                })?;

            let mut choices: Vec<(String, bool)> = item.incorrect_answers.iter()
                .map(|a| (decode_entities(a), false))
                .collect();
            choices.push((decode_entities(&item.correct_answer), true));
            rng.shuffle(&mut choices);

            let correct_index = choices.iter()
                .position(|(_, correct)| *correct)
                .unwrap_or(0) as u8;

            questions.push(Question::new(
                id,
                decode_entities(&item.question),
                choices.into_iter().map(|(text, _)| text).collect(),
                correct_index,
                category,
                item.difficulty,
            )?);
        }

        let bank = QuestionBank::new(questions, &catalog)?;
        Ok(Self { catalog, bank })
    }

    /// Load content from a JSON file, or from every `*.json` file in a
    /// directory (sorted by file name).
    pub fn load_path(path: &Path, seed: u64) -> Result<Self, ContentError> {
        let documents = if path.is_dir() {
            let mut files: Vec<_> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
                .collect();
            files.sort();
            files.iter()
                .map(std::fs::read_to_string)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            vec![std::fs::read_to_string(path)?]
        };

        Self::from_open_trivia_json(&documents, seed)
    }

    /// Content shipped with the binary.
    pub fn bundled(seed: u64) -> Result<Self, ContentError> {
        Self::from_open_trivia_json(&[BUNDLED_QUESTIONS], seed)
    }
}

/// Decode the HTML entities Open Trivia DB embeds in its text fields.
fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&eacute;", "é")
        .replace("&aacute;", "á")
        .replace("&amp;", "&")
}
