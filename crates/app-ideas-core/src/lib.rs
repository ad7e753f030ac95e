use std::cmp::Reverse;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;

mod icon;
mod launch;

pub use icon::{suggest_icon, FALLBACK_ICON};
pub use launch::{quick_launch_link, quick_launch_links, LlmProvider, QuickLaunchLink};

/// Icon assigned to ideas created without an explicit one.
pub const DEFAULT_ICON: &str = "💻";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl Display for CategoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct AppIdeaId(pub i64);

impl Display for AppIdeaId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct Category {
    pub id: CategoryId,
    pub title: String,
}

/// A persisted idea as read back from the store.
///
/// Values of this type are disconnected snapshots: editing one changes nothing
/// until it is submitted back through an update.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct AppIdea {
    pub id: AppIdeaId,
    pub title: String,
    pub icon: String,
    pub short_description: String,
    pub detail: String,
    pub is_favorite: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub category_id: Option<CategoryId>,
}

impl AppIdea {
    /// Copy the caller-editable fields out of this snapshot.
    #[must_use]
    pub fn fields(&self) -> IdeaFields {
        IdeaFields {
            title: self.title.clone(),
            icon: self.icon.clone(),
            short_description: self.short_description.clone(),
            detail: self.detail.clone(),
            is_favorite: self.is_favorite,
            category_id: self.category_id,
        }
    }

    #[must_use]
    pub fn to_draft(&self) -> IdeaDraft {
        IdeaDraft::Existing(self.id, self.fields())
    }
}

/// Caller-editable idea columns. The store stamps `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(default)]
pub struct IdeaFields {
    pub title: String,
    pub icon: String,
    pub short_description: String,
    pub detail: String,
    pub is_favorite: bool,
    pub category_id: Option<CategoryId>,
}

impl Default for IdeaFields {
    fn default() -> Self {
        Self {
            title: String::new(),
            icon: DEFAULT_ICON.to_string(),
            short_description: String::new(),
            detail: String::new(),
            is_favorite: false,
            category_id: None,
        }
    }
}

impl IdeaFields {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_short_description(mut self, short_description: impl Into<String>) -> Self {
        self.short_description = short_description.into();
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    #[must_use]
    pub fn with_category(mut self, category_id: Option<CategoryId>) -> Self {
        self.category_id = category_id;
        self
    }

    #[must_use]
    pub fn with_favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }
}

/// An idea either not yet persisted or bound to an existing row.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", content = "draft", rename_all = "snake_case")]
pub enum IdeaDraft {
    New(IdeaFields),
    Existing(AppIdeaId, IdeaFields),
}

impl IdeaDraft {
    #[must_use]
    pub fn id(&self) -> Option<AppIdeaId> {
        match self {
            Self::New(_) => None,
            Self::Existing(id, _) => Some(*id),
        }
    }

    #[must_use]
    pub fn fields(&self) -> &IdeaFields {
        match self {
            Self::New(fields) | Self::Existing(_, fields) => fields,
        }
    }

    pub fn fields_mut(&mut self) -> &mut IdeaFields {
        match self {
            Self::New(fields) | Self::Existing(_, fields) => fields,
        }
    }
}

impl Default for IdeaDraft {
    fn default() -> Self {
        Self::New(IdeaFields::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CategoryDraft {
    New { title: String },
    Existing(Category),
}

impl CategoryDraft {
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::New { title } => title,
            Self::Existing(category) => &category.title,
        }
    }
}

/// Reject blank category titles.
///
/// # Errors
/// Returns [`CoreError::Validation`] when the title is empty or whitespace.
pub fn validate_category_title(title: &str) -> Result<(), CoreError> {
    if title.trim().is_empty() {
        return Err(CoreError::Validation(
            "category title must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOption {
    /// Store iteration order (ascending primary key).
    #[default]
    Default,
    /// Most recently touched first.
    UpdatedAt,
    Title,
    CharacterLengthAsc,
    CharacterLengthDesc,
}

impl SortOption {
    pub const ALL: [Self; 5] = [
        Self::Default,
        Self::UpdatedAt,
        Self::Title,
        Self::CharacterLengthAsc,
        Self::CharacterLengthDesc,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::UpdatedAt => "updated_at",
            Self::Title => "title",
            Self::CharacterLengthAsc => "character_length_asc",
            Self::CharacterLengthDesc => "character_length_desc",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "default" => Some(Self::Default),
            "updated_at" => Some(Self::UpdatedAt),
            "title" => Some(Self::Title),
            "character_length_asc" => Some(Self::CharacterLengthAsc),
            "character_length_desc" => Some(Self::CharacterLengthDesc),
            _ => None,
        }
    }

    /// Human-readable menu label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::UpdatedAt => "Updated Date",
            Self::Title => "Title",
            Self::CharacterLengthAsc => "Character Length ↑",
            Self::CharacterLengthDesc => "Character Length ↓",
        }
    }
}

/// Display-side view parameters for an idea list.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(default)]
pub struct IdeaQuery {
    pub category: Option<CategoryId>,
    pub search: String,
    pub sort: SortOption,
}

impl IdeaQuery {
    #[must_use]
    pub fn apply(&self, ideas: &[AppIdea]) -> Vec<AppIdea> {
        apply(ideas, self.category, &self.search, self.sort)
    }
}

/// Filter by category, then search, then sort.
///
/// The stage order is fixed. Every sort is stable, so ties keep their
/// incoming relative order.
#[must_use]
pub fn apply(
    ideas: &[AppIdea],
    category_filter: Option<CategoryId>,
    search_text: &str,
    sort: SortOption,
) -> Vec<AppIdea> {
    let mut selected = ideas
        .iter()
        .filter(|idea| category_filter.is_none() || idea.category_id == category_filter)
        .filter(|idea| matches_search(idea, search_text))
        .cloned()
        .collect::<Vec<_>>();

    sort_ideas(&mut selected, sort);
    selected
}

/// Case-insensitive substring match over title, short description and detail.
/// An empty query matches everything.
#[must_use]
pub fn matches_search(idea: &AppIdea, search_text: &str) -> bool {
    if search_text.is_empty() {
        return true;
    }

    let needle = search_text.to_lowercase();
    [&idea.title, &idea.short_description, &idea.detail]
        .into_iter()
        .any(|field| field.to_lowercase().contains(&needle))
}

pub fn sort_ideas(ideas: &mut [AppIdea], sort: SortOption) {
    match sort {
        SortOption::Default => {}
        SortOption::UpdatedAt => ideas.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
        SortOption::Title => ideas.sort_by_cached_key(|idea| idea.title.to_lowercase()),
        SortOption::CharacterLengthAsc => {
            ideas.sort_by_cached_key(|idea| character_length(&idea.detail));
        }
        SortOption::CharacterLengthDesc => {
            ideas.sort_by_cached_key(|idea| Reverse(character_length(&idea.detail)));
        }
    }
}

/// Length as a reader counts it: extended grapheme clusters, so "e\u{301}"
/// and a ZWJ emoji sequence are one character each.
#[must_use]
pub fn character_length(text: &str) -> usize {
    text.graphemes(true).count()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use time::Duration;

    use super::*;

    fn fixture_time() -> OffsetDateTime {
        time::macros::datetime!(2026-01-01 00:00:00 UTC)
    }

    fn mk_idea(id: i64, title: &str, category: Option<i64>) -> AppIdea {
        AppIdea {
            id: AppIdeaId(id),
            title: title.to_string(),
            icon: DEFAULT_ICON.to_string(),
            short_description: String::new(),
            detail: String::new(),
            is_favorite: false,
            updated_at: fixture_time(),
            category_id: category.map(CategoryId),
        }
    }

    fn ids(ideas: &[AppIdea]) -> Vec<i64> {
        ideas.iter().map(|idea| idea.id.0).collect()
    }

    #[test]
    fn category_filter_keeps_matching_ideas_in_order() {
        let ideas = vec![
            mk_idea(1, "Calculator App", Some(1)),
            mk_idea(2, "Chat App", Some(3)),
            mk_idea(3, "Notes App", Some(1)),
            mk_idea(4, "Loose Idea", None),
        ];

        let beginner = apply(&ideas, Some(CategoryId(1)), "", SortOption::Default);
        assert_eq!(ids(&beginner), vec![1, 3]);

        let everything = apply(&ideas, None, "", SortOption::Default);
        assert_eq!(ids(&everything), vec![1, 2, 3, 4]);
        assert!(apply(&ideas, Some(CategoryId(9)), "", SortOption::Default).is_empty());
    }

    #[test]
    fn search_matches_any_text_field_case_insensitively() {
        let mut weather = mk_idea(1, "Weather App", Some(1));
        weather.short_description = "Get the temperature of a city".to_string();
        let mut forecast = mk_idea(2, "Forecast", Some(1));
        forecast.detail = "Shows tomorrow's WEATHER conditions".to_string();
        let mut clock = mk_idea(3, "Clock", Some(1));
        clock.short_description = "Track the weather? no, time".to_string();
        let unrelated = mk_idea(4, "Chat App", Some(1));
        let ideas = vec![weather, forecast, clock, unrelated];

        let upper = apply(&ideas, None, "WEATHER", SortOption::Default);
        let lower = apply(&ideas, None, "weather", SortOption::Default);

        assert_eq!(ids(&upper), vec![1, 2, 3]);
        assert_eq!(upper, lower);
    }

    #[test]
    fn search_is_applied_after_the_category_filter() {
        let ideas = vec![
            mk_idea(1, "Weather App", Some(1)),
            mk_idea(2, "Weather Bot", Some(2)),
        ];

        let result = apply(&ideas, Some(CategoryId(2)), "weather", SortOption::Default);
        assert_eq!(ids(&result), vec![2]);
    }

    #[test]
    fn updated_at_sort_puts_most_recent_first() {
        let mut a = mk_idea(1, "A", None);
        let mut b = mk_idea(2, "B", None);
        let mut c = mk_idea(3, "C", None);
        a.updated_at = fixture_time();
        b.updated_at = fixture_time() + Duration::hours(2);
        c.updated_at = fixture_time() + Duration::hours(1);

        let result = apply(&[a, b, c], None, "", SortOption::UpdatedAt);
        assert_eq!(ids(&result), vec![2, 3, 1]);
    }

    #[test]
    fn title_sort_ignores_case_and_keeps_ties_stable() {
        let ideas = vec![
            mk_idea(1, "beta", None),
            mk_idea(2, "Alpha", None),
            mk_idea(3, "BETA", None),
            mk_idea(4, "alpha", None),
        ];

        let result = apply(&ideas, None, "", SortOption::Title);
        assert_eq!(ids(&result), vec![2, 4, 1, 3]);
    }

    fn with_detail(id: i64, detail: &str) -> AppIdea {
        let mut idea = mk_idea(id, "idea", None);
        idea.detail = detail.to_string();
        idea
    }

    #[test]
    fn character_length_counts_graphemes() {
        assert_eq!(character_length(""), 0);
        assert_eq!(character_length("abc"), 3);
        assert_eq!(character_length("e\u{301}"), 1);
        assert_eq!(character_length("🍽️"), 1);
        assert_eq!(character_length("👩\u{200d}💻 code"), 6);
    }

    #[test]
    fn character_length_sorts_by_graphemes_not_scalars() {
        let ideas = vec![
            with_detail(1, "ab"),
            with_detail(2, "e\u{301}"),
            with_detail(3, "👩\u{200d}💻"),
            with_detail(4, "abc"),
            with_detail(5, ""),
        ];

        let ascending = apply(&ideas, None, "", SortOption::CharacterLengthAsc);
        assert_eq!(ids(&ascending), vec![5, 2, 3, 1, 4]);

        let descending = apply(&ideas, None, "", SortOption::CharacterLengthDesc);
        assert_eq!(ids(&descending), vec![4, 1, 2, 3, 5]);
    }

    #[test]
    fn sort_option_names_round_trip() {
        for option in SortOption::ALL {
            assert_eq!(SortOption::parse(option.as_str()), Some(option));
        }
        assert_eq!(SortOption::parse("newest"), None);
        assert_eq!(SortOption::CharacterLengthAsc.label(), "Character Length ↑");
    }

    #[test]
    fn idea_fields_default_to_placeholder_icon() {
        let fields = IdeaFields::default();
        assert_eq!(fields.icon, DEFAULT_ICON);
        assert!(fields.title.is_empty());
        assert!(!fields.is_favorite);
        assert_eq!(fields.category_id, None);
        assert_eq!(IdeaDraft::default().id(), None);
    }

    #[test]
    fn to_draft_is_a_disconnected_copy() {
        let idea = mk_idea(7, "Timer", Some(2));
        let mut draft = idea.to_draft();
        draft.fields_mut().title = "Stopwatch".to_string();

        assert_eq!(draft.id(), Some(AppIdeaId(7)));
        assert_eq!(draft.fields().title, "Stopwatch");
        assert_eq!(idea.title, "Timer");
    }

    #[test]
    fn blank_category_titles_are_rejected() {
        assert!(validate_category_title("  ").is_err());
        assert!(validate_category_title("").is_err());
        assert!(validate_category_title("📚 Beginner Projects").is_ok());
    }

    #[test]
    fn idea_serializes_with_rfc3339_timestamp() -> anyhow::Result<()> {
        let idea = mk_idea(1, "Calculator App", Some(1));
        let json = serde_json::to_value(&idea)?;
        assert_eq!(json["updated_at"], "2026-01-01T00:00:00Z");
        assert_eq!(json["category_id"], 1);

        let back: AppIdea = serde_json::from_value(json)?;
        assert_eq!(back, idea);
        Ok(())
    }

    fn arb_ideas() -> impl Strategy<Value = Vec<AppIdea>> {
        prop::collection::vec(
            (
                prop::sample::select(vec!["alpha", "Alpha", "beta", "Weather", "chat"]),
                prop::option::of(1_i64..4),
                0_i64..5,
                "[a-zA-Z ]{0,12}",
            ),
            0..24,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(index, (title, category, hours, detail))| {
                    let id = i64::try_from(index).unwrap_or(i64::MAX) + 1;
                    let mut idea = mk_idea(id, title, category);
                    idea.updated_at = fixture_time() + Duration::hours(hours);
                    idea.detail = detail;
                    idea
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn property_category_filter_is_an_ordered_subsequence(
            ideas in arb_ideas(),
            category in 1_i64..4
        ) {
            let result = apply(&ideas, Some(CategoryId(category)), "", SortOption::Default);
            let expected = ideas
                .iter()
                .filter(|idea| idea.category_id == Some(CategoryId(category)))
                .cloned()
                .collect::<Vec<_>>();
            prop_assert_eq!(result, expected);
        }

        #[test]
        fn property_search_ignores_query_case(ideas in arb_ideas(), query in "[a-zA-Z]{1,4}") {
            let upper = apply(&ideas, None, &query.to_uppercase(), SortOption::Default);
            let lower = apply(&ideas, None, &query.to_lowercase(), SortOption::Default);
            prop_assert_eq!(upper, lower);
        }

        #[test]
        fn property_sorts_are_stable(
            ideas in arb_ideas(),
            option in prop::sample::select(SortOption::ALL.to_vec())
        ) {
            let result = apply(&ideas, None, "", option);
            prop_assert_eq!(result.len(), ideas.len());

            let position = |id: AppIdeaId| ideas.iter().position(|idea| idea.id == id);
            for pair in result.windows(2) {
                let ties = match option {
                    SortOption::Default => true,
                    SortOption::UpdatedAt => pair[0].updated_at == pair[1].updated_at,
                    SortOption::Title => {
                        pair[0].title.to_lowercase() == pair[1].title.to_lowercase()
                    }
                    SortOption::CharacterLengthAsc | SortOption::CharacterLengthDesc => {
                        character_length(&pair[0].detail) == character_length(&pair[1].detail)
                    }
                };
                if ties {
                    prop_assert!(position(pair[0].id) < position(pair[1].id));
                }
            }
        }
    }
}
