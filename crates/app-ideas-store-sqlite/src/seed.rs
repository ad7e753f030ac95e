use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use app_ideas_core::suggest_icon;
use rusqlite::{params, Connection};

/// Read-only bundle of seed documents.
pub trait SeedResources: Send + Sync {
    /// Contents of the named resource, or `None` when it is not bundled.
    fn load(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoResources;

impl SeedResources for NoResources {
    fn load(&self, _name: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl SeedResources for DirectoryResources {
    fn load(&self, name: &str) -> Option<String> {
        let path = self.root.join(name);
        match fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    error = %err,
                    "seed resource unreadable"
                );
                None
            }
        }
    }
}

impl SeedResources for BTreeMap<String, String> {
    fn load(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Bundled document name for a seeded idea title.
#[must_use]
pub fn resource_name(title: &str) -> String {
    format!("{}.md", title.replace(' ', "-"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedCategory {
    pub id: i64,
    pub title: &'static str,
}

pub const SEED_CATEGORIES: [SeedCategory; 3] = [
    SeedCategory {
        id: 1,
        title: "📚 Beginner Projects",
    },
    SeedCategory {
        id: 2,
        title: "💻 Intermediate Projects",
    },
    SeedCategory {
        id: 3,
        title: "🧠 Advanced Projects",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Beginner,
    Intermediate,
    Advanced,
}

impl Tier {
    #[must_use]
    pub fn category_id(self) -> i64 {
        match self {
            Self::Beginner => SEED_CATEGORIES[0].id,
            Self::Intermediate => SEED_CATEGORIES[1].id,
            Self::Advanced => SEED_CATEGORIES[2].id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedIdea {
    pub title: &'static str,
    pub short_description: &'static str,
    pub tier: Tier,
}

const BEGINNER: &[(&str, &str)] = &[
    ("Bin2Dec App", "Binary-to-Decimal number converter"),
    (
        "Border Radius Previewer",
        "Preview how CSS3 border-radius values affect an element",
    ),
    ("Calculator App", "Calculator"),
    (
        "Christmas Lights App",
        "Simulate a string of Christmas lights",
    ),
    (
        "Cause Effect App",
        "Click list item to display item details",
    ),
    (
        "Color Cycle App",
        "Cycle a color value through incremental changes",
    ),
    ("Countdown Timer App", "Event Countdown timer"),
    ("CSV2JSON App", "CSV to JSON converter"),
    ("Dollars To Cents App", "Convert dollars to cents"),
    (
        "Dynamic CSS Variables",
        "Dynamically change CSS variable settings",
    ),
    ("First DB App", "Your first Database app!"),
    (
        "Flip Image App",
        "Change the orientation of images across two axes",
    ),
    ("GitHub Status App", "Display Current GitHub Status"),
    ("Hello App", "User native language greeting"),
    ("IOT Mailbox App", "Use callbacks to check your snail mail"),
    (
        "Javascript Validation With Regex",
        "Script to validate inputs entered by a user using RegEx",
    ),
    ("JSON2CSV App", "JSON to CSV converter"),
    ("Key Value App", "Keyboard Event Values"),
    ("Notes App", "Create an online note pad"),
    (
        "Pearson Regression App",
        "Calculate the correlation coefficient for two sets of data",
    ),
    ("Pomodoro Clock", "Task timer to aid personal productivity"),
    (
        "Product Landing Page",
        "Showcase product details for possible buyers",
    ),
    ("Quiz App", "Test your knowledge by answering questions"),
    ("Recipe App", "Recipe"),
    ("Random Meal Generator", "Generate random meals"),
    (
        "Random Number Generator",
        "Generate random number between range.",
    ),
    (
        "Roman to Decimal Converter",
        "Convert Roman to Decimal numbers",
    ),
    ("Slider Design", "Display images using a slider control"),
    ("Stopwatch App", "Count time spent on activities"),
    (
        "True or False App",
        "Identify the result of a conditional comparison",
    ),
    ("Vigenere Cipher", "Encrypt text using the Vigenere Cypher"),
    (
        "Windchill App",
        "Calculate the windchill factor from an actual temperature",
    ),
    (
        "Word Frequency App",
        "Calculate word frequency in a block of text",
    ),
    (
        "Weather App",
        "Get the temperature, weather condition of a city.",
    ),
];

const INTERMEDIATE: &[(&str, &str)] = &[
    ("Bit Masks App", "Using Bit Masks for Conditions"),
    ("Book Finder App", "Search for books by multiple criteria"),
    ("Calculator CLI", "Create a basic calculator cli."),
    ("Card Memory Game", "Memorize and match hidden images"),
    ("Charity Finder App", "Find a Global Charity to donate to"),
    (
        "Chrome Theme Extension",
        "Build your own chrome theme extention.",
    ),
    ("Currency Converter", "Convert one currency to another."),
    ("Drawing App", "Create digital artwork on the web"),
    ("Emoji Translator App", "Translate sentences into Emoji"),
    (
        "FlashCards App",
        "Review and test your knowledge through Flash Cards",
    ),
    ("Flip Art App", "Animate a set of images"),
    (
        "Game Suggestion App",
        "Create polls to decide what games to play",
    ),
    ("GitHub Profiles", "A GitHub user search App"),
    ("HighStriker Game", "Highstriker strongman carnival game"),
    ("Image Scanner", "Image Scanner App"),
    (
        "Markdown Previewer",
        "Preview text formatted in GitHub flavored markdown",
    ),
    (
        "Markdown Table Generator",
        "Convert a table into Markdown-formatted text",
    ),
    ("Math Editor", "A math editor for students to use"),
    ("Meme Generator App", "Create custom memes"),
    ("Name Generator", "Generate names using names dataset"),
    ("Password Generator", "Generate random passwords"),
    ("Podcast Directory App", "Directory of favorite podcasts"),
    ("QRCode Badge App", "Encode badge info in a QRcode"),
    ("RegExp Helper App", "Test Regular Expressions"),
    ("Sales DB App", "Record Sales Receipts in a DB"),
    ("Simple Online Store", "Simple Online Store"),
    (
        "Sports Bracket Generator",
        "Generate a sports bracket diagram",
    ),
    ("String Art", "An animation of moving, colored strings"),
    ("This or That Game", "This or That Game"),
    ("Timezone Slackbot", "Display Team Timezones"),
    ("To-Do App", "Manage personal to-do tasks"),
    ("Typing Practice App", "Typing Practice"),
    ("Voting App", "Voting App"),
];

const ADVANCED: &[(&str, &str)] = &[
    (
        "Battleship Bot",
        "Create a Discord bot that plays Battleship",
    ),
    (
        "Battleship Game Engine",
        "Create a callable engine to play the Battleship game",
    ),
    ("Boole Bot Game", "Battling Bots driven by Boolean algebra"),
    ("Calendar App", "Create your own Calendar"),
    ("Calorie Counter App", "Calorie Counter Nutrition App"),
    ("Chat App", "Real-time chat interface"),
    ("Contribution Tracker App", "Track funds donated to charity"),
    ("Elevator App", "Elevator simulator"),
    ("FastFood App", "Fast Food Restaurant Simulator"),
    ("Instagram Clone App", "A clone of Facebook's Instagram app"),
    (
        "GitHub Timeline App",
        "Generate a timeline of a users GitHub Repos",
    ),
    ("Kudos Slackbot", "Give recognition to a deserving peer"),
    (
        "Movie App",
        "Browse, Find Ratings, Check Actors and Find you next movie to watch",
    ),
    (
        "MyPodcast Library App",
        "Create a library of favorite podcasts",
    ),
    ("NASA Exoplanet Query", "Query NASA's Exoplanet Archive"),
    ("Shell Game", "Animated shell game"),
    (
        "Shuffle Deck App",
        "Evaluate different algorithms for shuffling a card deck",
    ),
    ("Slack Archiver", "Archive Slack Messages"),
    ("SpellIt App", "A twist on the classic Speak N Spell game"),
    ("Survey App", "Define, conduct, and view a survey"),
];

/// The curated idea library, beginner tier first.
pub fn seed_catalog() -> impl Iterator<Item = SeedIdea> {
    let tiers = [
        (Tier::Beginner, BEGINNER),
        (Tier::Intermediate, INTERMEDIATE),
        (Tier::Advanced, ADVANCED),
    ];
    tiers.into_iter().flat_map(|(tier, ideas)| {
        ideas.iter().map(move |&(title, short_description)| SeedIdea {
            title,
            short_description,
            tier,
        })
    })
}

pub(crate) fn seed_categories(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt =
        conn.prepare("INSERT INTO \"categories\"(\"id\", \"title\") VALUES (?1, ?2)")?;
    for category in SEED_CATEGORIES {
        stmt.execute(params![category.id, category.title])?;
    }
    Ok(())
}

pub(crate) fn seed_ideas(
    conn: &Connection,
    resources: &dyn SeedResources,
) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO \"appIdeas\"(
             \"title\", \"icon\", \"shortDescription\", \"detail\", \"categoryID\"
         )
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;

    let mut inserted = 0_usize;
    for idea in seed_catalog() {
        let name = resource_name(idea.title);
        let detail = resources.load(&name).unwrap_or_else(|| {
            tracing::warn!(resource = %name, "seed resource missing; using empty detail");
            String::new()
        });
        let icon = suggest_icon(idea.title, &detail);
        inserted += stmt.execute(params![
            idea.title,
            icon,
            idea.short_description,
            detail,
            idea.tier.category_id()
        ])?;
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_names_hyphenate_titles() {
        assert_eq!(resource_name("Calculator App"), "Calculator-App.md");
        assert_eq!(
            resource_name("Javascript Validation With Regex"),
            "Javascript-Validation-With-Regex.md"
        );
    }

    #[test]
    fn catalog_covers_three_tiers() {
        let catalog = seed_catalog().collect::<Vec<_>>();
        let count = |tier| catalog.iter().filter(|idea| idea.tier == tier).count();

        assert_eq!(catalog.len(), 87);
        assert_eq!(count(Tier::Beginner), 34);
        assert_eq!(count(Tier::Intermediate), 33);
        assert_eq!(count(Tier::Advanced), 20);
        assert_eq!(catalog[0].title, "Bin2Dec App");
    }

    #[test]
    fn directory_resources_read_markdown_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("Chat-App.md"), "# Chat App\nReal-time chat")?;
        let resources = DirectoryResources::new(dir.path());

        let chat = resources.load("Chat-App.md");
        assert_eq!(chat.as_deref(), Some("# Chat App\nReal-time chat"));
        assert_eq!(resources.load("Missing.md"), None);
        Ok(())
    }
}
