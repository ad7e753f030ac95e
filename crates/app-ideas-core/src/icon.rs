/// Icon used when no keyword rule matches.
pub const FALLBACK_ICON: &str = "📱";

struct IconRule {
    title_keywords: &'static [&'static str],
    text_keywords: &'static [&'static str],
    icon: &'static str,
}

const fn rule(
    title_keywords: &'static [&'static str],
    text_keywords: &'static [&'static str],
    icon: &'static str,
) -> IconRule {
    IconRule {
        title_keywords,
        text_keywords,
        icon,
    }
}

// First match wins.
const ICON_RULES: &[IconRule] = &[
    rule(&["calculator"], &["calculate"], "🧮"),
    rule(&["game"], &["game"], "🎮"),
    rule(&["chat"], &["chat"], "💬"),
    rule(&["image", "photo"], &["image"], "📸"),
    rule(&["podcast"], &["podcast"], "🎧"),
    rule(&["recipe", "meal"], &["food"], "🍽️"),
    rule(&["weather"], &["weather"], "🌤️"),
    rule(&["timer", "clock"], &["countdown"], "⏰"),
    rule(&["note"], &["note"], "📝"),
    rule(&["todo"], &["task"], "✅"),
    rule(&["calendar"], &["calendar"], "📅"),
    rule(&["store"], &["shopping"], "🛒"),
    rule(&["currency"], &["money"], "💰"),
    rule(&["instagram"], &["social"], "📱"),
    rule(&["github"], &["github"], "🐙"),
    rule(&["password"], &["password"], "🔐"),
    rule(&["qr"], &["qr"], "📱"),
    rule(&["draw"], &["art"], "🎨"),
    rule(&["emoji"], &["emoji"], "😊"),
    rule(&["quiz"], &["quiz"], "❓"),
    rule(&["memory"], &["card"], "🃏"),
    rule(&["vote"], &["poll"], "🗳️"),
    rule(&["charity"], &["donation"], "❤️"),
    rule(&["movie"], &["movie"], "🎬"),
    rule(&["calorie"], &["fitness"], "💪"),
    rule(&["nasa"], &["space"], "🚀"),
];

/// Pick an emoji for an idea from keywords in its title and descriptive text.
#[must_use]
pub fn suggest_icon(title: &str, text: &str) -> &'static str {
    let title = title.to_lowercase();
    let text = text.to_lowercase();

    ICON_RULES
        .iter()
        .find(|rule| {
            rule.title_keywords.iter().any(|keyword| title.contains(keyword))
                || rule.text_keywords.iter().any(|keyword| text.contains(keyword))
        })
        .map_or(FALLBACK_ICON, |rule| rule.icon)
}
