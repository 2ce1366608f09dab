use crate::models::{Category, StoryCard};

/// Cover used for every built-in story (the site's default social card image).
const DEFAULT_COVER: &str = "https://images.unsplash.com/photo-1614850523296-d8c1af93d400?auto=format&fit=crop&q=80&w=1200";

fn card(
    title: &str,
    slug: &str,
    category: Category,
    excerpt: &str,
    read_time: &str,
) -> StoryCard {
    StoryCard {
        title: title.to_string(),
        slug: slug.to_string(),
        category,
        image: DEFAULT_COVER.to_string(),
        excerpt: excerpt.to_string(),
        read_time: read_time.to_string(),
    }
}

/// The story shown in the featured slot whenever live content is unavailable, labelled with
/// the configured featured category.
pub fn featured(category: Category) -> StoryCard {
    card(
        "Why Your Brain Won't Let You Sleep at 3 AM",
        "why-your-brain-wont-let-you-sleep",
        category,
        "The science behind the late-night thought spiral, and why the internet feels \
         more interesting after midnight.",
        "7 min read",
    )
}

/// Number of items in the fallback quick grid.
pub const QUICK_ITEMS: usize = 4;

/// The four items shown in the quick grid whenever live content is unavailable. Items in
/// the featured category are skipped, like the live grid does.
pub fn quick(featured: Category) -> Vec<StoryCard> {
    quick_pool()
        .into_iter()
        .filter(|item| item.category != featured)
        .take(QUICK_ITEMS)
        .collect()
}

fn quick_pool() -> Vec<StoryCard> {
    vec![
        card(
            "The Perfect 2 AM Instant Noodle Upgrade",
            "perfect-2am-instant-noodle-upgrade",
            Category::MidnightSnacks,
            "Five pantry additions that turn a packet of ramen into a legitimate meal.",
            "3 min read",
        ),
        card(
            "What Blue Light Actually Does to You",
            "what-blue-light-actually-does",
            Category::BlueLight,
            "Separating the screen-time myths from what the research really says.",
            "5 min read",
        ),
        card(
            "Brain Fog Is Not a Personality Trait",
            "brain-fog-is-not-a-personality-trait",
            Category::BrainFog,
            "Small, boring habits that clear the haze faster than another coffee.",
            "4 min read",
        ),
        card(
            "Unsolved: The Internet's Strangest Mysteries",
            "unsolved-internets-strangest-mysteries",
            Category::Mystery,
            "Cicada 3301, unexplained broadcasts and the threads nobody has closed.",
            "6 min read",
        ),
        card(
            "Doomscrolling Has a Design Budget",
            "doomscrolling-has-a-design-budget",
            Category::Tech,
            "Infinite feeds, pull-to-refresh and the engineering of one more minute.",
            "5 min read",
        ),
    ]
}
