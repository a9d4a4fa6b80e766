//! Built-in topic catalog and the color palette offered for custom topics.

use crate::Topic;

/// Colors a user can pick when creating a topic, in display order.
pub const TOPIC_PALETTE: [&str; 8] = [
    "bg-rose-500/10 text-rose-400",
    "bg-blue-500/10 text-blue-400",
    "bg-amber-500/10 text-amber-400",
    "bg-emerald-500/10 text-emerald-400",
    "bg-purple-500/10 text-purple-400",
    "bg-cyan-500/10 text-cyan-400",
    "bg-pink-500/10 text-pink-400",
    "bg-indigo-500/10 text-indigo-400",
];

/// Color used when a topic is created without one.
pub const DEFAULT_TOPIC_COLOR: &str = TOPIC_PALETTE[0];

/// (id, title, description, color)
const BUILTIN: &[(&str, &str, &str, &str)] = &[
    (
        "1",
        "childhood scars",
        "Discussing the hidden wounds of our early years.",
        "bg-rose-500/10 text-rose-400",
    ),
    (
        "2",
        "things i never told anyone",
        "A safe space for your deepest secrets.",
        "bg-indigo-500/10 text-indigo-400",
    ),
    (
        "3",
        "growing up too soon",
        "For those who had to be adults before they were ready.",
        "bg-amber-500/10 text-amber-400",
    ),
    (
        "4",
        "homes that didnt feel like home",
        "When the place you live isnt your sanctuary.",
        "bg-emerald-500/10 text-emerald-400",
    ),
    (
        "5",
        "words that hurt",
        "The impact of verbal scars.",
        "bg-red-500/10 text-red-400",
    ),
    (
        "6",
        "the day everything changed",
        "Moments that defined a before and after.",
        "bg-cyan-500/10 text-cyan-400",
    ),
    (
        "7",
        "faded memories",
        "Holding onto what is slipping away.",
        "bg-slate-500/10 text-slate-400",
    ),
    (
        "8",
        "the past that haunts",
        "Dealing with ghosts of yesterday.",
        "bg-violet-500/10 text-violet-400",
    ),
    (
        "9",
        "people who left",
        "Coping with absence and loss.",
        "bg-orange-500/10 text-orange-400",
    ),
    (
        "10",
        "unsaid goodbyes",
        "Closure that never happened.",
        "bg-pink-500/10 text-pink-400",
    ),
    (
        "11",
        "loving in silence",
        "Unrequited or hidden affection.",
        "bg-fuchsia-500/10 text-fuchsia-400",
    ),
    (
        "12",
        "anxiety talks",
        "Open discussions on managing anxiety.",
        "bg-blue-500/10 text-blue-400",
    ),
    (
        "13",
        "overthinking zone",
        "For the minds that never rest.",
        "bg-purple-500/10 text-purple-400",
    ),
    (
        "14",
        "healing slowly",
        "Celebrating small steps in recovery.",
        "bg-teal-500/10 text-teal-400",
    ),
    (
        "15",
        "becoming myself",
        "The journey of self-discovery.",
        "bg-lime-500/10 text-lime-400",
    ),
    (
        "16",
        "soft confessions",
        "Gentle admissions of the heart.",
        "bg-sky-500/10 text-sky-400",
    ),
    (
        "17",
        "Covid19",
        "Experiences during the pandemic.",
        "bg-gray-500/10 text-gray-400",
    ),
    (
        "18",
        "Netflix Dark",
        "Theories and discussions about the show.",
        "bg-red-900/10 text-red-500",
    ),
    (
        "19",
        "Social Issues",
        "Debating the world around us.",
        "bg-green-500/10 text-green-400",
    ),
];

/// Returns the static topic catalog in its fixed order.
pub fn builtin_topics() -> Vec<Topic> {
    BUILTIN
        .iter()
        .map(|(id, title, description, color)| Topic {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            color: color.to_string(),
            is_custom: false,
        })
        .collect()
}
