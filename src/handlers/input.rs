//! Rule-based reading of user input: restart commands, yes/no answers and
//! the dog keyword pre-filter.

use regex::Regex;
use std::sync::LazyLock;

const RESTART_COMMANDS: &[&str] = &[
    "restart",
    "start over",
    "reset",
    "neu",
    "neustart",
    "neu anfangen",
    "von vorne",
    "von vorn",
    "nochmal",
];

const YES_WORDS: &[&str] = &[
    "ja", "jo", "jap", "jup", "jawohl", "gerne", "klar", "natürlich", "sicher", "ok", "okay",
    "yes", "yep", "yeah", "sure", "y",
];

const NO_WORDS: &[&str] = &[
    "nein", "ne", "nee", "nö", "niemals", "no", "nope", "n",
];

const YES_PHRASES: &[&str] = &["auf jeden fall", "sehr gerne", "of course"];

const NO_PHRASES: &[&str] = &[
    "lieber nicht",
    "eher nicht",
    "besser nicht",
    "nicht nötig",
    "nicht jetzt",
    "auf keinen fall",
    "kein interesse",
    "lass mal",
    "vielleicht später",
    "no thanks",
    "not now",
];

const DOG_KEYWORDS: &[&str] = &[
    // German
    "hund", "hunde", "hundes", "welpe", "welpen", "rüde", "hündin", "vierbeiner",
    "bellen", "bellt", "gebell", "beißen", "beißt", "knurren", "knurrt",
    "winseln", "winselt", "jaulen", "jault", "heulen", "heult",
    "schwanz", "rute", "pfote", "pfoten", "schnauze",
    "schnüffeln", "schnüffelt", "lecken", "leckt", "sabbern", "sabbert",
    "zerren", "zerrt", "apportieren", "apportiert", "jagen", "jagt", "hetzen", "hetzt",
    "fressen", "frisst", "futter", "leckerli", "leckerchen",
    "gassi", "spaziergang", "leine", "halsband", "geschirr",
    "hundeschule", "erziehung", "kommando",
    // English
    "dog", "dogs", "puppy", "puppies", "canine", "pup", "pooch",
    "bark", "barking", "barks", "bite", "biting", "bites", "growl", "growling", "growls",
    "whine", "whining", "howl", "howling", "tail", "paw", "paws", "sniff", "sniffing",
    "leash", "collar", "harness", "fetch", "chew", "chewing", "walkies",
];

static DOG_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    let alternation = DOG_KEYWORDS
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).ok()
});

/// Answer to a yes/no question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YesNo {
    Yes,
    No,
    Unclear,
}

/// Lower-case, punctuation folded to single spaces
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    format!(" {normalized} ").contains(&format!(" {phrase} "))
}

pub fn is_restart_command(text: &str) -> bool {
    let normalized = normalize(text);
    RESTART_COMMANDS.contains(&normalized.as_str())
}

pub fn classify_yes_no(text: &str) -> YesNo {
    let normalized = normalize(text);
    if NO_PHRASES.iter().any(|p| contains_phrase(&normalized, p)) {
        return YesNo::No;
    }
    if YES_PHRASES.iter().any(|p| contains_phrase(&normalized, p)) {
        return YesNo::Yes;
    }

    let words: Vec<&str> = normalized.split(' ').collect();
    let yes = words.iter().any(|w| YES_WORDS.contains(w));
    let no = words.iter().any(|w| NO_WORDS.contains(w));
    match (yes, no) {
        (true, false) => YesNo::Yes,
        (false, true) => YesNo::No,
        _ => YesNo::Unclear,
    }
}

/// Fast domain check: does the text name something dog-related?
pub fn mentions_dog(text: &str) -> bool {
    DOG_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(text))
}

/// Length of the input as the user sees it
pub fn visible_len(text: &str) -> usize {
    text.trim().chars().count()
}
