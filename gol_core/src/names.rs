//! Lobby name generation: two hyphenated words, e.g. `brave-otter`.

use gol_env::LifeContext;

/// Generate a random lobby name from the context's entropy source
pub fn lobby_name<Ctx: LifeContext>(context: &Ctx) -> String {
    let adjective = ADJECTIVES[context.random_below(ADJECTIVES.len())];
    let noun = NOUNS[context.random_below(NOUNS.len())];
    format!("{adjective}-{noun}")
}

static ADJECTIVES: &[&str] = &[
    "able", "amused", "brave", "bright", "busy", "calm", "clever", "cosmic", "crisp", "daring",
    "eager", "fancy", "fast", "fond", "gentle", "glad", "golden", "grand", "happy", "humble",
    "jolly", "keen", "kind", "lively", "loyal", "lucky", "merry", "mighty", "neat", "nimble",
    "noble", "polite", "proud", "quick", "quiet", "rapid", "ready", "sharp", "shy", "smart",
    "snappy", "solid", "steady", "sunny", "swift", "tidy", "vast", "vivid", "warm", "witty",
];

static NOUNS: &[&str] = &[
    "ant", "badger", "bat", "bear", "beetle", "bison", "cat", "cod", "crab", "crane",
    "deer", "dodo", "dove", "eagle", "eel", "elk", "falcon", "ferret", "finch", "fox",
    "frog", "gecko", "goat", "hare", "hawk", "heron", "ibis", "koala", "lark", "lemur",
    "lion", "lynx", "mole", "moose", "newt", "otter", "owl", "panda", "quail", "raven",
    "robin", "seal", "shrew", "sloth", "snail", "swan", "tapir", "toad", "wolf", "yak",
];
