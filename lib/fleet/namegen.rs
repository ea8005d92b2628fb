//! Human-readable instance names.

use rand::{rngs::OsRng, Rng};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Game-flavored descriptors for generated names.
const ADJECTIVES: &[&str] = &[
    "legendary", "ancient", "mystic", "brave", "shadow", "fierce", "crimson", "silver", "iron",
    "golden", "dark", "holy", "cursed", "blessed", "frozen", "burning", "ethereal", "phantom",
    "storm", "dragon", "thunder", "void", "celestial", "arcane", "corrupted", "pure", "savage",
    "noble", "rogue", "eternal", "forgotten", "enchanted", "demon", "angel", "blood", "crystal",
    "chaos", "order", "primal", "astral", "wild", "divine",
];

/// Game-flavored items, characters, and creatures for generated names.
const NOUNS: &[&str] = &[
    "sword", "shield", "tome", "paladin", "rogue", "barbarian", "dragon", "phoenix", "golem",
    "wizard", "archer", "knight", "blade", "axe", "staff", "crown", "helm", "gauntlet", "wyrm",
    "griffin", "hydra", "titan", "specter", "wraith", "sentinel", "champion", "warden", "guardian",
    "slayer", "hunter", "reaper", "oracle", "sage", "monk", "warlock", "crusader", "berserker",
    "assassin", "druid", "necromancer", "sorcerer", "ranger", "templar", "valkyrie", "samurai",
    "ninja", "ronin", "shogun",
];

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Generates a random `adjective-noun` instance name (e.g. `shadow-dragon`)
/// from the OS CSPRNG. Uniqueness against the live fleet is the caller's
/// responsibility.
pub fn generate_name() -> String {
    let adjective = ADJECTIVES[OsRng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[OsRng.gen_range(0..NOUNS.len())];
    format!("{}-{}", adjective, noun)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate_container_name;

    #[test]
    fn test_generate_name_shape() {
        for _ in 0..100 {
            let name = generate_name();
            let (adj, noun) = name.split_once('-').expect("name should be adjective-noun");
            assert!(ADJECTIVES.contains(&adj));
            assert!(NOUNS.contains(&noun));
        }
    }

    #[test]
    fn test_generate_name_is_valid_container_name() {
        for _ in 0..100 {
            validate_container_name(&generate_name()).unwrap();
        }
    }

    #[test]
    fn test_generate_name_varies() {
        let first = generate_name();
        let distinct = (0..50).map(|_| generate_name()).any(|n| n != first);
        assert!(distinct, "50 draws from a 2016-name space should vary");
    }
}
