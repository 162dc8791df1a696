use uuid::Uuid;

const ADJECTIVES: [&str; 16] = [
    "Brave", "Calm", "Clever", "Swift", "Quiet", "Lucky", "Mighty", "Sunny", "Fuzzy", "Jolly",
    "Witty", "Rusty", "Frosty", "Bold", "Sly", "Cozy",
];
const NOUNS: [&str; 16] = [
    "Cat", "Fox", "Wolf", "Otter", "Panda", "Raven", "Tiger", "Badger", "Falcon", "Lynx", "Moose",
    "Gecko", "Koala", "Bison", "Heron", "Yak",
];
/// Minecraft rejects longer names.
pub const MAX_NAME_LEN: usize = 16;

/// A fresh random session identifier in hyphenated UUID form.
pub fn new_session_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

/// A readable offline player name such as `SwiftOtter42`.
pub fn generate_player_name() -> String {
    name_from_bytes(Uuid::new_v4().as_bytes())
}

fn name_from_bytes(bytes: &[u8; 16]) -> String {
    let adjective = ADJECTIVES[usize::from(bytes[0]) % ADJECTIVES.len()];
    let noun = NOUNS[usize::from(bytes[1]) % NOUNS.len()];
    let number = u16::from_be_bytes([bytes[2], bytes[3]]) % 100;
    let mut name = format!("{adjective}{noun}{number:02}");
    name.truncate(MAX_NAME_LEN);
    name
}

/// The name to launch with: the player's own, untouched, or a generated one
/// when it is blank.
pub fn resolve_player_name(requested: &str) -> String {
    if requested.trim().is_empty() {
        generate_player_name()
    } else {
        requested.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_are_valid_minecraft_names() {
        for _ in 0..200 {
            let name = generate_player_name();
            assert!(!name.is_empty());
            assert!(name.len() <= MAX_NAME_LEN, "{name} too long");
            assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn longest_combination_fits() {
        let longest_adjective = ADJECTIVES.iter().map(|a| a.len()).max().unwrap();
        let longest_noun = NOUNS.iter().map(|n| n.len()).max().unwrap();
        assert!(longest_adjective + longest_noun + 2 <= MAX_NAME_LEN);
        assert_eq!(name_from_bytes(&[0; 16]), "BraveCat00");
    }

    #[test]
    fn keeps_requested_names() {
        assert_eq!(resolve_player_name("Steve"), "Steve");
        assert_eq!(resolve_player_name(" Steve "), " Steve ");
        assert!(!resolve_player_name("").is_empty());
        assert!(!resolve_player_name("   ").is_empty());
    }

    #[test]
    fn session_ids_are_uuids() {
        let id = new_session_id();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_ne!(id, new_session_id());
    }
}
