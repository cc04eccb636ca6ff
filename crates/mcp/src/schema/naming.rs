//! Conversion between internal tool tags (`CreateFlashcards`) and wire tool
//! names (`create-flashcards`).

/// `CreateFlashcards` -> `create-flashcards`
pub fn pascal_to_kebab(tag: &str) -> String {
    let mut name = String::with_capacity(tag.len() + 4);
    for (i, c) in tag.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                name.push('-');
            }
            name.push(c.to_ascii_lowercase());
        } else {
            name.push(c);
        }
    }
    name
}

/// `create-flashcards` -> `CreateFlashcards`
pub fn kebab_to_pascal(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Whether `tag` survives the trip to its wire name and back unchanged.
///
/// Tags with consecutive capitals (`HTTPFetch`), digits glued to words or
/// non-ASCII letters do not.
pub fn is_round_trip(tag: &str) -> bool {
    let starts_upper = tag.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    let no_adjacent_upper = !tag
        .as_bytes()
        .windows(2)
        .any(|w| w[0].is_ascii_uppercase() && w[1].is_ascii_uppercase());

    starts_upper
        && no_adjacent_upper
        && tag.chars().all(|c| c.is_ascii_alphanumeric())
        && kebab_to_pascal(&pascal_to_kebab(tag)) == tag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pascal_to_kebab() {
        assert_eq!(pascal_to_kebab("CreateFlashcards"), "create-flashcards");
        assert_eq!(pascal_to_kebab("Add"), "add");
        assert_eq!(pascal_to_kebab("ListAllOpenNotes"), "list-all-open-notes");
    }

    #[test]
    fn test_kebab_to_pascal() {
        assert_eq!(kebab_to_pascal("create-flashcards"), "CreateFlashcards");
        assert_eq!(kebab_to_pascal("add"), "Add");
        assert_eq!(kebab_to_pascal("list-all-open-notes"), "ListAllOpenNotes");
    }

    #[test]
    fn test_round_trip() {
        assert!(is_round_trip("CreateFlashcards"));
        assert!(is_round_trip("Add"));
        assert!(is_round_trip("Fetch2Notes"));

        assert!(!is_round_trip(""));
        assert!(!is_round_trip("createFlashcards"));
        assert!(!is_round_trip("HTTPFetch"));
        assert!(!is_round_trip("Create_Flashcards"));
        assert!(!is_round_trip("Create-Flashcards"));
    }
}
