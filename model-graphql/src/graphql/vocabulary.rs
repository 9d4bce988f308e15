//! Naming of root fields and wording of authorization errors.

use crate::security::Ability;
use std::collections::HashMap;
use std::fmt::Debug;

/// A naming strategy for generated root fields, and the language of authorization errors.
pub trait Vocabulary: Debug + Send + Sync + 'static {
    /// The plural form of a model name.
    fn plural(&self, word: &str) -> String;

    /// The name of the field listing every entity of a model, such as `allBooks`.
    fn all(&self, model: &str) -> String;

    /// The name of the field creating an entity, such as `createBook`.
    fn create(&self, model: &str) -> String;

    /// The name of the field updating an entity, such as `updateBook`.
    fn update(&self, model: &str) -> String;

    /// The name of the field deleting an entity, such as `deleteBook`.
    fn delete(&self, model: &str) -> String;

    /// The name of the field viewing one entity, which is also the name of the argument holding
    /// the input of a mutation.
    fn view(&self, model: &str) -> String {
        lcfirst(model)
    }

    /// The message of an authorization error.
    ///
    /// `property` names the offending property for [`Ability::FilterProperty`].
    fn denied(&self, ability: Ability, property: Option<&str>) -> String;
}

/// English field names and messages.
#[derive(Clone, Debug, Default)]
pub struct English;

impl Vocabulary for English {
    fn plural(&self, word: &str) -> String {
        english_plural(word)
    }

    fn all(&self, model: &str) -> String {
        format!("all{}", ucfirst(&self.plural(model)))
    }

    fn create(&self, model: &str) -> String {
        format!("create{}", ucfirst(model))
    }

    fn update(&self, model: &str) -> String {
        format!("update{}", ucfirst(model))
    }

    fn delete(&self, model: &str) -> String {
        format!("delete{}", ucfirst(model))
    }

    fn denied(&self, ability: Ability, property: Option<&str>) -> String {
        match ability {
            Ability::Filter => "You are not authorized to filter this type".into(),
            Ability::FilterProperty => format!(
                "You are not authorized to filter the property [{}].",
                property.unwrap_or_default()
            ),
            Ability::Create => "You are not authorized to create this model.".into(),
            Ability::Delete => "You are not authorized to delete this model.".into(),
            Ability::Update => "You are not authorized to update this model.".into(),
            Ability::View => "You are not authorized to view this model.".into(),
            Ability::ViewProperty => "You are not authorized to view this property.".into(),
            Ability::ViewAny => "You are not authorized to view any model.".into(),
        }
    }
}

const ENGLISH_EXCEPTIONS: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("woman", "women"),
    ("man", "men"),
    ("mouse", "mice"),
    ("datum", "data"),
];

/// The English plural of a word.
///
/// Compound names are pluralized by their last word, so `SalesPerson` becomes `SalesPeople`.
pub fn english_plural(word: &str) -> String {
    if let Some(plural) = exception(word, ENGLISH_EXCEPTIONS.iter().copied()) {
        return plural;
    }
    let lower = word.to_lowercase();
    let before_last = lower.chars().rev().nth(1);
    if lower.ends_with("is") {
        format!("{}es", strip_chars(word, 2))
    } else if ["s", "sh", "ch", "x", "z"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        format!("{word}es")
    } else if lower.ends_with("fe") {
        format!("{}ves", strip_chars(word, 2))
    } else if lower.ends_with('y') && !matches!(before_last, Some('a' | 'e' | 'i' | 'o' | 'u')) {
        format!("{}ies", strip_chars(word, 1))
    } else {
        format!("{word}s")
    }
}

/// German field names and messages.
#[derive(Clone, Debug)]
pub struct German {
    exceptions: HashMap<String, String>,
}

impl Default for German {
    fn default() -> Self {
        Self {
            exceptions: [
                ("job", "jobs"),
                ("login", "logins"),
                ("konto", "konten"),
                ("pizza", "pizzen"),
                ("kaktus", "kakteen"),
            ]
            .into_iter()
            .map(|(singular, plural)| (singular.to_string(), plural.to_string()))
            .collect(),
        }
    }
}

impl German {
    /// Add irregular plurals, overriding the built-in ones.
    pub fn with_exceptions<I, S, P>(mut self, exceptions: I) -> Self
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
        P: Into<String>,
    {
        self.exceptions.extend(
            exceptions
                .into_iter()
                .map(|(singular, plural)| (singular.into().to_lowercase(), plural.into())),
        );
        self
    }
}

impl Vocabulary for German {
    fn plural(&self, word: &str) -> String {
        if let Some(plural) = exception(
            word,
            self.exceptions
                .iter()
                .map(|(singular, plural)| (singular.as_str(), plural.as_str())),
        ) {
            return plural;
        }
        let lower = word.to_lowercase();
        let strip = |n| strip_chars(word, n);
        if lower.ends_with('e') {
            format!("{word}n")
        } else if [
            "ent", "and", "ant", "ist", "or", "in", "ion", "ik", "heit", "keit", "schaft", "tät",
            "ung",
        ]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
        {
            format!("{word}en")
        } else if lower.ends_with("ma") {
            format!("{}en", strip(1))
        } else if lower.ends_with("um") {
            format!("{}en", strip(2))
        } else if lower.ends_with("us") {
            format!("{word}en")
        } else if ["eur", "ich", "ier", "iet", "ig", "ling", "ör", "nd"]
            .iter()
            .any(|suffix| lower.ends_with(suffix))
        {
            format!("{word}e")
        } else if lower.ends_with(['a', 'i', 'o', 'u', 'y']) {
            format!("{word}s")
        } else if lower.ends_with("aub") {
            format!("{}aeube", strip(3))
        } else if lower.ends_with("ub") {
            format!("{}uebe", strip(2))
        } else if lower.ends_with("ob") {
            format!("{}oebe", strip(2))
        } else if lower.ends_with("ab") {
            format!("{}aebe", strip(2))
        } else if lower.ends_with("eb") {
            format!("{}ebe", strip(2))
        } else {
            word.to_string()
        }
    }

    fn all(&self, model: &str) -> String {
        format!("alle{}", ucfirst(&self.plural(model)))
    }

    fn create(&self, model: &str) -> String {
        format!("erstelle{}", ucfirst(model))
    }

    fn update(&self, model: &str) -> String {
        format!("bearbeite{}", ucfirst(model))
    }

    fn delete(&self, model: &str) -> String {
        format!("loesche{}", ucfirst(model))
    }

    fn denied(&self, ability: Ability, property: Option<&str>) -> String {
        match ability {
            Ability::Filter => "Sie sind nicht berechtigt, diesen Filter zu verwenden.".into(),
            Ability::FilterProperty => format!(
                "Sie sind nicht berechtigt, die Eigenschaft [{}] zu filtern.",
                property.unwrap_or_default()
            ),
            Ability::Create => "Sie sind nicht berechtigt, diesen Eintrag zu erstellen.".into(),
            Ability::Delete => "Sie sind nicht berechtigt, diesen Eintrag zu löschen.".into(),
            Ability::Update => "Sie sind nicht berechtigt, diesen Eintrag zu bearbeiten.".into(),
            Ability::View => "Sie sind nicht berechtigt, diesen Eintrag anzusehen.".into(),
            Ability::ViewProperty => {
                "Sie sind nicht berechtigt, diese Eigenschaft anzusehen.".into()
            }
            Ability::ViewAny => "Sie sind nicht berechtigt, diese Einträge anzusehen.".into(),
        }
    }
}

/// Look up an irregular plural for the last word of a (possibly camel case) name, preserving the
/// case of its first letter.
fn exception<'a>(
    word: &str,
    exceptions: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Option<String> {
    let lower = word.to_lowercase();
    for (singular, plural) in exceptions {
        if !lower.ends_with(singular) {
            continue;
        }
        let Some(start) = word
            .len()
            .checked_sub(singular.len())
            .filter(|start| word.is_char_boundary(*start))
        else {
            continue;
        };
        let Some(first) = word[start..].chars().next() else {
            continue;
        };
        // Only match at a word boundary: the whole name, or a capitalized last word.
        if start > 0 && !first.is_uppercase() {
            continue;
        }
        let plural = if first.is_uppercase() {
            ucfirst(plural)
        } else {
            plural.to_string()
        };
        return Some(format!("{}{plural}", &word[..start]));
    }
    None
}

/// Remove the last `n` characters of a string.
fn strip_chars(s: &str, n: usize) -> String {
    let mut chars = s.chars().collect::<Vec<_>>();
    chars.truncate(chars.len().saturating_sub(n));
    chars.into_iter().collect()
}

/// Uppercase the first character of a string.
pub fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercase the first character of a string.
pub fn lcfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_english_plural() {
        for (singular, plural) in [
            ("Book", "Books"),
            ("Box", "Boxes"),
            ("Bus", "Buses"),
            ("Address", "Addresses"),
            ("Match", "Matches"),
            ("Wish", "Wishes"),
            ("Buzz", "Buzzes"),
            ("Category", "Categories"),
            ("BookCategory", "BookCategories"),
            ("Key", "Keys"),
            ("Day", "Days"),
            ("Knife", "Knives"),
            ("Analysis", "Analyses"),
            ("Person", "People"),
            ("SalesPerson", "SalesPeople"),
            ("Woman", "Women"),
            ("Human", "Humans"),
            ("Child", "Children"),
            ("child", "children"),
            ("Datum", "Data"),
        ] {
            assert_eq!(english_plural(singular), plural, "{singular}");
        }
    }

    #[test]
    fn test_german_plural() {
        let german = German::default();
        for (singular, plural) in [
            ("Kunde", "Kunden"),
            ("Student", "Studenten"),
            ("Rechnung", "Rechnungen"),
            ("Firma", "Firmen"),
            ("Museum", "Museen"),
            ("Bonus", "Bonusen"),
            ("Konto", "Konten"),
            ("Kaktus", "Kakteen"),
            ("Pizza", "Pizzen"),
            ("Frisör", "Frisöre"),
            ("Auto", "Autos"),
            ("Staub", "Staeube"),
            ("Tisch", "Tisch"),
        ] {
            assert_eq!(german.plural(singular), plural, "{singular}");
        }
        let german = German::default().with_exceptions([("Tisch", "tische")]);
        assert_eq!(german.plural("Tisch"), "Tische");
    }

    #[test]
    fn test_field_names() {
        assert_eq!(English.all("Book"), "allBooks");
        assert_eq!(English.view("Book"), "book");
        assert_eq!(English.create("Book"), "createBook");
        assert_eq!(English.update("Book"), "updateBook");
        assert_eq!(English.delete("Book"), "deleteBook");

        let german = German::default();
        assert_eq!(german.all("Buch"), "alleBuch");
        assert_eq!(german.all("Kunde"), "alleKunden");
        assert_eq!(german.view("Kunde"), "kunde");
        assert_eq!(german.create("Kunde"), "erstelleKunde");
        assert_eq!(german.update("Kunde"), "bearbeiteKunde");
        assert_eq!(german.delete("Kunde"), "loescheKunde");
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            English.denied(Ability::FilterProperty, Some("email")),
            "You are not authorized to filter the property [email]."
        );
        assert_eq!(
            German::default().denied(Ability::ViewAny, None),
            "Sie sind nicht berechtigt, diese Einträge anzusehen."
        );
    }
}
