//! Property vocabularies.
//!
//! A [`VocabularySet`] is the live property vocabulary snapshot: every
//! property with its numeric id, its term (`dcterms:title`) and its label
//! (`Dublin Core : Title`). Registration order matters: it decides which
//! property keeps a bare label on collision and which one wins a local-name
//! match.

use serde::{Deserialize, Serialize};

/// A property vocabulary (Dublin Core, Bibo...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vocabulary {
    /// Term prefix (`dcterms`).
    pub prefix: String,
    /// Namespace URI.
    pub namespace_uri: String,
    /// Human-readable label (`Dublin Core`).
    pub label: String,
    /// Properties, in registration order.
    pub properties: Vec<Property>,
}

/// A property of a vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Property {
    /// Numeric id, unique across vocabularies.
    pub id: u32,
    /// Local name (`title`).
    pub local_name: String,
    /// Human-readable label (`Title`).
    pub label: String,
}

/// A property resolved against its vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRef<'a> {
    pub id: u32,
    pub term: String,
    pub local_name: &'a str,
    pub label: &'a str,
    pub vocabulary_label: &'a str,
    pub namespace_uri: &'a str,
}

impl PropertyRef<'_> {
    /// Full label: `Vocabulary : Property`.
    pub fn full_label(&self) -> String {
        format!("{} : {}", self.vocabulary_label, self.label)
    }
}

/// Ordered set of vocabularies, the property vocabulary snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct VocabularySet {
    vocabularies: Vec<Vocabulary>,
}

impl VocabularySet {
    /// Create a set from vocabularies in registration order.
    pub fn new(vocabularies: Vec<Vocabulary>) -> Self {
        Self { vocabularies }
    }

    /// The default set: Dublin Core, Bibo and FOAF subsets.
    pub fn builtin() -> Self {
        let mut next_id = 1;
        let mut vocab = |prefix: &str, uri: &str, label: &str, props: &[(&str, &str)]| {
            let properties = props
                .iter()
                .map(|(local_name, label)| {
                    let p = Property {
                        id: next_id,
                        local_name: local_name.to_string(),
                        label: label.to_string(),
                    };
                    next_id += 1;
                    p
                })
                .collect();
            Vocabulary {
                prefix: prefix.to_string(),
                namespace_uri: uri.to_string(),
                label: label.to_string(),
                properties,
            }
        };

        let dcterms = vocab(
            "dcterms",
            "http://purl.org/dc/terms/",
            "Dublin Core",
            &[
                ("title", "Title"),
                ("creator", "Creator"),
                ("subject", "Subject"),
                ("description", "Description"),
                ("publisher", "Publisher"),
                ("contributor", "Contributor"),
                ("date", "Date"),
                ("type", "Type"),
                ("format", "Format"),
                ("identifier", "Identifier"),
                ("source", "Source"),
                ("language", "Language"),
                ("relation", "Relation"),
                ("coverage", "Coverage"),
                ("rights", "Rights"),
                ("alternative", "Alternative Title"),
                ("isPartOf", "Is Part Of"),
                ("spatial", "Spatial Coverage"),
            ],
        );
        let bibo = vocab(
            "bibo",
            "http://purl.org/ontology/bibo/",
            "Bibliographic Ontology",
            &[
                ("isbn", "isbn"),
                ("issn", "issn"),
                ("shortTitle", "short title"),
                ("pages", "pages"),
            ],
        );
        let foaf = vocab(
            "foaf",
            "http://xmlns.com/foaf/0.1/",
            "Friend of a Friend",
            &[("name", "name"), ("title", "title"), ("mbox", "personal mailbox")],
        );

        Self::new(vec![dcterms, bibo, foaf])
    }

    /// Vocabularies in registration order.
    pub fn vocabularies(&self) -> &[Vocabulary] {
        &self.vocabularies
    }

    /// All properties in registration order.
    pub fn properties(&self) -> impl Iterator<Item = PropertyRef<'_>> {
        self.vocabularies.iter().flat_map(|v| {
            v.properties.iter().map(move |p| PropertyRef {
                id: p.id,
                term: format!("{}:{}", v.prefix, p.local_name),
                local_name: &p.local_name,
                label: &p.label,
                vocabulary_label: &v.label,
                namespace_uri: &v.namespace_uri,
            })
        })
    }

    /// Look up a property by its term.
    pub fn by_term(&self, term: &str) -> Option<PropertyRef<'_>> {
        let (prefix, local) = term.split_once(':')?;
        let vocabulary = self.vocabularies.iter().find(|v| v.prefix == prefix)?;
        let p = vocabulary.properties.iter().find(|p| p.local_name == local)?;
        Some(PropertyRef {
            id: p.id,
            term: term.to_string(),
            local_name: &p.local_name,
            label: &p.label,
            vocabulary_label: &vocabulary.label,
            namespace_uri: &vocabulary.namespace_uri,
        })
    }

    /// Whether a term is a known property.
    pub fn has_term(&self, term: &str) -> bool {
        self.by_term(term).is_some()
    }

    /// Namespace URI of a prefix.
    pub fn namespace_of(&self, prefix: &str) -> Option<&str> {
        self.vocabularies
            .iter()
            .find(|v| v.prefix == prefix)
            .map(|v| v.namespace_uri.as_str())
    }
}
