//! Structured response parsing for the concept and outline stages
//!
//! Model output is cleaned (reasoning sections and markdown fences removed), decoded
//! into the wire structs below and converted into the run model. Any mismatch is a
//! permanent service error: asking again with the same prompt is not expected to fix it.

use crate::model::{Audience, Concept, Genre, Outline, OutlineEntry, StructureSketch};
use llm::text::{strip_code_fence, strip_reasoning};
use llm::ServiceError;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;

/// Words per chapter assumed when the outline gives no usable length
pub const DEFAULT_CHAPTER_WORDS: u32 = 2500;

/// Number that may arrive as a JSON number or as text such as "85,000"
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Int(u64),
    Float(f64),
    Text(String),
}

impl LooseNumber {
    fn value(&self) -> Option<u64> {
        match self {
            LooseNumber::Int(n) => Some(*n),
            LooseNumber::Float(f) if f.is_finite() && *f >= 0.0 => Some(f.round() as u64),
            LooseNumber::Float(_) => None,
            LooseNumber::Text(s) => {
                // Keep the first run of digits, ignoring thousands separators.
                let digits: String = s
                    .trim()
                    .chars()
                    .skip_while(|c| !c.is_ascii_digit())
                    .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '_')
                    .filter(|c| c.is_ascii_digit())
                    .collect();
                digits.parse().ok()
            }
        }
    }
}

fn loose_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<LooseNumber>::deserialize(deserializer)?;
    Ok(raw.and_then(|n| n.value()))
}

#[derive(Debug, Deserialize)]
struct ConceptDoc {
    expanded_title: String,
    #[serde(default)]
    subtitle: String,
    #[serde(default)]
    target_audience: AudienceDoc,
    #[serde(default)]
    core_themes: Vec<String>,
    #[serde(default)]
    genre_classification: GenreDoc,
    #[serde(default, deserialize_with = "loose_number")]
    word_count: Option<u64>,
    chapter_structure: StructureDoc,
    #[serde(default)]
    unique_selling_proposition: String,
}

#[derive(Debug, Default, Deserialize)]
struct AudienceDoc {
    #[serde(default)]
    primary: String,
    #[serde(default)]
    secondary: Vec<String>,
    #[serde(default)]
    key_interests: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GenreDoc {
    #[serde(default)]
    primary: String,
    #[serde(default)]
    secondary: Vec<String>,
    #[serde(default)]
    tone: String,
}

#[derive(Debug, Deserialize)]
struct StructureDoc {
    #[serde(default)]
    prologue: Option<String>,
    #[serde(default)]
    act_1_discovery: Vec<String>,
    #[serde(default)]
    act_2_investigation: Vec<String>,
    #[serde(default)]
    act_3_confrontation: Vec<String>,
    #[serde(default)]
    epilogue: Option<String>,
    #[serde(default, deserialize_with = "loose_number")]
    total_chapters: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OutlineDoc {
    Wrapped { chapters: Vec<OutlineEntryDoc> },
    Bare(Vec<OutlineEntryDoc>),
}

#[derive(Debug, Deserialize)]
struct OutlineEntryDoc {
    #[serde(default, alias = "chapter", alias = "chapter_number", deserialize_with = "loose_number")]
    number: Option<u64>,
    title: String,
    #[serde(default, alias = "beats", alias = "plot")]
    plot_points: Vec<String>,
    #[serde(default, alias = "word_count", alias = "target_length", deserialize_with = "loose_number")]
    target_words: Option<u64>,
}

fn schema_error(what: &str, detail: impl std::fmt::Display) -> ServiceError {
    ServiceError::permanent(format!("{} response does not match its schema: {}", what, detail))
}

/// Decode the JSON document inside a model response
///
/// Falls back to the outermost `{...}` or `[...]` span when prose surrounds it.
fn decode_document<T: DeserializeOwned>(what: &str, text: &str) -> Result<T, ServiceError> {
    let cleaned = strip_reasoning(text);
    let body = strip_code_fence(&cleaned);

    match serde_json::from_str(body) {
        Ok(doc) => Ok(doc),
        Err(first) => {
            let span = ['{', '[']
                .iter()
                .zip(['}', ']'])
                .filter_map(|(open, close)| Some((body.find(*open)?, body.rfind(close)?)))
                .filter(|(start, end)| start < end)
                .min_by_key(|(start, _)| *start);

            match span {
                Some((start, end)) => {
                    serde_json::from_str(&body[start..=end]).map_err(|e| schema_error(what, e))
                }
                None => Err(schema_error(what, first)),
            }
        }
    }
}

/// Parse the concept stage response
pub fn parse_concept(text: &str) -> Result<Concept, ServiceError> {
    let doc: ConceptDoc = decode_document("Concept", text)?;

    let title = doc.expanded_title.trim().to_string();
    if title.is_empty() {
        return Err(schema_error("Concept", "expanded_title is empty"));
    }

    let structure = doc.chapter_structure;
    let sketched = structure.act_1_discovery.len()
        + structure.act_2_investigation.len()
        + structure.act_3_confrontation.len();
    let target_chapters = structure
        .total_chapters
        .filter(|n| *n > 0)
        .or((sketched > 0).then_some(sketched as u64))
        .ok_or_else(|| schema_error("Concept", "chapter_structure.total_chapters is missing"))?;
    let target_chapters = u32::try_from(target_chapters)
        .map_err(|_| schema_error("Concept", "chapter_structure.total_chapters is out of range"))?;

    Ok(Concept {
        title,
        subtitle: doc.subtitle.trim().to_string(),
        audience: Audience {
            primary: doc.target_audience.primary,
            secondary: doc.target_audience.secondary,
            key_interests: doc.target_audience.key_interests,
        },
        themes: doc.core_themes,
        genre: Genre {
            primary: doc.genre_classification.primary,
            secondary: doc.genre_classification.secondary,
            tone: doc.genre_classification.tone,
        },
        target_chapters,
        word_count: doc.word_count,
        structure: StructureSketch {
            prologue: structure.prologue.filter(|p| !p.trim().is_empty()),
            act_one: structure.act_1_discovery,
            act_two: structure.act_2_investigation,
            act_three: structure.act_3_confrontation,
            epilogue: structure.epilogue.filter(|e| !e.trim().is_empty()),
        },
        unique_selling_proposition: doc.unique_selling_proposition,
    })
}

/// Parse the outline stage response
///
/// Entries without a number are numbered by position. The result must pass
/// [`Outline::validate`].
pub fn parse_outline(text: &str) -> Result<Outline, ServiceError> {
    let doc: OutlineDoc = decode_document("Outline", text)?;
    let raw = match doc {
        OutlineDoc::Wrapped { chapters } => chapters,
        OutlineDoc::Bare(chapters) => chapters,
    };

    let entries = raw
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let number = match entry.number {
                Some(n) => u32::try_from(n)
                    .map_err(|_| schema_error("Outline", format!("chapter number {} is out of range", n)))?,
                None => index as u32 + 1,
            };
            let target_words = entry
                .target_words
                .filter(|w| *w > 0)
                .and_then(|w| u32::try_from(w).ok())
                .unwrap_or(DEFAULT_CHAPTER_WORDS);
            Ok(OutlineEntry {
                number,
                title: entry.title.trim().to_string(),
                plot_points: entry.plot_points,
                target_words,
            })
        })
        .collect::<Result<Vec<_>, ServiceError>>()?;

    let outline = Outline::new(entries);
    outline.validate().map_err(|e| schema_error("Outline", e))?;
    Ok(outline)
}
