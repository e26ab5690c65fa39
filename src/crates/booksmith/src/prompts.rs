//! Prompt construction for each unit of work
//!
//! Every request carries a tag naming its unit (`concept`, `outline`, `chapter-3`,
//! `refine-3`); the tag drives logging and dry-run fixture lookup.

use crate::model::{Concept, Outline, OutlineEntry};
use crate::summarizer::ContextDigest;
use llm::{ChatMessage, ChatRequest};

/// Model and sampling choices applied to every request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptSettings {
    /// Overrides the backend's model when set
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl PromptSettings {
    fn apply(&self, mut request: ChatRequest) -> ChatRequest {
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        request
    }
}

pub fn chapter_tag(number: u32) -> String {
    format!("chapter-{}", number)
}

pub fn refine_tag(number: u32) -> String {
    format!("refine-{}", number)
}

const CONCEPT_SCHEMA: &str = r#"{
  "expanded_title": "A clear, evocative full title for the work.",
  "subtitle": "A one-sentence hook capturing the core premise.",
  "target_audience": {
    "primary": "The main audience segment.",
    "secondary": ["Secondary or niche audience segments."],
    "key_interests": ["Themes, tropes or interests that appeal to the audience."]
  },
  "core_themes": ["4-6 central themes explored in the work."],
  "genre_classification": {
    "primary": "Main genre.",
    "secondary": ["Secondary genres or subgenres."],
    "tone": "Brief description of the tone or atmosphere."
  },
  "word_count": "Estimated total word count as a number.",
  "chapter_structure": {
    "prologue": "Brief summary of the prologue (if present).",
    "act_1_discovery": ["Key plot beats or chapters in Act 1."],
    "act_2_investigation": ["Key plot beats or chapters in Act 2."],
    "act_3_confrontation": ["Key plot beats or chapters in Act 3."],
    "epilogue": "Brief summary of the epilogue (if present).",
    "total_chapters": "Total number of chapters as a number."
  },
  "unique_selling_proposition": "One or two sentences on what makes the work unique."
}"#;

const OUTLINE_SCHEMA: &str = r#"{
  "chapters": [
    {
      "number": 1,
      "title": "Chapter title.",
      "plot_points": ["Events that must happen in this chapter."],
      "target_words": 2500
    }
  ]
}"#;

pub fn concept_request(idea: &str, settings: &PromptSettings) -> ChatRequest {
    let prompt = format!(
        "Based on this book idea: \"{idea}\"\n\n\
         Create a comprehensive book concept including:\n\
         1. Expanded title and subtitle\n\
         2. Target audience analysis\n\
         3. Core themes and messages\n\
         4. Genre classification\n\
         5. Estimated word count and chapter structure\n\
         6. Unique selling proposition\n\n\
         Format your output strictly as JSON using the following structure:\n\n{CONCEPT_SCHEMA}\n",
        idea = idea.trim(),
    );

    settings.apply(ChatRequest::new(
        "concept",
        vec![
            ChatMessage::system("You are an experienced publishing strategist."),
            ChatMessage::user(prompt),
        ],
    ))
}

fn concept_brief(concept: &Concept) -> String {
    let mut brief = format!(
        "Title: {}\nSubtitle: {}\nGenre: {} ({})\nAudience: {}\nThemes: {}\n",
        concept.title,
        concept.subtitle,
        concept.genre.primary,
        concept.genre.tone,
        concept.audience.primary,
        concept.themes.join(", "),
    );
    if let Some(prologue) = &concept.structure.prologue {
        brief.push_str(&format!("Prologue: {}\n", prologue));
    }
    for (act, beats) in [
        ("Act 1", &concept.structure.act_one),
        ("Act 2", &concept.structure.act_two),
        ("Act 3", &concept.structure.act_three),
    ] {
        if !beats.is_empty() {
            brief.push_str(&format!("{}: {}\n", act, beats.join("; ")));
        }
    }
    if let Some(epilogue) = &concept.structure.epilogue {
        brief.push_str(&format!("Epilogue: {}\n", epilogue));
    }
    brief
}

pub fn outline_request(idea: &str, concept: &Concept, settings: &PromptSettings) -> ChatRequest {
    let words_hint = concept
        .word_count
        .map(|w| format!(" The whole book should total about {} words.", w))
        .unwrap_or_default();

    let prompt = format!(
        "Original idea: \"{idea}\"\n\n{brief}\n\
         Write a chapter-by-chapter outline with exactly {count} chapters, numbered from 1.{words_hint}\n\
         Format your output strictly as JSON using the following structure:\n\n{OUTLINE_SCHEMA}\n",
        idea = idea.trim(),
        brief = concept_brief(concept),
        count = concept.target_chapters,
    );

    settings.apply(ChatRequest::new(
        "outline",
        vec![
            ChatMessage::system("You are a meticulous story editor who plans novels chapter by chapter."),
            ChatMessage::user(prompt),
        ],
    ))
}

pub fn chapter_request(
    concept: &Concept,
    outline: &Outline,
    entry: &OutlineEntry,
    digest: &ContextDigest,
    settings: &PromptSettings,
) -> ChatRequest {
    let plan: String = outline
        .entries
        .iter()
        .map(|e| format!("{}. {}\n", e.number, e.title))
        .collect();

    let context = if digest.is_empty() {
        "This is the opening of the book; no chapters precede it.".to_string()
    } else {
        format!("Story so far:\n{}", digest.render())
    };

    let prompt = format!(
        "{brief}\nChapter plan:\n{plan}\n{context}\n\n\
         Write chapter {number}, \"{title}\", in about {words} words.\n\
         It must cover:\n{points}\n\
         Stay consistent with everything above. Return only the chapter prose.",
        brief = concept_brief(concept),
        number = entry.number,
        title = entry.title,
        words = entry.target_words,
        points = entry
            .plot_points
            .iter()
            .map(|p| format!("- {}\n", p))
            .collect::<String>(),
    );

    settings.apply(ChatRequest::new(
        chapter_tag(entry.number),
        vec![
            ChatMessage::system("You are a skilled novelist writing one chapter of a book."),
            ChatMessage::user(prompt),
        ],
    ))
}

pub fn refine_request(
    concept: &Concept,
    entry: &OutlineEntry,
    raw_text: &str,
    settings: &PromptSettings,
) -> ChatRequest {
    let prompt = format!(
        "Book: {title} ({genre}, {tone})\n\
         Revise chapter {number}, \"{chapter}\", below. Tighten the prose, fix continuity slips and \
         keep every plot event. Return only the revised chapter.\n\n{raw_text}",
        title = concept.title,
        genre = concept.genre.primary,
        tone = concept.genre.tone,
        number = entry.number,
        chapter = entry.title,
    );

    settings.apply(ChatRequest::new(
        refine_tag(entry.number),
        vec![
            ChatMessage::system("You are a careful line editor."),
            ChatMessage::user(prompt),
        ],
    ))
}
