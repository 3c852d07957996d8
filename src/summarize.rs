//! Retrieval-oriented summaries for extracted elements.
//!
//! Summaries are what gets embedded; the original element is stored
//! alongside and returned at query time. Text elements are used verbatim
//! unless `summarizer.summarize_texts` is set, tables always go through the
//! model.

use std::sync::Arc;

use tracing::debug;

use crate::error::SummarizationError;
use crate::llm::GenerativeModel;
use crate::models::ElementKind;

/// Prompt asking the model for a retrieval-friendly summary of one element.
pub fn summary_prompt(element: &str) -> String {
    format!(
        "You are an assistant tasked with summarising tables and text for retrieval. \
         These summaries will be embedded and used to retrieve the raw text or table elements. \
         Give a concise summary of the table or text that is well optimized for retrieval. \
         Table or text: {}",
        element
    )
}

/// Summaries in the same order as their inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summaries {
    pub texts: Vec<String>,
    pub tables: Vec<String>,
}

pub struct Summarizer {
    model: Arc<dyn GenerativeModel>,
}

impl Summarizer {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// Summarize texts and tables sequentially. The first failing call
    /// aborts the whole batch.
    pub async fn summarize(
        &self,
        texts: &[String],
        tables: &[String],
        summarize_texts: bool,
    ) -> Result<Summaries, SummarizationError> {
        let texts = if summarize_texts {
            self.summarize_all(ElementKind::Text, texts).await?
        } else {
            texts.to_vec()
        };
        let tables = self.summarize_all(ElementKind::Table, tables).await?;
        Ok(Summaries { texts, tables })
    }

    async fn summarize_all(
        &self,
        kind: ElementKind,
        elements: &[String],
    ) -> Result<Vec<String>, SummarizationError> {
        let mut summaries = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            let summary = self
                .model
                .generate(&summary_prompt(element))
                .await
                .map_err(|source| SummarizationError {
                    kind,
                    index,
                    source,
                })?;
            debug!(%kind, index, "summarized element");
            summaries.push(summary);
        }
        Ok(summaries)
    }
}
