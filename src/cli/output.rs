use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{CandidateRecord, OutputFormat, SearchResults};
use crate::services::{Analysis, PipelineReport};
use crate::utils::preview;

/// Appends one line to a `String` buffer; writing to a `String` cannot fail.
macro_rules! out {
    ($buf:expr) => {
        let _ = writeln!($buf);
    };
    ($buf:expr, $($arg:tt)*) => {
        let _ = writeln!($buf, $($arg)*);
    };
}

const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_record(&self, record: &CandidateRecord) -> String;
    fn format_records(&self, records: &[CandidateRecord]) -> String;
    fn format_analysis(&self, analysis: &Analysis) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_report(&self, report: &PipelineReport) -> String;
    fn format_message(&self, message: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_url: String,
    pub embedding_healthy: bool,
    pub vector_store_url: String,
    pub vector_store_connected: bool,
    pub collection: String,
    pub collection_exists: bool,
    pub points: Option<u64>,
}

fn author_names(record: &CandidateRecord) -> String {
    record
        .authors
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct TextFormatter;

impl TextFormatter {
    fn write_record_details(output: &mut String, record: &CandidateRecord, indent: &str) {
        if !record.authors.is_empty() {
            out!(output, "{}Authors:    {}", indent, author_names(record));
        }
        if !record.categories.is_empty() {
            out!(output, "{}Categories: {}", indent, record.categories.join(", "));
        }
        if !record.published.is_empty() {
            out!(output, "{}Published:  {}", indent, record.published);
        }
    }
}

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        out!(output, "Search results for: \"{}\"", results.query);
        out!(
            output,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        );

        for (i, result) in results.results.iter().enumerate() {
            let record = &result.record;
            out!(
                output,
                "{}. [Score: {:.3}] {}  {}",
                i + 1,
                result.score,
                record.id,
                preview(&record.title, 100)
            );
            Self::write_record_details(&mut output, record, "   ");
            out!(output, "   ---");
            out!(output, "   {}", preview(&record.summary, PREVIEW_CHARS));
            out!(output);
        }

        output
    }

    fn format_record(&self, record: &CandidateRecord) -> String {
        let mut output = String::new();
        out!(output, "{}", record.id);
        out!(output, "{}", "-".repeat(record.id.chars().count()));
        if !record.title.is_empty() {
            out!(output, "Title:      {}", preview(&record.title, usize::MAX));
        }
        Self::write_record_details(&mut output, record, "");
        if !record.updated.is_empty() {
            out!(output, "Updated:    {}", record.updated);
        }
        if let Some(ref doi) = record.doi {
            out!(output, "DOI:        {}", doi);
        }
        if let Some(ref journal_ref) = record.journal_ref {
            out!(output, "Journal:    {}", journal_ref);
        }
        if !record.comment.is_empty() {
            out!(output, "Comment:    {}", record.comment);
        }
        for link in &record.links {
            if link.media_type.is_empty() {
                out!(output, "Link:       {}", link.href);
            } else {
                out!(output, "Link:       {} ({})", link.href, link.media_type);
            }
        }
        out!(output);
        out!(output, "{}", preview(&record.summary, usize::MAX));
        output
    }

    fn format_records(&self, records: &[CandidateRecord]) -> String {
        if records.is_empty() {
            return "No stored records\n".to_string();
        }

        let mut output = String::new();
        for (i, record) in records.iter().enumerate() {
            out!(output, "{}. {}  {}", i + 1, record.id, preview(&record.title, 100));
            Self::write_record_details(&mut output, record, "   ");
            out!(output);
        }
        output
    }

    fn format_analysis(&self, analysis: &Analysis) -> String {
        let mut output = String::new();
        out!(output, "Explanation ({})", analysis.model);
        out!(output, "-----------");
        out!(output, "{}", analysis.explanation.trim_end());
        out!(output);

        if analysis.related.is_empty() {
            out!(output, "No related papers found");
            return output;
        }
        out!(output, "Related papers:");
        for (i, result) in analysis.related.iter().enumerate() {
            out!(
                output,
                "{}. [Score: {:.3}] {}  {}",
                i + 1,
                result.score,
                result.record.id,
                preview(&result.record.title, 100)
            );
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        out!(output, "Status");
        out!(output, "------");

        let embedding_status = if status.embedding_healthy {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        out!(
            output,
            "Embedding:     {} ({})",
            status.embedding_provider,
            embedding_status
        );
        out!(output, "  Model:       {}", status.embedding_model);
        out!(output, "  URL:         {}", status.embedding_url);
        out!(output);

        let vector_status = if status.vector_store_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        out!(output, "Vector Store:  qdrant ({})", vector_status);
        out!(output, "  URL:         {}", status.vector_store_url);
        if status.vector_store_connected {
            let state = if status.collection_exists {
                "exists"
            } else {
                "missing"
            };
            out!(output, "  Collection:  {} ({})", status.collection, state);
            if let Some(points) = status.points {
                out!(output, "  Points:      {}", points);
            }
        }

        output
    }

    fn format_report(&self, report: &PipelineReport) -> String {
        let stats = &report.stats;
        let mut output = String::new();
        out!(output, "Pipeline Stopped");
        out!(output, "----------------");
        out!(output, "Started:            {}", report.started_at);
        out!(output, "Duration:           {}ms", report.duration_ms);
        out!(output, "Messages received:  {}", stats.messages_received);
        out!(output, "Messages discarded: {}", stats.messages_discarded);
        out!(output, "Batches dispatched: {}", stats.batches_dispatched);
        out!(output, "Batches stored:     {}", stats.batches_stored);
        out!(output, "Batches failed:     {}", stats.batches_failed);
        out!(output, "Records stored:     {}", stats.records_stored);
        out!(output, "Records skipped:    {}", stats.records_skipped);
        if report.drain_timed_out {
            out!(output, "Drain deadline expired; pending records were dropped.");
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        self.render(results)
    }

    fn format_record(&self, record: &CandidateRecord) -> String {
        self.render(record)
    }

    fn format_records(&self, records: &[CandidateRecord]) -> String {
        self.render(&serde_json::json!({ "records": records }))
    }

    fn format_analysis(&self, analysis: &Analysis) -> String {
        self.render(analysis)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let json = serde_json::json!({
            "embedding": {
                "provider": status.embedding_provider,
                "model": status.embedding_model,
                "url": status.embedding_url,
                "connected": status.embedding_healthy,
            },
            "vector_store": {
                "url": status.vector_store_url,
                "connected": status.vector_store_connected,
                "collection": status.collection,
                "collection_exists": status.collection_exists,
                "points": status.points,
            }
        });
        self.render(&json)
    }

    fn format_report(&self, report: &PipelineReport) -> String {
        self.render(report)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("## No results found\n\nQuery: `{}`\n", results.query);
        }

        let mut output = String::new();
        out!(output, "## Search Results\n");
        out!(output, "**Query:** `{}`\n", results.query);
        out!(
            output,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        );

        for (i, result) in results.results.iter().enumerate() {
            let record = &result.record;
            out!(
                output,
                "### {}. {} (score {:.3})\n",
                i + 1,
                preview(&record.title, 100),
                result.score
            );
            out!(output, "**ID:** `{}`\n", record.id);
            if !record.categories.is_empty() {
                let categories: Vec<String> =
                    record.categories.iter().map(|c| format!("`{}`", c)).collect();
                out!(output, "**Categories:** {}\n", categories.join(", "));
            }
            out!(output, "> {}\n", preview(&record.summary, PREVIEW_CHARS));
        }

        output
    }

    fn format_record(&self, record: &CandidateRecord) -> String {
        let mut output = String::new();
        out!(output, "## {}\n", preview(&record.title, usize::MAX));
        out!(output, "- **ID:** `{}`", record.id);
        if !record.authors.is_empty() {
            out!(output, "- **Authors:** {}", author_names(record));
        }
        if !record.categories.is_empty() {
            out!(output, "- **Categories:** {}", record.categories.join(", "));
        }
        if !record.published.is_empty() {
            out!(output, "- **Published:** {}", record.published);
        }
        if let Some(ref doi) = record.doi {
            out!(output, "- **DOI:** {}", doi);
        }
        if let Some(ref journal_ref) = record.journal_ref {
            out!(output, "- **Journal:** {}", journal_ref);
        }
        for link in &record.links {
            out!(output, "- [{}]({})", link.rel, link.href);
        }
        out!(output);
        out!(output, "{}", preview(&record.summary, usize::MAX));
        output
    }

    fn format_records(&self, records: &[CandidateRecord]) -> String {
        if records.is_empty() {
            return "## No stored records\n".to_string();
        }

        let mut output = String::new();
        out!(output, "## Papers\n");
        for record in records {
            out!(output, "- **{}** (`{}`)", preview(&record.title, 100), record.id);
        }
        output
    }

    fn format_analysis(&self, analysis: &Analysis) -> String {
        let mut output = String::new();
        out!(output, "## Explanation\n");
        out!(output, "{}\n", analysis.explanation.trim_end());
        out!(output, "*Model: {}*\n", analysis.model);

        if !analysis.related.is_empty() {
            out!(output, "### Related Papers\n");
            for result in &analysis.related {
                out!(
                    output,
                    "- **{}** (`{}`, score {:.3})",
                    preview(&result.record.title, 100),
                    result.record.id,
                    result.score
                );
            }
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        out!(output, "## Status\n");

        let embedding_status = if status.embedding_healthy {
            "✅"
        } else {
            "❌"
        };
        out!(
            output,
            "### Embedding ({}) {}\n",
            status.embedding_provider,
            embedding_status
        );
        out!(output, "- **Model:** {}", status.embedding_model);
        out!(output, "- **URL:** `{}`", status.embedding_url);
        out!(output);

        let vector_status = if status.vector_store_connected {
            "✅"
        } else {
            "❌"
        };
        out!(output, "### Vector Store (qdrant) {}\n", vector_status);
        out!(output, "- **URL:** `{}`", status.vector_store_url);
        out!(
            output,
            "- **Collection:** {} ({})",
            status.collection,
            if status.collection_exists {
                "exists"
            } else {
                "missing"
            }
        );
        if let Some(points) = status.points {
            out!(output, "- **Points:** {}", points);
        }

        output
    }

    fn format_report(&self, report: &PipelineReport) -> String {
        let stats = &report.stats;
        let mut output = String::new();
        out!(output, "## Pipeline Stopped\n");
        out!(output, "| Metric | Value |");
        out!(output, "|--------|-------|");
        out!(output, "| Started | {} |", report.started_at);
        out!(output, "| Duration | {}ms |", report.duration_ms);
        out!(output, "| Messages received | {} |", stats.messages_received);
        out!(output, "| Messages discarded | {} |", stats.messages_discarded);
        out!(output, "| Batches dispatched | {} |", stats.batches_dispatched);
        out!(output, "| Batches stored | {} |", stats.batches_stored);
        out!(output, "| Batches failed | {} |", stats.batches_failed);
        out!(output, "| Records stored | {} |", stats.records_stored);
        out!(output, "| Records skipped | {} |", stats.records_skipped);
        if report.drain_timed_out {
            out!(output, "\n> Drain deadline expired; pending records were dropped.");
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
